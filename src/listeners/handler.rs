//! # Handler abstraction and closure-backed implementations.
//!
//! [`Handler`] is what a listener runs for every delivery. Two adapters cover
//! the common cases:
//! - [`HandlerFn`] wraps `Fn(Delivery) -> Future`, polled inline on the runtime;
//! - [`BlockingFn`] wraps `Fn(Delivery) -> Result`, executed on tokio's bounded
//!   blocking pool so synchronous I/O never stalls other dispatch.
//!
//! ## Example
//! ```rust
//! use serde_json::json;
//! use eventvisor::{Delivery, HandlerError, HandlerFn, HandlerRef, Payload};
//!
//! let h: HandlerRef = HandlerFn::arc(|d: Delivery| async move {
//!     match d.payload() {
//!         Payload::SendWechatMessage(msg) => Ok(json!({ "sent_to": msg.to_wxid })),
//!         other => Err(HandlerError::fail(format!("unexpected payload {:?}", other.event_type()))),
//!     }
//! });
//! # let _ = h;
//! ```

use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::HandlerError;
use crate::events::Delivery;

/// Outcome of a single handler invocation.
pub type HandlerResult = Result<Value, HandlerError>;

/// Shared handle to a handler.
pub type HandlerRef = Arc<dyn Handler>;

/// # Listener capability.
///
/// Accepts one [`Delivery`] and returns a JSON value or fails.
/// Returning `Value::Null` is the idiomatic "no result".
///
/// Implementations must not block the executor; wrap blocking code in
/// [`BlockingFn`] (or call `spawn_blocking` yourself).
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, delivery: Delivery) -> HandlerResult;
}

/// Async closure handler.
///
/// Every invocation creates a fresh future; shared state has to be captured
/// explicitly through `Arc<...>`.
#[derive(Debug)]
pub struct HandlerFn<F> {
    f: F,
}

impl<F> HandlerFn<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }

    /// Wraps the closure and returns it as a shared [`HandlerRef`]-compatible handle.
    pub fn arc(f: F) -> Arc<Self> {
        Arc::new(Self::new(f))
    }
}

#[async_trait]
impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(Delivery) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn handle(&self, delivery: Delivery) -> HandlerResult {
        (self.f)(delivery).await
    }
}

/// Blocking closure handler, run via `tokio::task::spawn_blocking`.
///
/// A listener timeout releases the worker but cannot interrupt the thread;
/// the closure runs to completion in the background.
pub struct BlockingFn<F> {
    f: Arc<F>,
}

impl<F> BlockingFn<F> {
    pub fn new(f: F) -> Self {
        Self { f: Arc::new(f) }
    }

    pub fn arc(f: F) -> Arc<Self> {
        Arc::new(Self::new(f))
    }
}

#[async_trait]
impl<F> Handler for BlockingFn<F>
where
    F: Fn(Delivery) -> HandlerResult + Send + Sync + 'static,
{
    async fn handle(&self, delivery: Delivery) -> HandlerResult {
        let f = Arc::clone(&self.f);
        match tokio::task::spawn_blocking(move || f(delivery)).await {
            Ok(res) => res,
            Err(e) if e.is_panic() => Err(HandlerError::Panicked {
                info: panic_message(&*e.into_panic()),
            }),
            Err(e) => Err(HandlerError::fail(e.to_string())),
        }
    }
}

/// Renders a caught panic payload as text.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
