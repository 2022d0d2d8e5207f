//! # Listener: a handler bound to one event type.
//!
//! A [`Listener`] owns its own semaphore so that concurrency is bounded per
//! listener, never by a global lock. Its priority orders invocation among the
//! listeners of one event type and decides whether a failure escalates.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use serde_json::Value;
//! use eventvisor::{Delivery, EventType, HandlerFn, Listener, Priority};
//!
//! let l = Listener::new(
//!     "report_sender",
//!     EventType::SendAdvisorStatsReport,
//!     HandlerFn::arc(|_d: Delivery| async { Ok(Value::Null) }),
//! )
//! .with_priority(Priority::Critical)
//! .with_max_concurrent(2)
//! .with_timeout(Duration::from_secs(60));
//!
//! assert_eq!(l.max_concurrent(), 2);
//! ```

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::Semaphore;

use super::handler::{HandlerRef, HandlerResult, panic_message};
use crate::error::HandlerError;
use crate::events::{Delivery, EventType, Priority};

/// Registered handler with priority, concurrency cap, timeout and counters.
pub struct Listener {
    name: Arc<str>,
    event_type: EventType,
    priority: Priority,
    max_concurrent: usize,
    timeout: Option<Duration>,
    handler: HandlerRef,
    permits: Semaphore,
    active: AtomicUsize,
    processed: AtomicU64,
    failed: AtomicU64,
    registered_at: DateTime<Utc>,
}

impl Listener {
    /// Creates a NORMAL-priority listener allowing one invocation at a time.
    pub fn new(name: impl Into<Arc<str>>, event_type: EventType, handler: HandlerRef) -> Self {
        Self {
            name: name.into(),
            event_type,
            priority: Priority::Normal,
            max_concurrent: 1,
            timeout: None,
            handler,
            permits: Semaphore::new(1),
            active: AtomicUsize::new(0),
            processed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            registered_at: Utc::now(),
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Bounds simultaneous invocations (clamped to a minimum of 1).
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max.max(1);
        self.permits = Semaphore::new(self.max_concurrent);
        self
    }

    /// Overrides the event timeout for this listener.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Invocations currently running.
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Successful invocations so far.
    pub fn total_processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Failed, panicked or timed-out invocations so far.
    pub fn total_failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Runs the handler once under this listener's semaphore and deadline.
    ///
    /// The deadline is the listener override, else `event_timeout`; a zero
    /// deadline means none. Panics are caught and reported as
    /// [`HandlerError::Panicked`].
    pub(crate) async fn invoke(&self, delivery: Delivery, event_timeout: Duration) -> HandlerResult {
        let Ok(_permit) = self.permits.acquire().await else {
            return Err(HandlerError::fail("listener semaphore closed"));
        };
        let _active = ActiveGuard::enter(&self.active);

        let deadline = self.timeout.unwrap_or(event_timeout);
        let call = AssertUnwindSafe(self.handler.handle(delivery)).catch_unwind();

        let outcome = if deadline.is_zero() {
            call.await
        } else {
            match tokio::time::timeout(deadline, call).await {
                Ok(out) => out,
                Err(_) => Ok(Err(HandlerError::Timeout {
                    listener: self.name.to_string(),
                    timeout: deadline,
                })),
            }
        };

        let res = match outcome {
            Ok(res) => res,
            Err(panic) => Err(HandlerError::Panicked {
                info: panic_message(&*panic),
            }),
        };
        match &res {
            Ok(_) => self.processed.fetch_add(1, Ordering::Relaxed),
            Err(_) => self.failed.fetch_add(1, Ordering::Relaxed),
        };
        res
    }

    /// Serializable snapshot used by listener introspection.
    pub fn view(&self) -> ListenerView {
        ListenerView {
            name: self.name.to_string(),
            event_type: self.event_type,
            priority: self.priority,
            max_concurrent: self.max_concurrent,
            timeout_ms: self
                .timeout
                .map(|t| t.as_millis().min(u128::from(u64::MAX)) as u64),
            active_count: self.active_count(),
            total_processed: self.total_processed(),
            total_failed: self.total_failed(),
            registered_at: self.registered_at,
        }
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("name", &self.name)
            .field("event_type", &self.event_type)
            .field("priority", &self.priority)
            .field("max_concurrent", &self.max_concurrent)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Keeps `active` in sync even when the invocation future is dropped mid-flight.
struct ActiveGuard<'a>(&'a AtomicUsize);

impl<'a> ActiveGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Point-in-time copy of a listener's configuration and counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListenerView {
    pub name: String,
    pub event_type: EventType,
    pub priority: Priority,
    pub max_concurrent: usize,
    pub timeout_ms: Option<u64>,
    pub active_count: usize,
    pub total_processed: u64,
    pub total_failed: u64,
    pub registered_at: DateTime<Utc>,
}
