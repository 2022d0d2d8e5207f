//! # Listener registration builder.
//!
//! ```rust
//! use std::time::Duration;
//! use serde_json::Value;
//! use eventvisor::{Config, Delivery, EventBus, EventType, Priority};
//!
//! let bus = EventBus::new(Config { persistence: false, ..Config::default() });
//! let listener = bus
//!     .listen(EventType::AddDialogRecord)
//!     .name("dialog_cache")
//!     .priority(Priority::Low)
//!     .max_concurrent(8)
//!     .timeout(Duration::from_secs(2))
//!     .handler(|_d: Delivery| async { Ok(Value::Null) });
//!
//! assert_eq!(listener.name(), "dialog_cache");
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::core::bus::EventBus;
use crate::events::{Delivery, EventType, Priority};
use crate::listeners::{BlockingFn, HandlerFn, HandlerRef, HandlerResult, Listener};

/// Collects listener options, then registers on [`handler`](Self::handler),
/// [`blocking`](Self::blocking) or [`handle`](Self::handle).
#[must_use = "a listener is only registered once a handler is supplied"]
pub struct ListenBuilder<'a> {
    bus: &'a EventBus,
    event_type: EventType,
    name: Option<Arc<str>>,
    priority: Priority,
    max_concurrent: usize,
    timeout: Option<Duration>,
}

impl<'a> ListenBuilder<'a> {
    pub(crate) fn new(bus: &'a EventBus, event_type: EventType) -> Self {
        Self {
            bus,
            event_type,
            name: None,
            priority: Priority::Normal,
            max_concurrent: 1,
            timeout: None,
        }
    }

    /// Listener name; defaults to `<event type>#<n>`.
    pub fn name(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Registers an async closure.
    pub fn handler<F, Fut>(self, f: F) -> Arc<Listener>
    where
        F: Fn(Delivery) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.handle(HandlerFn::arc(f))
    }

    /// Registers a blocking closure, run on the blocking thread pool.
    pub fn blocking<F>(self, f: F) -> Arc<Listener>
    where
        F: Fn(Delivery) -> HandlerResult + Send + Sync + 'static,
    {
        self.handle(BlockingFn::arc(f))
    }

    /// Registers any [`Handler`](crate::Handler).
    pub fn handle(self, handler: HandlerRef) -> Arc<Listener> {
        let name = self.name.unwrap_or_else(|| {
            let n = self
                .bus
                .listeners_info()
                .get(&self.event_type)
                .map_or(0, Vec::len);
            Arc::from(format!("{}#{n}", self.event_type))
        });

        let mut listener = Listener::new(name, self.event_type, handler)
            .with_priority(self.priority)
            .with_max_concurrent(self.max_concurrent);
        if let Some(t) = self.timeout {
            listener = listener.with_timeout(t);
        }
        self.bus.register_listener(listener)
    }
}
