//! # Listeners: handlers bound to one event type.
//!
//! - [`Handler`] the single capability every listener implements
//! - [`HandlerFn`] / [`BlockingFn`] closure-backed handlers (async / blocking)
//! - [`Listener`] a handler plus priority, concurrency cap, timeout and counters
//! - [`ListenerRegistry`] per-type listener lists kept in descending priority
//!
//! ```text
//! worker ──► registry.listeners_for(type) ──► [CRITICAL.., HIGH.., NORMAL.., LOW..]
//!                                                   │
//!                                                   └─► listener.invoke(delivery)
//!                                                         ├─ semaphore (max_concurrent)
//!                                                         ├─ timeout (listener or event)
//!                                                         └─ catch_unwind
//! ```

mod handler;
mod listener;
mod registry;

pub use handler::{BlockingFn, Handler, HandlerFn, HandlerRef, HandlerResult};
pub use listener::{Listener, ListenerView};
pub use registry::ListenerRegistry;

pub(crate) use handler::panic_message;
