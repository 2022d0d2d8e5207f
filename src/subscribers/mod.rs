//! # Lifecycle-record subscribers.
//!
//! The bus turns every lifecycle transition of an event into a
//! [`LifecycleRecord`](crate::events::LifecycleRecord) and hands it to a
//! [`SubscriberSet`], which fans it out to each [`Subscribe`] implementation
//! without ever blocking a worker.
//!
//! ```text
//! worker / emit / stop ── LifecycleRecord ──► SubscriberSet::emit
//!                                                  │ (try_send, per-subscriber queue)
//!                                    ┌─────────────┼──────────────┐
//!                                    ▼             ▼              ▼
//!                            PersistenceLogger   Custom   ...
//! ```
//!
//! ## Built-in
//! - [`PersistenceLogger`]: appends one JSON line per record to a per-day file.

mod embedded;
mod subscriber;
mod subscriber_set;

pub use embedded::PersistenceLogger;
pub use subscriber::Subscribe;
pub use subscriber_set::SubscriberSet;
