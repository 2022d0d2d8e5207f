//! # Built-in subscribers
//!
//! - [`PersistenceLogger`]: best-effort JSON-lines lifecycle log, one file per day.

mod persistence;

pub use persistence::PersistenceLogger;
