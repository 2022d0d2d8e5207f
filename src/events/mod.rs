//! Event data model and lifecycle records.
//!
//! This module groups the event **data model** consumed by listeners and the
//! **lifecycle records** the bus produces while moving an event through its
//! state machine.
//!
//! ## Contents
//! - [`Event`] identity + mutable processing envelope around a typed [`Payload`]
//! - [`EventType`], [`Priority`], [`EventStatus`] closed classifications
//! - [`Delivery`] read-only view handed to listener handlers
//! - [`EventView`] serializable snapshot used by history and dead-letter inspection
//! - [`LifecycleRecord`], [`Action`] one JSON line of the persistence log
//!
//! ## Quick reference
//! - **Producers**: callers build an `Event` and hand it to `EventBus::emit`.
//! - **Consumers**: workers build a `Delivery` per listener invocation;
//!   the journal turns every transition into an `EventView` (history) and a
//!   `LifecycleRecord` (subscribers, persistence).

mod event;
mod payload;
mod record;

pub use event::{Delivery, Event, EventStatus, EventView, Priority};
pub use payload::{CallRecordUpload, DialogRecord, EventType, FileUpload, Payload, WechatMessage};
pub use record::{Action, LifecycleRecord};
