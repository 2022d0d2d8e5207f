//! # eventvisor
//!
//! **Eventvisor** is an in-process, priority-aware, retrying and observable
//! event bus for tokio services.
//!
//! Request handlers and background jobs emit typed [`Event`]s; listeners
//! registered per [`EventType`] do the actual work (persist a record, call an
//! external API, send a notification). The bus bounds memory with per-priority
//! queues, bounds concurrency per listener, retries escalated failures with
//! backoff, and keeps dead-letter, history, metrics and a persistence log for
//! inspection.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   caller ── emit(Event) ─────────────────────────────────────────┐
//!      ▲                                                            ▼
//!      │ result / error        ┌────────────────────────────────────────────┐
//!      └──── pending slot ◄────│ QueueSet: CRITICAL │ HIGH │ NORMAL │ LOW     │
//!                              │ (bounded lanes, producers suspend if full) │
//!                              └──────────────────────┬─────────────────────┘
//!                                                     ▼ highest lane first
//! ┌───────────────────────────────────────────────────────────────────────────┐
//! │ WorkerPool: worker-0 … worker-N                                           │
//! │   listeners of the type, descending priority, each under its semaphore    │
//! │   + timeout + catch_unwind                                                │
//! └───────┬──────────────────────┬───────────────────────────┬────────────────┘
//!         ▼                      ▼                           ▼
//!     COMPLETED        HIGH/CRITICAL failure          listener timeout
//!                      ├─ retries left → RetryScheduler (timer) → re-enqueue
//!                      └─ exhausted    → FAILED ─┐               TIMEOUT ─┐
//!                                                ▼                        ▼
//!                                         DeadLetterBuffer (ring, oldest evicted)
//!
//! every transition ──► Journal ──► history ring
//!                              └─► SubscriberSet ──► PersistenceLogger (JSON lines / day)
//!                                                └─► user subscribers
//!
//! side loops: HealthMonitor (restart exited workers, pressure warnings)
//!             throughput sampler (events/second over a rolling window)
//! ```
//!
//! ### Event lifecycle
//! ```text
//! PENDING ─► PROCESSING ─► COMPLETED | FAILED | TIMEOUT | CANCELLED
//!    ▲            │
//!    └── retry ───┘   (retry_count += 1, delay = first × factor^(retry-1))
//! ```
//!
//! ## Features
//! | Area              | Description                                                   | Key types / traits                              |
//! |-------------------|---------------------------------------------------------------|-------------------------------------------------|
//! | **Bus**           | Start/stop, emit with backpressure, queries.                  | [`EventBus`], [`ListenBuilder`]                 |
//! | **Events**        | Typed payloads, priorities, lifecycle status.                 | [`Event`], [`Payload`], [`EventType`], [`Priority`] |
//! | **Listeners**     | Async or blocking handlers with caps and timeouts.            | [`Handler`], [`HandlerFn`], [`BlockingFn`], [`Listener`] |
//! | **Policies**      | Retry delay growth and jitter.                                | [`BackoffPolicy`], [`JitterPolicy`]             |
//! | **Observability** | Metrics, health, history, dead letters, lifecycle records.    | [`MetricsSnapshot`], [`HealthStatus`], [`Subscribe`], [`PersistenceLogger`] |
//! | **Application**   | Explicit context and per-service emit helper.                 | [`AppContext`], [`Emitter`]                     |
//! | **Errors**        | Typed errors for callers and handlers.                        | [`BusError`], [`HandlerError`], [`ConfigError`] |
//! | **Configuration** | Defaults plus `EVENT_BUS_*` environment overrides.            | [`Config`]                                      |
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use serde_json::json;
//! use eventvisor::{
//!     Config, Delivery, Event, EventBus, EventType, HandlerError, Payload, Priority, WechatMessage,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = Config { persistence: false, worker_count: 2, ..Config::default() };
//!     let bus = EventBus::new(cfg);
//!
//!     // Critical listener: its failures are retried, then dead-lettered.
//!     bus.listen(EventType::SendWechatMessage)
//!         .name("bot_sender")
//!         .priority(Priority::Critical)
//!         .max_concurrent(4)
//!         .handler(|d: Delivery| async move {
//!             match d.payload() {
//!                 Payload::SendWechatMessage(msg) => Ok(json!({ "to": msg.to_wxid })),
//!                 _ => Err(HandlerError::fail("unexpected payload")),
//!             }
//!         });
//!
//!     bus.start().await;
//!
//!     let ev = Event::new(WechatMessage { to_wxid: "ops".into(), message: "deploy done".into() })
//!         .with_priority(Priority::High)
//!         .wait_for_result(true)
//!         .with_timeout(Duration::from_secs(5));
//!     assert_eq!(bus.emit(ev).await?, Some(json!({ "to": "ops" })));
//!
//!     bus.stop(Duration::from_secs(5)).await;
//!     assert_eq!(bus.metrics().completed_events, 1);
//!     Ok(())
//! }
//! ```
mod config;
mod context;
mod core;
mod error;
mod events;
mod listeners;
mod policies;
mod subscribers;

// ---- Public re-exports ----

pub use crate::core::{
    EventBus, EventHealth, HealthState, HealthStatus, ListenBuilder, MetricsSnapshot,
    PerformanceHealth, QueueHealth, WorkerHealth,
};
pub use config::Config;
pub use context::{AppContext, Emitter, ServiceHealth, ServiceStats, wait_for_shutdown_signal};
pub use error::{BusError, ConfigError, HandlerError};
pub use events::{
    Action, CallRecordUpload, Delivery, DialogRecord, Event, EventStatus, EventType, EventView,
    FileUpload, LifecycleRecord, Payload, Priority, WechatMessage,
};
pub use listeners::{
    BlockingFn, Handler, HandlerFn, HandlerRef, HandlerResult, Listener, ListenerRegistry,
    ListenerView,
};
pub use policies::{BackoffPolicy, JitterPolicy};
pub use subscribers::{PersistenceLogger, Subscribe, SubscriberSet};
