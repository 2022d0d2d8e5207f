//! Runtime core: queues, workers, retries and the bus itself.
//!
//! The only public entry point is [`EventBus`]; the health and metrics
//! report types are re-exported for callers of its query methods.
//!
//! Internal modules:
//! - [`queue`]: bounded per-priority lanes with suspension on full;
//! - [`pending`]: result slots, the single arbiter of who settles an event;
//! - [`worker`]: dispatch loop and worker pool;
//! - [`retry`]: timer-driven re-enqueue with backoff;
//! - [`state`]: shared bookkeeping and terminal settlement;
//! - [`journal`]: history ring and lifecycle-record fan-out;
//! - [`dead_letter`], [`metrics`], [`health`]: observability.

mod bus;
mod dead_letter;
mod health;
mod journal;
mod listen;
mod metrics;
mod pending;
mod queue;
mod retry;
mod state;
mod worker;

#[cfg(test)]
mod scenarios;

pub use bus::EventBus;
pub use health::{EventHealth, HealthState, HealthStatus, PerformanceHealth, QueueHealth, WorkerHealth};
pub use listen::ListenBuilder;
pub use metrics::MetricsSnapshot;
