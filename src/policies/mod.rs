//! Retry delay policies.
//!
//! Escalated listener failures are re-enqueued after a delay computed here.
//!
//! ## Contents
//! - [`BackoffPolicy`] how retry delays evolve (first / factor / max + jitter)
//! - [`JitterPolicy`]  randomization applied on top of the computed delay
//!
//! ## Quick wiring
//! ```text
//! Config { backoff: BackoffPolicy, .. }
//!      └─► core::retry::RetryScheduler uses:
//!           - backoff.delay(retry_count) to arm the re-enqueue timer
//! ```
//!
//! ## Defaults
//! - `BackoffPolicy::default()` → first=1s, factor=2.0, max=5min, jitter=None.
//! - `JitterPolicy::None` by default; `Equal` spreads retries of bursty failures.

mod backoff;
mod jitter;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
