//! # Lifecycle subscriber trait.
//!
//! [`Subscribe`] is the extension point for consuming lifecycle records
//! (audit trails, external metrics, alerting).
//!
//! Each subscriber gets:
//! - a **dedicated worker task**;
//! - a **bounded queue** (capacity via [`Subscribe::queue_capacity`]);
//! - **panic isolation**: a panic is caught and logged, the worker keeps going.
//!
//! A slow subscriber only fills its own queue. On overflow the record is
//! dropped for that subscriber only and a warning is logged.
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use eventvisor::{Action, LifecycleRecord, Subscribe};
//!
//! struct FailureAlerts;
//!
//! #[async_trait]
//! impl Subscribe for FailureAlerts {
//!     async fn on_record(&self, rec: &LifecycleRecord) {
//!         if rec.action == Action::Failed {
//!             // page someone
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "failure_alerts" }
//! }
//! ```

use async_trait::async_trait;

use crate::events::LifecycleRecord;

/// Consumer of lifecycle records.
///
/// ### Implementation requirements
/// - Use async I/O; avoid blocking the executor.
/// - Handle errors internally; records are diagnostic, nothing is retried.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Processes one record. Records arrive in FIFO order per subscriber.
    async fn on_record(&self, record: &LifecycleRecord);

    /// Name used in logs. Defaults to the type name.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Preferred queue capacity (clamped to a minimum of 1). Default: 1024.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
