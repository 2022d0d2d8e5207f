//! Error types used by the event bus and by listener handlers.
//!
//! This module defines three enums:
//!
//! - [`BusError`] errors surfaced to callers of [`EventBus`](crate::EventBus).
//! - [`HandlerError`] errors raised by individual listener handlers.
//! - [`ConfigError`] malformed environment overrides for [`Config`](crate::Config).
//!
//! `BusError` and `HandlerError` provide `as_label` for logs/metrics.
//! Persistence failures are never represented here: the persistence logger
//! reports them through `tracing` and otherwise ignores them.

use std::time::Duration;

use thiserror::Error;

use crate::events::EventType;

/// # Errors surfaced by the event bus.
///
/// Only escalated failures, deadlines and lifecycle misuse reach callers.
/// Suppressed (non-critical) listener failures are recorded on the event
/// and never returned from [`EventBus::emit`](crate::EventBus::emit).
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum BusError {
    /// `emit` was called before `start()` or after `stop()`.
    #[error("event bus is not running")]
    NotRunning,

    /// No listener is registered for the event type; retrying cannot help.
    #[error("no listeners for event type: {event_type}")]
    NoListeners {
        /// Type of the event that had nobody to handle it.
        event_type: EventType,
    },

    /// A HIGH/CRITICAL listener failed and the event ran out of retries.
    ///
    /// Displays as the original handler error so callers see what actually broke.
    #[error("{source}")]
    ListenerFailed {
        /// Name of the listener whose failure escalated.
        listener: String,
        /// Number of attempts made (first delivery included).
        attempts: u32,
        /// The handler's own error.
        source: HandlerError,
    },

    /// The event deadline (or a listener deadline) elapsed.
    #[error("event {event_type} timed out after {timeout:?}")]
    Timeout {
        /// Type of the event that timed out.
        event_type: EventType,
        /// The deadline that was exceeded.
        timeout: Duration,
    },

    /// The bus was stopped while the event was still pending.
    #[error("event cancelled by bus shutdown")]
    Cancelled,
}

impl BusError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use eventvisor::BusError;
    ///
    /// assert_eq!(BusError::NotRunning.as_label(), "bus_not_running");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            BusError::NotRunning => "bus_not_running",
            BusError::NoListeners { .. } => "bus_no_listeners",
            BusError::ListenerFailed { attempts, .. } if *attempts > 1 => "bus_retry_exhausted",
            BusError::ListenerFailed { .. } => "bus_listener_failed",
            BusError::Timeout { .. } => "bus_timeout",
            BusError::Cancelled => "bus_cancelled",
        }
    }

    /// Returns `true` for the deadline variant.
    pub fn is_timeout(&self) -> bool {
        matches!(self, BusError::Timeout { .. })
    }

    /// Returns `true` if the caller was released by `stop()`.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, BusError::Cancelled)
    }
}

/// # Errors produced by listener handlers.
///
/// Handlers return `Fail` for ordinary failures. The bus itself produces
/// `Timeout` (listener deadline) and `Panicked` (caught unwind).
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// Handler failed; escalates only for HIGH/CRITICAL listeners.
    #[error("{error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Handler exceeded its deadline.
    #[error("listener {listener} timeout after {timeout:?}")]
    Timeout {
        /// Name of the listener that ran over.
        listener: String,
        /// The deadline that was exceeded.
        timeout: Duration,
    },

    /// Handler panicked; the panic was caught by the worker.
    #[error("handler panicked: {info}")]
    Panicked {
        /// Panic payload rendered as text.
        info: String,
    },
}

impl HandlerError {
    /// Shorthand for [`HandlerError::Fail`].
    ///
    /// # Example
    /// ```
    /// use eventvisor::HandlerError;
    ///
    /// let err = HandlerError::fail("upstream refused");
    /// assert_eq!(err.to_string(), "upstream refused");
    /// ```
    pub fn fail(error: impl Into<String>) -> Self {
        HandlerError::Fail {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            HandlerError::Fail { .. } => "handler_failed",
            HandlerError::Timeout { .. } => "handler_timeout",
            HandlerError::Panicked { .. } => "handler_panicked",
        }
    }

    /// Timeouts are terminal for the event and never go through the retry path.
    pub fn is_timeout(&self) -> bool {
        matches!(self, HandlerError::Timeout { .. })
    }
}

/// Malformed configuration override.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Environment variable is present but cannot be parsed.
    #[error("invalid value {value:?} for {key}: expected {expected}")]
    Invalid {
        /// Environment variable name.
        key: &'static str,
        /// Raw value found in the environment.
        value: String,
        /// Human-readable description of the accepted format.
        expected: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listener_failed_displays_original_error() {
        let err = BusError::ListenerFailed {
            listener: "report".into(),
            attempts: 3,
            source: HandlerError::fail("smtp down"),
        };
        assert_eq!(err.to_string(), "smtp down");
        assert_eq!(err.as_label(), "bus_retry_exhausted");
    }

    #[test]
    fn single_attempt_failure_is_not_retry_exhausted() {
        let err = BusError::ListenerFailed {
            listener: "report".into(),
            attempts: 1,
            source: HandlerError::fail("nope"),
        };
        assert_eq!(err.as_label(), "bus_listener_failed");
    }

    #[test]
    fn timeout_labels() {
        let err = HandlerError::Timeout {
            listener: "slow".into(),
            timeout: Duration::from_millis(10),
        };
        assert!(err.is_timeout());
        assert_eq!(err.as_label(), "handler_timeout");
        assert!(!HandlerError::fail("x").is_timeout());
    }
}
