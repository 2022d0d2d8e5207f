//! # Shared bus state and terminal settlement.
//!
//! [`BusState`] is shared (`Arc`) by the bus handle, every worker, retry
//! timers and the health loop. It owns the bookkeeping that outlives a single
//! `start()`/`stop()` cycle: listeners, pending result slots, the dead-letter
//! ring, history/subscribers and metrics.
//!
//! Every terminal transition goes through [`BusState::finish`] (or
//! [`BusState::settle`] when the claim is already held), so for each event:
//! - the pending slot is claimed first; a lost claim discards the outcome;
//! - status, dead-letter, metrics, journal and the caller's slot are updated
//!   together, exactly once.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::config::Config;
use crate::core::dead_letter::DeadLetterBuffer;
use crate::core::journal::Journal;
use crate::core::metrics::MetricsCollector;
use crate::core::pending::{Claim, PendingMap};
use crate::error::BusError;
use crate::events::{Action, Event, EventStatus};
use crate::listeners::ListenerRegistry;

/// Terminal outcome of one event.
pub(crate) enum Outcome {
    Completed(Value),
    Failed(BusError),
    TimedOut { timeout: Duration, reason: String },
    Cancelled(&'static str),
}

pub(crate) struct BusState {
    pub(crate) cfg: Config,
    pub(crate) registry: ListenerRegistry,
    pub(crate) pending: PendingMap,
    pub(crate) dead_letter: DeadLetterBuffer,
    pub(crate) journal: Journal,
    pub(crate) metrics: MetricsCollector,
}

impl BusState {
    pub(crate) fn new(cfg: Config) -> Self {
        Self {
            registry: ListenerRegistry::new(),
            pending: PendingMap::default(),
            dead_letter: DeadLetterBuffer::new(cfg.dead_letter_capacity_clamped()),
            journal: Journal::new(cfg.history_capacity),
            metrics: MetricsCollector::new(cfg.processing_samples, cfg.metrics_window),
            cfg,
        }
    }

    /// Claims `event` and settles it; returns `false` if someone else already had.
    pub(crate) fn finish(&self, event: Event, outcome: Outcome, worker: Option<&Arc<str>>) -> bool {
        let claim = self.pending.claim(&event);
        if matches!(claim, Claim::Settled) {
            tracing::debug!(
                event_id = %event.id(),
                event_type = %event.event_type(),
                "event already settled by its caller, outcome discarded"
            );
            return false;
        }
        self.settle(event, claim, outcome, worker);
        true
    }

    /// Applies a terminal outcome for which `claim` was already obtained.
    pub(crate) fn settle(
        &self,
        mut event: Event,
        claim: Claim,
        outcome: Outcome,
        worker: Option<&Arc<str>>,
    ) {
        match outcome {
            Outcome::Completed(value) => {
                event.transition(EventStatus::Completed);
                self.metrics.completed(event.processing_time());
                let suppressed = event
                    .is_partial_failure()
                    .then(|| event.suppressed_failures().join("; "));
                self.journal
                    .record(&event, Action::Completed, worker, suppressed);
                tracing::debug!(
                    event_id = %event.id(),
                    event_type = %event.event_type(),
                    partial_failure = event.is_partial_failure(),
                    processing_time = ?event.processing_time(),
                    "event completed"
                );
                claim.resolve(Ok(value));
            }
            Outcome::Failed(err) => {
                event.transition(EventStatus::Failed);
                event.set_error(err.to_string());
                self.dead_letter(&event);
                self.metrics.failed();
                self.journal
                    .record(&event, Action::Failed, worker, Some(err.to_string()));
                tracing::error!(
                    event_id = %event.id(),
                    event_type = %event.event_type(),
                    retry_count = event.retry_count(),
                    label = err.as_label(),
                    error = %err,
                    "event failed permanently"
                );
                claim.resolve(Err(err));
            }
            Outcome::TimedOut { timeout, reason } => {
                event.transition(EventStatus::Timeout);
                event.set_error(reason.clone());
                self.dead_letter(&event);
                self.metrics.timed_out();
                self.journal
                    .record(&event, Action::Timeout, worker, Some(reason.clone()));
                tracing::warn!(
                    event_id = %event.id(),
                    event_type = %event.event_type(),
                    ?timeout,
                    reason = %reason,
                    "event timed out"
                );
                claim.resolve(Err(BusError::Timeout {
                    event_type: event.event_type(),
                    timeout,
                }));
            }
            Outcome::Cancelled(reason) => {
                event.transition(EventStatus::Cancelled);
                event.set_error(reason);
                self.metrics.cancelled(1);
                self.journal
                    .record(&event, Action::Cancelled, worker, Some(reason.to_string()));
                tracing::debug!(event_id = %event.id(), reason, "event cancelled");
                claim.resolve(Err(BusError::Cancelled));
            }
        }
    }

    fn dead_letter(&self, event: &Event) {
        if let Some(evicted) = self.dead_letter.push(event.view()) {
            tracing::debug!(
                evicted = %evicted.event_id,
                capacity = self.dead_letter.capacity(),
                "dead-letter buffer full, oldest entry evicted"
            );
        }
    }
}
