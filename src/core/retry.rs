//! # Retry scheduler.
//!
//! Escalated failures are re-enqueued by a timer task instead of sleeping on
//! the worker, so backoff never takes a worker away from the queues.
//!
//! ```text
//! worker ── schedule(event, delay) ──► tracker.spawn:
//!                                         select {
//!                                           token.cancelled() → settle CANCELLED
//!                                           sleep(delay)      → queues.push(event)
//!                                                                └─ closed → settle CANCELLED
//!                                         }
//! ```
//!
//! `stop()` closes the queues, then calls [`RetryScheduler::shutdown`], which
//! cancels every sleeping timer and waits for all of them to settle.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::core::queue::QueueSet;
use crate::core::state::{BusState, Outcome};
use crate::events::Event;

#[derive(Clone)]
pub(crate) struct RetryScheduler {
    tracker: TaskTracker,
    token: CancellationToken,
    queues: Arc<QueueSet>,
    state: Arc<BusState>,
}

impl RetryScheduler {
    pub(crate) fn new(state: Arc<BusState>, queues: Arc<QueueSet>, token: CancellationToken) -> Self {
        Self {
            tracker: TaskTracker::new(),
            token,
            queues,
            state,
        }
    }

    /// Re-enqueues `event` on its own priority lane after `delay`.
    pub(crate) fn schedule(&self, event: Event, delay: Duration) {
        let token = self.token.clone();
        let queues = Arc::clone(&self.queues);
        let state = Arc::clone(&self.state);

        self.tracker.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    state.finish(event, Outcome::Cancelled("bus stopped during retry backoff"), None);
                }
                _ = tokio::time::sleep(delay) => {
                    if let Err(event) = queues.push(event).await {
                        state.finish(event, Outcome::Cancelled("bus stopped during retry backoff"), None);
                    }
                }
            }
        });
    }

    /// Timers still sleeping or re-enqueueing.
    pub(crate) fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Cancels every timer and waits until each has settled its event.
    pub(crate) async fn shutdown(&self) {
        self.tracker.close();
        self.token.cancel();
        self.tracker.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::core::metrics::Gauges;
    use crate::events::{EventStatus, Payload};

    fn setup() -> (Arc<BusState>, Arc<QueueSet>, RetryScheduler) {
        let state = Arc::new(BusState::new(Config::default()));
        let queues = Arc::new(QueueSet::new(4));
        let sched = RetryScheduler::new(
            Arc::clone(&state),
            Arc::clone(&queues),
            CancellationToken::new(),
        );
        (state, queues, sched)
    }

    #[tokio::test(start_paused = true)]
    async fn requeues_after_delay() {
        let (_state, queues, sched) = setup();
        let ev = Event::new(Payload::SendAdvisorStatsReport);
        let id = ev.id();
        sched.schedule(ev, Duration::from_secs(2));

        tokio::time::sleep(Duration::from_millis(1900)).await;
        assert_eq!(queues.len(), 0);
        assert_eq!(sched.in_flight(), 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(queues.pop().await.map(|e| e.id()), Some(id));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_sleeping_retries() {
        let (state, queues, sched) = setup();
        let ev = Event::new(Payload::SendAdvisorStatsReport).wait_for_result(true);
        let rx = state.pending.register(ev.id());
        sched.schedule(ev, Duration::from_secs(60));
        tokio::task::yield_now().await;

        sched.shutdown().await;
        assert!(rx.await.unwrap().unwrap_err().is_cancelled());
        assert_eq!(queues.len(), 0);
        assert_eq!(state.metrics.snapshot(Gauges::default()).cancelled_events, 1);
        assert_eq!(state.journal.history(1)[0].status, EventStatus::Cancelled);
    }
}
