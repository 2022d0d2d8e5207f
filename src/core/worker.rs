//! # Workers: drain the queue set and dispatch events to listeners.
//!
//! A [`Worker`] loops on [`QueueSet::pop`] until its token is cancelled or the
//! queues close. For each event it:
//! 1. skips it if a waiting caller already gave up (slot settled);
//! 2. marks it PROCESSING and invokes every listener of its type in
//!    descending-priority order;
//! 3. applies the failure policy per listener error:
//!
//! | listener error                  | effect                                     |
//! |---------------------------------|--------------------------------------------|
//! | timeout (any priority)          | event TIMEOUT, dead-lettered, no retry     |
//! | failure, HIGH/CRITICAL listener | abort; retry with backoff or FAILED        |
//! | failure, LOW/NORMAL listener    | recorded on the event, dispatch continues  |
//!
//! A worker never dies because of a listener: handler panics are caught at
//! the listener boundary. [`WorkerPool`] keeps the join handles so the health
//! loop can restart a worker that exited anyway, under the same identity.
//!
//! Each slot also keeps a copy of the event its worker is processing. The
//! copy is cleared only when `process` returns, so a worker aborted by
//! `stop()` leaves its event behind to be settled as CANCELLED.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::queue::QueueSet;
use crate::core::retry::RetryScheduler;
use crate::core::state::{BusState, Outcome};
use crate::error::{BusError, HandlerError};
use crate::events::{Action, Event, EventStatus};

/// Everything a worker needs; cloned into each spawned worker.
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub(crate) state: Arc<BusState>,
    pub(crate) queues: Arc<QueueSet>,
    pub(crate) retries: RetryScheduler,
    pub(crate) token: CancellationToken,
}

/// Copy of the event a worker is currently processing.
type InFlight = Arc<Mutex<Option<Event>>>;

fn lock_in_flight(slot: &InFlight) -> std::sync::MutexGuard<'_, Option<Event>> {
    slot.lock().unwrap_or_else(|e| e.into_inner())
}

pub(crate) struct Worker {
    id: Arc<str>,
    ctx: WorkerContext,
    in_flight: InFlight,
}

impl Worker {
    pub(crate) fn new(id: Arc<str>, ctx: WorkerContext, in_flight: InFlight) -> Self {
        Self { id, ctx, in_flight }
    }

    pub(crate) async fn run(self) {
        tracing::info!(worker_id = %self.id, "worker started");
        loop {
            let next = tokio::select! {
                biased;
                _ = self.ctx.token.cancelled() => break,
                ev = self.ctx.queues.pop() => ev,
            };
            match next {
                Some(event) => {
                    self.process(event).await;
                    lock_in_flight(&self.in_flight).take();
                }
                None => break,
            }
        }
        tracing::info!(worker_id = %self.id, "worker stopped");
    }

    async fn process(&self, mut event: Event) {
        let state = &self.ctx.state;
        if event.is_waiting() && !state.pending.contains(&event.id()) {
            tracing::debug!(
                worker_id = %self.id,
                event_id = %event.id(),
                "caller already settled, event skipped"
            );
            return;
        }

        event.transition(EventStatus::Processing);
        *lock_in_flight(&self.in_flight) = Some(event.clone());
        state
            .journal
            .record(&event, Action::Processing, Some(&self.id), None);

        let listeners = state.registry.listeners_for(event.event_type());
        if listeners.is_empty() {
            let err = BusError::NoListeners {
                event_type: event.event_type(),
            };
            state.finish(event, Outcome::Failed(err), Some(&self.id));
            return;
        }

        let mut results = Vec::with_capacity(listeners.len());
        for listener in listeners.iter() {
            match listener.invoke(event.delivery(), event.timeout()).await {
                Ok(value) => results.push(value),
                Err(err) if err.is_timeout() => {
                    let outcome = Outcome::TimedOut {
                        timeout: listener.timeout().unwrap_or(event.timeout()),
                        reason: err.to_string(),
                    };
                    state.finish(event, outcome, Some(&self.id));
                    return;
                }
                Err(err) if listener.priority().escalates() => {
                    tracing::error!(
                        worker_id = %self.id,
                        event_id = %event.id(),
                        listener = listener.name(),
                        priority = %listener.priority(),
                        label = err.as_label(),
                        error = %err,
                        "listener failed, escalating"
                    );
                    self.escalate(event, listener.name(), err);
                    return;
                }
                Err(err) => {
                    tracing::warn!(
                        worker_id = %self.id,
                        event_id = %event.id(),
                        listener = listener.name(),
                        priority = %listener.priority(),
                        error = %err,
                        "listener failed, suppressed"
                    );
                    event.record_suppressed(listener.name(), &err.to_string());
                }
            }
        }

        let value = if results.len() == 1 {
            results.pop().unwrap_or(Value::Null)
        } else {
            Value::Array(results)
        };
        state.finish(event, Outcome::Completed(value), Some(&self.id));
    }

    /// Retries with backoff while the budget lasts, otherwise fails the event.
    fn escalate(&self, mut event: Event, listener: &str, err: HandlerError) {
        let state = &self.ctx.state;
        if event.retry_count() >= event.max_retries() {
            let err = BusError::ListenerFailed {
                listener: listener.to_string(),
                attempts: event.retry_count() + 1,
                source: err,
            };
            state.finish(event, Outcome::Failed(err), Some(&self.id));
            return;
        }

        event.transition(EventStatus::Pending);
        let delay = state.cfg.backoff.delay(event.retry_count());
        state
            .journal
            .record(&event, Action::Retrying, Some(&self.id), Some(err.to_string()));
        tracing::warn!(
            worker_id = %self.id,
            event_id = %event.id(),
            retry_count = event.retry_count(),
            max_retries = event.max_retries(),
            ?delay,
            "retrying event"
        );
        self.ctx.retries.schedule(event, delay);
    }
}

struct WorkerSlot {
    id: Arc<str>,
    handle: JoinHandle<()>,
    in_flight: InFlight,
}

/// Result of [`WorkerPool::shutdown`].
pub(crate) struct PoolShutdown {
    /// Workers still running at the deadline.
    pub(crate) aborted: usize,
    /// Events those workers were processing, still unsettled.
    pub(crate) stranded: Vec<Event>,
}

/// Fixed-size set of workers named `worker-0..worker-{n-1}`.
pub(crate) struct WorkerPool {
    ctx: WorkerContext,
    slots: Mutex<Vec<WorkerSlot>>,
}

impl WorkerPool {
    /// Spawns `count` workers.
    pub(crate) fn start(ctx: WorkerContext, count: usize) -> Self {
        let slots = (0..count)
            .map(|i| {
                let id: Arc<str> = Arc::from(format!("worker-{i}"));
                let in_flight = InFlight::default();
                let handle = Self::spawn(&ctx, Arc::clone(&id), Arc::clone(&in_flight));
                WorkerSlot {
                    id,
                    handle,
                    in_flight,
                }
            })
            .collect();
        Self {
            ctx,
            slots: Mutex::new(slots),
        }
    }

    fn spawn(ctx: &WorkerContext, id: Arc<str>, in_flight: InFlight) -> JoinHandle<()> {
        tokio::spawn(Worker::new(id, ctx.clone(), in_flight).run())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<WorkerSlot>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn total(&self) -> usize {
        self.lock().len()
    }

    /// Workers whose task has not exited.
    pub(crate) fn alive(&self) -> usize {
        self.lock().iter().filter(|s| !s.handle.is_finished()).count()
    }

    /// Respawns every exited worker under its previous id; returns how many.
    pub(crate) fn restart_dead(&self) -> usize {
        if self.ctx.token.is_cancelled() {
            return 0;
        }
        let mut restarted = 0;
        for slot in self.lock().iter_mut() {
            if slot.handle.is_finished() {
                tracing::warn!(worker_id = %slot.id, "worker exited, restarting");
                if let Some(event) = lock_in_flight(&slot.in_flight).take() {
                    self.ctx.state.finish(
                        event,
                        Outcome::Cancelled("worker exited while processing"),
                        Some(&slot.id),
                    );
                }
                slot.handle =
                    Self::spawn(&self.ctx, Arc::clone(&slot.id), Arc::clone(&slot.in_flight));
                restarted += 1;
            }
        }
        restarted
    }

    /// Waits up to `timeout` for every worker to exit, then aborts the rest.
    ///
    /// The context token must already be cancelled. Events held by aborted
    /// workers are returned unsettled; the caller owns their terminal status.
    pub(crate) async fn shutdown(&self, timeout: Duration) -> PoolShutdown {
        let mut slots = std::mem::take(&mut *self.lock());

        let all = futures::future::join_all(slots.iter_mut().map(|s| &mut s.handle));
        let mut aborted = 0;
        if tokio::time::timeout(timeout, all).await.is_err() {
            for slot in &slots {
                if !slot.handle.is_finished() {
                    tracing::warn!(worker_id = %slot.id, "worker did not stop in time, aborting");
                    slot.handle.abort();
                    aborted += 1;
                }
            }
        }

        let mut stranded = Vec::new();
        for slot in slots {
            let _ = slot.handle.await;
            if let Some(event) = lock_in_flight(&slot.in_flight).take() {
                stranded.push(event);
            }
        }
        PoolShutdown { aborted, stranded }
    }
}
