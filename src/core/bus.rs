//! # EventBus: the public contract.
//!
//! ```text
//! emit(event) ──► [pending slot if waiting] ──► QueueSet (lane per priority, bounded)
//!                                                   │ pop (highest lane first)
//!                                                   ▼
//!                                        WorkerPool: worker-0 .. worker-N
//!                                                   │ listeners, descending priority
//!                           ┌───────────────────────┼──────────────────────────┐
//!                           ▼                       ▼                          ▼
//!                       COMPLETED          escalated failure               TIMEOUT / FAILED
//!                                          └─► RetryScheduler (timer) ─► re-enqueue
//!                                                                      └─► dead-letter
//!
//! side loops: HealthMonitor (restart workers, pressure warnings), throughput sampler
//! every transition: Journal ─► history ring + SubscriberSet (PersistenceLogger, ...)
//! ```
//!
//! ## Lifecycle
//! - [`EventBus::start`] is idempotent; it spawns workers and loops under a
//!   fresh root [`CancellationToken`] and attaches the subscribers.
//! - [`EventBus::stop`] is idempotent; see its docs for the exact order.
//! - A stopped bus can be started again; listeners, metrics, history and the
//!   dead-letter buffer survive the restart.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use serde_json::json;
//! use eventvisor::{Config, Delivery, Event, EventBus, EventType, Payload, Priority, WechatMessage};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bus = EventBus::new(Config { persistence: false, ..Config::default() });
//!
//!     bus.listen(EventType::SendWechatMessage)
//!         .name("wechat_sender")
//!         .priority(Priority::High)
//!         .handler(|d: Delivery| async move {
//!             Ok(json!({ "attempt": d.attempt }))
//!         });
//!
//!     bus.start().await;
//!     let msg = WechatMessage { to_wxid: "room".into(), message: "hi".into() };
//!     let out = bus.emit(Event::new(msg).wait_for_result(true)).await?;
//!     assert_eq!(out, Some(json!({ "attempt": 1 })));
//!
//!     bus.stop(Duration::from_secs(5)).await;
//!     Ok(())
//! }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::core::health::{HealthMonitor, HealthStatus};
use crate::core::listen::ListenBuilder;
use crate::core::metrics::{Gauges, MetricsSnapshot};
use crate::core::pending::Claim;
use crate::core::queue::QueueSet;
use crate::core::retry::RetryScheduler;
use crate::core::state::{BusState, Outcome};
use crate::core::worker::{WorkerContext, WorkerPool};
use crate::error::BusError;
use crate::events::{Action, Event, EventType, EventView, Payload};
use crate::listeners::{Listener, ListenerView};
use crate::subscribers::{PersistenceLogger, Subscribe, SubscriberSet};

/// Everything that exists only between `start()` and `stop()`.
struct Runtime {
    token: CancellationToken,
    queues: Arc<QueueSet>,
    pool: Arc<WorkerPool>,
    retries: RetryScheduler,
    loops: Vec<JoinHandle<()>>,
    started_at: Instant,
}

/// In-process, priority-aware, retrying event bus.
pub struct EventBus {
    state: Arc<BusState>,
    subscribers: Vec<Arc<dyn Subscribe>>,
    runtime: Mutex<Option<Runtime>>,
}

impl EventBus {
    /// Creates a stopped bus. With `cfg.persistence` set, a
    /// [`PersistenceLogger`] writing to `cfg.persistence_path` is attached.
    pub fn new(cfg: Config) -> Self {
        Self::with_subscribers(cfg, Vec::new())
    }

    /// Creates a stopped bus that also feeds lifecycle records to `subscribers`.
    pub fn with_subscribers(cfg: Config, mut subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        if cfg.persistence {
            subscribers.push(Arc::new(PersistenceLogger::new(cfg.persistence_path.clone())));
        }
        Self {
            state: Arc::new(BusState::new(cfg)),
            subscribers,
            runtime: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &Config {
        &self.state.cfg
    }

    /// New event carrying this bus's `wait_for_result`, `timeout` and
    /// `max_retries` defaults.
    pub fn event(&self, payload: impl Into<Payload>) -> Event {
        Event::with_defaults(payload, &self.state.cfg)
    }

    pub fn is_running(&self) -> bool {
        self.lock_runtime().is_some()
    }

    fn lock_runtime(&self) -> std::sync::MutexGuard<'_, Option<Runtime>> {
        self.runtime.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Starts workers, the health loop and the throughput sampler. No-op if running.
    pub async fn start(&self) {
        if self.is_running() {
            return;
        }
        let cfg = &self.state.cfg;

        if cfg.persistence {
            let logger = PersistenceLogger::new(cfg.persistence_path.clone());
            if let Err(e) = logger.prepare().await {
                tracing::error!(
                    dir = %cfg.persistence_path.display(),
                    error = %e,
                    "failed to create persistence directory"
                );
            }
        }

        let mut guard = self.lock_runtime();
        if guard.is_some() {
            return;
        }

        let token = CancellationToken::new();
        let queues = Arc::new(QueueSet::new(cfg.queue_capacity_clamped()));
        let retries = RetryScheduler::new(
            Arc::clone(&self.state),
            Arc::clone(&queues),
            token.child_token(),
        );
        let ctx = WorkerContext {
            state: Arc::clone(&self.state),
            queues: Arc::clone(&queues),
            retries: retries.clone(),
            token: token.child_token(),
        };
        let pool = Arc::new(WorkerPool::start(ctx, cfg.workers()));
        self.state
            .journal
            .attach(SubscriberSet::new(self.subscribers.clone()));

        let mut loops = Vec::new();
        if let Some(period) = cfg.health_interval() {
            let monitor = HealthMonitor::new(
                Arc::clone(&self.state),
                Arc::clone(&pool),
                Arc::clone(&queues),
            );
            loops.push(tokio::spawn(monitor.run(period, token.child_token())));
        }
        if !cfg.metrics_interval.is_zero() {
            loops.push(tokio::spawn(sample_throughput(
                Arc::clone(&self.state),
                cfg.metrics_interval,
                token.child_token(),
            )));
        }

        *guard = Some(Runtime {
            token,
            queues,
            pool,
            retries,
            loops,
            started_at: Instant::now(),
        });
        drop(guard);

        tracing::info!(
            workers = cfg.workers(),
            queue_capacity = cfg.queue_capacity_clamped(),
            persistence = cfg.persistence,
            "event bus started"
        );
    }

    /// Stops the bus. No-op if not running.
    ///
    /// Order:
    /// 1. refuse further `emit` calls ([`BusError::NotRunning`]);
    /// 2. cancel workers and loops; a worker finishes its current event;
    /// 3. wait up to `timeout` for workers, abort stragglers (their events
    ///    become CANCELLED);
    /// 4. close the queues, releasing producers suspended on a full lane;
    /// 5. cancel retry timers (events in backoff become CANCELLED);
    /// 6. drain the queues (queued events become CANCELLED);
    /// 7. resolve every remaining result slot with [`BusError::Cancelled`];
    /// 8. flush subscribers.
    pub async fn stop(&self, timeout: Duration) {
        let Some(rt) = self.lock_runtime().take() else {
            return;
        };
        tracing::info!(?timeout, "stopping event bus");

        rt.token.cancel();
        let pool = rt.pool.shutdown(timeout).await;
        if pool.aborted > 0 {
            tracing::warn!(
                aborted = pool.aborted,
                in_flight = pool.stranded.len(),
                "workers aborted after stop timeout"
            );
        }
        for event in pool.stranded {
            self.state.finish(
                event,
                Outcome::Cancelled("worker aborted by bus stop"),
                None,
            );
        }

        rt.queues.close();
        rt.retries.shutdown().await;

        let queued = rt.queues.drain();
        let drained = queued.len();
        for event in queued {
            self.state
                .finish(event, Outcome::Cancelled("bus stopped while queued"), None);
        }

        let orphaned = self.state.pending.cancel_all();
        self.state.metrics.cancelled(orphaned as u64);

        for h in rt.loops {
            let _ = h.await;
        }
        if let Some(subs) = self.state.journal.detach().await {
            subs.shutdown().await;
        }

        tracing::info!(drained, orphaned, "event bus stopped");
    }

    /// Registers a listener; its type's list is re-sorted by descending priority.
    pub fn register_listener(&self, listener: Listener) -> Arc<Listener> {
        let listener = Arc::new(listener);
        tracing::info!(
            listener = listener.name(),
            event_type = %listener.event_type(),
            priority = %listener.priority(),
            max_concurrent = listener.max_concurrent(),
            "listener registered"
        );
        self.state.registry.register(Arc::clone(&listener));
        listener
    }

    /// Starts building a listener for `event_type`.
    pub fn listen(&self, event_type: EventType) -> ListenBuilder<'_> {
        ListenBuilder::new(self, event_type)
    }

    /// Enqueues `event` on its priority lane.
    ///
    /// - Suspends while that lane is full; dropping the future at that point
    ///   settles the event as CANCELLED.
    /// - Fire-and-forget events return `Ok(None)` once queued.
    /// - Waiting events return the listeners' result (one listener: its value;
    ///   several: a JSON array) or the terminal error, within `event.timeout()`
    ///   (a zero timeout waits indefinitely).
    ///
    /// # Errors
    /// - [`BusError::NotRunning`] before `start()` / after `stop()`;
    /// - [`BusError::Timeout`] when the deadline or a listener deadline elapsed;
    /// - [`BusError::NoListeners`], [`BusError::ListenerFailed`] for failed events;
    /// - [`BusError::Cancelled`] when `stop()` caught the event before it finished.
    pub async fn emit(&self, event: Event) -> Result<Option<Value>, BusError> {
        let queues = match self.lock_runtime().as_ref() {
            Some(rt) => Arc::clone(&rt.queues),
            None => return Err(BusError::NotRunning),
        };

        let id = event.id();
        let deadline = event.timeout();
        let waiter = event.is_waiting().then(|| self.state.pending.register(id));

        self.state.metrics.emitted();
        self.state.journal.record(&event, Action::Emitted, None, None);
        tracing::debug!(
            event_id = %id,
            event_type = %event.event_type(),
            priority = %event.priority(),
            waiting = event.is_waiting(),
            "event emitted"
        );

        // Dropping this future while the lane is full cancels the event.
        let mut unqueued = Unqueued {
            state: &self.state,
            event: Some(event.clone()),
        };
        let pushed = queues.push(event).await;
        let shadow = unqueued.disarm();

        if let Err(event) = pushed {
            self.state.finish(
                event,
                Outcome::Cancelled("bus stopped before the event was queued"),
                None,
            );
            return Err(BusError::Cancelled);
        }

        let (Some(mut rx), Some(shadow)) = (waiter, shadow) else {
            return Ok(None);
        };

        let settled = if deadline.is_zero() {
            rx.await
        } else {
            match tokio::time::timeout(deadline, &mut rx).await {
                Ok(res) => res,
                Err(_) => {
                    // Deadline hit: settle as TIMEOUT unless a worker got there first.
                    if let Some(tx) = self.state.pending.take(&id) {
                        let reason = format!("caller deadline of {deadline:?} elapsed");
                        self.state.settle(
                            shadow,
                            Claim::Waiting(tx),
                            Outcome::TimedOut {
                                timeout: deadline,
                                reason,
                            },
                            None,
                        );
                    }
                    rx.await
                }
            }
        };

        match settled {
            Ok(res) => res.map(Some),
            Err(_) => Err(BusError::Cancelled),
        }
    }

    /// Counters plus current gauges.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.state.metrics.snapshot(self.gauges())
    }

    fn gauges(&self) -> Gauges {
        let guard = self.lock_runtime();
        Gauges {
            queue_size: guard.as_ref().map_or(0, |rt| rt.queues.len()),
            active_workers: guard.as_ref().map_or(0, |rt| rt.pool.alive()),
            dead_letter_size: self.state.dead_letter.len(),
        }
    }

    /// Health report: verdict, score, workers, queues, events, performance.
    pub fn health_status(&self) -> HealthStatus {
        let metrics = self.metrics();
        let guard = self.lock_runtime();
        let (running, uptime, workers) = match guard.as_ref() {
            Some(rt) => (true, rt.started_at.elapsed(), rt.pool.total()),
            None => (false, Duration::ZERO, 0),
        };
        drop(guard);
        HealthStatus::assess(
            running,
            uptime,
            workers,
            self.state.cfg.total_queue_capacity(),
            &metrics,
        )
    }

    /// The `limit` most recent lifecycle snapshots, oldest first.
    pub fn event_history(&self, limit: usize) -> Vec<EventView> {
        self.state.journal.history(limit)
    }

    /// The `limit` most recent dead-lettered events, oldest first.
    pub fn dead_letter_events(&self, limit: usize) -> Vec<EventView> {
        self.state.dead_letter.recent(limit)
    }

    /// Empties the dead-letter buffer; returns how many entries were removed.
    pub fn clear_dead_letter_queue(&self) -> usize {
        let n = self.state.dead_letter.clear();
        tracing::info!(count = n, "dead-letter buffer cleared");
        n
    }

    /// Registered listeners per event type, in invocation order.
    pub fn listeners_info(&self) -> HashMap<EventType, Vec<ListenerView>> {
        self.state.registry.snapshot()
    }

    /// Result slots currently awaited by callers.
    pub fn pending_count(&self) -> usize {
        self.state.pending.len()
    }

    /// Retry timers currently sleeping (0 when stopped).
    pub fn scheduled_retries(&self) -> usize {
        self.lock_runtime()
            .as_ref()
            .map_or(0, |rt| rt.retries.in_flight())
    }
}

/// Settles an event as CANCELLED if `emit` is dropped before it is queued.
struct Unqueued<'a> {
    state: &'a BusState,
    event: Option<Event>,
}

impl Unqueued<'_> {
    fn disarm(&mut self) -> Option<Event> {
        self.event.take()
    }
}

impl Drop for Unqueued<'_> {
    fn drop(&mut self) {
        if let Some(event) = self.event.take() {
            tracing::debug!(event_id = %event.id(), "emit abandoned before the event was queued");
            self.state.finish(
                event,
                Outcome::Cancelled("caller abandoned emit before the event was queued"),
                None,
            );
        }
    }
}

async fn sample_throughput(state: Arc<BusState>, period: Duration, token: CancellationToken) {
    let mut tick = tokio::time::interval(period);
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = tick.tick() => state.metrics.sample_throughput(Instant::now()),
        }
    }
}
