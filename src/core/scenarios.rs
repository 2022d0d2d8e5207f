//! End-to-end behavior of a running bus.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::{Value, json};
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::Config;
use crate::core::{EventBus, MetricsSnapshot};
use crate::core::health::{HealthMonitor, HealthState};
use crate::core::queue::QueueSet;
use crate::core::retry::RetryScheduler;
use crate::core::state::BusState;
use crate::core::worker::{WorkerContext, WorkerPool};
use crate::error::{BusError, HandlerError};
use crate::events::{Delivery, Event, EventStatus, EventType, Payload, Priority, WechatMessage};
use crate::policies::{BackoffPolicy, JitterPolicy};

fn cfg() -> Config {
    Config {
        worker_count: 4,
        persistence: false,
        health_check_interval: Duration::ZERO,
        backoff: BackoffPolicy {
            first: Duration::from_secs(1),
            max: Duration::from_secs(300),
            factor: 2.0,
            jitter: JitterPolicy::None,
        },
        ..Config::default()
    }
}

fn report() -> Event {
    Event::new(Payload::SendAdvisorStatsReport)
}

fn message(text: &str) -> Event {
    Event::new(WechatMessage {
        to_wxid: "room".into(),
        message: text.into(),
    })
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    while !cond() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Terminal statuses recorded in history, per event.
fn terminal_statuses(bus: &EventBus) -> HashMap<Uuid, usize> {
    let mut terminal = HashMap::new();
    for v in bus.event_history(1000) {
        if v.status.is_terminal() {
            *terminal.entry(v.event_id).or_default() += 1;
        }
    }
    terminal
}

fn settled_total(m: &MetricsSnapshot) -> u64 {
    m.completed_events + m.failed_events + m.timeout_events + m.cancelled_events
}

fn last_status(bus: &EventBus, id: Uuid) -> Option<EventStatus> {
    bus.event_history(1000)
        .into_iter()
        .rfind(|v| v.event_id == id)
        .map(|v| v.status)
}

/// Handler that blocks on a shared gate, one permit per invocation.
fn gated(
    gate: Arc<Semaphore>,
    entered: Arc<AtomicUsize>,
) -> impl Fn(Delivery) -> BoxFuture<'static, Result<Value, HandlerError>> + Send + Sync + 'static {
    move |d: Delivery| {
        let gate = Arc::clone(&gate);
        let entered = Arc::clone(&entered);
        Box::pin(async move {
            entered.fetch_add(1, Ordering::SeqCst);
            if let Ok(p) = gate.acquire().await {
                p.forget();
            }
            Ok(json!(d.priority.as_str()))
        })
    }
}

// 1. One listener, max_concurrent = 1, three concurrent fire-and-forget emits.
#[tokio::test(start_paused = true)]
async fn serialized_listener_processes_all_three() {
    let bus = Arc::new(EventBus::new(cfg()));
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let (r, p) = (Arc::clone(&running), Arc::clone(&peak));

    let listener = bus
        .listen(EventType::SendAdvisorStatsReport)
        .max_concurrent(1)
        .handler(move |_d: Delivery| {
            let (r, p) = (Arc::clone(&r), Arc::clone(&p));
            async move {
                let now = r.fetch_add(1, Ordering::SeqCst) + 1;
                p.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
                r.fetch_sub(1, Ordering::SeqCst);
                Ok(Value::Null)
            }
        });
    bus.start().await;

    let mut emits = Vec::new();
    for _ in 0..3 {
        let bus = Arc::clone(&bus);
        emits.push(tokio::spawn(async move {
            bus.emit(report().wait_for_result(false)).await
        }));
    }
    for e in emits {
        assert_eq!(e.await.unwrap().unwrap(), None);
    }

    wait_until(|| listener.total_processed() == 3).await;
    assert_eq!(peak.load(Ordering::SeqCst), 1);
    assert_eq!(listener.total_failed(), 0);

    wait_until(|| bus.metrics().completed_events == 3).await;
    bus.stop(Duration::from_secs(1)).await;
}

// 2. CRITICAL listener that always fails, max_retries = 2, base delay 1s.
#[tokio::test(start_paused = true)]
async fn critical_failure_retries_with_backoff_then_dead_letters() {
    let bus = EventBus::new(cfg());
    let calls: Arc<Mutex<Vec<Instant>>> = Arc::default();
    let c = Arc::clone(&calls);

    bus.listen(EventType::SendWechatMessage)
        .name("bot")
        .priority(Priority::Critical)
        .handler(move |_d: Delivery| {
            c.lock().unwrap().push(Instant::now());
            async { Err(HandlerError::fail("smtp down")) }
        });
    bus.start().await;

    let ev = message("x")
        .wait_for_result(true)
        .with_max_retries(2)
        .with_timeout(Duration::from_secs(60));
    let id = ev.id();
    let err = bus.emit(ev).await.unwrap_err();

    assert_eq!(err.to_string(), "smtp down");
    match &err {
        BusError::ListenerFailed {
            listener, attempts, ..
        } => {
            assert_eq!(listener, "bot");
            assert_eq!(*attempts, 3);
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(err.as_label(), "bus_retry_exhausted");

    let calls = calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 3);
    let first_gap = calls[1] - calls[0];
    let second_gap = calls[2] - calls[1];
    assert!(first_gap >= Duration::from_secs(1) && first_gap < Duration::from_millis(1100));
    assert!(second_gap >= Duration::from_secs(2) && second_gap < Duration::from_millis(2100));

    let dlq = bus.dead_letter_events(10);
    assert_eq!(dlq.len(), 1);
    assert_eq!(dlq[0].event_id, id);
    assert_eq!(dlq[0].status, EventStatus::Failed);
    assert_eq!(dlq[0].retry_count, 2);
    assert_eq!(dlq[0].error_message.as_deref(), Some("smtp down"));
    assert_eq!(bus.metrics().failed_events, 1);

    bus.stop(Duration::from_secs(1)).await;
}

// 3. Listener sleeping 1s, caller waits with a 10ms deadline.
#[tokio::test(start_paused = true)]
async fn caller_deadline_times_out_and_dead_letters() {
    let bus = EventBus::new(cfg());
    bus.listen(EventType::SendAdvisorStatsReport)
        .handler(|_d: Delivery| async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(json!("late"))
        });
    bus.start().await;

    let started = Instant::now();
    let err = bus
        .emit(
            report()
                .wait_for_result(true)
                .with_timeout(Duration::from_millis(10)),
        )
        .await
        .unwrap_err();
    assert!(err.is_timeout(), "{err:?}");
    assert!(started.elapsed() < Duration::from_millis(50));

    tokio::time::sleep(Duration::from_secs(2)).await;
    let dlq = bus.dead_letter_events(10);
    assert_eq!(dlq.len(), 1);
    assert_eq!(dlq[0].status, EventStatus::Timeout);

    let m = bus.metrics();
    assert_eq!(m.timeout_events, 1);
    assert_eq!(m.completed_events, 0);
    assert_eq!(bus.pending_count(), 0);

    bus.stop(Duration::from_secs(1)).await;
}

// 4. No listener registered for the type.
#[tokio::test(start_paused = true)]
async fn missing_listeners_fail_immediately_without_retry() {
    let bus = EventBus::new(cfg());
    bus.start().await;

    let err = bus
        .emit(Event::new(Payload::AddDialogRecord(crate::events::DialogRecord {
            session_id: "s".into(),
            role: "user".into(),
            content: "hi".into(),
        }))
        .wait_for_result(true)
        .with_max_retries(5))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        BusError::NoListeners {
            event_type: EventType::AddDialogRecord
        }
    ));
    assert_eq!(bus.scheduled_retries(), 0);
    let dlq = bus.dead_letter_events(10);
    assert_eq!(dlq[0].status, EventStatus::Failed);
    assert_eq!(dlq[0].retry_count, 0);

    bus.stop(Duration::from_secs(1)).await;
}

// 5. Lane capacity 1: the second queued emit suspends until a slot frees up.
#[tokio::test(start_paused = true)]
async fn full_lane_applies_backpressure() {
    let bus = Arc::new(EventBus::new(Config {
        worker_count: 1,
        queue_capacity: 1,
        ..cfg()
    }));
    let gate = Arc::new(Semaphore::new(0));
    let entered = Arc::new(AtomicUsize::new(0));
    let listener = bus
        .listen(EventType::SendAdvisorStatsReport)
        .handler(gated(Arc::clone(&gate), Arc::clone(&entered)));
    bus.start().await;

    // Worker busy with the first event, the lane holds the second.
    bus.emit(report().wait_for_result(false)).await.unwrap();
    wait_until(|| entered.load(Ordering::SeqCst) == 1).await;
    bus.emit(report().wait_for_result(false)).await.unwrap();

    let b = Arc::clone(&bus);
    let third = tokio::spawn(async move { b.emit(report().wait_for_result(false)).await });
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!third.is_finished());
    assert_eq!(bus.metrics().queue_size, 1);

    gate.add_permits(3);
    assert_eq!(third.await.unwrap().unwrap(), None);
    wait_until(|| listener.total_processed() == 3).await;

    bus.stop(Duration::from_secs(1)).await;
}

// 6. stop() while a waiting event is still queued.
#[tokio::test(start_paused = true)]
async fn stop_cancels_queued_waiting_event() {
    let bus = Arc::new(EventBus::new(Config {
        worker_count: 1,
        ..cfg()
    }));
    let gate = Arc::new(Semaphore::new(0));
    let entered = Arc::new(AtomicUsize::new(0));
    bus.listen(EventType::SendAdvisorStatsReport)
        .handler(gated(Arc::clone(&gate), Arc::clone(&entered)));
    bus.start().await;

    bus.emit(report().wait_for_result(false)).await.unwrap();
    wait_until(|| entered.load(Ordering::SeqCst) == 1).await;

    let b = Arc::clone(&bus);
    let waiting = tokio::spawn(async move {
        b.emit(report().wait_for_result(true).with_timeout(Duration::ZERO))
            .await
    });
    wait_until(|| bus.metrics().queue_size == 1).await;

    bus.stop(Duration::from_millis(100)).await;

    let err = waiting.await.unwrap().unwrap_err();
    assert!(err.is_cancelled());
    assert!(bus.metrics().cancelled_events >= 1);
    assert_eq!(bus.pending_count(), 0);

    let after = bus.emit(report()).await.unwrap_err();
    assert!(matches!(after, BusError::NotRunning));
    assert_eq!(bus.health_status().status, HealthState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn suppressed_failure_completes_with_partial_result() {
    let bus = EventBus::new(cfg());
    bus.listen(EventType::SendWechatMessage)
        .name("send")
        .priority(Priority::High)
        .handler(|_d: Delivery| async { Ok(json!("sent")) });
    bus.listen(EventType::SendWechatMessage)
        .name("audit")
        .priority(Priority::Low)
        .handler(|_d: Delivery| async { Err(HandlerError::fail("audit store down")) });
    bus.listen(EventType::SendWechatMessage)
        .name("stats")
        .priority(Priority::Normal)
        .handler(|_d: Delivery| async { Ok(json!(1)) });
    bus.start().await;

    let ev = message("hello").wait_for_result(true);
    let id = ev.id();
    let out = bus.emit(ev).await.unwrap();
    assert_eq!(out, Some(json!(["sent", 1])));

    let last = bus
        .event_history(10)
        .into_iter()
        .rfind(|v| v.event_id == id)
        .unwrap();
    assert_eq!(last.status, EventStatus::Completed);
    assert!(last.partial_failure);
    assert_eq!(last.suppressed_failures, vec!["audit: audit store down".to_string()]);
    assert!(bus.dead_letter_events(10).is_empty());

    bus.stop(Duration::from_secs(1)).await;
}

#[tokio::test(start_paused = true)]
async fn low_priority_listener_timeout_is_terminal() {
    let bus = EventBus::new(cfg());
    let calls = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&calls);
    bus.listen(EventType::SendAdvisorStatsReport)
        .priority(Priority::Low)
        .timeout(Duration::from_millis(20))
        .handler(move |_d: Delivery| {
            c.fetch_add(1, Ordering::SeqCst);
            async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(Value::Null)
            }
        });
    bus.start().await;

    let err = bus
        .emit(
            report()
                .wait_for_result(true)
                .with_max_retries(3)
                .with_timeout(Duration::from_secs(10)),
        )
        .await
        .unwrap_err();
    match err {
        BusError::Timeout { timeout, .. } => assert_eq!(timeout, Duration::from_millis(20)),
        other => panic!("unexpected error {other:?}"),
    }
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(bus.dead_letter_events(1)[0].status, EventStatus::Timeout);

    bus.stop(Duration::from_secs(1)).await;
}

#[tokio::test(start_paused = true)]
async fn every_event_reaches_exactly_one_terminal_status() {
    let bus = Arc::new(EventBus::new(cfg()));
    bus.listen(EventType::SendWechatMessage)
        .priority(Priority::Critical)
        .max_concurrent(4)
        .handler(|d: Delivery| async move {
            match d.payload() {
                crate::events::Payload::SendWechatMessage(m) if m.message == "fail" => {
                    Err(HandlerError::fail("rejected"))
                }
                _ => Ok(Value::Null),
            }
        });
    bus.start().await;

    let mut ids = Vec::new();
    let mut emits = Vec::new();
    for i in 0..12 {
        let text = if i % 3 == 0 { "fail" } else { "ok" };
        let ev = message(text).wait_for_result(true).with_max_retries(1);
        ids.push(ev.id());
        let bus = Arc::clone(&bus);
        emits.push(tokio::spawn(async move { bus.emit(ev).await }));
    }
    let mut failures = 0;
    for e in emits {
        if e.await.unwrap().is_err() {
            failures += 1;
        }
    }
    assert_eq!(failures, 4);

    let terminal = terminal_statuses(&bus);
    for v in bus.event_history(1000) {
        assert!(v.retry_count <= v.max_retries);
    }
    for id in ids {
        assert_eq!(terminal.get(&id), Some(&1), "event {id}");
    }

    let m = bus.metrics();
    assert_eq!((m.total_events, m.completed_events, m.failed_events), (12, 8, 4));
    bus.stop(Duration::from_secs(1)).await;
}

#[tokio::test(start_paused = true)]
async fn higher_priority_lanes_are_drained_first() {
    let bus = Arc::new(EventBus::new(Config {
        worker_count: 1,
        ..cfg()
    }));
    let gate = Arc::new(Semaphore::new(0));
    let entered = Arc::new(AtomicUsize::new(0));
    let order: Arc<Mutex<Vec<Priority>>> = Arc::default();
    let o = Arc::clone(&order);
    let g = Arc::clone(&gate);
    let e = Arc::clone(&entered);

    bus.listen(EventType::SendAdvisorStatsReport)
        .handler(move |d: Delivery| {
            o.lock().unwrap().push(d.priority);
            let (g, e) = (Arc::clone(&g), Arc::clone(&e));
            async move {
                e.fetch_add(1, Ordering::SeqCst);
                if let Ok(p) = g.acquire().await {
                    p.forget();
                }
                Ok(Value::Null)
            }
        });
    bus.start().await;

    bus.emit(report().wait_for_result(false)).await.unwrap();
    wait_until(|| entered.load(Ordering::SeqCst) == 1).await;
    for p in [Priority::Low, Priority::Normal, Priority::Critical, Priority::High] {
        bus.emit(report().with_priority(p).wait_for_result(false))
            .await
            .unwrap();
    }

    gate.add_permits(5);
    wait_until(|| bus.metrics().completed_events == 5).await;
    assert_eq!(
        *order.lock().unwrap(),
        vec![
            Priority::Normal,
            Priority::Critical,
            Priority::High,
            Priority::Normal,
            Priority::Low
        ]
    );
    bus.stop(Duration::from_secs(1)).await;
}

#[tokio::test(start_paused = true)]
async fn abandoned_event_is_skipped_by_the_worker() {
    let bus = Arc::new(EventBus::new(Config {
        worker_count: 1,
        ..cfg()
    }));
    let gate = Arc::new(Semaphore::new(0));
    let entered = Arc::new(AtomicUsize::new(0));
    bus.listen(EventType::SendAdvisorStatsReport)
        .handler(gated(Arc::clone(&gate), Arc::clone(&entered)));
    bus.start().await;

    bus.emit(report().wait_for_result(false)).await.unwrap();
    wait_until(|| entered.load(Ordering::SeqCst) == 1).await;

    let err = bus
        .emit(
            report()
                .wait_for_result(true)
                .with_timeout(Duration::from_millis(50)),
        )
        .await
        .unwrap_err();
    assert!(err.is_timeout());

    gate.add_permits(5);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(entered.load(Ordering::SeqCst), 1);

    let m = bus.metrics();
    assert_eq!((m.completed_events, m.timeout_events), (1, 1));
    bus.stop(Duration::from_secs(1)).await;
}

#[tokio::test(start_paused = true)]
async fn stop_cancels_events_in_retry_backoff() {
    let bus = Arc::new(EventBus::new(cfg()));
    bus.listen(EventType::SendAdvisorStatsReport)
        .priority(Priority::High)
        .handler(|_d: Delivery| async { Err(HandlerError::fail("flaky")) });
    bus.start().await;

    let b = Arc::clone(&bus);
    let waiting = tokio::spawn(async move {
        b.emit(report().wait_for_result(true).with_max_retries(3))
            .await
    });
    wait_until(|| bus.scheduled_retries() == 1).await;

    bus.stop(Duration::from_secs(1)).await;
    assert!(waiting.await.unwrap().unwrap_err().is_cancelled());
    let m = bus.metrics();
    assert_eq!((m.cancelled_events, m.failed_events), (1, 0));
}

#[tokio::test(start_paused = true)]
async fn bus_can_be_restarted_and_start_is_idempotent() {
    let bus = EventBus::new(cfg());
    bus.listen(EventType::SendAdvisorStatsReport)
        .handler(|d: Delivery| async move { Ok(json!(d.attempt)) });

    bus.start().await;
    bus.start().await;
    assert_eq!(bus.health_status().workers.total, 4);
    bus.stop(Duration::from_secs(1)).await;
    bus.stop(Duration::from_secs(1)).await;

    bus.start().await;
    let out = bus.emit(report().wait_for_result(true)).await.unwrap();
    assert_eq!(out, Some(json!(1)));
    let health = bus.health_status();
    assert_eq!(health.status, HealthState::Healthy);
    assert_eq!(health.events.completed, 1);
    bus.stop(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn persistence_writes_lifecycle_lines() {
    let dir = tempfile::tempdir().unwrap();
    let bus = EventBus::new(Config {
        persistence: true,
        persistence_path: dir.path().join("logs").join("events"),
        ..cfg()
    });
    bus.listen(EventType::SendAdvisorStatsReport)
        .handler(|_d: Delivery| async { Ok(Value::Null) });
    bus.start().await;
    bus.emit(report().wait_for_result(true).with_source("scheduler"))
        .await
        .unwrap();
    bus.stop(Duration::from_secs(1)).await;

    let mut files = std::fs::read_dir(dir.path().join("logs").join("events"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect::<Vec<_>>();
    assert_eq!(files.len(), 1);
    let body = std::fs::read_to_string(files.pop().unwrap()).unwrap();
    let actions: Vec<String> = body
        .lines()
        .map(|l| {
            let v: Value = serde_json::from_str(l).unwrap();
            assert_eq!(v["source"], "scheduler");
            v["action"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(actions, ["emitted", "processing", "completed"]);
}

#[tokio::test(start_paused = true)]
async fn health_monitor_restarts_exited_workers() {
    let state = Arc::new(BusState::new(cfg()));
    let queues = Arc::new(QueueSet::new(4));
    let token = CancellationToken::new();
    let ctx = WorkerContext {
        state: Arc::clone(&state),
        queues: Arc::clone(&queues),
        retries: RetryScheduler::new(Arc::clone(&state), Arc::clone(&queues), token.child_token()),
        token: token.child_token(),
    };
    let pool = Arc::new(WorkerPool::start(ctx, 2));

    // Closing the queues makes every worker's pop return None.
    queues.close();
    wait_until(|| pool.alive() == 0).await;

    let monitor = HealthMonitor::new(Arc::clone(&state), Arc::clone(&pool), Arc::clone(&queues));
    let report = monitor.check();
    assert_eq!(report.restarted, 2);
    assert!(!report.queue_pressure);
    assert!(!report.dead_letter_pressure);
    assert_eq!(pool.total(), 2);

    token.cancel();
    let stopped = pool.shutdown(Duration::from_secs(1)).await;
    assert_eq!(stopped.aborted, 0);
    assert!(stopped.stranded.is_empty());
}

#[tokio::test(start_paused = true)]
async fn aborted_worker_event_is_cancelled_at_stop() {
    let bus = Arc::new(EventBus::new(Config {
        worker_count: 1,
        ..cfg()
    }));
    bus.listen(EventType::SendAdvisorStatsReport)
        .handler(|_d: Delivery| async {
            tokio::time::sleep(Duration::from_secs(600)).await;
            Ok(Value::Null)
        });
    bus.start().await;

    let running = report().wait_for_result(false);
    let running_id = running.id();
    bus.emit(running).await.unwrap();
    wait_until(|| last_status(&bus, running_id) == Some(EventStatus::Processing)).await;

    let queued = report().wait_for_result(true).with_timeout(Duration::ZERO);
    let queued_id = queued.id();
    let b = Arc::clone(&bus);
    let waiting = tokio::spawn(async move { b.emit(queued).await });
    wait_until(|| bus.metrics().queue_size == 1).await;

    bus.stop(Duration::from_millis(100)).await;
    assert!(waiting.await.unwrap().unwrap_err().is_cancelled());

    let m = bus.metrics();
    assert_eq!(m.total_events, 2);
    assert_eq!(m.cancelled_events, 2);
    assert_eq!(settled_total(&m), m.total_events);
    assert_eq!(bus.pending_count(), 0);

    assert_eq!(last_status(&bus, running_id), Some(EventStatus::Cancelled));
    let terminal = terminal_statuses(&bus);
    assert_eq!(terminal.get(&running_id), Some(&1));
    assert_eq!(terminal.get(&queued_id), Some(&1));
}

#[tokio::test(start_paused = true)]
async fn emit_dropped_on_full_lane_cancels_the_event() {
    let bus = Arc::new(EventBus::new(Config {
        worker_count: 1,
        queue_capacity: 1,
        ..cfg()
    }));
    let gate = Arc::new(Semaphore::new(0));
    let entered = Arc::new(AtomicUsize::new(0));
    bus.listen(EventType::SendAdvisorStatsReport)
        .handler(gated(Arc::clone(&gate), Arc::clone(&entered)));
    bus.start().await;

    bus.emit(report().wait_for_result(false)).await.unwrap();
    wait_until(|| entered.load(Ordering::SeqCst) == 1).await;
    bus.emit(report().wait_for_result(false)).await.unwrap();

    let blocked = report().wait_for_result(true);
    let blocked_id = blocked.id();
    let gave_up = tokio::time::timeout(Duration::from_millis(50), bus.emit(blocked)).await;
    assert!(gave_up.is_err());
    assert_eq!(bus.pending_count(), 0);
    assert_eq!(last_status(&bus, blocked_id), Some(EventStatus::Cancelled));

    gate.add_permits(5);
    wait_until(|| bus.metrics().completed_events == 2).await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(entered.load(Ordering::SeqCst), 2);

    let m = bus.metrics();
    assert_eq!((m.total_events, m.cancelled_events), (3, 1));
    assert_eq!(settled_total(&m), m.total_events);
    assert_eq!(terminal_statuses(&bus).get(&blocked_id), Some(&1));

    bus.stop(Duration::from_secs(1)).await;
}

#[tokio::test(start_paused = true)]
async fn dead_letter_capacity_evicts_oldest_first() {
    let bus = EventBus::new(Config {
        dead_letter_capacity: 3,
        ..cfg()
    });
    bus.start().await;

    let mut ids = Vec::new();
    for _ in 0..5 {
        let ev = report().wait_for_result(true);
        ids.push(ev.id());
        assert!(bus.emit(ev).await.is_err());
    }

    let kept: Vec<Uuid> = bus
        .dead_letter_events(10)
        .into_iter()
        .map(|v| v.event_id)
        .collect();
    assert_eq!(kept, ids[2..]);
    assert_eq!(bus.metrics().dead_letter_queue_size, 3);
    assert_eq!(bus.metrics().failed_events, 5);

    assert_eq!(bus.clear_dead_letter_queue(), 3);
    assert!(bus.dead_letter_events(10).is_empty());
    bus.stop(Duration::from_secs(1)).await;
}

#[test]
fn bus_events_inherit_configured_defaults() {
    let bus = EventBus::new(Config {
        wait_for_result: false,
        timeout: Duration::from_secs(5),
        max_retries: 7,
        ..cfg()
    });
    let ev = bus.event(Payload::SendAiAdvisorStatsReport);
    assert!(!ev.is_waiting());
    assert_eq!(ev.timeout(), Duration::from_secs(5));
    assert_eq!(ev.max_retries(), 7);

    let plain = Event::new(Payload::SendAiAdvisorStatsReport);
    assert!(plain.is_waiting());
    assert_eq!(plain.max_retries(), 3);
}
