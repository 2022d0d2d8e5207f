//! # Metrics collector.
//!
//! All counters live behind a single mutex; readers get a [`MetricsSnapshot`]
//! copy. Gauges (queue size, live workers, dead-letter size) are read from
//! their owners at snapshot time and passed in.
//!
//! Throughput is a finite difference over a rolling window of
//! `(instant, total_events)` samples taken by the metrics loop:
//! `events_per_second = Δtotal / Δt` between the oldest and newest sample.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

/// Point-in-time copy of the bus counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub total_events: u64,
    pub completed_events: u64,
    pub failed_events: u64,
    pub timeout_events: u64,
    pub cancelled_events: u64,
    /// Mean of the most recent processing times, in seconds.
    pub average_processing_time: f64,
    pub events_per_second: f64,
    pub queue_size: usize,
    pub active_workers: usize,
    pub dead_letter_queue_size: usize,
    pub last_updated: DateTime<Utc>,
}

/// Values owned elsewhere, read when a snapshot is taken.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Gauges {
    pub queue_size: usize,
    pub active_workers: usize,
    pub dead_letter_size: usize,
}

struct Counters {
    total: u64,
    completed: u64,
    failed: u64,
    timeout: u64,
    cancelled: u64,
    processing: VecDeque<Duration>,
    window: VecDeque<(Instant, u64)>,
    events_per_second: f64,
    last_updated: DateTime<Utc>,
}

pub(crate) struct MetricsCollector {
    counters: Mutex<Counters>,
    samples: usize,
    window: usize,
}

impl MetricsCollector {
    /// `samples` bounds the processing-time average, `window` the throughput window.
    pub(crate) fn new(samples: usize, window: usize) -> Self {
        Self {
            counters: Mutex::new(Counters {
                total: 0,
                completed: 0,
                failed: 0,
                timeout: 0,
                cancelled: 0,
                processing: VecDeque::new(),
                window: VecDeque::new(),
                events_per_second: 0.0,
                last_updated: Utc::now(),
            }),
            samples: samples.max(1),
            window: window.max(2),
        }
    }

    fn update(&self, f: impl FnOnce(&mut Counters)) {
        let mut c = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut c);
        c.last_updated = Utc::now();
    }

    pub(crate) fn emitted(&self) {
        self.update(|c| c.total += 1);
    }

    pub(crate) fn completed(&self, processing_time: Option<Duration>) {
        let cap = self.samples;
        self.update(|c| {
            c.completed += 1;
            if let Some(d) = processing_time {
                if c.processing.len() >= cap {
                    c.processing.pop_front();
                }
                c.processing.push_back(d);
            }
        });
    }

    pub(crate) fn failed(&self) {
        self.update(|c| c.failed += 1);
    }

    pub(crate) fn timed_out(&self) {
        self.update(|c| c.timeout += 1);
    }

    pub(crate) fn cancelled(&self, n: u64) {
        if n > 0 {
            self.update(|c| c.cancelled += n);
        }
    }

    /// Adds one throughput sample and recomputes the rate.
    pub(crate) fn sample_throughput(&self, now: Instant) {
        let cap = self.window;
        self.update(|c| {
            if c.window.len() >= cap {
                c.window.pop_front();
            }
            c.window.push_back((now, c.total));

            if let (Some(&(t0, n0)), Some(&(t1, n1))) = (c.window.front(), c.window.back()) {
                let dt = t1.saturating_duration_since(t0).as_secs_f64();
                if dt > 0.0 {
                    c.events_per_second = n1.saturating_sub(n0) as f64 / dt;
                }
            }
        });
    }

    pub(crate) fn snapshot(&self, gauges: Gauges) -> MetricsSnapshot {
        let c = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        let average = if c.processing.is_empty() {
            0.0
        } else {
            c.processing.iter().map(Duration::as_secs_f64).sum::<f64>() / c.processing.len() as f64
        };
        MetricsSnapshot {
            total_events: c.total,
            completed_events: c.completed,
            failed_events: c.failed,
            timeout_events: c.timeout,
            cancelled_events: c.cancelled,
            average_processing_time: average,
            events_per_second: c.events_per_second,
            queue_size: gauges.queue_size,
            active_workers: gauges.active_workers,
            dead_letter_queue_size: gauges.dead_letter_size,
            last_updated: c.last_updated,
        }
    }
}
