//! # Health monitor.
//!
//! A periodic loop that restarts exited workers and warns about pressure:
//! - aggregate queue occupancy above 80% of total capacity;
//! - dead-letter buffer above 80% of its bound.
//!
//! Pressure warnings are observational only. [`HealthStatus`] is the report
//! returned by `EventBus::health_status`.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::core::metrics::MetricsSnapshot;
use crate::core::queue::QueueSet;
use crate::core::state::BusState;
use crate::core::worker::WorkerPool;

/// Overall verdict of a health report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    /// Running with a health score above 80.
    Healthy,
    /// Running with a health score of 80 or less.
    Degraded,
    /// Not running.
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerHealth {
    pub total: usize,
    pub active: usize,
    pub dead: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueHealth {
    pub total_size: usize,
    pub dead_letter_size: usize,
    /// Percentage of total queue capacity in use.
    pub queue_utilization: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventHealth {
    pub total: u64,
    pub completed: u64,
    pub failed: u64,
    pub timeout: u64,
    pub success_rate: f64,
    pub failure_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceHealth {
    pub average_processing_time: f64,
    pub events_per_second: f64,
}

/// Health report of the bus.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthStatus {
    pub status: HealthState,
    /// `100 - 100 × (failed + timeout) / total`, clamped at 0.
    pub health_score: u8,
    pub running: bool,
    /// Seconds since the last `start()`, `0` when stopped.
    pub uptime: f64,
    pub workers: WorkerHealth,
    pub queues: QueueHealth,
    pub events: EventHealth,
    pub performance: PerformanceHealth,
}

impl HealthStatus {
    pub(crate) fn assess(
        running: bool,
        uptime: Duration,
        workers_total: usize,
        queue_capacity: usize,
        m: &MetricsSnapshot,
    ) -> Self {
        let total = m.total_events;
        let bad = m.failed_events + m.timeout_events;
        let denom = total.max(1) as f64;

        let health_score = if total == 0 {
            100
        } else {
            (100.0 - 100.0 * bad as f64 / total as f64).clamp(0.0, 100.0) as u8
        };
        let status = match (running, health_score > 80) {
            (false, _) => HealthState::Stopped,
            (true, true) => HealthState::Healthy,
            (true, false) => HealthState::Degraded,
        };

        Self {
            status,
            health_score,
            running,
            uptime: if running { uptime.as_secs_f64() } else { 0.0 },
            workers: WorkerHealth {
                total: workers_total,
                active: m.active_workers,
                dead: workers_total.saturating_sub(m.active_workers),
            },
            queues: QueueHealth {
                total_size: m.queue_size,
                dead_letter_size: m.dead_letter_queue_size,
                queue_utilization: if queue_capacity == 0 {
                    0.0
                } else {
                    m.queue_size as f64 / queue_capacity as f64 * 100.0
                },
            },
            events: EventHealth {
                total,
                completed: m.completed_events,
                failed: m.failed_events,
                timeout: m.timeout_events,
                success_rate: m.completed_events as f64 / denom * 100.0,
                failure_rate: bad as f64 / denom * 100.0,
            },
            performance: PerformanceHealth {
                average_processing_time: m.average_processing_time,
                events_per_second: m.events_per_second,
            },
        }
    }
}

/// Result of one health tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CheckReport {
    pub restarted: usize,
    pub queue_pressure: bool,
    pub dead_letter_pressure: bool,
}

/// `true` when `len` is above 80% of `capacity`.
fn above_80(len: usize, capacity: usize) -> bool {
    len * 10 > capacity * 8
}

pub(crate) struct HealthMonitor {
    state: Arc<BusState>,
    pool: Arc<WorkerPool>,
    queues: Arc<QueueSet>,
}

impl HealthMonitor {
    pub(crate) fn new(state: Arc<BusState>, pool: Arc<WorkerPool>, queues: Arc<QueueSet>) -> Self {
        Self { state, pool, queues }
    }

    /// Runs one check immediately, then every `period` until cancelled.
    pub(crate) async fn run(self, period: Duration, token: CancellationToken) {
        tracing::info!(?period, "health monitor started");
        let mut tick = tokio::time::interval(period);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = tick.tick() => {
                    self.check();
                }
            }
        }
        tracing::info!("health monitor stopped");
    }

    pub(crate) fn check(&self) -> CheckReport {
        let restarted = self.pool.restart_dead();
        if restarted > 0 {
            tracing::warn!(count = restarted, "restarted dead workers");
        }

        let queue_size = self.queues.len();
        let queue_pressure = above_80(queue_size, self.queues.total_capacity());
        if queue_pressure {
            tracing::warn!(
                size = queue_size,
                capacity = self.queues.total_capacity(),
                "queue size is high"
            );
        }

        let dead = self.state.dead_letter.len();
        let dead_letter_pressure = above_80(dead, self.state.dead_letter.capacity());
        if dead_letter_pressure {
            tracing::warn!(
                size = dead,
                capacity = self.state.dead_letter.capacity(),
                "dead-letter buffer is high"
            );
        }

        tracing::debug!(
            active_workers = self.pool.alive(),
            queue_size,
            dead_letter_size = dead,
            "health check completed"
        );
        CheckReport {
            restarted,
            queue_pressure,
            dead_letter_pressure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn metrics(total: u64, completed: u64, failed: u64, timeout: u64) -> MetricsSnapshot {
        MetricsSnapshot {
            total_events: total,
            completed_events: completed,
            failed_events: failed,
            timeout_events: timeout,
            cancelled_events: 0,
            average_processing_time: 0.5,
            events_per_second: 2.0,
            queue_size: 10,
            active_workers: 3,
            dead_letter_queue_size: 1,
            last_updated: Utc::now(),
        }
    }

    #[test]
    fn score_and_status_follow_failure_rate() {
        let ok = HealthStatus::assess(true, Duration::from_secs(5), 4, 100, &metrics(10, 9, 1, 0));
        assert_eq!(ok.health_score, 90);
        assert_eq!(ok.status, HealthState::Healthy);
        assert_eq!(ok.workers.dead, 1);
        assert!((ok.queues.queue_utilization - 10.0).abs() < 1e-9);
        assert!((ok.events.success_rate - 90.0).abs() < 1e-9);

        let bad = HealthStatus::assess(true, Duration::ZERO, 4, 100, &metrics(10, 5, 3, 2));
        assert_eq!(bad.health_score, 50);
        assert_eq!(bad.status, HealthState::Degraded);

        let stopped = HealthStatus::assess(false, Duration::from_secs(5), 0, 100, &metrics(0, 0, 0, 0));
        assert_eq!(stopped.status, HealthState::Stopped);
        assert_eq!(stopped.health_score, 100);
        assert_eq!(stopped.uptime, 0.0);
    }

    #[test]
    fn pressure_threshold_is_strictly_above_80_percent() {
        assert!(!above_80(80, 100));
        assert!(above_80(81, 100));
        assert!(above_80(5, 4));
    }
}
