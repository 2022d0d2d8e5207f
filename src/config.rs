//! # Event bus configuration.
//!
//! Provides [`Config`] centralized settings for the bus runtime.
//!
//! Config is used in two ways:
//! 1. **Bus creation**: `EventBus::new(config)`
//! 2. **Event defaults**: `Event::with_defaults(payload, &config)`
//!
//! ## Sentinel values
//! - `worker_count = 0` → clamped to 1 worker
//! - `queue_capacity = 0` / `dead_letter_capacity = 0` → clamped to 1
//! - `timeout = 0s` → events without a deadline (treated as `None` by the bus)
//! - `health_check_interval = 0s` → health loop disabled
//!
//! ## Environment overrides
//! [`Config::from_env`] starts from the defaults and applies `EVENT_BUS_*`
//! variables. Durations are given in (fractional) seconds.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::policies::{BackoffPolicy, JitterPolicy};

/// Global configuration for the bus runtime.
///
/// ## Field semantics
/// - `worker_count`: cooperative workers draining the queues
/// - `queue_capacity`: bound of **each** priority queue (4 queues in total)
/// - `dead_letter_capacity`: ring size for terminally failed/timed-out events
/// - `history_capacity`: ring size of the event history
/// - `wait_for_result` / `timeout` / `max_retries`: defaults for new events
/// - `backoff`: retry delay policy (`first × factor^(retry-1)`)
/// - `health_check_interval`, `metrics_interval`, `metrics_window`: monitor loops
/// - `persistence` / `persistence_path`: JSON-lines lifecycle log
/// - `grace`: how long `AppContext::shutdown` lets workers finish
#[derive(Clone, Debug)]
pub struct Config {
    /// Number of workers spawned by `start()`.
    pub worker_count: usize,

    /// Capacity of each priority queue.
    ///
    /// When a queue is full, `emit` suspends until a worker frees a slot.
    pub queue_capacity: usize,

    /// Maximum number of dead-lettered events kept; oldest evicted first.
    pub dead_letter_capacity: usize,

    /// Maximum number of history entries kept; oldest evicted first.
    pub history_capacity: usize,

    /// Default for [`Event::wait_for_result`](crate::Event::wait_for_result).
    pub wait_for_result: bool,

    /// Default event deadline, also the default per-listener deadline.
    pub timeout: Duration,

    /// Default retry budget for escalated failures.
    pub max_retries: u32,

    /// Delay policy between retries.
    pub backoff: BackoffPolicy,

    /// Period of the health loop (`0s` = disabled).
    pub health_check_interval: Duration,

    /// Sampling period of the throughput window.
    pub metrics_interval: Duration,

    /// Number of samples in the throughput window.
    pub metrics_window: usize,

    /// Number of processing-time samples averaged by the metrics.
    pub processing_samples: usize,

    /// Append lifecycle records to a per-day JSON-lines file.
    pub persistence: bool,

    /// Directory of the persistence log.
    pub persistence_path: PathBuf,

    /// Stop timeout used by the application context.
    pub grace: Duration,
}

impl Config {
    /// Returns the worker count clamped to a minimum of 1.
    #[inline]
    pub fn workers(&self) -> usize {
        self.worker_count.max(1)
    }

    /// Returns the per-priority queue capacity clamped to a minimum of 1.
    #[inline]
    pub fn queue_capacity_clamped(&self) -> usize {
        self.queue_capacity.max(1)
    }

    /// Returns the dead-letter capacity clamped to a minimum of 1.
    #[inline]
    pub fn dead_letter_capacity_clamped(&self) -> usize {
        self.dead_letter_capacity.max(1)
    }

    /// Returns the health-check period as an `Option`.
    ///
    /// - `None` → health loop disabled
    /// - `Some(d)` → check every `d`
    #[inline]
    pub fn health_interval(&self) -> Option<Duration> {
        if self.health_check_interval == Duration::ZERO {
            None
        } else {
            Some(self.health_check_interval)
        }
    }

    /// Total queued events the bus can hold before every producer suspends.
    #[inline]
    pub fn total_queue_capacity(&self) -> usize {
        self.queue_capacity_clamped() * crate::Priority::DESCENDING.len()
    }

    /// Loads the defaults and applies `EVENT_BUS_*` environment overrides.
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `EVENT_BUS_WORKER_COUNT` | `worker_count` |
    /// | `EVENT_BUS_MAX_QUEUE_SIZE` | `queue_capacity` |
    /// | `EVENT_BUS_DEAD_LETTER_QUEUE_SIZE` | `dead_letter_capacity` |
    /// | `EVENT_BUS_DEFAULT_WAIT_FOR_RESULT` | `wait_for_result` |
    /// | `EVENT_BUS_DEFAULT_TIMEOUT` | `timeout` (seconds) |
    /// | `EVENT_BUS_MAX_RETRY_COUNT` | `max_retries` |
    /// | `EVENT_BUS_RETRY_DELAY` | `backoff.first` (seconds) |
    /// | `EVENT_BUS_HEALTH_CHECK_INTERVAL` | `health_check_interval` (seconds) |
    /// | `EVENT_BUS_ENABLE_PERSISTENCE` | `persistence` |
    /// | `EVENT_BUS_PERSISTENCE_PATH` | `persistence_path` |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(v) = parse::<usize>(&lookup, "EVENT_BUS_WORKER_COUNT", "integer")? {
            cfg.worker_count = v;
        }
        if let Some(v) = parse::<usize>(&lookup, "EVENT_BUS_MAX_QUEUE_SIZE", "integer")? {
            cfg.queue_capacity = v;
        }
        if let Some(v) = parse::<usize>(&lookup, "EVENT_BUS_DEAD_LETTER_QUEUE_SIZE", "integer")? {
            cfg.dead_letter_capacity = v;
        }
        if let Some(v) = flag(&lookup, "EVENT_BUS_DEFAULT_WAIT_FOR_RESULT")? {
            cfg.wait_for_result = v;
        }
        if let Some(v) = seconds(&lookup, "EVENT_BUS_DEFAULT_TIMEOUT")? {
            cfg.timeout = v;
        }
        if let Some(v) = parse::<u32>(&lookup, "EVENT_BUS_MAX_RETRY_COUNT", "integer")? {
            cfg.max_retries = v;
        }
        if let Some(v) = seconds(&lookup, "EVENT_BUS_RETRY_DELAY")? {
            cfg.backoff.first = v;
        }
        if let Some(v) = seconds(&lookup, "EVENT_BUS_HEALTH_CHECK_INTERVAL")? {
            cfg.health_check_interval = v;
        }
        if let Some(v) = flag(&lookup, "EVENT_BUS_ENABLE_PERSISTENCE")? {
            cfg.persistence = v;
        }
        if let Some(v) = lookup("EVENT_BUS_PERSISTENCE_PATH") {
            cfg.persistence_path = PathBuf::from(v);
        }

        Ok(cfg)
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    expected: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid {
                key,
                value: raw,
                expected,
            }),
    }
}

fn seconds(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<Duration>, ConfigError> {
    let expected = "non-negative number of seconds";
    match parse::<f64>(lookup, key, expected)? {
        None => Ok(None),
        Some(secs) => Duration::try_from_secs_f64(secs)
            .map(Some)
            .map_err(|_| ConfigError::Invalid {
                key,
                value: secs.to_string(),
                expected,
            }),
    }
}

fn flag(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<bool>, ConfigError> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(ConfigError::Invalid {
                key,
                value: raw,
                expected: "boolean",
            }),
        },
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `worker_count = 4`
    /// - `queue_capacity = 1000` (per priority)
    /// - `dead_letter_capacity = 100`, `history_capacity = 1000`
    /// - `wait_for_result = true`, `timeout = 30s`, `max_retries = 3`
    /// - `backoff`: first=1s, factor=2.0, max=5min, no jitter
    /// - `health_check_interval = 30s`, `metrics_interval = 1s`, `metrics_window = 60`
    /// - `processing_samples = 100`
    /// - `persistence = true` under `./logs/events`
    /// - `grace = 10s`
    fn default() -> Self {
        Self {
            worker_count: 4,
            queue_capacity: 1000,
            dead_letter_capacity: 100,
            history_capacity: 1000,
            wait_for_result: true,
            timeout: Duration::from_secs(30),
            max_retries: 3,
            backoff: BackoffPolicy {
                first: Duration::from_secs(1),
                max: Duration::from_secs(300),
                factor: 2.0,
                jitter: JitterPolicy::None,
            },
            health_check_interval: Duration::from_secs(30),
            metrics_interval: Duration::from_secs(1),
            metrics_window: 60,
            processing_samples: 100,
            persistence: true,
            persistence_path: PathBuf::from("./logs/events"),
            grace: Duration::from_secs(10),
        }
    }
}
