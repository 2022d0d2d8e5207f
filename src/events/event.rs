//! # Events flowing through the bus.
//!
//! An [`Event`] has an immutable identity (id, payload, priority, creation
//! time, tracing metadata) and a mutable processing envelope (status,
//! timestamps, retry counters, error message) that only the bus touches.
//!
//! ## State machine
//! ```text
//!             ┌──────────── retry (retry_count += 1) ───────────┐
//!             ▼                                                 │
//!         Pending ──► Processing ──► Completed                  │
//!            │            ├────────► Failed                     │
//!            │            ├────────► Timeout                    │
//!            │            ├────────► Cancelled                  │
//!            │            └─────────────────────────────────────┘
//!            ├──► Timeout    (caller deadline while queued)
//!            └──► Cancelled  (bus stopped while queued / in backoff)
//! ```
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use eventvisor::{Event, EventStatus, EventType, Payload, Priority};
//!
//! let ev = Event::new(Payload::SendAdvisorStatsReport)
//!     .with_priority(Priority::High)
//!     .with_timeout(Duration::from_secs(5))
//!     .with_source("scheduler")
//!     .with_tag("report", "daily");
//!
//! assert_eq!(ev.event_type(), EventType::SendAdvisorStatsReport);
//! assert_eq!(ev.status(), EventStatus::Pending);
//! assert_eq!(ev.source(), Some("scheduler"));
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use uuid::Uuid;

use super::payload::{EventType, Payload};
use crate::config::Config;

/// Queue-selection priority; also orders listeners of one event type.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Low = 0,
    #[default]
    Normal = 1,
    High = 2,
    Critical = 3,
}

impl Priority {
    /// Dequeue preference order: highest first.
    pub const DESCENDING: [Priority; 4] = [
        Priority::Critical,
        Priority::High,
        Priority::Normal,
        Priority::Low,
    ];

    /// Index of this priority's queue.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Failures of listeners at this priority escalate to the retry path.
    #[inline]
    pub fn escalates(self) -> bool {
        self >= Priority::High
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "LOW",
            Priority::Normal => "NORMAL",
            Priority::High => "HIGH",
            Priority::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Processing status of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Timeout,
    Cancelled,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Pending => "pending",
            EventStatus::Processing => "processing",
            EventStatus::Completed => "completed",
            EventStatus::Failed => "failed",
            EventStatus::Timeout => "timeout",
            EventStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal statuses are reached exactly once per event.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EventStatus::Completed
                | EventStatus::Failed
                | EventStatus::Timeout
                | EventStatus::Cancelled
        )
    }

    /// Returns `true` if `self -> next` is an edge of the state machine.
    pub fn can_transition_to(&self, next: EventStatus) -> bool {
        use EventStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Timeout)
                | (Pending, Cancelled)
                | (Processing, Pending)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Timeout)
                | (Processing, Cancelled)
        )
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unit of work with identity, typed payload, priority and lifecycle status.
///
/// Cloning is cheap: the payload and tags are shared behind `Arc`.
/// The result slot of a waiting caller is owned by the bus (keyed by [`Event::id`]),
/// not by the event itself.
#[derive(Debug, Clone)]
pub struct Event {
    id: Uuid,
    payload: Arc<Payload>,
    priority: Priority,
    created_at: DateTime<Utc>,
    wait_for_result: bool,
    timeout: Duration,
    max_retries: u32,
    correlation_id: Option<Arc<str>>,
    source: Option<Arc<str>>,
    tags: Arc<BTreeMap<String, String>>,

    status: EventStatus,
    retry_count: u32,
    processing_started_at: Option<DateTime<Utc>>,
    processing_ended_at: Option<DateTime<Utc>>,
    started: Option<Instant>,
    processing_time: Option<Duration>,
    error_message: Option<String>,
    suppressed_failures: Vec<String>,
}

impl Event {
    /// Creates a pending event with the built-in defaults
    /// (same values as [`Config::default`]).
    ///
    /// Environment overrides loaded into a bus's [`Config`] do not apply here;
    /// use [`EventBus::event`](crate::EventBus::event) or
    /// [`Event::with_defaults`] to inherit them.
    pub fn new(payload: impl Into<Payload>) -> Self {
        Self::with_defaults(payload, &Config::default())
    }

    /// Creates a pending event inheriting `wait_for_result`, `timeout` and
    /// `max_retries` from the given configuration.
    pub fn with_defaults(payload: impl Into<Payload>, cfg: &Config) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload: Arc::new(payload.into()),
            priority: Priority::Normal,
            created_at: Utc::now(),
            wait_for_result: cfg.wait_for_result,
            timeout: cfg.timeout,
            max_retries: cfg.max_retries,
            correlation_id: None,
            source: None,
            tags: Arc::new(BTreeMap::new()),
            status: EventStatus::Pending,
            retry_count: 0,
            processing_started_at: None,
            processing_ended_at: None,
            started: None,
            processing_time: None,
            error_message: None,
            suppressed_failures: Vec::new(),
        }
    }

    /// Sets the queue priority.
    #[inline]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Makes `emit` wait for the listeners' result (or not).
    #[inline]
    pub fn wait_for_result(mut self, wait: bool) -> Self {
        self.wait_for_result = wait;
        self
    }

    /// Sets the caller deadline, also the default listener deadline.
    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Bounds the number of retries after an escalated failure.
    #[inline]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[inline]
    pub fn with_correlation_id(mut self, id: impl Into<Arc<str>>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    #[inline]
    pub fn with_source(mut self, source: impl Into<Arc<str>>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Adds one free-form tracing tag.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.tags).insert(key.into(), value.into());
        self
    }

    // ---- accessors ----

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn event_type(&self) -> EventType {
        self.payload.event_type()
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_waiting(&self) -> bool {
        self.wait_for_result
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub fn status(&self) -> EventStatus {
        self.status
    }

    pub fn processing_started_at(&self) -> Option<DateTime<Utc>> {
        self.processing_started_at
    }

    pub fn processing_ended_at(&self) -> Option<DateTime<Utc>> {
        self.processing_ended_at
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Failures of non-escalating listeners that were recorded and swallowed.
    pub fn suppressed_failures(&self) -> &[String] {
        &self.suppressed_failures
    }

    /// `true` once some listener failure was swallowed during processing.
    pub fn is_partial_failure(&self) -> bool {
        !self.suppressed_failures.is_empty()
    }

    /// Time spent between the last `Processing` transition and the terminal one.
    pub fn processing_time(&self) -> Option<Duration> {
        self.processing_time
    }

    // ---- bus-only mutation ----

    /// Moves the event along one state-machine edge.
    ///
    /// Returns `false` (and leaves the event untouched) for an illegal edge.
    pub(crate) fn transition(&mut self, next: EventStatus) -> bool {
        if !self.status.can_transition_to(next) {
            tracing::error!(
                event_id = %self.id,
                from = %self.status,
                to = %next,
                "illegal event status transition"
            );
            return false;
        }
        match next {
            EventStatus::Processing => {
                self.processing_started_at = Some(Utc::now());
                self.started = Some(Instant::now());
                self.suppressed_failures.clear();
            }
            EventStatus::Pending => {
                self.retry_count += 1;
            }
            _ => {
                self.processing_ended_at = Some(Utc::now());
                self.processing_time = self.started.map(|s| s.elapsed());
            }
        }
        self.status = next;
        true
    }

    pub(crate) fn set_error(&mut self, message: impl Into<String>) {
        self.error_message = Some(message.into());
    }

    pub(crate) fn record_suppressed(&mut self, listener: &str, error: &str) {
        self.suppressed_failures.push(format!("{listener}: {error}"));
    }

    /// Read-only view handed to one listener invocation.
    pub(crate) fn delivery(&self) -> Delivery {
        Delivery {
            id: self.id,
            payload: Arc::clone(&self.payload),
            priority: self.priority,
            attempt: self.retry_count + 1,
            correlation_id: self.correlation_id.clone(),
            source: self.source.clone(),
            tags: Arc::clone(&self.tags),
        }
    }

    /// Serializable snapshot for history and dead-letter inspection.
    pub fn view(&self) -> EventView {
        EventView {
            event_id: self.id,
            event_type: self.event_type(),
            priority: self.priority,
            status: self.status,
            created_at: self.created_at,
            processing_started_at: self.processing_started_at,
            processing_ended_at: self.processing_ended_at,
            wait_for_result: self.wait_for_result,
            timeout_ms: self.timeout.as_millis().min(u128::from(u64::MAX)) as u64,
            retry_count: self.retry_count,
            max_retries: self.max_retries,
            correlation_id: self.correlation_id.as_deref().map(str::to_owned),
            source: self.source.as_deref().map(str::to_owned),
            tags: (*self.tags).clone(),
            error_message: self.error_message.clone(),
            partial_failure: self.is_partial_failure(),
            suppressed_failures: self.suppressed_failures.clone(),
        }
    }
}

/// What a listener handler sees of the event it is processing.
///
/// Cheap to clone; the payload is shared with the event.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub id: Uuid,
    pub payload: Arc<Payload>,
    pub priority: Priority,
    /// 1-based delivery attempt (`retry_count + 1`).
    pub attempt: u32,
    pub correlation_id: Option<Arc<str>>,
    pub source: Option<Arc<str>>,
    pub tags: Arc<BTreeMap<String, String>>,
}

impl Delivery {
    pub fn event_type(&self) -> EventType {
        self.payload.event_type()
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }
}

/// Point-in-time copy of an event, as returned by history and dead-letter queries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventView {
    pub event_id: Uuid,
    pub event_type: EventType,
    pub priority: Priority,
    pub status: EventStatus,
    pub created_at: DateTime<Utc>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub processing_ended_at: Option<DateTime<Utc>>,
    pub wait_for_result: bool,
    pub timeout_ms: u64,
    pub retry_count: u32,
    pub max_retries: u32,
    pub correlation_id: Option<String>,
    pub source: Option<String>,
    pub tags: BTreeMap<String, String>,
    pub error_message: Option<String>,
    pub partial_failure: bool,
    pub suppressed_failures: Vec<String>,
}
