//! # Lifecycle records.
//!
//! A [`LifecycleRecord`] is produced on every lifecycle transition and fanned
//! out to subscribers. Serialized with `serde_json` it is exactly one line of
//! the persistence log:
//!
//! ```text
//! {"event_id":"…","event_type":"send.wechat.message","action":"processing",
//!  "timestamp":"2025-01-01T08:00:00.000000Z","correlation_id":null,"source":"scheduler",
//!  "worker_id":"worker-2","error":null,"retry_count":0,"priority":"NORMAL","status":"processing"}
//! ```

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::event::{Event, EventStatus, Priority};
use super::payload::EventType;

/// Lifecycle transition that produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Emitted,
    Processing,
    Completed,
    Retrying,
    Failed,
    Timeout,
    Cancelled,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Emitted => "emitted",
            Action::Processing => "processing",
            Action::Completed => "completed",
            Action::Retrying => "retrying",
            Action::Failed => "failed",
            Action::Timeout => "timeout",
            Action::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One persisted line describing a lifecycle transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LifecycleRecord {
    pub event_id: Uuid,
    pub event_type: EventType,
    pub action: Action,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: Option<String>,
    pub source: Option<String>,
    pub worker_id: Option<Arc<str>>,
    pub error: Option<String>,
    pub retry_count: u32,
    pub priority: Priority,
    pub status: EventStatus,
}

impl LifecycleRecord {
    /// Captures `event` as it is right now.
    pub fn new(event: &Event, action: Action) -> Self {
        Self {
            event_id: event.id(),
            event_type: event.event_type(),
            action,
            timestamp: Utc::now(),
            correlation_id: event.correlation_id().map(str::to_owned),
            source: event.source().map(str::to_owned),
            worker_id: None,
            error: None,
            retry_count: event.retry_count(),
            priority: event.priority(),
            status: event.status(),
        }
    }

    #[inline]
    pub fn with_worker(mut self, worker_id: Option<Arc<str>>) -> Self {
        self.worker_id = worker_id;
        self
    }

    #[inline]
    pub fn with_error(mut self, error: Option<String>) -> Self {
        self.error = error;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Payload;

    #[test]
    fn serializes_the_persisted_field_set() {
        let ev = Event::new(Payload::SendAiAdvisorStatsReport)
            .with_priority(Priority::Critical)
            .with_correlation_id("req-42");
        let rec = LifecycleRecord::new(&ev, Action::Emitted)
            .with_worker(Some(Arc::from("worker-0")))
            .with_error(None);

        let json: serde_json::Value = serde_json::to_value(&rec).unwrap();
        let obj = json.as_object().unwrap();
        let mut keys: Vec<&str> = obj.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            vec![
                "action",
                "correlation_id",
                "error",
                "event_id",
                "event_type",
                "priority",
                "retry_count",
                "source",
                "status",
                "timestamp",
                "worker_id",
            ]
        );
        assert_eq!(obj["action"], "emitted");
        assert_eq!(obj["priority"], "CRITICAL");
        assert_eq!(obj["status"], "pending");
        assert_eq!(obj["event_type"], "send.ai.advisor.stats.wechat.report.task");
        assert_eq!(obj["correlation_id"], "req-42");
    }
}
