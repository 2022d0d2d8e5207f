//! # Emitter: per-service call-site helper.
//!
//! Wraps the shared bus with a service identity:
//! - events built via [`Emitter::event`] inherit the bus defaults, are
//!   fire-and-forget, and carry `source = <service>`;
//! - [`Emitter::emit`] always stamps the source and counts successes/failures;
//! - listeners registered via [`Emitter::listen`] are named `<service>_<handler>`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;

use crate::core::{EventBus, ListenBuilder};
use crate::error::BusError;
use crate::events::{Event, EventType, Payload};

/// Counters kept per service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServiceStats {
    pub events_emitted: u64,
    pub emit_failures: u64,
}

/// Service-level health report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceHealth {
    pub service_name: String,
    /// `healthy` while the bus runs, `stopped` otherwise.
    pub status: &'static str,
    pub uptime_seconds: f64,
    /// Percentage of `emit` calls that returned `Ok`.
    pub success_rate: f64,
    pub stats: ServiceStats,
}

/// Emits events and registers listeners on behalf of one service.
#[derive(Clone)]
pub struct Emitter {
    service: Arc<str>,
    bus: Arc<EventBus>,
    started_at: Instant,
    emitted: Arc<AtomicU64>,
    failures: Arc<AtomicU64>,
}

impl Emitter {
    pub fn new(service: impl Into<Arc<str>>, bus: Arc<EventBus>) -> Self {
        let service = service.into();
        tracing::info!(service = %service, "service attached to event bus");
        Self {
            service,
            bus,
            started_at: Instant::now(),
            emitted: Arc::new(AtomicU64::new(0)),
            failures: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Fire-and-forget event with the bus defaults and this service as source.
    pub fn event(&self, payload: impl Into<Payload>) -> Event {
        Event::with_defaults(payload, self.bus.config())
            .wait_for_result(false)
            .with_source(Arc::clone(&self.service))
    }

    /// Emits `event` with `source` set to this service.
    pub async fn emit(&self, event: Event) -> Result<Option<Value>, BusError> {
        let event_type = event.event_type();
        let res = self
            .bus
            .emit(event.with_source(Arc::clone(&self.service)))
            .await;
        match &res {
            Ok(_) => {
                self.emitted.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(service = %self.service, %event_type, "event emitted");
            }
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    service = %self.service,
                    %event_type,
                    label = e.as_label(),
                    error = %e,
                    "failed to emit event"
                );
            }
        }
        res
    }

    /// Starts a listener named `<service>_<handler>`.
    pub fn listen(&self, event_type: EventType, handler: &str) -> ListenBuilder<'_> {
        self.bus
            .listen(event_type)
            .name(format!("{}_{handler}", self.service))
    }

    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            events_emitted: self.emitted.load(Ordering::Relaxed),
            emit_failures: self.failures.load(Ordering::Relaxed),
        }
    }

    pub fn health(&self) -> ServiceHealth {
        let stats = self.stats();
        let attempts = stats.events_emitted + stats.emit_failures;
        ServiceHealth {
            service_name: self.service.to_string(),
            status: if self.bus.is_running() {
                "healthy"
            } else {
                "stopped"
            },
            uptime_seconds: self.started_at.elapsed().as_secs_f64(),
            success_rate: stats.events_emitted as f64 / attempts.max(1) as f64 * 100.0,
            stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::events::{Delivery, WechatMessage};
    use serde_json::json;

    fn bus() -> Arc<EventBus> {
        Arc::new(EventBus::new(Config {
            persistence: false,
            health_check_interval: std::time::Duration::ZERO,
            ..Config::default()
        }))
    }

    #[tokio::test]
    async fn stamps_source_and_names_listeners() {
        let em = Emitter::new("notify", bus());
        em.listen(EventType::SendWechatMessage, "deliver")
            .handler(|d: Delivery| async move { Ok(json!(d.source.as_deref())) });
        let info = em.bus().listeners_info();
        assert_eq!(info[&EventType::SendWechatMessage][0].name, "notify_deliver");

        em.bus().start().await;
        let ev = em
            .event(WechatMessage {
                to_wxid: "room".into(),
                message: "hello".into(),
            })
            .wait_for_result(true);
        assert_eq!(ev.source(), Some("notify"));
        assert_eq!(em.emit(ev).await.unwrap(), Some(json!("notify")));
        em.bus().stop(std::time::Duration::from_secs(1)).await;

        assert_eq!(em.stats().events_emitted, 1);
        assert_eq!(em.health().status, "stopped");
    }

    #[tokio::test]
    async fn failures_are_counted() {
        let em = Emitter::new("reports", bus());
        let err = em
            .emit(em.event(Payload::SendAdvisorStatsReport))
            .await
            .unwrap_err();
        assert!(matches!(err, BusError::NotRunning));
        let h = em.health();
        assert_eq!(h.stats.emit_failures, 1);
        assert_eq!(h.success_rate, 0.0);
    }
}
