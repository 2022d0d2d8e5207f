//! # AppContext: explicit owner of the bus.
//!
//! ```rust
//! use serde_json::json;
//! use eventvisor::{AppContext, Config, Delivery, Payload};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let ctx = AppContext::new(Config { persistence: false, ..Config::default() });
//!     let reports = ctx.emitter("report_service");
//!
//!     reports
//!         .listen(eventvisor::EventType::SendAdvisorStatsReport, "send_daily")
//!         .handler(|_d: Delivery| async { Ok(json!("sent")) });
//!
//!     ctx.start().await;
//!     let ev = reports.event(Payload::SendAdvisorStatsReport).wait_for_result(true);
//!     assert_eq!(reports.emit(ev).await.unwrap(), Some(json!("sent")));
//!     ctx.shutdown().await;
//! }
//! ```

use std::sync::Arc;

use crate::config::Config;
use crate::context::emitter::Emitter;
use crate::context::signal::wait_for_shutdown_signal;
use crate::core::EventBus;
use crate::subscribers::Subscribe;

/// Owns the bus for the lifetime of the application.
#[derive(Clone)]
pub struct AppContext {
    bus: Arc<EventBus>,
}

impl AppContext {
    pub fn new(cfg: Config) -> Self {
        Self::with_subscribers(cfg, Vec::new())
    }

    pub fn with_subscribers(cfg: Config, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        Self {
            bus: Arc::new(EventBus::with_subscribers(cfg, subscribers)),
        }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Per-service handle for emitting events and registering listeners.
    pub fn emitter(&self, service: impl Into<Arc<str>>) -> Emitter {
        Emitter::new(service, Arc::clone(&self.bus))
    }

    pub async fn start(&self) {
        self.bus.start().await;
    }

    /// Stops the bus, giving workers `Config::grace` to finish.
    pub async fn shutdown(&self) {
        self.bus.stop(self.bus.config().grace).await;
    }

    /// Starts the bus, waits for a termination signal, then shuts down.
    pub async fn run_until_signal(&self) -> std::io::Result<()> {
        self.start().await;
        let res = wait_for_shutdown_signal().await;
        match &res {
            Ok(signal) => tracing::info!(signal, "shutdown requested"),
            Err(e) => tracing::error!(error = %e, "failed to listen for shutdown signals"),
        }
        self.shutdown().await;
        res.map(|_| ())
    }
}
