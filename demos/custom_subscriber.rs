//! # Example: custom_subscriber
//!
//! Plugs a custom [`Subscribe`] into the bus next to the built-in persistence
//! logger, wires two services through an [`AppContext`], and prints every
//! lifecycle record as it happens.
//!
//! One NORMAL listener fails and is suppressed, so the event still completes
//! with a partial failure; an event with no listeners is dead-lettered.
//!
//! ## Run
//! ```bash
//! cargo run --example custom_subscriber
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use eventvisor::{
    AppContext, Config, Delivery, DialogRecord, EventType, HandlerError, LifecycleRecord, Payload,
    Priority, Subscribe,
};
use serde_json::json;

/// Prints one line per lifecycle record.
struct Console;

#[async_trait]
impl Subscribe for Console {
    async fn on_record(&self, rec: &LifecycleRecord) {
        println!(
            "[{}] {} {} worker={} retry={} error={}",
            rec.timestamp.format("%H:%M:%S%.3f"),
            rec.action,
            rec.event_type,
            rec.worker_id.as_deref().unwrap_or("-"),
            rec.retry_count,
            rec.error.as_deref().unwrap_or("-"),
        );
    }

    fn name(&self) -> &'static str {
        "console"
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = Config {
        persistence: false,
        ..Config::default()
    };
    let ctx = AppContext::with_subscribers(cfg, vec![Arc::new(Console) as Arc<dyn Subscribe>]);

    let reports = ctx.emitter("report_service");
    let dialogs = ctx.emitter("dialog_service");

    reports
        .listen(EventType::SendAdvisorStatsReport, "render")
        .priority(Priority::High)
        .handler(|_d: Delivery| async { Ok(json!({ "rows": 42 })) });
    reports
        .listen(EventType::SendAdvisorStatsReport, "archive")
        .handler(|_d: Delivery| async { Err(HandlerError::fail("archive disk full")) });

    ctx.start().await;

    let ev = reports
        .event(Payload::SendAdvisorStatsReport)
        .wait_for_result(true);
    println!("report result: {:?}", reports.emit(ev).await?);

    let orphan = dialogs
        .event(Payload::AddDialogRecord(DialogRecord {
            session_id: "s-1".into(),
            role: "user".into(),
            content: "hello".into(),
        }))
        .wait_for_result(true);
    if let Err(e) = dialogs.emit(orphan).await {
        println!("dialog emit failed: {e} ({})", e.as_label());
    }

    ctx.shutdown().await;

    for dead in ctx.bus().dead_letter_events(10) {
        println!("dead letter: {} {:?}", dead.event_type, dead.error_message);
    }
    println!("{:?}", reports.stats());
    Ok(())
}
