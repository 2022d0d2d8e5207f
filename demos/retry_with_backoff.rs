//! # Example: retry_with_backoff
//!
//! A CRITICAL listener fails twice before succeeding. Its failures escalate,
//! so the bus re-enqueues the event with growing backoff delays; the caller
//! waiting on `emit` only sees the final result.
//!
//! ## Flow
//! ```text
//! emit(SendWechatMessage, wait=true)
//!   ├─► attempt 1 → Err("gateway busy #1") → retrying (delay=100ms)
//!   ├─► attempt 2 → Err("gateway busy #2") → retrying (delay≈200ms)
//!   └─► attempt 3 → Ok({"delivered": true}) → completed
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=eventvisor=debug cargo run --example retry_with_backoff
//! ```

use std::{
    sync::atomic::{AtomicU32, Ordering},
    time::Duration,
};

use eventvisor::{
    BackoffPolicy, Config, Delivery, Event, EventBus, EventType, HandlerError, JitterPolicy,
    Priority, WechatMessage,
};
use serde_json::json;
use tracing_subscriber::EnvFilter;

static ATTEMPTS: AtomicU32 = AtomicU32::new(0);

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 1. Short backoff so the demo finishes quickly, no persistence files.
    let cfg = Config {
        worker_count: 2,
        persistence: false,
        backoff: BackoffPolicy {
            first: Duration::from_millis(100),
            max: Duration::from_secs(2),
            factor: 2.0,
            jitter: JitterPolicy::Equal,
        },
        ..Config::default()
    };
    let bus = EventBus::new(cfg);

    // 2. Flaky critical listener.
    bus.listen(EventType::SendWechatMessage)
        .name("wechat_gateway")
        .priority(Priority::Critical)
        .handler(|d: Delivery| async move {
            let n = ATTEMPTS.fetch_add(1, Ordering::Relaxed) + 1;
            println!("[wechat_gateway] attempt {} (delivery attempt {})", n, d.attempt);
            if n < 3 {
                return Err(HandlerError::fail(format!("gateway busy #{n}")));
            }
            Ok(json!({ "delivered": true }))
        });

    bus.start().await;

    // 3. Wait for the outcome, retries included.
    let ev = Event::new(WechatMessage {
        to_wxid: "advisors".into(),
        message: "daily report ready".into(),
    })
    .wait_for_result(true)
    .with_max_retries(3)
    .with_timeout(Duration::from_secs(10));

    let result = bus.emit(ev).await?;
    println!("result: {result:?}");

    bus.stop(Duration::from_secs(5)).await;

    let m = bus.metrics();
    println!(
        "total={} completed={} failed={}",
        m.total_events, m.completed_events, m.failed_events
    );
    Ok(())
}
