//! # Non-blocking fan-out of lifecycle records.
//!
//! [`SubscriberSet`] owns one bounded queue and one worker task per
//! subscriber. [`SubscriberSet::emit`] uses `try_send`, so the caller (a bus
//! worker, `emit`, or `stop`) is never suspended by a slow subscriber.
//!
//! ```text
//! emit(record)
//!     ├──► [queue 1] ──► worker 1 ──► sub1.on_record()
//!     ├──► [queue 2] ──► worker 2 ──► sub2.on_record()
//!     └──► [queue N] ──► worker N ──► subN.on_record()
//! ```
//!
//! - No ordering across subscribers, FIFO within one.
//! - Overflow drops the record for that subscriber only (logged at `warn`).
//! - Panics are caught with `catch_unwind` and logged; the worker continues.
//!
//! **Warning**: `AssertUnwindSafe` is used, which can leave shared state
//! inconsistent if a subscriber panics while holding a lock.

use std::sync::Arc;

use futures::FutureExt;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::events::LifecycleRecord;
use crate::listeners::panic_message;
use crate::subscribers::Subscribe;

struct SubscriberChannel {
    name: &'static str,
    sender: mpsc::Sender<Arc<LifecycleRecord>>,
}

/// Fan-out coordinator for lifecycle subscribers.
pub struct SubscriberSet {
    channels: Vec<SubscriberChannel>,
    workers: Vec<JoinHandle<()>>,
}

impl SubscriberSet {
    /// Spawns one worker task per subscriber. Must be called inside a tokio runtime.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>) -> Self {
        let mut channels = Vec::with_capacity(subs.len());
        let mut workers = Vec::with_capacity(subs.len());

        for sub in subs {
            let name = sub.name();
            let (tx, mut rx) = mpsc::channel::<Arc<LifecycleRecord>>(sub.queue_capacity().max(1));

            let handle = tokio::spawn(async move {
                while let Some(rec) = rx.recv().await {
                    let fut = sub.on_record(rec.as_ref());
                    if let Err(panic) = std::panic::AssertUnwindSafe(fut).catch_unwind().await {
                        tracing::error!(
                            subscriber = sub.name(),
                            info = %panic_message(&*panic),
                            "subscriber panicked"
                        );
                    }
                }
            });
            channels.push(SubscriberChannel { name, sender: tx });
            workers.push(handle);
        }
        Self { channels, workers }
    }

    /// `true` when no subscriber is attached.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Hands the record to every subscriber without waiting.
    pub fn emit(&self, record: LifecycleRecord) {
        if self.channels.is_empty() {
            return;
        }
        let record = Arc::new(record);
        for channel in &self.channels {
            match channel.sender.try_send(Arc::clone(&record)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(
                        subscriber = channel.name,
                        event_id = %record.event_id,
                        action = %record.action,
                        "subscriber queue full, record dropped"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::warn!(subscriber = channel.name, "subscriber queue closed");
                }
            }
        }
    }

    /// Closes every queue and waits until each subscriber has drained its backlog.
    pub async fn shutdown(self) {
        drop(self.channels);
        for h in self.workers {
            let _ = h.await;
        }
    }
}
