//! # Lifecycle journal.
//!
//! Every transition of an event goes through [`Journal::record`], which:
//! 1. appends the event's view to the bounded history ring (synchronously,
//!    so history is consistent with what callers have observed);
//! 2. builds a [`LifecycleRecord`] and fans it out to the live
//!    [`SubscriberSet`] (persistence and user subscribers), never blocking.
//!
//! The subscriber set only exists while the bus runs: `start()` attaches
//! one, `stop()` detaches it and waits for its backlog to flush.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::events::{Action, Event, EventView, LifecycleRecord};
use crate::subscribers::SubscriberSet;

pub(crate) struct Journal {
    history: Mutex<VecDeque<EventView>>,
    capacity: usize,
    subs: Mutex<Option<Arc<SubscriberSet>>>,
}

impl Journal {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            history: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
            subs: Mutex::new(None),
        }
    }

    /// Records one lifecycle transition of `event`.
    pub(crate) fn record(
        &self,
        event: &Event,
        action: Action,
        worker_id: Option<&Arc<str>>,
        error: Option<String>,
    ) {
        {
            let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
            if history.len() >= self.capacity {
                history.pop_front();
            }
            history.push_back(event.view());
        }

        let subs = self.subs.lock().unwrap_or_else(|e| e.into_inner()).clone();
        if let Some(subs) = subs {
            subs.emit(
                LifecycleRecord::new(event, action)
                    .with_worker(worker_id.cloned())
                    .with_error(error),
            );
        }
    }

    /// The `limit` most recent history entries, oldest first.
    pub(crate) fn history(&self, limit: usize) -> Vec<EventView> {
        let history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        let skip = history.len().saturating_sub(limit);
        history.iter().skip(skip).cloned().collect()
    }

    pub(crate) fn attach(&self, subs: SubscriberSet) {
        *self.subs.lock().unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(subs));
    }

    /// Detaches the live set and returns it once no in-flight `record` holds it.
    pub(crate) async fn detach(&self) -> Option<SubscriberSet> {
        let mut subs = self.subs.lock().unwrap_or_else(|e| e.into_inner()).take()?;
        loop {
            match Arc::try_unwrap(subs) {
                Ok(set) => return Some(set),
                Err(shared) => {
                    subs = shared;
                    tokio::task::yield_now().await;
                }
            }
        }
    }
}
