//! # Listener registry.
//!
//! Holds, per event type, the listeners in descending-priority order.
//! Registration appends then re-sorts with a stable sort, so listeners of
//! equal priority keep their registration order.
//!
//! Lookups return an `Arc` snapshot of the list: a worker dispatching an event
//! is unaffected by registrations that happen meanwhile.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::events::EventType;
use crate::listeners::{Listener, ListenerView};

/// Per-type ordered listener lists.
#[derive(Default)]
pub struct ListenerRegistry {
    by_type: RwLock<HashMap<EventType, Arc<[Arc<Listener>]>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a listener and re-sorts that type's list by descending priority.
    pub fn register(&self, listener: Arc<Listener>) {
        let mut map = self.by_type.write().unwrap_or_else(|e| e.into_inner());
        let ty = listener.event_type();

        let mut list: Vec<Arc<Listener>> = map.get(&ty).map(|l| l.to_vec()).unwrap_or_default();
        list.push(listener);
        list.sort_by(|a, b| b.priority().cmp(&a.priority()));
        map.insert(ty, list.into());
    }

    /// Listeners for `event_type` in invocation order (empty if none).
    pub fn listeners_for(&self, event_type: EventType) -> Arc<[Arc<Listener>]> {
        let map = self.by_type.read().unwrap_or_else(|e| e.into_inner());
        map.get(&event_type).cloned().unwrap_or_else(|| Arc::from([]))
    }

    /// Total registered listeners across all types.
    pub fn len(&self) -> usize {
        let map = self.by_type.read().unwrap_or_else(|e| e.into_inner());
        map.values().map(|l| l.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Views of every listener, grouped by type, in invocation order.
    pub fn snapshot(&self) -> HashMap<EventType, Vec<ListenerView>> {
        let map = self.by_type.read().unwrap_or_else(|e| e.into_inner());
        map.iter()
            .map(|(ty, list)| (*ty, list.iter().map(|l| l.view()).collect()))
            .collect()
    }
}
