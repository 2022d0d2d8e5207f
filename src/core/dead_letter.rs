//! # Dead-letter buffer.
//!
//! Bounded, insertion-ordered ring of terminally failed or timed-out events,
//! kept for inspection only. Once full, each insert evicts the oldest entry.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::events::EventView;

pub(crate) struct DeadLetterBuffer {
    entries: Mutex<VecDeque<EventView>>,
    capacity: usize,
}

impl DeadLetterBuffer {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
        }
    }

    /// Appends an entry; returns the evicted one when the ring was full.
    pub(crate) fn push(&self, view: EventView) -> Option<EventView> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let evicted = if entries.len() >= self.capacity {
            entries.pop_front()
        } else {
            None
        };
        entries.push_back(view);
        evicted
    }

    /// The `limit` most recent entries, oldest first.
    pub(crate) fn recent(&self, limit: usize) -> Vec<EventView> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let skip = entries.len().saturating_sub(limit);
        entries.iter().skip(skip).cloned().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Empties the buffer; returns how many entries were dropped.
    pub(crate) fn clear(&self) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let n = entries.len();
        entries.clear();
        n
    }
}
