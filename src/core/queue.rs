//! # Bounded priority queue set.
//!
//! One FIFO lane per [`Priority`], each bounded by its own capacity. Workers
//! always take from the highest non-empty lane, so an event sitting in a
//! higher lane is preferred over any coexisting lower one.
//!
//! ```text
//! push(ev) ─► lane[ev.priority].slots.acquire()   (suspends while the lane is full)
//!             lane.items.push_back(ev)
//!             ready.add_permits(1)
//!
//! pop()    ─► ready.acquire()                     (suspends while every lane is empty)
//!             scan CRITICAL → HIGH → NORMAL → LOW, pop_front the first hit
//!             lane.slots.add_permits(1)           (wakes one suspended producer)
//! ```
//!
//! `ready` never holds more permits than there are queued items, so a popper
//! holding a ready permit always finds an event. [`QueueSet::close`] fails
//! every suspended producer (handing its event back) and every suspended
//! consumer; [`QueueSet::drain`] then empties the lanes.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::Semaphore;

use crate::events::{Event, Priority};

struct Lane {
    slots: Semaphore,
    items: Mutex<VecDeque<Event>>,
}

/// Four bounded FIFO lanes drained highest priority first.
pub(crate) struct QueueSet {
    lanes: [Lane; 4],
    ready: Semaphore,
    capacity: usize,
}

impl QueueSet {
    /// Creates the set; `capacity` bounds each lane (minimum 1).
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let lane = || Lane {
            slots: Semaphore::new(capacity),
            items: Mutex::new(VecDeque::new()),
        };
        Self {
            lanes: [lane(), lane(), lane(), lane()],
            ready: Semaphore::new(0),
            capacity,
        }
    }

    fn lane(&self, priority: Priority) -> &Lane {
        &self.lanes[priority.index()]
    }

    /// Appends `event` to its priority lane, suspending while the lane is full.
    ///
    /// Returns the event back if the set was closed.
    pub(crate) async fn push(&self, event: Event) -> Result<(), Event> {
        let lane = self.lane(event.priority());
        match lane.slots.acquire().await {
            Ok(permit) => permit.forget(),
            Err(_) => return Err(event),
        }
        self.enqueue(event)
    }

    /// Appends an event whose slot permit is already held.
    ///
    /// The closed check runs under the lane lock: `close` happens before
    /// `drain`, so an event either lands before the drain or is handed back.
    fn enqueue(&self, event: Event) -> Result<(), Event> {
        let lane = self.lane(event.priority());
        let mut items = lane.items.lock().unwrap_or_else(|e| e.into_inner());
        if lane.slots.is_closed() {
            return Err(event);
        }
        items.push_back(event);
        drop(items);
        self.ready.add_permits(1);
        Ok(())
    }

    /// Takes the oldest event of the highest non-empty lane.
    ///
    /// Returns `None` once the set is closed.
    pub(crate) async fn pop(&self) -> Option<Event> {
        self.ready.acquire().await.ok()?.forget();
        for p in Priority::DESCENDING {
            let lane = self.lane(p);
            let next = lane
                .items
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .pop_front();
            if let Some(ev) = next {
                lane.slots.add_permits(1);
                return Some(ev);
            }
        }
        None
    }

    /// Events currently queued in one lane.
    pub(crate) fn lane_len(&self, priority: Priority) -> usize {
        self.lane(priority)
            .items
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Events currently queued across all lanes.
    pub(crate) fn len(&self) -> usize {
        Priority::DESCENDING.iter().map(|p| self.lane_len(*p)).sum()
    }

    /// Sum of the lane capacities.
    pub(crate) fn total_capacity(&self) -> usize {
        self.capacity * self.lanes.len()
    }

    /// Refuses further pushes and pops; suspended callers are released.
    pub(crate) fn close(&self) {
        self.ready.close();
        for lane in &self.lanes {
            lane.slots.close();
        }
    }

    /// Removes every queued event, highest priority first.
    pub(crate) fn drain(&self) -> Vec<Event> {
        let mut out = Vec::new();
        for p in Priority::DESCENDING {
            out.extend(
                self.lane(p)
                    .items
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .drain(..),
            );
        }
        out
    }
}
