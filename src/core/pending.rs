//! # Pending result slots.
//!
//! Waiting callers park on a oneshot receiver keyed by event id. The map is
//! the single arbiter of who settles an event: whoever removes the slot first
//! (the worker finishing it, the caller hitting its deadline, or `stop()`)
//! owns the outcome; everyone else discards theirs.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::error::BusError;
use crate::events::Event;

/// Outcome delivered to a waiting caller.
pub(crate) type Settlement = Result<Value, BusError>;

/// Right to settle an event, obtained from [`PendingMap::claim`].
pub(crate) enum Claim {
    /// Fire-and-forget event: nobody waits, the claimant proceeds.
    Detached,
    /// The caller waits on this sender.
    Waiting(oneshot::Sender<Settlement>),
    /// Someone else already settled the event.
    Settled,
}

impl Claim {
    /// Sends `outcome` to the waiting caller, if any.
    pub(crate) fn resolve(self, outcome: Settlement) {
        if let Claim::Waiting(tx) = self {
            // The receiver is gone only if the caller future was dropped.
            let _ = tx.send(outcome);
        }
    }
}

#[derive(Default)]
pub(crate) struct PendingMap {
    slots: Mutex<HashMap<Uuid, oneshot::Sender<Settlement>>>,
}

impl PendingMap {
    /// Registers a slot for `id`.
    pub(crate) fn register(&self, id: Uuid) -> oneshot::Receiver<Settlement> {
        let (tx, rx) = oneshot::channel();
        self.lock().insert(id, tx);
        rx
    }

    /// `true` while nobody has settled `id` yet.
    pub(crate) fn contains(&self, id: &Uuid) -> bool {
        self.lock().contains_key(id)
    }

    /// Removes the slot; `None` if it was already taken.
    pub(crate) fn take(&self, id: &Uuid) -> Option<oneshot::Sender<Settlement>> {
        self.lock().remove(id)
    }

    /// Claims the right to settle `event`.
    pub(crate) fn claim(&self, event: &Event) -> Claim {
        if !event.is_waiting() {
            return Claim::Detached;
        }
        match self.take(&event.id()) {
            Some(tx) => Claim::Waiting(tx),
            None => Claim::Settled,
        }
    }

    /// Resolves every remaining slot with [`BusError::Cancelled`]; returns how many.
    pub(crate) fn cancel_all(&self) -> usize {
        let slots: Vec<_> = self.lock().drain().collect();
        let n = slots.len();
        for (_, tx) in slots {
            let _ = tx.send(Err(BusError::Cancelled));
        }
        n
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, oneshot::Sender<Settlement>>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }
}
