#![forbid(unsafe_code)]

//! Per-owner record of scoped subscriptions.
//!
//! A [`Tracker`] maps each tracked object (by [`ObjectId`]) to the handler
//! ids subscribed on the owner on its behalf, plus the teardown wiring
//! installed on the tracked object itself.
//!
//! The tracker is plain state. It never calls an adapter while it is
//! borrowed: the registry takes entries out of it and releases them after
//! the borrow ends, so adapter calls are free to reenter the registry.
//!
//! # Entry lifecycle
//!
//! ```text
//! UNTRACKED ──track──▶ TRACKED ──track──▶ TRACKED (more ids)
//!                          │
//!                          └──untrack──▶ REMOVED (terminal)
//! ```
//!
//! A later `track` for the same object creates a fresh entry.

use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use lifeline_core::{HandlerId, ObjectId, Subscribable};
use tracing::trace;

/// Diagnostic view of one tracked entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySnapshot {
    pub tracked: ObjectId,
    pub handlers: usize,
    pub teardown_wired: bool,
}

/// Diagnostic view of one tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerSnapshot {
    pub owner: ObjectId,
    pub owner_teardown_wired: bool,
    pub entries: Vec<EntrySnapshot>,
}

impl TrackerSnapshot {
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.entries.iter().map(|e| e.handlers).sum()
    }
}

/// Handler ids recorded against one tracked object.
pub(crate) struct TrackedEntry {
    tracked: Weak<dyn Subscribable>,
    handler_ids: Vec<HandlerId>,
    teardown_id: Option<HandlerId>,
}

impl TrackedEntry {
    /// Unsubscribe every recorded handler from `owner` and the teardown
    /// wiring from the tracked object. Handles already gone are skipped.
    pub(crate) fn release(self, owner: Option<&Rc<dyn Subscribable>>) {
        if let Some(owner) = owner {
            for id in self.handler_ids {
                if owner.is_active(id) {
                    owner.unsubscribe(id);
                } else {
                    trace!(owner = %owner.object_id(), handler = %id, "scoped handler already inactive");
                }
            }
        }
        if let Some(id) = self.teardown_id {
            match self.tracked.upgrade() {
                Some(tracked) if tracked.is_active(id) => tracked.unsubscribe(id),
                _ => trace!(handler = %id, "teardown wiring already inactive"),
            }
        }
    }
}

/// Scoped subscriptions held by one owner.
pub(crate) struct Tracker {
    owner: Weak<dyn Subscribable>,
    owner_id: ObjectId,
    owner_teardown: Option<HandlerId>,
    entries: BTreeMap<ObjectId, TrackedEntry>,
}

impl Tracker {
    pub(crate) fn new(owner: &Rc<dyn Subscribable>) -> Self {
        Self {
            owner: Rc::downgrade(owner),
            owner_id: owner.object_id(),
            owner_teardown: None,
            entries: BTreeMap::new(),
        }
    }

    pub(crate) fn owner(&self) -> Option<Rc<dyn Subscribable>> {
        self.owner.upgrade()
    }

    pub(crate) fn set_owner_teardown(&mut self, id: HandlerId) {
        self.owner_teardown = Some(id);
    }

    /// Append `ids` to the entry for `tracked`, creating it if absent.
    /// Returns `true` when a new entry was created.
    pub(crate) fn track(
        &mut self,
        tracked: &Rc<dyn Subscribable>,
        ids: impl IntoIterator<Item = HandlerId>,
    ) -> bool {
        let mut created = false;
        let entry = self
            .entries
            .entry(tracked.object_id())
            .or_insert_with(|| {
                created = true;
                TrackedEntry {
                    tracked: Rc::downgrade(tracked),
                    handler_ids: Vec::new(),
                    teardown_id: None,
                }
            });
        entry.handler_ids.extend(ids);
        created
    }

    /// Whether `tracked` has an entry without teardown wiring yet.
    pub(crate) fn needs_teardown_wiring(&self, tracked: ObjectId) -> bool {
        self.entries
            .get(&tracked)
            .is_some_and(|e| e.teardown_id.is_none())
    }

    /// Record teardown wiring. Returns `false` if the entry is gone or
    /// already wired; the caller must release `id` in that case.
    pub(crate) fn set_entry_teardown(&mut self, tracked: ObjectId, id: HandlerId) -> bool {
        match self.entries.get_mut(&tracked) {
            Some(entry) if entry.teardown_id.is_none() => {
                entry.teardown_id = Some(id);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn untrack(&mut self, tracked: ObjectId) -> Option<TrackedEntry> {
        self.entries.remove(&tracked)
    }

    pub(crate) fn contains(&self, tracked: ObjectId) -> bool {
        self.entries.contains_key(&tracked)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Tracked ids in a stable order, copied out for reentrant-safe
    /// iteration.
    pub(crate) fn keys(&self) -> Vec<ObjectId> {
        self.entries.keys().copied().collect()
    }

    pub(crate) fn snapshot(&self) -> TrackerSnapshot {
        TrackerSnapshot {
            owner: self.owner_id,
            owner_teardown_wired: self.owner_teardown.is_some(),
            entries: self
                .entries
                .iter()
                .map(|(id, e)| EntrySnapshot {
                    tracked: *id,
                    handlers: e.handler_ids.len(),
                    teardown_wired: e.teardown_id.is_some(),
                })
                .collect(),
        }
    }

    /// Release every remaining entry and the owner's teardown wiring. Call
    /// only after the tracker has been removed from the registry.
    pub(crate) fn dismantle(self) {
        let owner = self.owner.upgrade();
        for (_, entry) in self.entries {
            entry.release(owner.as_ref());
        }
        if let (Some(owner), Some(id)) = (owner.as_ref(), self.owner_teardown) {
            if owner.is_active(id) {
                owner.unsubscribe(id);
            }
        }
    }
}
