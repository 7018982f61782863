//! Slot-addressed registry of open connections.
//!
//! The registry is an arena of optional entries plus a queue of free slot
//! indices.  Inserting reuses the oldest freed slot before growing the
//! sequence, and removing only clears the slot, so:
//!
//! - insert and remove are O(1) (amortised for the occasional `Vec` growth);
//! - an occupied slot's index never changes while it is occupied;
//! - memory is bounded by the peak number of simultaneously open connections,
//!   not by the total number ever opened.
//!
//! ```text
//! slots: [ A ][ -- ][ C ][ -- ]      free: [1, 3]      live: 2
//! insert(D) ─► slots[1] = D          free: [3]         live: 3
//! remove(2) ─► slots[2] = --         free: [3, 2]      live: 2
//! ```
//!
//! # Invariants
//!
//! - An index is either in the free queue (slot empty) or its slot holds
//!   exactly one entry, never both.
//! - The live count equals the number of occupied slots.  It is maintained
//!   incrementally, never recomputed by scanning.
//!
//! The registry is not synchronised.  It is owned by the
//! [`Server`](crate::Server), which mutates it from a single task.  Other
//! tasks can still read the live count through a [`LiveCount`] handle.

use std::collections::VecDeque;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use crate::protocol::connection::ConnectionId;

/// A read-only, cloneable view of a registry's live-connection count.
///
/// Cloning is cheap (one `Arc` increment).  The value can be read from any
/// thread while the owning registry keeps mutating it.
#[derive(Debug, Clone, Default)]
pub struct LiveCount(Arc<AtomicUsize>);

impl LiveCount {
    /// Returns the number of occupied slots at the time of the call.
    pub fn get(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    fn increment(&self) {
        self.0.fetch_add(1, Ordering::AcqRel);
    }

    fn decrement(&self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// One occupied slot: the handle plus the identity it was registered under.
#[derive(Debug)]
struct Entry<H> {
    id: ConnectionId,
    handle: H,
}

/// Slot table of live connection handles with a free-index queue.
#[derive(Debug)]
pub struct ConnectionRegistry<H> {
    slots: Vec<Option<Entry<H>>>,
    free: VecDeque<usize>,
    live: LiveCount,
}

impl<H> ConnectionRegistry<H> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: VecDeque::new(),
            live: LiveCount::default(),
        }
    }

    /// Places `handle` in a free slot (or a new one) and returns its index.
    pub fn insert(&mut self, id: ConnectionId, handle: H) -> usize {
        let entry = Some(Entry { id, handle });
        let index = if let Some(index) = self.free.pop_front() {
            self.slots[index] = entry;
            index
        } else {
            let index = self.slots.len();
            self.slots.push(entry);
            index
        };
        self.live.increment();
        index
    }

    /// Clears slot `index` if it currently holds the connection `id`.
    ///
    /// Returns the removed handle.  Removing an empty slot, an out-of-range
    /// index, or a slot now owned by a different connection is a no-op that
    /// returns `None`; duplicate or late terminal notifications therefore
    /// never corrupt the free queue or drive the count below zero.
    pub fn remove(&mut self, index: usize, id: ConnectionId) -> Option<H> {
        let slot = self.slots.get_mut(index)?;
        match slot.as_ref() {
            Some(entry) if entry.id == id => {}
            _ => return None,
        }

        let entry = slot.take()?;
        self.free.push_back(index);
        self.live.decrement();
        Some(entry.handle)
    }

    /// Returns the handle stored at `index`, if the slot is occupied.
    pub fn get(&self, index: usize) -> Option<&H> {
        self.slots
            .get(index)
            .and_then(|slot| slot.as_ref())
            .map(|entry| &entry.handle)
    }

    /// Number of occupied slots.
    pub fn count(&self) -> usize {
        self.live.get()
    }

    /// Returns `true` when no slot is occupied.
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// A shareable view of the live count.
    pub fn live_count(&self) -> LiveCount {
        self.live.clone()
    }

    /// Length of the underlying slot sequence, occupied or not.
    pub fn slot_len(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots waiting to be reused.
    pub fn free_len(&self) -> usize {
        self.free.len()
    }

    /// Iterates over occupied slots in index order, skipping freed ones.
    pub fn iter(&self) -> impl Iterator<Item = &H> {
        self.slots
            .iter()
            .filter_map(|slot| slot.as_ref().map(|entry| &entry.handle))
    }

    /// Like [`iter`](Self::iter) but also yields each slot index and id.
    pub fn iter_indexed(&self) -> impl Iterator<Item = (usize, ConnectionId, &H)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.as_ref()
                .map(|entry| (index, entry.id, &entry.handle))
        })
    }
}

impl<H> Default for ConnectionRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
