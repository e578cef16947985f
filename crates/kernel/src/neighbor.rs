//! Neighbor caches: cells previously entered after leaving a cell through a
//! given surface.
//!
//! Each list is a fixed array of atomic slots filled front to back with
//! "insert if absent" semantics. Duplicates are no-ops and a full list drops
//! new entries, so the contents are deterministic for a single thread and
//! never corrupt under concurrent insertion. A stale or missing entry only
//! costs a full universe search.

use std::sync::atomic::{AtomicU32, Ordering};

use cellspace_common::{CellIndex, SurfaceHandle};

const EMPTY: u32 = u32::MAX;

/// Bounded, append-only set of cell indices.
#[derive(Debug)]
pub struct NeighborList {
    slots: Box<[AtomicU32]>,
}

impl NeighborList {
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "neighbor list capacity must be positive");
        let slots = (0..capacity).map(|_| AtomicU32::new(EMPTY)).collect();
        Self { slots }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Record `cell`. Returns `true` if it is present afterwards.
    pub fn insert(&self, cell: CellIndex) -> bool {
        for slot in self.slots.iter() {
            match slot.compare_exchange(EMPTY, cell.0, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return true,
                Err(current) if current == cell.0 => return true,
                Err(_) => {}
            }
        }
        false
    }

    /// Iterate recorded cells in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = CellIndex> + '_ {
        self.slots
            .iter()
            .map(|slot| slot.load(Ordering::Acquire))
            .take_while(|v| *v != EMPTY)
            .map(CellIndex)
    }

    pub fn contains(&self, cell: CellIndex) -> bool {
        self.iter().any(|c| c == cell)
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots[0].load(Ordering::Acquire) == EMPTY
    }
}

impl Clone for NeighborList {
    fn clone(&self) -> Self {
        let slots = self
            .slots
            .iter()
            .map(|slot| AtomicU32::new(slot.load(Ordering::Acquire)))
            .collect();
        Self { slots }
    }
}

/// A cell's neighbor lists, one per exit half-space plus a fallback list for
/// exits that are not region tokens (e.g. mesh cells).
///
/// The key set is fixed at construction; only the lists' contents change.
#[derive(Debug, Clone)]
pub struct NeighborTable {
    keys: Vec<SurfaceHandle>,
    lists: Vec<NeighborList>,
    fallback: NeighborList,
}

// Neighbor tables are shared by every tracking thread.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<NeighborTable>();
};

impl NeighborTable {
    pub fn new(exits: impl IntoIterator<Item = SurfaceHandle>, capacity: usize) -> Self {
        let mut keys: Vec<SurfaceHandle> = exits.into_iter().collect();
        keys.sort_unstable();
        keys.dedup();
        let lists = keys.iter().map(|_| NeighborList::new(capacity)).collect();
        Self {
            keys,
            lists,
            fallback: NeighborList::new(capacity),
        }
    }

    /// List for a given exit half-space.
    pub fn list(&self, exit: Option<SurfaceHandle>) -> &NeighborList {
        exit.and_then(|h| self.keys.binary_search(&h).ok())
            .map_or(&self.fallback, |i| &self.lists[i])
    }

    /// Record that leaving through `exit` led into `entered`.
    pub fn record(&self, exit: Option<SurfaceHandle>, entered: CellIndex) -> bool {
        self.list(exit).insert(entered)
    }

    /// Candidate cells for a crossing through `exit`.
    pub fn candidates(&self, exit: Option<SurfaceHandle>) -> impl Iterator<Item = CellIndex> + '_ {
        self.list(exit).iter()
    }

    /// Exit half-spaces with their own list.
    pub fn keys(&self) -> &[SurfaceHandle] {
        &self.keys
    }
}
