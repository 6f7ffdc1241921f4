//! In-memory needle map.

use crate::types::{NeedleId, Offset, Size};
use std::collections::BTreeMap;

/// Location of a needle in its data log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeedleValue {
    /// Scaled offset of the needle.
    pub offset: Offset,
    /// Body size, or [`Size::TOMBSTONE`].
    pub size: Size,
}

impl NeedleValue {
    /// Returns true if this entry marks the id as deleted.
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.size.is_tombstone()
    }
}

/// Maps needle ids to their latest location.
///
/// Only the most recent entry for an id is kept. Deleted ids stay in the
/// map as tombstones so a saved index records the deletion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NeedleMap {
    entries: BTreeMap<NeedleId, NeedleValue>,
}

impl NeedleMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up the entry for `id`.
    #[must_use]
    pub fn get(&self, id: NeedleId) -> Option<NeedleValue> {
        self.entries.get(&id).copied()
    }

    /// Records `id` at `offset` with `size`, returning the previous entry.
    pub fn set(&mut self, id: NeedleId, offset: Offset, size: Size) -> Option<NeedleValue> {
        self.entries.insert(id, NeedleValue { offset, size })
    }

    /// Marks `id` as deleted, returning the previous entry.
    pub fn delete(&mut self, id: NeedleId, offset: Offset) -> Option<NeedleValue> {
        self.set(id, offset, Size::TOMBSTONE)
    }

    /// Number of entries, tombstones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the map has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries that address live content.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.entries.values().filter(|v| v.size.is_live()).count()
    }

    /// Iterates entries in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (NeedleId, NeedleValue)> + '_ {
        self.entries.iter().map(|(id, value)| (*id, *value))
    }
}
