//! Needle liveness against an index.

use crate::index::NeedleMap;
use crate::types::NeedleId;

/// Whether a scanned needle is still the current copy of its id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// The index points at this needle and its size is live.
    Live,
    /// The index has an entry for the id, but it is a tombstone, has no
    /// content, or points at another offset.
    Stale,
    /// The index has no entry for the id.
    Missing,
}

impl Liveness {
    /// Returns true for [`Liveness::Live`].
    #[must_use]
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Live)
    }
}

/// Classifies the needle `id` found at byte `offset` of the log.
#[must_use]
pub fn check_liveness(index: &NeedleMap, id: NeedleId, offset: u64) -> Liveness {
    match index.get(id) {
        None => Liveness::Missing,
        Some(value) if value.size.is_live() && value.offset.to_actual() == offset => {
            Liveness::Live
        }
        Some(_) => Liveness::Stale,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Offset, Size};

    fn index() -> NeedleMap {
        let mut map = NeedleMap::new();
        map.set(NeedleId::new(1), Offset(1), Size::new(10));
        map.delete(NeedleId::new(2), Offset(4));
        map.set(NeedleId::new(3), Offset(6), Size::new(0));
        map
    }

    #[test]
    fn live_when_offset_matches() {
        assert_eq!(check_liveness(&index(), NeedleId::new(1), 8), Liveness::Live);
    }

    #[test]
    fn stale_when_superseded() {
        assert_eq!(check_liveness(&index(), NeedleId::new(1), 64), Liveness::Stale);
    }

    #[test]
    fn stale_when_tombstoned_or_empty() {
        assert_eq!(check_liveness(&index(), NeedleId::new(2), 32), Liveness::Stale);
        assert_eq!(check_liveness(&index(), NeedleId::new(3), 48), Liveness::Stale);
    }

    #[test]
    fn missing_when_absent() {
        assert_eq!(
            check_liveness(&index(), NeedleId::new(99), 8),
            Liveness::Missing
        );
    }
}
