//! Needle index: the id → (offset, size) map of a volume.
//!
//! The map is authoritative for liveness. A needle in the data log whose id
//! maps elsewhere, or to a tombstone, is dead.

mod needle_map;
mod persistence;

pub use needle_map::{NeedleMap, NeedleValue};
pub(crate) use persistence::sync_directory;
pub use persistence::{encode_idx, load_from_idx, parse_idx, save_to_idx, temp_path_for};
