//! Needles: the records of a volume data log.
//!
//! Each needle is a 16-byte header (cookie, id, size), a version-dependent
//! body, a CRC-32C checksum, an append timestamp for version 3 volumes, and
//! padding up to the next 8-byte boundary.

mod flags;
mod record;

pub use flags::NeedleFlags;
pub use record::{
    disk_size, padding_length, tail_length, tail_length_for, Needle, MAX_NAME_LEN, MAX_PAIRS_LEN,
};
