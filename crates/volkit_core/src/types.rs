//! Core type definitions for volume logs and their indexes.

use crate::error::{CoreError, CoreResult};
use std::fmt;

/// Size of a needle header on disk: cookie (4) + id (8) + size (4).
pub const NEEDLE_HEADER_SIZE: usize = 16;
/// Size of the needle checksum trailer.
pub const NEEDLE_CHECKSUM_SIZE: usize = 4;
/// Size of the append timestamp stored by version 3 needles.
pub const TIMESTAMP_SIZE: usize = 8;
/// Alignment unit of every needle in the log; index offsets are scaled by it.
pub const NEEDLE_PADDING_SIZE: u64 = 8;
/// Size of one `.idx` entry: id (8) + offset (4) + size (4).
pub const NEEDLE_MAP_ENTRY_SIZE: usize = 16;

/// Identifier of a needle, unique within a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct NeedleId(pub u64);

impl NeedleId {
    /// Creates a new needle ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NeedleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

/// Random value bound to a needle id at upload time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Cookie(pub u32);

impl Cookie {
    /// Creates a new cookie.
    #[must_use]
    pub const fn new(cookie: u32) -> Self {
        Self(cookie)
    }

    /// Returns the raw cookie value.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

/// Identifier of a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VolumeId(pub u32);

impl VolumeId {
    /// Creates a new volume ID.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Needle offset as stored in the index: the byte offset divided by
/// [`NEEDLE_PADDING_SIZE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Offset(pub u32);

impl Offset {
    /// Scales a byte offset into its stored form.
    ///
    /// # Errors
    ///
    /// Returns an error if the offset is not padding-aligned or does not fit
    /// the 32-bit stored form.
    pub fn from_actual(actual: u64) -> CoreResult<Self> {
        if actual % NEEDLE_PADDING_SIZE != 0 {
            return Err(CoreError::invalid_format(format!(
                "offset {actual} is not aligned to {NEEDLE_PADDING_SIZE} bytes"
            )));
        }
        let scaled = actual / NEEDLE_PADDING_SIZE;
        u32::try_from(scaled)
            .map(Self)
            .map_err(|_| CoreError::invalid_format(format!("offset {actual} exceeds volume limit")))
    }

    /// Expands the stored form back into a byte offset.
    #[must_use]
    pub const fn to_actual(self) -> u64 {
        self.0 as u64 * NEEDLE_PADDING_SIZE
    }

    /// Returns true for the zero offset, which never addresses a needle
    /// because the super block occupies the start of the log.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

/// Needle body size as stored in the index.
///
/// [`Size::TOMBSTONE`] marks an id as logically deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Size(pub i32);

impl Size {
    /// Sentinel for deleted ids (`0xFFFFFFFF` on disk).
    pub const TOMBSTONE: Self = Self(-1);

    /// Creates a size from a body length.
    #[must_use]
    pub const fn new(size: i32) -> Self {
        Self(size)
    }

    /// Returns true for the tombstone sentinel.
    #[must_use]
    pub const fn is_tombstone(self) -> bool {
        self.0 == Self::TOMBSTONE.0
    }

    /// Returns true when the size addresses real needle content.
    #[must_use]
    pub const fn is_live(self) -> bool {
        self.0 > 0
    }

    /// Returns the on-disk representation.
    #[must_use]
    pub const fn to_disk(self) -> u32 {
        self.0 as u32
    }

    /// Reads the on-disk representation.
    #[must_use]
    pub const fn from_disk(raw: u32) -> Self {
        Self(raw as i32)
    }
}

/// Formats a file id the way clients see it: hex of `id || cookie` with
/// leading zero bytes stripped.
#[must_use]
pub fn format_file_id(id: NeedleId, cookie: Cookie) -> String {
    let mut bytes = [0u8; 12];
    bytes[..8].copy_from_slice(&id.as_u64().to_be_bytes());
    bytes[8..].copy_from_slice(&cookie.as_u32().to_be_bytes());
    let first = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len() - 1);
    bytes[first..].iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_scaling() {
        let offset = Offset::from_actual(4096).unwrap();
        assert_eq!(offset.0, 512);
        assert_eq!(offset.to_actual(), 4096);
    }

    #[test]
    fn offset_rejects_unaligned() {
        assert!(Offset::from_actual(13).is_err());
    }

    #[test]
    fn offset_rejects_overflow() {
        assert!(Offset::from_actual((u64::from(u32::MAX) + 1) * 8).is_err());
    }

    #[test]
    fn size_tombstone_on_disk() {
        assert_eq!(Size::TOMBSTONE.to_disk(), 0xFFFF_FFFF);
        assert!(Size::from_disk(0xFFFF_FFFF).is_tombstone());
        assert!(!Size::TOMBSTONE.is_live());
        assert!(!Size::new(0).is_live());
        assert!(Size::new(42).is_live());
    }

    #[test]
    fn file_id_strips_leading_zero_bytes() {
        let fid = format_file_id(NeedleId::new(0x01637037), Cookie::new(0xd6a5_0c11));
        assert_eq!(fid, "01637037d6a50c11");
    }

    #[test]
    fn file_id_all_zero() {
        assert_eq!(format_file_id(NeedleId::new(0), Cookie::new(0)), "00");
    }
}
