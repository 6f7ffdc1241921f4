//! Volume super block.
//!
//! The super block is the fixed header at offset 0 of every data log. The
//! first needle starts right after it, at [`SuperBlock::block_size`].

use crate::error::{CoreError, CoreResult};
use crate::ttl::Ttl;
use std::fmt;
use std::str::FromStr;
use volkit_storage::StorageBackend;

/// Size of the fixed super block prefix.
pub const SUPER_BLOCK_SIZE: usize = 8;

/// Needle format version of a volume.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Version {
    /// Raw data bodies, no metadata.
    V1 = 1,
    /// Flagged metadata bodies.
    V2 = 2,
    /// Version 2 plus an append timestamp after the checksum.
    V3 = 3,
}

impl Version {
    /// The version written by new volumes.
    pub const CURRENT: Self = Self::V3;

    /// Decodes a version byte.
    ///
    /// # Errors
    ///
    /// Returns an error for versions this crate cannot read.
    pub fn from_byte(b: u8) -> CoreResult<Self> {
        match b {
            1 => Ok(Self::V1),
            2 => Ok(Self::V2),
            3 => Ok(Self::V3),
            other => Err(CoreError::invalid_format(format!(
                "unsupported volume version {other}"
            ))),
        }
    }

    /// Returns the version byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// Returns true if needles of this version carry an append timestamp.
    #[must_use]
    pub const fn has_append_timestamp(self) -> bool {
        matches!(self, Self::V3)
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::CURRENT
    }
}

/// Replica placement: copies in other data centers, other racks and on
/// other servers of the same rack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ReplicaPlacement {
    /// Copies in other data centers.
    pub diff_data_center: u8,
    /// Copies on other racks.
    pub diff_rack: u8,
    /// Copies on other servers in the same rack.
    pub same_rack: u8,
}

impl ReplicaPlacement {
    /// Decodes the packed `d*100 + r*10 + s` byte.
    #[must_use]
    pub const fn from_byte(b: u8) -> Self {
        Self {
            diff_data_center: b / 100,
            diff_rack: (b % 100) / 10,
            same_rack: b % 10,
        }
    }

    /// Encodes the packed byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self.diff_data_center * 100 + self.diff_rack * 10 + self.same_rack
    }

    /// Total number of copies, including the primary.
    #[must_use]
    pub const fn copy_count(self) -> u32 {
        self.diff_data_center as u32 + self.diff_rack as u32 + self.same_rack as u32 + 1
    }
}

impl FromStr for ReplicaPlacement {
    type Err = CoreError;

    /// Parses up to three digits such as `001` or `"1"` (left padded).
    fn from_str(s: &str) -> CoreResult<Self> {
        let s = s.trim();
        if s.len() > 3 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CoreError::invalid_format(format!(
                "invalid replica placement {s:?}"
            )));
        }
        let mut digits = [0u8; 3];
        for (slot, b) in digits[3 - s.len()..].iter_mut().zip(s.bytes()) {
            *slot = b - b'0';
        }
        if digits[0] > 2 {
            return Err(CoreError::invalid_format(format!(
                "invalid replica placement {s:?}"
            )));
        }
        Ok(Self {
            diff_data_center: digits[0],
            diff_rack: digits[1],
            same_rack: digits[2],
        })
    }
}

impl fmt::Display for ReplicaPlacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.diff_data_center, self.diff_rack, self.same_rack
        )
    }
}

/// The volume header.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SuperBlock {
    /// Needle format version.
    pub version: Version,
    /// Replica placement.
    pub replica_placement: ReplicaPlacement,
    /// Default TTL for the volume.
    pub ttl: Ttl,
    /// Bumped every time the volume is compacted.
    pub compaction_revision: u16,
    /// Opaque extra block, carried verbatim.
    pub extra: Vec<u8>,
}

impl SuperBlock {
    /// Creates a super block with no extra data.
    #[must_use]
    pub fn new(version: Version, replica_placement: ReplicaPlacement, ttl: Ttl) -> Self {
        Self {
            version,
            replica_placement,
            ttl,
            compaction_revision: 0,
            extra: Vec::new(),
        }
    }

    /// Size of the encoded block; the first needle starts here.
    #[must_use]
    pub fn block_size(&self) -> u64 {
        match self.version {
            Version::V1 => SUPER_BLOCK_SIZE as u64,
            Version::V2 | Version::V3 => (SUPER_BLOCK_SIZE + self.extra.len()) as u64,
        }
    }

    /// Encodes the block.
    ///
    /// # Errors
    ///
    /// Returns an error if the extra block does not fit its 16-bit length.
    pub fn to_bytes(&self) -> CoreResult<Vec<u8>> {
        let mut buf = Vec::with_capacity(SUPER_BLOCK_SIZE + self.extra.len());
        buf.push(self.version.as_byte());
        buf.push(self.replica_placement.as_byte());
        buf.extend_from_slice(&self.ttl.to_bytes());
        buf.extend_from_slice(&self.compaction_revision.to_be_bytes());
        if self.version == Version::V1 || self.extra.is_empty() {
            buf.extend_from_slice(&0u16.to_be_bytes());
        } else {
            let extra_size = u16::try_from(self.extra.len()).map_err(|_| {
                CoreError::invalid_format(format!(
                    "super block extra of {} bytes is too large",
                    self.extra.len()
                ))
            })?;
            buf.extend_from_slice(&extra_size.to_be_bytes());
            buf.extend_from_slice(&self.extra);
        }
        Ok(buf)
    }

    /// Decodes the fixed prefix, returning the block and the length of the
    /// extra data that follows it.
    ///
    /// # Errors
    ///
    /// Returns an error for a short buffer, unknown version or TTL unit.
    pub fn parse_header(bytes: &[u8]) -> CoreResult<(Self, usize)> {
        if bytes.len() < SUPER_BLOCK_SIZE {
            return Err(CoreError::corrupted(
                0,
                format!("super block needs {SUPER_BLOCK_SIZE} bytes, got {}", bytes.len()),
            ));
        }
        let version = Version::from_byte(bytes[0])?;
        let block = Self {
            version,
            replica_placement: ReplicaPlacement::from_byte(bytes[1]),
            ttl: Ttl::from_bytes([bytes[2], bytes[3]])?,
            compaction_revision: u16::from_be_bytes([bytes[4], bytes[5]]),
            extra: Vec::new(),
        };
        let extra_size = match version {
            Version::V1 => 0,
            Version::V2 | Version::V3 => usize::from(u16::from_be_bytes([bytes[6], bytes[7]])),
        };
        Ok((block, extra_size))
    }

    /// Decodes a complete block, extra data included.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer is malformed or truncated.
    pub fn parse(bytes: &[u8]) -> CoreResult<Self> {
        let (mut block, extra_size) = Self::parse_header(bytes)?;
        let end = SUPER_BLOCK_SIZE + extra_size;
        if bytes.len() < end {
            return Err(CoreError::corrupted(0, "super block extra data is truncated"));
        }
        block.extra = bytes[SUPER_BLOCK_SIZE..end].to_vec();
        Ok(block)
    }

    /// Reads the block from the start of a data log.
    ///
    /// # Errors
    ///
    /// Returns an error if the log is too short or the block is malformed.
    pub fn read_from(backend: &dyn StorageBackend) -> CoreResult<Self> {
        let len = backend.size()?;
        if len < SUPER_BLOCK_SIZE as u64 {
            return Err(CoreError::corrupted(
                0,
                format!("data log of {len} bytes has no super block"),
            ));
        }
        let header = backend.read_at(0, SUPER_BLOCK_SIZE)?;
        let (mut block, extra_size) = Self::parse_header(&header)?;
        if extra_size > 0 {
            if len < (SUPER_BLOCK_SIZE + extra_size) as u64 {
                return Err(CoreError::corrupted(0, "super block extra data is truncated"));
            }
            block.extra = backend.read_at(SUPER_BLOCK_SIZE as u64, extra_size)?;
        }
        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ttl::TtlUnit;
    use volkit_storage::InMemoryBackend;

    #[test]
    fn encode_layout() {
        let mut sb = SuperBlock::new(
            Version::V3,
            "012".parse().unwrap(),
            Ttl::new(3, TtlUnit::Day),
        );
        sb.compaction_revision = 0x0102;
        let bytes = sb.to_bytes().unwrap();
        assert_eq!(bytes, vec![3, 12, 3, 3, 0x01, 0x02, 0, 0]);
        assert_eq!(sb.block_size(), 8);
        assert_eq!(SuperBlock::parse(&bytes).unwrap(), sb);
    }

    #[test]
    fn extra_is_carried_verbatim() {
        let mut sb = SuperBlock::default();
        sb.extra = vec![0xde, 0xad, 0xbe, 0xef];
        let bytes = sb.to_bytes().unwrap();
        assert_eq!(&bytes[6..8], &[0, 4]);
        assert_eq!(sb.block_size(), 12);

        let backend = InMemoryBackend::with_data(bytes);
        let read = SuperBlock::read_from(&backend).unwrap();
        assert_eq!(read.extra, vec![0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn rejects_unknown_version() {
        assert!(SuperBlock::parse(&[9, 0, 0, 0, 0, 0, 0, 0]).is_err());
    }

    #[test]
    fn rejects_short_log() {
        let backend = InMemoryBackend::with_data(vec![3, 0, 0]);
        let err = SuperBlock::read_from(&backend).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn replica_placement_strings() {
        let rp: ReplicaPlacement = "1".parse().unwrap();
        assert_eq!(rp.same_rack, 1);
        assert_eq!(rp.to_string(), "001");
        assert_eq!(rp.copy_count(), 2);

        let rp: ReplicaPlacement = "210".parse().unwrap();
        assert_eq!(rp.as_byte(), 210);
        assert_eq!(ReplicaPlacement::from_byte(210), rp);

        assert!("3000".parse::<ReplicaPlacement>().is_err());
        assert!("a1".parse::<ReplicaPlacement>().is_err());
    }
}
