//! Needle encoding and decoding.

use super::flags::NeedleFlags;
use crate::crc;
use crate::error::{CoreError, CoreResult};
use crate::super_block::Version;
use crate::ttl::Ttl;
use crate::types::{
    Cookie, NeedleId, Size, NEEDLE_CHECKSUM_SIZE, NEEDLE_HEADER_SIZE, NEEDLE_PADDING_SIZE,
    TIMESTAMP_SIZE,
};

/// Largest name or mime field a body can carry.
pub const MAX_NAME_LEN: usize = u8::MAX as usize;
/// Largest pairs field a body can carry.
pub const MAX_PAIRS_LEN: usize = u16::MAX as usize;

const LAST_MODIFIED_SIZE: usize = 5;
const LAST_MODIFIED_MAX: u64 = (1 << 40) - 1;
const TTL_SIZE: usize = 2;

/// A stored object and its metadata.
///
/// Optional fields are only meaningful when their flag is set; the `set_*`
/// helpers keep the two in step.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Needle {
    /// Random value bound to the id.
    pub cookie: Cookie,
    /// Needle id.
    pub id: NeedleId,
    /// Body length, as last read or written.
    pub size: Size,
    /// Payload bytes.
    pub data: Vec<u8>,
    /// Flag byte.
    pub flags: NeedleFlags,
    /// Original file name.
    pub name: Vec<u8>,
    /// Mime type.
    pub mime: Vec<u8>,
    /// Opaque key/value pairs.
    pub pairs: Vec<u8>,
    /// Last-modified time in unix seconds.
    pub last_modified: u64,
    /// Needle TTL.
    pub ttl: Ttl,
    /// CRC-32C of `data`, as last read or written.
    pub checksum: u32,
    /// Wall-clock nanoseconds at which the needle was appended.
    pub append_at_ns: u64,
}

impl Needle {
    /// Creates a needle holding `data`.
    #[must_use]
    pub fn new(id: NeedleId, cookie: Cookie, data: Vec<u8>) -> Self {
        let checksum = crc::crc32c(&data);
        Self {
            cookie,
            id,
            data,
            checksum,
            ..Self::default()
        }
    }

    /// Returns true if the data is gzip compressed.
    #[must_use]
    pub fn is_gzipped(&self) -> bool {
        self.flags.contains(NeedleFlags::GZIP)
    }

    /// Returns true if the data is a chunk manifest.
    #[must_use]
    pub fn is_chunk_manifest(&self) -> bool {
        self.flags.contains(NeedleFlags::CHUNK_MANIFEST)
    }

    /// Returns true if a name is present.
    #[must_use]
    pub fn has_name(&self) -> bool {
        self.flags.contains(NeedleFlags::NAME)
    }

    /// Returns true if a mime type is present.
    #[must_use]
    pub fn has_mime(&self) -> bool {
        self.flags.contains(NeedleFlags::MIME)
    }

    /// Returns true if a last-modified time is present.
    #[must_use]
    pub fn has_last_modified(&self) -> bool {
        self.flags.contains(NeedleFlags::LAST_MODIFIED)
    }

    /// Returns true if a TTL is present.
    #[must_use]
    pub fn has_ttl(&self) -> bool {
        self.flags.contains(NeedleFlags::TTL)
    }

    /// Returns true if pairs are present.
    #[must_use]
    pub fn has_pairs(&self) -> bool {
        self.flags.contains(NeedleFlags::PAIRS)
    }

    /// Replaces the data and recomputes the checksum.
    pub fn set_data(&mut self, data: Vec<u8>) {
        self.checksum = crc::crc32c(&data);
        self.data = data;
    }

    /// Sets the name; names outside 1..=255 bytes are dropped.
    pub fn set_name(&mut self, name: Vec<u8>) {
        let keep = (1..=MAX_NAME_LEN).contains(&name.len());
        self.flags.set(NeedleFlags::NAME, keep);
        self.name = if keep { name } else { Vec::new() };
    }

    /// Sets the mime type; values outside 1..=255 bytes are dropped.
    pub fn set_mime(&mut self, mime: Vec<u8>) {
        let keep = (1..=MAX_NAME_LEN).contains(&mime.len());
        self.flags.set(NeedleFlags::MIME, keep);
        self.mime = if keep { mime } else { Vec::new() };
    }

    /// Sets the pairs; values outside 1..=65535 bytes are dropped.
    pub fn set_pairs(&mut self, pairs: Vec<u8>) {
        let keep = (1..=MAX_PAIRS_LEN).contains(&pairs.len());
        self.flags.set(NeedleFlags::PAIRS, keep);
        self.pairs = if keep { pairs } else { Vec::new() };
    }

    /// Sets the last-modified time in unix seconds.
    pub fn set_last_modified(&mut self, secs: u64) {
        self.last_modified = secs.min(LAST_MODIFIED_MAX);
        self.flags.set(NeedleFlags::LAST_MODIFIED, true);
    }

    /// Clears the last-modified time.
    pub fn clear_last_modified(&mut self) {
        self.last_modified = 0;
        self.flags.set(NeedleFlags::LAST_MODIFIED, false);
    }

    /// Sets the TTL; an empty TTL clears the flag.
    pub fn set_ttl(&mut self, ttl: Ttl) {
        self.ttl = ttl;
        self.flags.set(NeedleFlags::TTL, !ttl.is_empty());
    }

    /// Length of the body this needle encodes to.
    #[must_use]
    pub fn body_size(&self, version: Version) -> usize {
        if version == Version::V1 {
            return self.data.len();
        }
        if self.data.is_empty() {
            return 0;
        }
        let mut size = 4 + self.data.len() + 1;
        if self.has_name() {
            size += 1 + self.name.len();
        }
        if self.has_mime() {
            size += 1 + self.mime.len();
        }
        if self.has_last_modified() {
            size += LAST_MODIFIED_SIZE;
        }
        if self.has_ttl() {
            size += TTL_SIZE;
        }
        if self.has_pairs() {
            size += 2 + self.pairs.len();
        }
        size
    }

    /// Total bytes this needle occupies in a log of `version`.
    #[must_use]
    pub fn disk_size(&self, version: Version) -> u64 {
        disk_size(self.body_size(version) as u64, version)
    }

    /// Serializes the needle for appending to a log of `version`.
    ///
    /// Updates `size` and `checksum` to match the returned bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if a field overflows its on-disk length prefix.
    pub fn prepare_write_buffer(&mut self, version: Version) -> CoreResult<Vec<u8>> {
        if self.has_name() && self.name.len() > MAX_NAME_LEN {
            return Err(CoreError::invalid_format(format!(
                "needle {} name of {} bytes is too long",
                self.id,
                self.name.len()
            )));
        }
        if self.has_mime() && self.mime.len() > MAX_NAME_LEN {
            return Err(CoreError::invalid_format(format!(
                "needle {} mime of {} bytes is too long",
                self.id,
                self.mime.len()
            )));
        }
        if self.has_pairs() && self.pairs.len() > MAX_PAIRS_LEN {
            return Err(CoreError::invalid_format(format!(
                "needle {} pairs of {} bytes are too long",
                self.id,
                self.pairs.len()
            )));
        }

        let body_size = self.body_size(version);
        let size = i32::try_from(body_size)
            .map_err(|_| CoreError::invalid_format(format!("needle {} is too large", self.id)))?;
        self.size = Size::new(size);
        self.checksum = crc::crc32c(&self.data);

        let total = disk_size(body_size as u64, version) as usize;
        let mut buf = Vec::with_capacity(total);
        buf.extend_from_slice(&self.cookie.as_u32().to_be_bytes());
        buf.extend_from_slice(&self.id.as_u64().to_be_bytes());
        buf.extend_from_slice(&self.size.to_disk().to_be_bytes());

        if version == Version::V1 {
            buf.extend_from_slice(&self.data);
        } else if body_size > 0 {
            let data_size = u32::try_from(self.data.len())
                .map_err(|_| CoreError::invalid_format(format!("needle {} is too large", self.id)))?;
            buf.extend_from_slice(&data_size.to_be_bytes());
            buf.extend_from_slice(&self.data);
            buf.push(self.flags.as_byte());
            if self.has_name() {
                buf.push(self.name.len() as u8);
                buf.extend_from_slice(&self.name);
            }
            if self.has_mime() {
                buf.push(self.mime.len() as u8);
                buf.extend_from_slice(&self.mime);
            }
            if self.has_last_modified() {
                buf.extend_from_slice(&self.last_modified.to_be_bytes()[8 - LAST_MODIFIED_SIZE..]);
            }
            if self.has_ttl() {
                buf.extend_from_slice(&self.ttl.to_bytes());
            }
            if self.has_pairs() {
                buf.extend_from_slice(&(self.pairs.len() as u16).to_be_bytes());
                buf.extend_from_slice(&self.pairs);
            }
        }

        buf.extend_from_slice(&self.checksum.to_be_bytes());
        if version.has_append_timestamp() {
            buf.extend_from_slice(&self.append_at_ns.to_be_bytes());
        }
        buf.resize(total, 0);
        Ok(buf)
    }

    /// Decodes the 16-byte header, leaving the body empty.
    ///
    /// # Errors
    ///
    /// Returns an error if fewer than 16 bytes are supplied.
    pub fn parse_header(bytes: &[u8]) -> CoreResult<Self> {
        if bytes.len() < NEEDLE_HEADER_SIZE {
            return Err(CoreError::invalid_format(format!(
                "needle header needs {NEEDLE_HEADER_SIZE} bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self {
            cookie: Cookie::new(read_u32(&bytes[0..4])),
            id: NeedleId::new(read_u64(&bytes[4..12])),
            size: Size::from_disk(read_u32(&bytes[12..16])),
            ..Self::default()
        })
    }

    /// Decodes the bytes following the header: body, checksum, append
    /// timestamp and padding, as produced by [`tail_length`].
    ///
    /// `offset` is only used to locate errors.
    ///
    /// # Errors
    ///
    /// Returns a corruption error if the body is malformed or the checksum
    /// does not match.
    pub fn read_body(&mut self, bytes: &[u8], version: Version, offset: u64) -> CoreResult<()> {
        let body_len = stored_body_len(self.size);
        let needed = body_len + NEEDLE_CHECKSUM_SIZE + timestamp_len(version);
        if bytes.len() < needed {
            return Err(CoreError::corrupted(
                offset,
                format!("needle {} body is truncated", self.id),
            ));
        }

        let body = &bytes[..body_len];
        if version == Version::V1 {
            self.data = body.to_vec();
        } else if body_len > 0 {
            self.parse_body_v2(body, offset)?;
        }

        let stored = read_u32(&bytes[body_len..body_len + NEEDLE_CHECKSUM_SIZE]);
        if !crc::matches(stored, &self.data) {
            return Err(CoreError::ChecksumMismatch {
                expected: stored,
                actual: crc::crc32c(&self.data),
            });
        }
        self.checksum = stored;

        if version.has_append_timestamp() {
            let at = body_len + NEEDLE_CHECKSUM_SIZE;
            self.append_at_ns = read_u64(&bytes[at..at + TIMESTAMP_SIZE]);
        }
        Ok(())
    }

    /// Decodes a complete needle from its on-disk bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are malformed.
    pub fn decode(bytes: &[u8], version: Version, offset: u64) -> CoreResult<Self> {
        let mut needle = Self::parse_header(bytes)?;
        needle.read_body(&bytes[NEEDLE_HEADER_SIZE..], version, offset)?;
        Ok(needle)
    }

    fn parse_body_v2(&mut self, body: &[u8], offset: u64) -> CoreResult<()> {
        let mut cursor = BodyCursor {
            bytes: body,
            pos: 0,
            offset,
        };
        let data_size = cursor.u32()? as usize;
        self.data = cursor.take(data_size)?.to_vec();
        if cursor.remaining() == 0 {
            return Ok(());
        }
        self.flags = NeedleFlags::from_byte(cursor.take(1)?[0]);
        if self.has_name() {
            let len = usize::from(cursor.take(1)?[0]);
            self.name = cursor.take(len)?.to_vec();
        }
        if self.has_mime() {
            let len = usize::from(cursor.take(1)?[0]);
            self.mime = cursor.take(len)?.to_vec();
        }
        if self.has_last_modified() {
            let raw = cursor.take(LAST_MODIFIED_SIZE)?;
            self.last_modified = raw.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b));
        }
        if self.has_ttl() {
            let raw = cursor.take(TTL_SIZE)?;
            self.ttl = Ttl::from_bytes([raw[0], raw[1]])
                .map_err(|e| CoreError::corrupted(offset, e.to_string()))?;
        }
        if self.has_pairs() {
            let raw = cursor.take(2)?;
            let len = usize::from(u16::from_be_bytes([raw[0], raw[1]]));
            self.pairs = cursor.take(len)?.to_vec();
        }
        Ok(())
    }
}

struct BodyCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
    offset: u64,
}

impl<'a> BodyCursor<'a> {
    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, len: usize) -> CoreResult<&'a [u8]> {
        if self.remaining() < len {
            return Err(CoreError::corrupted(
                self.offset,
                format!(
                    "needle body field of {len} bytes overruns body at {}",
                    self.pos
                ),
            ));
        }
        let out = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    fn u32(&mut self) -> CoreResult<u32> {
        self.take(4).map(read_u32)
    }
}

fn read_u32(b: &[u8]) -> u32 {
    u32::from_be_bytes([b[0], b[1], b[2], b[3]])
}

fn read_u64(b: &[u8]) -> u64 {
    u64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
}

fn timestamp_len(version: Version) -> usize {
    if version.has_append_timestamp() {
        TIMESTAMP_SIZE
    } else {
        0
    }
}

/// Body bytes actually stored for a header size; tombstone sizes have none.
fn stored_body_len(size: Size) -> usize {
    if size.is_live() {
        size.0 as usize
    } else {
        0
    }
}

/// Padding after a needle with a body of `body_size` bytes: always 1..=8.
#[must_use]
pub fn padding_length(body_size: u64, version: Version) -> u64 {
    let unpadded = NEEDLE_HEADER_SIZE as u64
        + body_size
        + NEEDLE_CHECKSUM_SIZE as u64
        + timestamp_len(version) as u64;
    NEEDLE_PADDING_SIZE - (unpadded % NEEDLE_PADDING_SIZE)
}

/// Total on-disk size of a needle with a body of `body_size` bytes.
#[must_use]
pub fn disk_size(body_size: u64, version: Version) -> u64 {
    NEEDLE_HEADER_SIZE as u64 + tail_length(body_size, version)
}

/// Bytes following the header of a needle with a body of `body_size`
/// bytes: body, checksum, timestamp and padding.
#[must_use]
pub fn tail_length(body_size: u64, version: Version) -> u64 {
    body_size
        + NEEDLE_CHECKSUM_SIZE as u64
        + timestamp_len(version) as u64
        + padding_length(body_size, version)
}

/// Like [`tail_length`], for the size field of a parsed header.
#[must_use]
pub fn tail_length_for(size: Size, version: Version) -> u64 {
    tail_length(stored_body_len(size) as u64, version)
}
