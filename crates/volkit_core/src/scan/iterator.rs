//! Streaming needle iterator.
//!
//! Reads needles one by one through a bounded read buffer, so scanning a
//! multi-gigabyte volume keeps memory proportional to the largest needle.

use crate::error::{CoreError, CoreResult};
use crate::needle::{tail_length_for, Needle};
use crate::super_block::Version;
use crate::types::NEEDLE_HEADER_SIZE;
use volkit_storage::StorageBackend;

/// Read buffer size for streaming iteration.
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// A needle produced by [`NeedleIterator`].
#[derive(Debug, Clone)]
pub struct ScannedNeedle {
    /// Byte offset of the needle header in the log.
    pub offset: u64,
    /// Decoded needle; only header fields are set when bodies are skipped.
    pub needle: Needle,
    /// Raw 16-byte header.
    pub header: Vec<u8>,
    /// Raw bytes after the header (body, checksum, timestamp, padding);
    /// empty when bodies are skipped.
    pub body: Vec<u8>,
    /// Total bytes the needle occupies in the log.
    pub disk_size: u64,
}

/// A streaming iterator over the needles of a data log.
///
/// # Error Handling
///
/// - End of file exactly at a needle boundary ends iteration
/// - A partial header or a body running past the end of the log is a
///   corruption error
/// - Checksum mismatches and malformed bodies are returned immediately
///
/// After an error the iterator is exhausted.
pub struct NeedleIterator<'a> {
    backend: &'a dyn StorageBackend,
    version: Version,
    read_bodies: bool,
    total_size: u64,
    /// Log offset of `buffer[buffer_pos]`.
    current_offset: u64,
    buffer: Vec<u8>,
    buffer_pos: usize,
    buffer_len: usize,
    finished: bool,
}

impl<'a> NeedleIterator<'a> {
    /// Creates an iterator starting at `start_offset`, which must be the
    /// first needle offset or the offset of a needle header.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend size cannot be determined.
    pub fn new(
        backend: &'a dyn StorageBackend,
        version: Version,
        start_offset: u64,
        read_bodies: bool,
    ) -> CoreResult<Self> {
        let total_size = backend.size()?;
        Ok(Self {
            backend,
            version,
            read_bodies,
            total_size,
            current_offset: start_offset,
            buffer: vec![0u8; READ_BUFFER_SIZE],
            buffer_pos: 0,
            buffer_len: 0,
            finished: false,
        })
    }

    /// Offset the next needle will be read from.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.current_offset
    }

    /// Ensures at least `min_bytes` are buffered from the current position.
    ///
    /// Returns `false` if the log ends first.
    fn ensure_buffered(&mut self, min_bytes: usize) -> CoreResult<bool> {
        let available = self.buffer_len - self.buffer_pos;
        if available >= min_bytes {
            return Ok(true);
        }

        let remaining_in_log = self.total_size.saturating_sub(self.current_offset);
        if remaining_in_log < min_bytes as u64 {
            return Ok(false);
        }

        if self.buffer_pos > 0 && available > 0 {
            self.buffer.copy_within(self.buffer_pos..self.buffer_len, 0);
        }
        self.buffer_len = available;
        self.buffer_pos = 0;

        if min_bytes > self.buffer.len() {
            self.buffer.resize(min_bytes.next_power_of_two(), 0);
        }

        let unbuffered = remaining_in_log - available as u64;
        let bytes_to_read = ((self.buffer.len() - self.buffer_len) as u64).min(unbuffered) as usize;
        if bytes_to_read > 0 {
            let read_offset = self.current_offset + self.buffer_len as u64;
            let data = self.backend.read_at(read_offset, bytes_to_read)?;
            self.buffer[self.buffer_len..self.buffer_len + data.len()].copy_from_slice(&data);
            self.buffer_len += data.len();
        }

        Ok(self.buffer_len - self.buffer_pos >= min_bytes)
    }

    /// Moves past `len` bytes, dropping the buffer if they are not all in it.
    fn advance(&mut self, len: u64) {
        let available = (self.buffer_len - self.buffer_pos) as u64;
        if len <= available {
            self.buffer_pos += len as usize;
        } else {
            self.buffer_pos = 0;
            self.buffer_len = 0;
        }
        self.current_offset += len;
    }

    fn read_next(&mut self) -> CoreResult<Option<ScannedNeedle>> {
        let offset = self.current_offset;
        if offset >= self.total_size {
            return Ok(None);
        }

        if !self.ensure_buffered(NEEDLE_HEADER_SIZE)? {
            return Err(CoreError::corrupted(
                offset,
                format!(
                    "partial needle header: {} bytes left in log",
                    self.total_size - offset
                ),
            ));
        }
        let header = self.buffer[self.buffer_pos..self.buffer_pos + NEEDLE_HEADER_SIZE].to_vec();
        let mut needle = Needle::parse_header(&header)?;

        let tail_len = tail_length_for(needle.size, self.version);
        let disk_size = NEEDLE_HEADER_SIZE as u64 + tail_len;
        if offset + disk_size > self.total_size {
            return Err(CoreError::corrupted(
                offset,
                format!(
                    "needle {} of {disk_size} bytes runs past end of log at {}",
                    needle.id, self.total_size
                ),
            ));
        }

        let body = if self.read_bodies {
            let tail_len = usize::try_from(tail_len)
                .map_err(|_| CoreError::corrupted(offset, "needle too large to buffer"))?;
            if !self.ensure_buffered(NEEDLE_HEADER_SIZE + tail_len)? {
                return Err(CoreError::corrupted(offset, "needle body is truncated"));
            }
            let start = self.buffer_pos + NEEDLE_HEADER_SIZE;
            let body = self.buffer[start..start + tail_len].to_vec();
            needle.read_body(&body, self.version, offset)?;
            body
        } else {
            Vec::new()
        };

        self.advance(disk_size);
        Ok(Some(ScannedNeedle {
            offset,
            needle,
            header,
            body,
            disk_size,
        }))
    }
}

impl Iterator for NeedleIterator<'_> {
    type Item = CoreResult<ScannedNeedle>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.read_next() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::super_block::SuperBlock;
    use crate::types::{Cookie, NeedleId};
    use volkit_storage::InMemoryBackend;

    fn log_with(needles: &mut [Needle]) -> (InMemoryBackend, u64) {
        let mut backend = InMemoryBackend::new();
        let sb = SuperBlock::default();
        backend.append(&sb.to_bytes().unwrap()).unwrap();
        for n in needles.iter_mut() {
            let buf = n.prepare_write_buffer(Version::V3).unwrap();
            backend.append(&buf).unwrap();
        }
        (backend, sb.block_size())
    }

    #[test]
    fn iterates_in_offset_order() {
        let mut needles: Vec<Needle> = (1..=5)
            .map(|i| Needle::new(NeedleId::new(i), Cookie::new(7), vec![i as u8; i as usize * 3]))
            .collect();
        let (backend, start) = log_with(&mut needles);

        let scanned: Vec<_> = NeedleIterator::new(&backend, Version::V3, start, true)
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(scanned.len(), 5);
        assert_eq!(scanned[0].offset, 8);
        for pair in scanned.windows(2) {
            assert_eq!(pair[0].offset + pair[0].disk_size, pair[1].offset);
            assert_eq!(pair[1].offset % 8, 0);
        }
        assert_eq!(scanned[4].needle.data, vec![5u8; 15]);
    }

    #[test]
    fn header_only_mode_skips_bodies() {
        let mut needles = vec![
            Needle::new(NeedleId::new(1), Cookie::new(1), b"one".to_vec()),
            Needle::new(NeedleId::new(2), Cookie::new(1), b"two".to_vec()),
        ];
        let (backend, start) = log_with(&mut needles);

        let scanned: Vec<_> = NeedleIterator::new(&backend, Version::V3, start, false)
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(scanned.len(), 2);
        assert!(scanned[1].needle.data.is_empty());
        assert!(scanned[1].body.is_empty());
        assert_eq!(scanned[1].needle.id, NeedleId::new(2));
    }

    #[test]
    fn needle_larger_than_buffer() {
        let mut needles = vec![
            Needle::new(NeedleId::new(1), Cookie::new(1), vec![0xAB; 200 * 1024]),
            Needle::new(NeedleId::new(2), Cookie::new(1), b"small".to_vec()),
        ];
        let (backend, start) = log_with(&mut needles);

        let scanned: Vec<_> = NeedleIterator::new(&backend, Version::V3, start, true)
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(scanned[0].needle.data.len(), 200 * 1024);
        assert_eq!(scanned[1].needle.data, b"small");
    }

    #[test]
    fn truncated_log_is_an_error() {
        let mut needles = vec![Needle::new(NeedleId::new(1), Cookie::new(1), b"abc".to_vec())];
        let (backend, start) = log_with(&mut needles);
        let mut data = backend.data();
        data.truncate(data.len() - 3);
        let backend = InMemoryBackend::with_data(data);

        let results: Vec<_> = NeedleIterator::new(&backend, Version::V3, start, true)
            .unwrap()
            .collect();
        assert_eq!(results.len(), 1);
        assert!(results[0].as_ref().unwrap_err().is_corruption());
    }

    #[test]
    fn partial_header_is_an_error() {
        let mut needles = vec![Needle::new(NeedleId::new(1), Cookie::new(1), b"abc".to_vec())];
        let (backend, start) = log_with(&mut needles);
        let mut data = backend.data();
        data.extend_from_slice(&[0u8; 5]);
        let backend = InMemoryBackend::with_data(data);

        let mut iter = NeedleIterator::new(&backend, Version::V3, start, true).unwrap();
        assert!(iter.next().unwrap().is_ok());
        assert!(iter.next().unwrap().is_err());
        assert!(iter.next().is_none());
    }
}
