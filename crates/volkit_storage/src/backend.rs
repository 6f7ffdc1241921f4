//! Storage backend trait definition.

use crate::error::StorageResult;

/// A low-level storage backend for volume data logs.
///
/// # Invariants
///
/// - `read_at` returns exactly the bytes previously written at that offset
/// - `size` is the logical end of the store: the offset an append lands on
/// - `write_at` past the current end extends the store; the log writers in
///   `volkit_core` only ever write at `size()`, which keeps logs append-only
/// - Backends must be `Send + Sync` so volumes can be processed on worker threads
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the read would extend beyond the current size
    /// or an I/O error occurs.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Writes `data` at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is read-only or an I/O error occurs.
    fn write_at(&mut self, data: &[u8], offset: u64) -> StorageResult<()>;

    /// Appends data at the logical end and returns the offset it was written at.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined or the write fails.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let offset = self.size()?;
        self.write_at(data, offset)?;
        Ok(offset)
    }

    /// Returns the current size of the storage in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Flushes buffered writes to the OS.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush operation fails.
    fn flush(&mut self) -> StorageResult<()>;

    /// Syncs all data and metadata to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync operation fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Truncates the storage to the given size.
    ///
    /// # Errors
    ///
    /// Returns an error if `new_size` is greater than the current size or the
    /// truncation fails.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;
}
