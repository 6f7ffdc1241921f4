//! Destination log writer and index builder.
//!
//! A [`VolumeWriter`] owns a freshly created data log and the index that
//! mirrors it. Every failure is tagged with the [`WriteStage`] it happened
//! in. Until [`VolumeWriter::finish`] succeeds the writer's files are
//! removed on abort or drop, so a failed pass leaves no destination behind.

use crate::error::{CoreError, CoreResult, WriteStage};
use crate::files::VolumeFiles;
use crate::index::{save_to_idx, temp_path_for, NeedleMap};
use crate::needle::Needle;
use crate::super_block::{SuperBlock, Version};
use crate::types::{Offset, Size, NEEDLE_PADDING_SIZE};
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, error, warn};
use volkit_storage::{FileBackend, StorageBackend, StorageError};

/// Opens the backend for a new destination data log.
pub type DestinationOpener = dyn Fn(&Path) -> CoreResult<Box<dyn StorageBackend>> + Send + Sync;

/// Creates the data log exclusively on the local filesystem.
///
/// # Errors
///
/// Returns an error if the file already exists or cannot be created.
pub fn create_exclusive(path: &Path) -> CoreResult<Box<dyn StorageBackend>> {
    Ok(Box::new(FileBackend::create_new(path)?))
}

/// What a finished writer produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteSummary {
    /// Needles appended.
    pub needles_written: u64,
    /// Bytes appended after the super block.
    pub bytes_written: u64,
    /// Final data log size.
    pub data_size: u64,
    /// The persisted index.
    pub index: NeedleMap,
}

/// Writes needles to a new destination volume.
pub struct VolumeWriter {
    files: VolumeFiles,
    backend: Option<Box<dyn StorageBackend>>,
    version: Version,
    index: NeedleMap,
    needles_written: u64,
    bytes_written: u64,
    done: bool,
}

impl VolumeWriter {
    /// Creates the destination files and writes `super_block`.
    ///
    /// # Errors
    ///
    /// Fails at [`WriteStage::CreateDestination`] if the data log or index
    /// already exists; existing files are never touched.
    pub fn create(files: VolumeFiles, super_block: &SuperBlock) -> CoreResult<Self> {
        Self::create_with(files, super_block, &create_exclusive)
    }

    /// Like [`create`](Self::create) with a custom backend opener.
    ///
    /// # Errors
    ///
    /// See [`create`](Self::create).
    pub fn create_with(
        files: VolumeFiles,
        super_block: &SuperBlock,
        opener: &DestinationOpener,
    ) -> CoreResult<Self> {
        let idx_path = files.idx_path();
        if idx_path.exists() {
            let e = CoreError::from(StorageError::AlreadyExists(idx_path));
            error!(vid = %files.vid(), stage = %WriteStage::CreateDestination, error = %e, "destination write failed");
            return Err(CoreError::at_stage(WriteStage::CreateDestination, e));
        }
        let backend = opener(&files.dat_path()).map_err(|e| {
            error!(vid = %files.vid(), stage = %WriteStage::CreateDestination, error = %e, "destination write failed");
            CoreError::at_stage(WriteStage::CreateDestination, e)
        })?;

        let mut writer = Self {
            files,
            backend: Some(backend),
            version: super_block.version,
            index: NeedleMap::new(),
            needles_written: 0,
            bytes_written: 0,
            done: false,
        };
        let header = super_block
            .to_bytes()
            .map_err(|e| writer.stage_error(WriteStage::PrepareBuffer, e))?;
        writer
            .backend_mut()?
            .write_at(&header, 0)
            .map_err(|e| writer.stage_error(WriteStage::WriteBytes, e))?;
        debug!(vid = %writer.files.vid(), path = %writer.files.dat_path().display(), "created destination volume");
        Ok(writer)
    }

    /// Files being written.
    #[must_use]
    pub fn files(&self) -> &VolumeFiles {
        &self.files
    }

    /// Needle format of the destination.
    #[must_use]
    pub fn version(&self) -> Version {
        self.version
    }

    /// Needles appended so far.
    #[must_use]
    pub fn needles_written(&self) -> u64 {
        self.needles_written
    }

    /// Bytes appended so far, super block excluded.
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Appends `needle` and indexes it, returning its byte offset and the
    /// size recorded in the index.
    ///
    /// Needles with no content are indexed as tombstones.
    ///
    /// # Errors
    ///
    /// Returns a stage error; the writer should then be aborted.
    pub fn append(&mut self, needle: &mut Needle) -> CoreResult<(u64, Size)> {
        let buf = needle
            .prepare_write_buffer(self.version)
            .map_err(|e| self.stage_error(WriteStage::PrepareBuffer, e))?;

        let offset = self
            .backend_mut()?
            .size()
            .map_err(|e| self.stage_error(WriteStage::DetermineWriteOffset, e))?;
        if offset % NEEDLE_PADDING_SIZE != 0 {
            let e = CoreError::corrupted(offset, "destination log end is not padding-aligned");
            return Err(self.stage_error(WriteStage::DetermineWriteOffset, e));
        }

        self.backend_mut()?
            .write_at(&buf, offset)
            .map_err(|e| self.stage_error(WriteStage::WriteBytes, e))?;

        let scaled =
            Offset::from_actual(offset).map_err(|e| self.stage_error(WriteStage::UpdateIndex, e))?;
        let size = if needle.size.is_live() {
            needle.size
        } else {
            Size::TOMBSTONE
        };
        self.index.set(needle.id, scaled, size);

        self.needles_written += 1;
        self.bytes_written += buf.len() as u64;
        Ok((offset, size))
    }

    /// Syncs the data log, then persists the index atomically.
    ///
    /// # Errors
    ///
    /// Returns a stage error; the destination files are removed.
    pub fn finish(mut self) -> CoreResult<WriteSummary> {
        let backend = self.backend_mut()?;
        let synced = backend.sync().and_then(|()| backend.size());
        let data_size = synced.map_err(|e| self.stage_error(WriteStage::WriteBytes, e))?;

        save_to_idx(&self.index, &self.files.idx_path())
            .map_err(|e| self.stage_error(WriteStage::PersistIndex, e))?;

        self.done = true;
        self.backend = None;
        debug!(
            vid = %self.files.vid(),
            needles = self.needles_written,
            bytes = self.bytes_written,
            "destination volume complete"
        );
        Ok(WriteSummary {
            needles_written: self.needles_written,
            bytes_written: self.bytes_written,
            data_size,
            index: std::mem::take(&mut self.index),
        })
    }

    /// Removes the destination data log and any partial index.
    pub fn abort(mut self) {
        self.cleanup();
    }

    fn backend_mut(&mut self) -> CoreResult<&mut Box<dyn StorageBackend>> {
        self.backend
            .as_mut()
            .ok_or_else(|| CoreError::invalid_operation("volume writer is closed"))
    }

    fn stage_error(&self, stage: WriteStage, e: impl Into<CoreError>) -> CoreError {
        let e = e.into();
        error!(vid = %self.files.vid(), stage = %stage, error = %e, "destination write failed");
        CoreError::at_stage(stage, e)
    }

    fn cleanup(&mut self) {
        if self.done {
            return;
        }
        self.done = true;
        self.backend = None;
        let idx_path = self.files.idx_path();
        for path in [self.files.dat_path(), temp_path_for(&idx_path), idx_path] {
            remove_if_present(&path);
        }
        warn!(vid = %self.files.vid(), "removed incomplete destination volume");
    }
}

impl Drop for VolumeWriter {
    fn drop(&mut self) {
        self.cleanup();
    }
}

impl std::fmt::Debug for VolumeWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VolumeWriter")
            .field("files", &self.files)
            .field("version", &self.version)
            .field("needles_written", &self.needles_written)
            .finish_non_exhaustive()
    }
}

fn remove_if_present(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove file"),
    }
}
