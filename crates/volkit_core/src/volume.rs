//! Local volume replica.
//!
//! A [`Volume`] holds an exclusive advisory lock on its data log while
//! open, and keeps its index in memory. Index changes are persisted with
//! [`save_to_idx`] after every mutating operation.

use crate::error::{CoreError, CoreResult};
use crate::files::VolumeFiles;
use crate::index::{load_from_idx, save_to_idx, NeedleMap};
use crate::needle::{tail_length_for, Needle};
use crate::passes::{self, PassOptions};
use crate::scan::NeedleIterator;
use crate::super_block::SuperBlock;
use crate::types::{Offset, NEEDLE_HEADER_SIZE, NEEDLE_PADDING_SIZE};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io;
use tracing::{debug, info, warn};
use volkit_storage::{FileBackend, InMemoryBackend, StorageBackend};

/// An open local volume.
pub struct Volume {
    files: VolumeFiles,
    backend: FileBackend,
    super_block: SuperBlock,
    index: NeedleMap,
    _lock_file: File,
}

impl Volume {
    /// Opens an existing volume.
    ///
    /// A missing index is rebuilt by scanning the data log.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::VolumeLocked`] if another process has the
    /// volume open, or an error if the files are unreadable.
    pub fn open(files: VolumeFiles) -> CoreResult<Self> {
        let lock_file = lock(&files)?;
        let backend = FileBackend::open_existing(&files.dat_path())?;
        let super_block = SuperBlock::read_from(&backend)?;

        let idx_path = files.idx_path();
        let index = if idx_path.exists() {
            load_from_idx(&idx_path)?
        } else {
            warn!(vid = %files.vid(), "index missing, rebuilding from data log");
            let index = rebuild_index(&backend, &super_block)?;
            save_to_idx(&index, &idx_path)?;
            index
        };

        debug!(vid = %files.vid(), entries = index.len(), "opened volume");
        Ok(Self {
            files,
            backend,
            super_block,
            index,
            _lock_file: lock_file,
        })
    }

    /// Creates an empty volume holding only `super_block`.
    ///
    /// # Errors
    ///
    /// Returns an error if either file already exists.
    pub fn create(files: VolumeFiles, super_block: SuperBlock) -> CoreResult<Self> {
        fs::create_dir_all(files.dir())?;
        if files.idx_path().exists() {
            return Err(volkit_storage::StorageError::AlreadyExists(files.idx_path()).into());
        }
        let mut backend = FileBackend::create_new(&files.dat_path())?;
        backend.write_at(&super_block.to_bytes()?, 0)?;
        backend.sync()?;
        let index = NeedleMap::new();
        save_to_idx(&index, &files.idx_path())?;
        let lock_file = lock(&files)?;

        info!(vid = %files.vid(), path = %files.dat_path().display(), "created empty volume");
        Ok(Self {
            files,
            backend,
            super_block,
            index,
            _lock_file: lock_file,
        })
    }

    /// Opens the volume if its data log exists, otherwise creates it with
    /// `super_block`.
    ///
    /// # Errors
    ///
    /// See [`open`](Self::open) and [`create`](Self::create).
    pub fn open_or_create(files: VolumeFiles, super_block: SuperBlock) -> CoreResult<Self> {
        if files.dat_path().exists() {
            Self::open(files)
        } else {
            remove_if_exists(&files.idx_path())?;
            Self::create(files, super_block)
        }
    }

    /// Volume files.
    #[must_use]
    pub fn files(&self) -> &VolumeFiles {
        &self.files
    }

    /// The volume header.
    #[must_use]
    pub fn super_block(&self) -> &SuperBlock {
        &self.super_block
    }

    /// The in-memory index.
    #[must_use]
    pub fn index(&self) -> &NeedleMap {
        &self.index
    }

    /// Size of the data log in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be read.
    pub fn data_size(&self) -> CoreResult<u64> {
        Ok(self.backend.size()?)
    }

    /// Reads the needle at byte `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the needle is unreadable or malformed.
    pub fn read_needle_at(&self, offset: u64) -> CoreResult<Needle> {
        let header = self.backend.read_at(offset, NEEDLE_HEADER_SIZE)?;
        let mut needle = Needle::parse_header(&header)?;
        let tail_len = tail_length_for(needle.size, self.super_block.version);
        let tail_len = usize::try_from(tail_len)
            .map_err(|_| CoreError::corrupted(offset, "needle too large to read"))?;
        let tail = self
            .backend
            .read_at(offset + NEEDLE_HEADER_SIZE as u64, tail_len)?;
        needle.read_body(&tail, self.super_block.version, offset)?;
        Ok(needle)
    }

    /// Append time of the most recently written needle, or 0 for an empty
    /// volume or one whose format has no append times.
    ///
    /// # Errors
    ///
    /// Returns an error if the last needle cannot be read.
    pub fn last_append_at_ns(&self) -> CoreResult<u64> {
        if !self.super_block.version.has_append_timestamp() {
            return Ok(0);
        }
        let last = self
            .index
            .iter()
            .map(|(_, value)| value.offset)
            .filter(|offset| !offset.is_zero())
            .max();
        match last {
            Some(offset) => Ok(self.read_needle_at(offset.to_actual())?.append_at_ns),
            None => Ok(0),
        }
    }

    /// Sets the compaction revision and rewrites the super block.
    ///
    /// # Errors
    ///
    /// Returns an error if the super block cannot be written.
    pub fn set_compaction_revision(&mut self, revision: u16) -> CoreResult<()> {
        let mut super_block = self.super_block.clone();
        super_block.compaction_revision = revision;
        self.backend.write_at(&super_block.to_bytes()?, 0)?;
        self.backend.sync()?;
        self.super_block = super_block;
        info!(vid = %self.files.vid(), revision, "set compaction revision");
        Ok(())
    }

    /// Rewrites the volume without its dead needles and reopens it.
    ///
    /// # Errors
    ///
    /// Returns an error if the compaction pass or the file swap fails. The
    /// original files are intact unless the swap itself failed.
    pub fn compact(self) -> CoreResult<Self> {
        let files = self.files.clone();
        drop(self);

        let work_dir = files.dir().join(format!(".{}.compact", files.base_name()));
        if work_dir.exists() {
            fs::remove_dir_all(&work_dir)?;
        }
        fs::create_dir_all(&work_dir)?;

        let options = PassOptions::new(files.dir(), files.vid())
            .collection(files.collection())
            .destination_dir(&work_dir);
        let outcome = passes::compact(&options).and_then(|result| {
            passes::swap_into_source(&options)?;
            Ok(result)
        });
        let _ = fs::remove_dir_all(&work_dir);
        let result = outcome?;
        info!(
            vid = %files.vid(),
            kept = result.processed,
            dropped = result.skipped_stale + result.skipped_missing,
            "compacted volume"
        );
        Self::open(files)
    }

    /// Appends needles received from a remote replica.
    ///
    /// `bytes` is a sequence of complete needles in this volume's format.
    /// Every needle is validated before anything is written. Needles with
    /// no content become tombstones. Returns the number of needles applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are malformed or a write fails.
    pub fn append_incremental(&mut self, bytes: &[u8]) -> CoreResult<u64> {
        if bytes.is_empty() {
            return Ok(0);
        }
        let incoming = InMemoryBackend::with_data(bytes.to_vec());
        let needles = NeedleIterator::new(&incoming, self.super_block.version, 0, true)?
            .collect::<CoreResult<Vec<_>>>()?;

        let mut offset = self.backend.size()?;
        if offset % NEEDLE_PADDING_SIZE != 0 {
            return Err(CoreError::corrupted(
                offset,
                "local data log end is not padding-aligned",
            ));
        }
        for scanned in &needles {
            let mut raw = Vec::with_capacity(scanned.disk_size as usize);
            raw.extend_from_slice(&scanned.header);
            raw.extend_from_slice(&scanned.body);
            self.backend.write_at(&raw, offset)?;

            let scaled = Offset::from_actual(offset)?;
            if scanned.needle.size.is_live() {
                self.index.set(scanned.needle.id, scaled, scanned.needle.size);
            } else {
                self.index.delete(scanned.needle.id, scaled);
            }
            offset += scanned.disk_size;
        }
        self.backend.sync()?;
        save_to_idx(&self.index, &self.files.idx_path())?;

        debug!(vid = %self.files.vid(), needles = needles.len(), "applied incremental needles");
        Ok(needles.len() as u64)
    }

    /// Closes the volume and deletes its data log and index.
    ///
    /// # Errors
    ///
    /// Returns an error if a file exists but cannot be removed.
    pub fn destroy(self) -> CoreResult<()> {
        let files = self.files.clone();
        drop(self);
        remove_volume_files(&files)?;
        warn!(vid = %files.vid(), "destroyed local volume");
        Ok(())
    }

    /// Syncs and closes the volume.
    ///
    /// # Errors
    ///
    /// Returns an error if the final sync fails.
    pub fn close(mut self) -> CoreResult<()> {
        self.backend.sync()?;
        Ok(())
    }
}

impl std::fmt::Debug for Volume {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Volume")
            .field("files", &self.files)
            .field("super_block", &self.super_block)
            .field("entries", &self.index.len())
            .finish_non_exhaustive()
    }
}

/// Deletes the data log and index of a volume; missing files are ignored.
///
/// # Errors
///
/// Returns an error if an existing file cannot be removed.
pub fn remove_volume_files(files: &VolumeFiles) -> CoreResult<()> {
    remove_if_exists(&files.dat_path())?;
    remove_if_exists(&files.idx_path())
}

fn remove_if_exists(path: &std::path::Path) -> CoreResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn lock(files: &VolumeFiles) -> CoreResult<File> {
    let lock_file = OpenOptions::new().read(true).open(files.dat_path())?;
    if lock_file.try_lock_exclusive().is_err() {
        return Err(CoreError::VolumeLocked);
    }
    Ok(lock_file)
}

fn rebuild_index(backend: &FileBackend, super_block: &SuperBlock) -> CoreResult<NeedleMap> {
    let mut index = NeedleMap::new();
    let iter = NeedleIterator::new(backend, super_block.version, super_block.block_size(), false)?;
    for scanned in iter {
        let scanned = scanned?;
        let offset = Offset::from_actual(scanned.offset)?;
        if scanned.needle.size.is_live() {
            index.set(scanned.needle.id, offset, scanned.needle.size);
        } else {
            index.delete(scanned.needle.id, offset);
        }
    }
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::super_block::Version;
    use crate::types::{Cookie, NeedleId, VolumeId};
    use crate::writer::VolumeWriter;
    use tempfile::tempdir;

    fn needle(id: u64, data: &[u8], append_at_ns: u64) -> Needle {
        let mut n = Needle::new(NeedleId::new(id), Cookie::new(1), data.to_vec());
        n.append_at_ns = append_at_ns;
        n
    }

    fn encode(needles: &mut [Needle]) -> Vec<u8> {
        let mut out = Vec::new();
        for n in needles {
            out.extend(n.prepare_write_buffer(Version::V3).unwrap());
        }
        out
    }

    #[test]
    fn create_then_open() {
        let dir = tempdir().unwrap();
        let files = VolumeFiles::new(dir.path(), "c", VolumeId::new(1));
        let volume = Volume::create(files.clone(), SuperBlock::default()).unwrap();
        assert_eq!(volume.data_size().unwrap(), 8);
        assert_eq!(volume.last_append_at_ns().unwrap(), 0);
        volume.close().unwrap();

        let volume = Volume::open(files).unwrap();
        assert!(volume.index().is_empty());
    }

    #[test]
    fn second_open_is_locked_out() {
        let dir = tempdir().unwrap();
        let files = VolumeFiles::new(dir.path(), "", VolumeId::new(2));
        let _volume = Volume::create(files.clone(), SuperBlock::default()).unwrap();
        assert!(matches!(Volume::open(files), Err(CoreError::VolumeLocked)));
    }

    #[test]
    fn incremental_append_indexes_needles_and_tombstones() {
        let dir = tempdir().unwrap();
        let files = VolumeFiles::new(dir.path(), "c", VolumeId::new(3));
        let mut volume = Volume::create(files, SuperBlock::default()).unwrap();

        let bytes = encode(&mut [
            needle(1, b"first", 100),
            needle(2, b"second", 200),
            needle(1, b"", 300),
        ]);
        assert_eq!(volume.append_incremental(&bytes).unwrap(), 3);
        assert_eq!(volume.data_size().unwrap(), 8 + bytes.len() as u64);
        assert!(volume.index().get(NeedleId::new(1)).unwrap().is_deleted());
        assert!(volume.index().get(NeedleId::new(2)).unwrap().size.is_live());
        assert_eq!(volume.last_append_at_ns().unwrap(), 300);
    }

    #[test]
    fn malformed_incremental_bytes_write_nothing() {
        let dir = tempdir().unwrap();
        let files = VolumeFiles::new(dir.path(), "c", VolumeId::new(4));
        let mut volume = Volume::create(files, SuperBlock::default()).unwrap();

        let mut bytes = encode(&mut [needle(1, b"first", 100)]);
        bytes.truncate(bytes.len() - 1);
        assert!(volume.append_incremental(&bytes).is_err());
        assert_eq!(volume.data_size().unwrap(), 8);
    }

    #[test]
    fn missing_index_is_rebuilt() {
        let dir = tempdir().unwrap();
        let files = VolumeFiles::new(dir.path(), "c", VolumeId::new(5));
        let mut volume = Volume::create(files.clone(), SuperBlock::default()).unwrap();
        volume
            .append_incremental(&encode(&mut [needle(7, b"x", 1), needle(8, b"y", 2)]))
            .unwrap();
        let expected = volume.index().clone();
        volume.close().unwrap();

        fs::remove_file(files.idx_path()).unwrap();
        let volume = Volume::open(files.clone()).unwrap();
        assert_eq!(volume.index(), &expected);
        assert!(files.idx_path().exists());
    }

    #[test]
    fn compaction_revision_is_persisted() {
        let dir = tempdir().unwrap();
        let files = VolumeFiles::new(dir.path(), "c", VolumeId::new(6));
        let mut volume = Volume::create(files.clone(), SuperBlock::default()).unwrap();
        volume.set_compaction_revision(4).unwrap();
        volume.close().unwrap();
        assert_eq!(Volume::open(files).unwrap().super_block().compaction_revision, 4);
    }

    #[test]
    fn compact_drops_dead_needles() {
        let dir = tempdir().unwrap();
        let files = VolumeFiles::new(dir.path(), "c", VolumeId::new(7));
        let mut volume = Volume::create(files.clone(), SuperBlock::default()).unwrap();
        volume
            .append_incremental(&encode(&mut [
                needle(1, b"old", 1),
                needle(1, b"new", 2),
                needle(2, b"gone", 3),
                needle(2, b"", 4),
            ]))
            .unwrap();
        let before = volume.data_size().unwrap();

        let volume = volume.compact().unwrap();
        assert!(volume.data_size().unwrap() < before);
        let value = volume.index().get(NeedleId::new(1)).unwrap();
        assert_eq!(volume.read_needle_at(value.offset.to_actual()).unwrap().data, b"new");
        assert!(volume.index().get(NeedleId::new(2)).is_none());
        assert!(!dir.path().join(".c_7.compact").exists());
    }

    #[test]
    fn destroy_removes_files() {
        let dir = tempdir().unwrap();
        let files = VolumeFiles::new(dir.path(), "c", VolumeId::new(8));
        let volume = Volume::create(files.clone(), SuperBlock::default()).unwrap();
        volume.destroy().unwrap();
        assert!(!files.dat_path().exists());
        assert!(!files.idx_path().exists());
    }

    #[test]
    fn open_or_create_reuses_existing() {
        let dir = tempdir().unwrap();
        let files = VolumeFiles::new(dir.path(), "c", VolumeId::new(9));
        let writer = VolumeWriter::create(files.clone(), &SuperBlock::default()).unwrap();
        writer.finish().unwrap();
        let volume = Volume::open_or_create(files, SuperBlock::default()).unwrap();
        assert_eq!(volume.data_size().unwrap(), 8);
    }

    #[test]
    fn open_or_create_replaces_orphan_index() {
        let dir = tempdir().unwrap();
        let files = VolumeFiles::new(dir.path(), "c", VolumeId::new(10));
        fs::write(files.idx_path(), [0u8; 16]).unwrap();

        let volume = Volume::open_or_create(files, SuperBlock::default()).unwrap();
        assert!(volume.index().is_empty());
    }

    #[test]
    fn open_or_create_reports_unremovable_index() {
        let dir = tempdir().unwrap();
        let files = VolumeFiles::new(dir.path(), "c", VolumeId::new(11));
        fs::create_dir(files.idx_path()).unwrap();

        let err = Volume::open_or_create(files.clone(), SuperBlock::default()).unwrap_err();
        assert!(matches!(err, CoreError::Io(_)));
        assert!(!files.dat_path().exists());
    }
}
