//! Test fixtures for building volumes on disk.
//!
//! A [`VolumeFixture`] collects needles in memory, keeps an index the way a
//! volume server would, and writes both files in one go. It can also
//! produce the awkward cases real volumes contain: superseded copies,
//! tombstones and needles the index never heard of.

use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use tempfile::TempDir;
use volkit_core::index::save_to_idx;
use volkit_core::{
    Cookie, CoreResult, Needle, NeedleId, NeedleMap, Offset, ReplicaPlacement, SuperBlock, Ttl,
    Version, VolumeFiles, VolumeId,
};
use volkit_storage::{FileBackend, StorageBackend};

/// First append time handed out, in nanoseconds.
pub const FIRST_APPEND_AT_NS: u64 = 1_600_000_000_000_000_000;

/// Builds a volume's data log and index.
pub struct VolumeFixture {
    files: VolumeFiles,
    super_block: SuperBlock,
    log: Vec<u8>,
    index: NeedleMap,
    offsets: Vec<(NeedleId, u64)>,
    next_append_at_ns: u64,
}

impl VolumeFixture {
    /// Starts a version 3 volume with replica placement `001`.
    pub fn new(dir: &Path, collection: &str, vid: VolumeId) -> Self {
        let super_block = SuperBlock::new(Version::V3, ReplicaPlacement::from_byte(1), Ttl::EMPTY);
        Self::with_super_block(dir, collection, vid, super_block)
    }

    /// Starts a volume with the given super block.
    pub fn with_super_block(
        dir: &Path,
        collection: &str,
        vid: VolumeId,
        super_block: SuperBlock,
    ) -> Self {
        let log = super_block
            .to_bytes()
            .expect("fixture super block must encode");
        Self {
            files: VolumeFiles::new(dir, collection, vid),
            super_block,
            log,
            index: NeedleMap::new(),
            offsets: Vec::new(),
            next_append_at_ns: FIRST_APPEND_AT_NS,
        }
    }

    /// Files the fixture writes.
    pub fn files(&self) -> &VolumeFiles {
        &self.files
    }

    /// The volume's super block.
    pub fn super_block(&self) -> &SuperBlock {
        &self.super_block
    }

    /// The index as it stands.
    pub fn index(&self) -> &NeedleMap {
        &self.index
    }

    /// Every needle appended so far, with its log offset, in log order.
    pub fn offsets(&self) -> &[(NeedleId, u64)] {
        &self.offsets
    }

    /// Current log length.
    pub fn log_size(&self) -> u64 {
        self.log.len() as u64
    }

    /// Appends `needle` and points the index at it. Returns its offset.
    ///
    /// A needle without an append time gets the next one in sequence.
    pub fn put_needle(&mut self, mut needle: Needle) -> u64 {
        let offset = self.append(&mut needle);
        let scaled = Offset::from_actual(offset).expect("fixture offsets are aligned");
        if needle.size.is_live() {
            self.index.set(needle.id, scaled, needle.size);
        } else {
            self.index.delete(needle.id, scaled);
        }
        offset
    }

    /// Appends a needle holding `data` under cookie 0x1234.
    pub fn put(&mut self, id: u64, data: &[u8]) -> u64 {
        self.put_needle(Needle::new(NeedleId(id), Cookie(0x1234), data.to_vec()))
    }

    /// Appends a needle holding `data` last modified at `secs`.
    pub fn put_modified(&mut self, id: u64, data: &[u8], secs: u64) -> u64 {
        let mut needle = Needle::new(NeedleId(id), Cookie(0x1234), data.to_vec());
        needle.set_last_modified(secs);
        self.put_needle(needle)
    }

    /// Appends an empty needle and records a tombstone for `id`.
    pub fn delete(&mut self, id: u64) -> u64 {
        self.put_needle(Needle::new(NeedleId(id), Cookie(0x1234), Vec::new()))
    }

    /// Appends a needle the index knows nothing about.
    pub fn put_unindexed(&mut self, id: u64, data: &[u8]) -> u64 {
        let mut needle = Needle::new(NeedleId(id), Cookie(0x1234), data.to_vec());
        self.append(&mut needle)
    }

    /// Writes the data log and index, replacing files already there.
    pub fn write(&self) -> CoreResult<VolumeFiles> {
        std::fs::create_dir_all(self.files.dir())?;
        let _ = std::fs::remove_file(self.files.dat_path());
        let mut backend = FileBackend::create_new(&self.files.dat_path())?;
        backend.write_at(&self.log, 0)?;
        backend.sync()?;
        save_to_idx(&self.index, &self.files.idx_path())?;
        Ok(self.files.clone())
    }

    fn append(&mut self, needle: &mut Needle) -> u64 {
        if needle.append_at_ns == 0 {
            needle.append_at_ns = self.next_append_at_ns;
        }
        self.next_append_at_ns = self.next_append_at_ns.max(needle.append_at_ns) + 1;
        let bytes = needle
            .prepare_write_buffer(self.super_block.version)
            .expect("fixture needle must encode");
        let offset = self.log.len() as u64;
        self.log.extend_from_slice(&bytes);
        self.offsets.push((needle.id, offset));
        offset
    }
}

/// A temporary directory holding one written volume.
pub struct TempVolume {
    /// Keeps the directory alive.
    pub dir: TempDir,
    /// Files of the written volume.
    pub files: VolumeFiles,
}

/// Builds and writes a volume in a fresh temporary directory.
pub fn temp_volume(
    collection: &str,
    vid: VolumeId,
    build: impl FnOnce(&mut VolumeFixture),
) -> TempVolume {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let mut fixture = VolumeFixture::new(dir.path(), collection, vid);
    build(&mut fixture);
    let files = fixture.write().expect("Failed to write fixture volume");
    TempVolume { dir, files }
}

/// Overwrites one byte of a file.
pub fn corrupt_byte(path: &Path, offset: u64) -> std::io::Result<()> {
    let bytes = std::fs::read(path)?;
    let original = bytes.get(offset as usize).copied().unwrap_or(0);
    let mut file = OpenOptions::new().write(true).open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(&[original ^ 0xff])?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use volkit_core::{check_liveness, index::load_from_idx, Liveness};

    #[test]
    fn fixture_builds_mixed_volume() {
        let dir = TempDir::new().unwrap();
        let mut fixture = VolumeFixture::new(dir.path(), "pics", VolumeId(1));
        let stale = fixture.put(1, b"first");
        let live = fixture.put(1, b"second");
        let deleted = fixture.put(2, b"gone");
        let tombstone = fixture.delete(2);
        let missing = fixture.put_unindexed(3, b"orphan");
        let files = fixture.write().unwrap();

        let index = load_from_idx(&files.idx_path()).unwrap();
        assert_eq!(check_liveness(&index, NeedleId(1), live), Liveness::Live);
        assert_eq!(check_liveness(&index, NeedleId(1), stale), Liveness::Stale);
        assert_eq!(check_liveness(&index, NeedleId(2), deleted), Liveness::Stale);
        assert_eq!(check_liveness(&index, NeedleId(2), tombstone), Liveness::Stale);
        assert_eq!(check_liveness(&index, NeedleId(3), missing), Liveness::Missing);
        assert_eq!(
            std::fs::metadata(files.dat_path()).unwrap().len(),
            fixture.log_size()
        );
    }

    #[test]
    fn append_times_increase() {
        let dir = TempDir::new().unwrap();
        let mut fixture = VolumeFixture::new(dir.path(), "", VolumeId(2));
        fixture.put(1, b"a");
        fixture.put(2, b"b");
        assert_eq!(fixture.offsets().len(), 2);
        assert_eq!(fixture.next_append_at_ns, FIRST_APPEND_AT_NS + 2);
    }
}
