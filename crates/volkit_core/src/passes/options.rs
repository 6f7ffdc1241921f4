//! Pass configuration and results.

use crate::crypto::CipherKey;
use crate::files::VolumeFiles;
use crate::types::VolumeId;
use std::path::{Path, PathBuf};

/// Inputs shared by every volume pass.
///
/// # Example
///
/// ```rust
/// use volkit_core::passes::PassOptions;
/// use volkit_core::VolumeId;
///
/// let options = PassOptions::new("/data", VolumeId::new(7))
///     .collection("pics")
///     .destination_dir("/data/out")
///     .limit(100);
/// assert_eq!(options.source_files().base_name(), "pics_7");
/// ```
#[derive(Debug, Clone)]
pub struct PassOptions {
    /// Directory holding the source volume.
    pub source_dir: PathBuf,
    /// Directory the destination volume is written to.
    pub destination_dir: PathBuf,
    /// Collection name; may be empty.
    pub collection: String,
    /// Volume id.
    pub vid: VolumeId,
    /// Last-modified cutoff in unix seconds.
    pub cutoff_secs: Option<u64>,
    /// Stop after this many needles have been written.
    pub limit: Option<u64>,
    /// Key for encrypting passes.
    pub cipher_key: Option<CipherKey>,
}

impl PassOptions {
    /// Options for `vid` in `source_dir`, writing next to the source.
    pub fn new(source_dir: impl Into<PathBuf>, vid: VolumeId) -> Self {
        let source_dir = source_dir.into();
        Self {
            destination_dir: source_dir.clone(),
            source_dir,
            collection: String::new(),
            vid,
            cutoff_secs: None,
            limit: None,
            cipher_key: None,
        }
    }

    /// Sets the collection.
    #[must_use]
    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    /// Sets the destination directory.
    #[must_use]
    pub fn destination_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.destination_dir = dir.into();
        self
    }

    /// Sets the last-modified cutoff.
    #[must_use]
    pub fn cutoff_secs(mut self, cutoff: u64) -> Self {
        self.cutoff_secs = Some(cutoff);
        self
    }

    /// Sets the needle limit.
    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the cipher key.
    #[must_use]
    pub fn cipher_key(mut self, key: CipherKey) -> Self {
        self.cipher_key = Some(key);
        self
    }

    /// Source volume files.
    #[must_use]
    pub fn source_files(&self) -> VolumeFiles {
        VolumeFiles::new(&self.source_dir, self.collection.clone(), self.vid)
    }

    /// Destination volume files.
    #[must_use]
    pub fn destination_files(&self) -> VolumeFiles {
        VolumeFiles::new(&self.destination_dir, self.collection.clone(), self.vid)
    }

    /// Source directory.
    #[must_use]
    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }
}

/// Counters of a finished pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassResult {
    /// Live needles handled: written by rewriting passes, counted by check.
    pub processed: u64,
    /// Needles matching the pass's auxiliary predicate, if it has one.
    pub matched: Option<u64>,
    /// Needles whose index entry points elsewhere or is deleted.
    pub skipped_stale: u64,
    /// Needles with no index entry.
    pub skipped_missing: u64,
    /// Bytes appended to the destination, super block excluded.
    pub bytes_written: u64,
    /// True if the needle limit ended the pass.
    pub stopped_early: bool,
}
