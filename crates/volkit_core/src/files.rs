//! Volume file naming.

use crate::types::VolumeId;
use std::path::{Path, PathBuf};

/// The on-disk artifacts of one volume: `{collection}_{vid}.dat` and
/// `.idx`, or `{vid}.dat` when the collection is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeFiles {
    dir: PathBuf,
    collection: String,
    vid: VolumeId,
}

impl VolumeFiles {
    /// Names the files of `vid` in `collection` under `dir`.
    pub fn new(dir: impl Into<PathBuf>, collection: impl Into<String>, vid: VolumeId) -> Self {
        Self {
            dir: dir.into(),
            collection: collection.into(),
            vid,
        }
    }

    /// Directory holding the files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Collection name; may be empty.
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Volume id.
    #[must_use]
    pub fn vid(&self) -> VolumeId {
        self.vid
    }

    /// File name without extension.
    #[must_use]
    pub fn base_name(&self) -> String {
        if self.collection.is_empty() {
            self.vid.to_string()
        } else {
            format!("{}_{}", self.collection, self.vid)
        }
    }

    /// Path of the file with extension `ext`.
    #[must_use]
    pub fn with_extension(&self, ext: &str) -> PathBuf {
        self.dir.join(format!("{}.{ext}", self.base_name()))
    }

    /// Path of the data log.
    #[must_use]
    pub fn dat_path(&self) -> PathBuf {
        self.with_extension("dat")
    }

    /// Path of the index.
    #[must_use]
    pub fn idx_path(&self) -> PathBuf {
        self.with_extension("idx")
    }

    /// The same volume in another directory.
    #[must_use]
    pub fn in_dir(&self, dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            collection: self.collection.clone(),
            vid: self.vid,
        }
    }
}
