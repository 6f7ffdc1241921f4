//! `.idx` file persistence.
//!
//! ## Format
//!
//! A flat sequence of 16-byte big-endian entries:
//! ```text
//! Entry {
//!     id: u64
//!     offset: u32   // byte offset / 8
//!     size: u32     // 0xFFFFFFFF marks a tombstone
//! }
//! ```
//!
//! ## Invariants
//!
//! - Loading replays entries in file order; the last entry for an id wins
//! - Saving writes one entry per id in ascending id order
//! - Saving never leaves a partially written index under the final name

use super::needle_map::NeedleMap;
use crate::error::{CoreError, CoreResult};
use crate::types::{NeedleId, Offset, Size, NEEDLE_MAP_ENTRY_SIZE};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Decodes index entries from raw `.idx` bytes.
///
/// # Errors
///
/// Returns an error if the length is not a whole number of entries.
pub fn parse_idx(data: &[u8]) -> CoreResult<NeedleMap> {
    if data.len() % NEEDLE_MAP_ENTRY_SIZE != 0 {
        return Err(CoreError::invalid_format(format!(
            "index of {} bytes is not a multiple of {NEEDLE_MAP_ENTRY_SIZE}",
            data.len()
        )));
    }
    let mut map = NeedleMap::new();
    for entry in data.chunks_exact(NEEDLE_MAP_ENTRY_SIZE) {
        let id = u64::from_be_bytes([
            entry[0], entry[1], entry[2], entry[3], entry[4], entry[5], entry[6], entry[7],
        ]);
        let offset = u32::from_be_bytes([entry[8], entry[9], entry[10], entry[11]]);
        let size = u32::from_be_bytes([entry[12], entry[13], entry[14], entry[15]]);
        map.set(NeedleId::new(id), Offset(offset), Size::from_disk(size));
    }
    Ok(map)
}

/// Encodes a map as `.idx` bytes in ascending id order.
#[must_use]
pub fn encode_idx(map: &NeedleMap) -> Vec<u8> {
    let mut buf = Vec::with_capacity(map.len() * NEEDLE_MAP_ENTRY_SIZE);
    for (id, value) in map.iter() {
        buf.extend_from_slice(&id.as_u64().to_be_bytes());
        buf.extend_from_slice(&value.offset.0.to_be_bytes());
        buf.extend_from_slice(&value.size.to_disk().to_be_bytes());
    }
    buf
}

/// Loads a needle map from an `.idx` file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is malformed.
pub fn load_from_idx(path: &Path) -> CoreResult<NeedleMap> {
    let data = fs::read(path)?;
    parse_idx(&data)
}

/// Saves a needle map to `path` atomically.
///
/// Uses write-then-rename for crash safety:
/// 1. Write to `<path>.tmp`
/// 2. Sync the temporary file
/// 3. Rename it over `path`
/// 4. Sync the directory so the rename is durable
///
/// # Errors
///
/// Returns an error if any step fails; the temporary file is removed.
pub fn save_to_idx(map: &NeedleMap, path: &Path) -> CoreResult<()> {
    let temp_path = temp_path_for(path);
    let result = write_and_rename(&encode_idx(map), &temp_path, path);
    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

fn write_and_rename(data: &[u8], temp_path: &Path, path: &Path) -> CoreResult<()> {
    let mut file = File::create(temp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    fs::rename(temp_path, path)?;

    if let Some(parent) = path.parent() {
        sync_directory(parent)?;
    }
    Ok(())
}

/// Temporary file used while saving `path`.
#[must_use]
pub fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Syncs a directory so renames and removals inside it are durable.
#[cfg(unix)]
pub(crate) fn sync_directory(dir: &Path) -> CoreResult<()> {
    let dir = if dir.as_os_str().is_empty() {
        Path::new(".")
    } else {
        dir
    };
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
pub(crate) fn sync_directory(_dir: &Path) -> CoreResult<()> {
    Ok(())
}
