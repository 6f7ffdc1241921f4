//! Single-pass volume scanning.
//!
//! [`scan_volume_file`] reads the super block once, hands it to the
//! visitor, then streams every needle in ascending offset order. The
//! visitor decides after each needle whether the scan goes on:
//!
//! - `Ok(VisitFlow::Continue)` moves to the next needle
//! - `Ok(VisitFlow::Stop)` ends the scan successfully
//! - `Err(_)` aborts the scan and is returned unchanged

mod iterator;

pub use iterator::{NeedleIterator, ScannedNeedle};

use crate::error::CoreResult;
use crate::files::VolumeFiles;
use crate::needle::Needle;
use crate::super_block::SuperBlock;
use crate::types::VolumeId;
use std::path::Path;
use tracing::debug;
use volkit_storage::{FileBackend, StorageBackend};

/// What a visitor wants the scanner to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitFlow {
    /// Keep scanning.
    Continue,
    /// End the scan; everything processed so far stands.
    Stop,
}

/// Receives the contents of a data log during a scan.
pub trait VolumeVisitor {
    /// Called once with the super block, before any needle.
    fn visit_super_block(&mut self, super_block: &SuperBlock) -> CoreResult<()>;

    /// Returns false if only needle headers are needed.
    fn wants_needle_body(&self) -> bool {
        true
    }

    /// Called for each needle in offset order.
    ///
    /// `header` is the raw 16-byte header; `body` holds the bytes after it
    /// and is empty when [`wants_needle_body`](Self::wants_needle_body) is
    /// false.
    fn visit_needle(
        &mut self,
        needle: &Needle,
        offset: u64,
        header: &[u8],
        body: &[u8],
    ) -> CoreResult<VisitFlow>;
}

/// Outcome of a completed scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSummary {
    /// The super block of the scanned log.
    pub super_block: SuperBlock,
    /// Needles handed to the visitor.
    pub needles_visited: u64,
    /// True if the visitor stopped the scan.
    pub stopped_early: bool,
}

/// Scans the data log of `vid` in `collection` under `dir`.
///
/// # Errors
///
/// Returns an error if the log cannot be opened, is malformed, or the
/// visitor fails.
pub fn scan_volume_file(
    dir: &Path,
    collection: &str,
    vid: VolumeId,
    visitor: &mut dyn VolumeVisitor,
) -> CoreResult<ScanSummary> {
    let path = VolumeFiles::new(dir, collection, vid).dat_path();
    debug!(vid = %vid, path = %path.display(), "scanning volume");
    let backend = FileBackend::open_read_only(&path)?;
    scan_backend(&backend, visitor)
}

/// Scans a data log held by any backend.
///
/// # Errors
///
/// Returns an error if the log is malformed or the visitor fails.
pub fn scan_backend(
    backend: &dyn StorageBackend,
    visitor: &mut dyn VolumeVisitor,
) -> CoreResult<ScanSummary> {
    let super_block = SuperBlock::read_from(backend)?;
    visitor.visit_super_block(&super_block)?;
    let start = super_block.block_size();
    scan_needles(backend, super_block, start, visitor)
}

/// Scans needles starting at `offset`, which must be a needle boundary of
/// a log described by `super_block`. The visitor's super block callback is
/// not invoked.
///
/// # Errors
///
/// Returns an error if the log is malformed or the visitor fails.
pub fn scan_backend_from(
    backend: &dyn StorageBackend,
    super_block: SuperBlock,
    offset: u64,
    visitor: &mut dyn VolumeVisitor,
) -> CoreResult<ScanSummary> {
    scan_needles(backend, super_block, offset, visitor)
}

fn scan_needles(
    backend: &dyn StorageBackend,
    super_block: SuperBlock,
    start: u64,
    visitor: &mut dyn VolumeVisitor,
) -> CoreResult<ScanSummary> {
    let iter = NeedleIterator::new(
        backend,
        super_block.version,
        start,
        visitor.wants_needle_body(),
    )?;

    let mut needles_visited = 0;
    let mut stopped_early = false;
    for scanned in iter {
        let scanned = scanned?;
        needles_visited += 1;
        let flow = visitor.visit_needle(
            &scanned.needle,
            scanned.offset,
            &scanned.header,
            &scanned.body,
        )?;
        if flow == VisitFlow::Stop {
            stopped_early = true;
            break;
        }
    }

    Ok(ScanSummary {
        super_block,
        needles_visited,
        stopped_early,
    })
}
