//! Volume maintenance passes.
//!
//! Each pass reads a source volume once and, except for [`check`], writes
//! a new destination volume holding the live needles it keeps:
//!
//! | pass          | keeps                         | rewrites                          |
//! |---------------|-------------------------------|-----------------------------------|
//! | [`transform`] | all live needles, up to limit | encryption, TTL, timestamps       |
//! | [`clean`]     | modified at or after cutoff   | nothing                           |
//! | [`compact`]   | all live needles              | nothing                           |
//! | [`generate`]  | all live needles              | last-modified, TTL, timestamps    |
//! | [`check`]     | nothing written               | counts needles older than cutoff  |
//!
//! The source volume is never modified; [`swap_into_source`] replaces it
//! with the destination afterwards when asked to.

mod check;
mod options;
mod rewrite;

pub use check::check;
pub use options::{PassOptions, PassResult};
pub use rewrite::{CountOlderThan, KeepAll, ModifiedSince, RecordPolicy, RewritePass};

use crate::clock::TimeSource;
use crate::error::{CoreError, CoreResult};
use crate::index::sync_directory;
use crate::transform::{LastModifiedPolicy, TransformOptions};
use std::fs;
use std::sync::Arc;
use tracing::info;

/// Copies live needles through `transform`, stopping after
/// [`PassOptions::limit`] needles. Every copied needle is stamped with the
/// time it was rewritten.
///
/// # Errors
///
/// Returns an error if the pass fails; the destination is removed.
pub fn transform(options: &PassOptions, transform: TransformOptions) -> CoreResult<PassResult> {
    RewritePass::new("transform", options, transform.restamped()).run()
}

/// Copies live needles modified at or after the cutoff. Needles with no
/// last-modified time are kept. `matched` counts the needles dropped.
///
/// # Errors
///
/// Returns an error if no cutoff is set or the pass fails.
pub fn clean(options: &PassOptions) -> CoreResult<PassResult> {
    let cutoff_secs = options
        .cutoff_secs
        .ok_or_else(|| CoreError::invalid_operation("clean requires a cutoff time"))?;
    RewritePass::new("clean", options, TransformOptions::verbatim())
        .policy(ModifiedSince { cutoff_secs })
        .run()
}

/// Copies live needles verbatim, dropping dead ones.
///
/// # Errors
///
/// Returns an error if the pass fails; the destination is removed.
pub fn compact(options: &PassOptions) -> CoreResult<PassResult> {
    RewritePass::new("compact", options, TransformOptions::verbatim()).run()
}

/// Copies live needles with their last-modified time taken from
/// `time_source`, their TTL aged and their append time set to now.
///
/// With a cutoff set, `matched` counts the needles whose source
/// last-modified time is before it. Those needles are still copied.
///
/// # Errors
///
/// Returns an error if the pass or the time source fails.
pub fn generate(options: &PassOptions, time_source: Arc<dyn TimeSource>) -> CoreResult<PassResult> {
    let transform = TransformOptions::default()
        .age_ttl(true)
        .last_modified(LastModifiedPolicy::From(time_source))
        .restamped();
    let pass = RewritePass::new("generate", options, transform);
    match options.cutoff_secs {
        Some(cutoff_secs) => pass.policy(CountOlderThan { cutoff_secs }).run(),
        None => pass.run(),
    }
}

/// Moves the destination volume over the source volume.
///
/// The data log is renamed before the index, so a crash in between leaves
/// the new log with the old index. Both renames are atomic.
///
/// # Errors
///
/// Returns an error if the directories are the same or a rename fails.
pub fn swap_into_source(options: &PassOptions) -> CoreResult<()> {
    let source = options.source_files();
    let destination = options.destination_files();
    if source.dat_path() == destination.dat_path() {
        return Err(CoreError::invalid_operation(
            "destination is the source volume",
        ));
    }

    fs::rename(destination.dat_path(), source.dat_path())?;
    fs::rename(destination.idx_path(), source.idx_path())?;
    sync_directory(source.dir())?;
    info!(vid = %options.vid, dir = %source.dir().display(), "replaced source volume");
    Ok(())
}
