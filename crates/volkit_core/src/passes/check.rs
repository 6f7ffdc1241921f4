//! Read-only volume check.

use super::options::{PassOptions, PassResult};
use crate::error::{CoreError, CoreResult};
use crate::index::{load_from_idx, NeedleMap};
use crate::liveness::{check_liveness, Liveness};
use crate::needle::Needle;
use crate::scan::{scan_volume_file, VisitFlow, VolumeVisitor};
use crate::super_block::SuperBlock;
use tracing::info;

struct CheckVisitor<'a> {
    index: &'a NeedleMap,
    cutoff_secs: u64,
    result: PassResult,
}

impl VolumeVisitor for CheckVisitor<'_> {
    fn visit_super_block(&mut self, _super_block: &SuperBlock) -> CoreResult<()> {
        Ok(())
    }

    fn visit_needle(
        &mut self,
        needle: &Needle,
        offset: u64,
        _header: &[u8],
        _body: &[u8],
    ) -> CoreResult<VisitFlow> {
        match check_liveness(self.index, needle.id, offset) {
            Liveness::Missing => self.result.skipped_missing += 1,
            Liveness::Stale => self.result.skipped_stale += 1,
            Liveness::Live => {
                self.result.processed += 1;
                if needle.has_last_modified() && needle.last_modified < self.cutoff_secs {
                    if let Some(matched) = self.result.matched.as_mut() {
                        *matched += 1;
                    }
                }
            }
        }
        Ok(VisitFlow::Continue)
    }
}

/// Counts live needles and those last modified before the cutoff, which a
/// clean pass with the same cutoff would drop. Writes nothing.
///
/// # Errors
///
/// Returns an error if no cutoff is set or the source is unreadable.
pub fn check(options: &PassOptions) -> CoreResult<PassResult> {
    let cutoff_secs = options
        .cutoff_secs
        .ok_or_else(|| CoreError::invalid_operation("check requires a cutoff time"))?;
    let index = load_from_idx(&options.source_files().idx_path())?;
    let mut visitor = CheckVisitor {
        index: &index,
        cutoff_secs,
        result: PassResult {
            matched: Some(0),
            ..PassResult::default()
        },
    };
    scan_volume_file(
        &options.source_dir,
        &options.collection,
        options.vid,
        &mut visitor,
    )?;

    let result = visitor.result;
    info!(
        vid = %options.vid,
        live = result.processed,
        older_than_cutoff = ?result.matched,
        stale = result.skipped_stale,
        missing = result.skipped_missing,
        "check complete"
    );
    Ok(result)
}
