//! The scan-validate-rewrite pass.

use super::options::{PassOptions, PassResult};
use crate::clock::unix_now_ns;
use crate::error::{CoreError, CoreResult};
use crate::index::{load_from_idx, NeedleMap};
use crate::liveness::{check_liveness, Liveness};
use crate::needle::Needle;
use crate::scan::{scan_volume_file, VisitFlow, VolumeVisitor};
use crate::super_block::SuperBlock;
use crate::transform::{TransformOptions, Transformer};
use crate::writer::{create_exclusive, DestinationOpener, VolumeWriter};
use tracing::{debug, info};

/// Decides which live needles a rewrite keeps and which it counts.
pub trait RecordPolicy {
    /// Returns false to drop `needle`.
    fn keep(&self, needle: &Needle) -> bool;

    /// Returns true if `needle` counts toward [`PassResult::matched`].
    /// Defaults to the needles that are dropped.
    fn matches(&self, needle: &Needle) -> bool {
        !self.keep(needle)
    }

    /// Returns true if [`PassResult::matched`] should be reported.
    fn reports_matches(&self) -> bool {
        false
    }
}

/// Keeps every live needle.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepAll;

impl RecordPolicy for KeepAll {
    fn keep(&self, _needle: &Needle) -> bool {
        true
    }
}

/// Keeps needles modified at or after a cutoff, and needles with no
/// last-modified time.
#[derive(Debug, Clone, Copy)]
pub struct ModifiedSince {
    /// Cutoff in unix seconds.
    pub cutoff_secs: u64,
}

impl RecordPolicy for ModifiedSince {
    fn keep(&self, needle: &Needle) -> bool {
        !needle.has_last_modified() || needle.last_modified >= self.cutoff_secs
    }

    fn reports_matches(&self) -> bool {
        true
    }
}

/// Keeps every needle and counts those last modified before a cutoff.
#[derive(Debug, Clone, Copy)]
pub struct CountOlderThan {
    /// Cutoff in unix seconds.
    pub cutoff_secs: u64,
}

impl RecordPolicy for CountOlderThan {
    fn keep(&self, _needle: &Needle) -> bool {
        true
    }

    fn matches(&self, needle: &Needle) -> bool {
        needle.has_last_modified() && needle.last_modified < self.cutoff_secs
    }

    fn reports_matches(&self) -> bool {
        true
    }
}

/// Copies the live needles of a source volume into a new destination
/// volume, transforming them on the way.
pub struct RewritePass<'a> {
    name: &'static str,
    options: &'a PassOptions,
    transform: TransformOptions,
    policy: Box<dyn RecordPolicy + 'a>,
    opener: &'a DestinationOpener,
    now_ns: Option<u64>,
}

impl<'a> RewritePass<'a> {
    /// Creates a pass that keeps every live needle.
    pub fn new(name: &'static str, options: &'a PassOptions, transform: TransformOptions) -> Self {
        Self {
            name,
            options,
            transform,
            policy: Box::new(KeepAll),
            opener: &create_exclusive,
            now_ns: None,
        }
    }

    /// Sets the needle selection policy.
    #[must_use]
    pub fn policy(mut self, policy: impl RecordPolicy + 'a) -> Self {
        self.policy = Box::new(policy);
        self
    }

    /// Sets how the destination data log is opened.
    #[must_use]
    pub fn with_destination_opener(mut self, opener: &'a DestinationOpener) -> Self {
        self.opener = opener;
        self
    }

    /// Pins the transform time instead of reading the clock per needle.
    #[must_use]
    pub fn at_time(mut self, now_ns: u64) -> Self {
        self.now_ns = Some(now_ns);
        self
    }

    /// Runs the pass.
    ///
    /// On success the destination log is synced and its index persisted.
    /// On failure the destination is removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the source is unreadable or malformed, the
    /// transform fails, or a destination write stage fails.
    pub fn run(self) -> CoreResult<PassResult> {
        let source = self.options.source_files();
        let index = load_from_idx(&source.idx_path())?;
        let transformer = Transformer::new(self.transform, self.options.cipher_key.as_ref())?;
        info!(
            pass = self.name,
            vid = %self.options.vid,
            collection = %self.options.collection,
            entries = index.len(),
            "starting pass"
        );

        let mut visitor = RewriteVisitor {
            options: self.options,
            index: &index,
            transformer: &transformer,
            policy: self.policy.as_ref(),
            opener: self.opener,
            now_ns: self.now_ns,
            writer: None,
            result: PassResult {
                matched: self.policy.reports_matches().then_some(0),
                ..PassResult::default()
            },
        };

        let scanned = scan_volume_file(
            &self.options.source_dir,
            &self.options.collection,
            self.options.vid,
            &mut visitor,
        );
        let mut result = visitor.result;
        let writer = visitor.writer.take();

        match (scanned, writer) {
            (Ok(_), Some(writer)) => {
                let summary = writer.finish()?;
                result.bytes_written = summary.bytes_written;
            }
            (Ok(_), None) => {
                return Err(CoreError::invalid_operation("scan produced no super block"));
            }
            (Err(e), writer) => {
                if let Some(writer) = writer {
                    writer.abort();
                }
                return Err(e);
            }
        }

        info!(
            pass = self.name,
            vid = %self.options.vid,
            processed = result.processed,
            matched = ?result.matched,
            stale = result.skipped_stale,
            missing = result.skipped_missing,
            bytes = result.bytes_written,
            stopped_early = result.stopped_early,
            "pass complete"
        );
        Ok(result)
    }
}

struct RewriteVisitor<'a> {
    options: &'a PassOptions,
    index: &'a NeedleMap,
    transformer: &'a Transformer,
    policy: &'a dyn RecordPolicy,
    opener: &'a DestinationOpener,
    now_ns: Option<u64>,
    writer: Option<VolumeWriter>,
    result: PassResult,
}

impl RewriteVisitor<'_> {
    fn limit_reached(&self) -> bool {
        self.options
            .limit
            .is_some_and(|limit| self.result.processed >= limit)
    }
}

impl VolumeVisitor for RewriteVisitor<'_> {
    fn visit_super_block(&mut self, super_block: &SuperBlock) -> CoreResult<()> {
        let writer = VolumeWriter::create_with(
            self.options.destination_files(),
            super_block,
            self.opener,
        )?;
        self.writer = Some(writer);
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
            Liveness::Missing => {
                debug!(vid = %self.options.vid, needle_id = %needle.id, offset, "needle already deleted");
                self.result.skipped_missing += 1;
                return Ok(VisitFlow::Continue);
            }
            Liveness::Stale => {
                debug!(vid = %self.options.vid, needle_id = %needle.id, offset, "skipping stale needle");
                self.result.skipped_stale += 1;
                return Ok(VisitFlow::Continue);
            }
            Liveness::Live => {}
        }

        if self.limit_reached() {
            self.result.stopped_early = true;
            return Ok(VisitFlow::Stop);
        }

        if let Some(matched) = self.result.matched.as_mut() {
            if self.policy.matches(needle) {
                *matched += 1;
            }
        }
        if !self.policy.keep(needle) {
            debug!(vid = %self.options.vid, needle_id = %needle.id, offset, "dropping needle");
            return Ok(VisitFlow::Continue);
        }

        let now_ns = self.now_ns.unwrap_or_else(unix_now_ns);
        let mut out = self.transformer.transform(needle, now_ns)?;
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| CoreError::invalid_operation("needle visited before super block"))?;
        let (new_offset, _) = writer.append(&mut out)?;
        debug!(
            vid = %self.options.vid,
            needle_id = %needle.id,
            offset,
            new_offset,
            "copied needle"
        );
        self.result.processed += 1;

        if self.limit_reached() {
            self.result.stopped_early = true;
            return Ok(VisitFlow::Stop);
        }
        Ok(VisitFlow::Continue)
    }
}
