//! Backs up many volumes on a bounded pool of worker threads.

use crate::config::{BackupConfig, VolumeTarget};
use crate::error::SyncResult;
use crate::orchestrator::{SyncReport, VolumeSyncer};
use crate::service::VolumeService;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use tracing::{error, info};
use volkit_core::VolumeId;

/// Result of backing up one volume.
#[derive(Debug)]
pub struct VolumeOutcome {
    /// Volume backed up.
    pub target: VolumeTarget,
    /// The sync report, or the error that ended the last attempt.
    pub result: SyncResult<SyncReport>,
}

impl VolumeOutcome {
    /// Returns true if the volume was synced.
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Outcomes of a batch, in target order.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// One outcome per target.
    pub outcomes: Vec<VolumeOutcome>,
}

impl BatchReport {
    /// Number of volumes synced.
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    /// Number of volumes that failed.
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// Returns true if every volume was synced.
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }
}

/// A backup of every configured (or listed) volume.
///
/// A failing volume never stops its siblings.
pub struct BackupBatch<'a, S: VolumeService + ?Sized> {
    service: &'a S,
    config: &'a BackupConfig,
}

impl<'a, S: VolumeService + ?Sized> BackupBatch<'a, S> {
    /// Creates a batch.
    pub fn new(service: &'a S, config: &'a BackupConfig) -> Self {
        Self { service, config }
    }

    /// Volumes to back up: the configured list, or every volume the
    /// service lists, each once.
    ///
    /// # Errors
    ///
    /// Returns an error if the volume listing fails.
    pub fn targets(&self) -> SyncResult<Vec<VolumeTarget>> {
        let targets: BTreeSet<VolumeTarget> = if self.config.volumes.is_empty() {
            self.service
                .list_volumes()?
                .into_iter()
                .filter(|summary| !(self.config.skip_read_only && summary.read_only))
                .map(|summary| VolumeTarget::new(summary.collection, VolumeId(summary.id)))
                .collect()
        } else {
            self.config.volumes.iter().cloned().collect()
        };
        Ok(targets.into_iter().collect())
    }

    /// Syncs every target.
    ///
    /// # Errors
    ///
    /// Returns an error only if the target list cannot be built or the
    /// backup directory cannot be created; per-volume failures are
    /// reported in the [`BatchReport`].
    pub fn run(&self) -> SyncResult<BatchReport> {
        let targets = self.targets()?;
        fs::create_dir_all(&self.config.dir).map_err(volkit_core::CoreError::from)?;
        let workers = self.config.workers.clamp(1, targets.len().max(1));
        info!(
            volumes = targets.len(),
            workers,
            dir = %self.config.dir.display(),
            "starting backup"
        );

        let syncer = VolumeSyncer::new(self.service, self.config);
        let next = AtomicUsize::new(0);
        let outcomes = Mutex::new(Vec::with_capacity(targets.len()));

        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    let i = next.fetch_add(1, Ordering::SeqCst);
                    let Some(target) = targets.get(i) else {
                        break;
                    };
                    let result = syncer.sync_with_retry(target);
                    if let Err(e) = &result {
                        error!(volume = %target, error = %e, "volume backup failed");
                    }
                    outcomes.lock().push(VolumeOutcome {
                        target: target.clone(),
                        result,
                    });
                });
            }
        });

        let mut outcomes = outcomes.into_inner();
        outcomes.sort_by(|a, b| a.target.cmp(&b.target));
        let report = BatchReport { outcomes };
        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            "backup complete"
        );
        Ok(report)
    }
}
