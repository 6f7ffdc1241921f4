//! Brings one local replica up to date with its remote volume.
//!
//! A sync walks these steps in order:
//!
//! 1. [`SyncStep::Resolve`]: find a server holding the volume and read its
//!    state. A configured replica placement wins over the remote's.
//! 2. [`SyncStep::CompareRevision`]: a local compaction revision behind the
//!    remote one means the remote was compacted; compact locally and adopt
//!    the remote revision.
//! 3. [`SyncStep::CompareTail`]: a local log longer than the remote one has
//!    diverged; destroy it and start over from an empty volume.
//! 4. [`SyncStep::Incremental`]: fetch everything appended after the local
//!    volume's last append time and append it.

use crate::config::{BackupConfig, VolumeTarget};
use crate::error::{SyncError, SyncResult};
use crate::retry::{RemoveVolumeFiles, RetryDriver};
use crate::service::{Location, VolumeService, VolumeSyncStatus};
use std::fmt;
use tracing::{debug, info, warn};
use volkit_core::{SuperBlock, Ttl, Version, Volume};

/// A step of a volume sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStep {
    /// Locating the volume and reading its remote state.
    Resolve,
    /// Comparing compaction revisions.
    CompareRevision,
    /// Comparing log lengths.
    CompareTail,
    /// Fetching and appending new needles.
    Incremental,
}

impl fmt::Display for SyncStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Resolve => "resolve",
            Self::CompareRevision => "compare-revision",
            Self::CompareTail => "compare-tail",
            Self::Incremental => "incremental",
        };
        f.write_str(name)
    }
}

/// What a successful sync did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Volume synced.
    pub target: VolumeTarget,
    /// Server the volume was fetched from.
    pub location: String,
    /// Whether the local volume was compacted first.
    pub compacted: bool,
    /// Whether the local volume was destroyed and recreated.
    pub recreated: bool,
    /// Cursor sent with the incremental fetch.
    pub since_ns: u64,
    /// Needles appended.
    pub needles_applied: u64,
    /// Bytes appended.
    pub bytes_applied: u64,
    /// Local log length afterwards.
    pub data_size: u64,
    /// Local compaction revision afterwards.
    pub compaction_revision: u16,
}

/// Syncs local replicas from a [`VolumeService`].
pub struct VolumeSyncer<'a, S: VolumeService + ?Sized> {
    service: &'a S,
    config: &'a BackupConfig,
}

impl<'a, S: VolumeService + ?Sized> VolumeSyncer<'a, S> {
    /// Creates a syncer.
    pub fn new(service: &'a S, config: &'a BackupConfig) -> Self {
        Self { service, config }
    }

    /// Syncs `target` with retries, removing the local replica after each
    /// failed attempt.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::RetriesExhausted`] if every attempt failed.
    pub fn sync_with_retry(&self, target: &VolumeTarget) -> SyncResult<SyncReport> {
        let recovery = RemoveVolumeFiles::new(target.files(&self.config.dir));
        RetryDriver::new(self.config.retry.clone()).run(&recovery, |attempt| {
            debug!(volume = %target, attempt, "syncing volume");
            self.sync_once(target)
        })
    }

    /// Runs every step once.
    ///
    /// # Errors
    ///
    /// Returns the first error of any step.
    pub fn sync_once(&self, target: &VolumeTarget) -> SyncResult<SyncReport> {
        let vid = target.vid;
        let files = target.files(&self.config.dir);

        debug!(volume = %target, step = %SyncStep::Resolve, "sync step");
        let (location, status) = self.resolve(target)?;
        let super_block = self.local_super_block(&status)?;
        let mut volume = Volume::open_or_create(files.clone(), super_block.clone())?;

        debug!(volume = %target, step = %SyncStep::CompareRevision, "sync step");
        let mut compacted = false;
        if volume.super_block().compaction_revision < status.compact_revision {
            info!(
                vid = %vid,
                local = volume.super_block().compaction_revision,
                remote = status.compact_revision,
                "remote volume was compacted, compacting local replica"
            );
            volume = volume.compact()?;
            volume.set_compaction_revision(status.compact_revision)?;
            compacted = true;
        }

        debug!(volume = %target, step = %SyncStep::CompareTail, "sync step");
        let mut recreated = false;
        let local_size = volume.data_size()?;
        if local_size > status.tail_offset {
            warn!(
                vid = %vid,
                local_size,
                remote_tail = status.tail_offset,
                "local replica is ahead of remote, recreating it empty"
            );
            volume.destroy()?;
            let mut fresh = super_block;
            fresh.compaction_revision = status.compact_revision;
            volume = Volume::create(files, fresh)?;
            recreated = true;
        }

        debug!(volume = %target, step = %SyncStep::Incremental, "sync step");
        let since_ns = volume.last_append_at_ns()?;
        let bytes = self.service.fetch_incremental(&location, vid, since_ns)?;
        let needles_applied = volume.append_incremental(&bytes)?;
        let data_size = volume.data_size()?;
        let compaction_revision = volume.super_block().compaction_revision;
        volume.close()?;

        info!(
            vid = %vid,
            location = %location.url,
            since_ns,
            needles = needles_applied,
            data_size,
            "volume synced"
        );
        Ok(SyncReport {
            target: target.clone(),
            location: location.url,
            compacted,
            recreated,
            since_ns,
            needles_applied,
            bytes_applied: bytes.len() as u64,
            data_size,
            compaction_revision,
        })
    }

    fn resolve(&self, target: &VolumeTarget) -> SyncResult<(Location, VolumeSyncStatus)> {
        let location = self
            .service
            .lookup(target.vid)?
            .into_iter()
            .next()
            .ok_or(SyncError::NoLocation { vid: target.vid })?;
        let status = self.service.sync_status(&location, target.vid)?;
        debug!(
            vid = %target.vid,
            location = %location.url,
            revision = status.compact_revision,
            tail = status.tail_offset,
            "resolved volume"
        );
        Ok((location, status))
    }

    fn local_super_block(&self, status: &VolumeSyncStatus) -> SyncResult<SuperBlock> {
        let ttl = Ttl::parse(&status.ttl)?;
        let replication = match self.config.replication {
            Some(replication) => replication,
            None => status.replication.parse()?,
        };
        Ok(SuperBlock::new(Version::CURRENT, replication, ttl))
    }
}
