//! Remote volume service abstraction.

use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use volkit_core::scan::NeedleIterator;
use volkit_core::{Needle, SuperBlock, VolumeId};
use volkit_storage::{InMemoryBackend, StorageBackend};

/// A volume server holding a replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Address the server is reached at.
    pub url: String,
    /// Address advertised to clients.
    #[serde(rename = "publicUrl", default)]
    pub public_url: String,
}

impl Location {
    /// Creates a location whose public address is `url`.
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            public_url: url.clone(),
            url,
        }
    }
}

/// State of a remote replica, as needed to bring a local copy up to date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSyncStatus {
    /// TTL string such as `3d`; empty for none.
    #[serde(default)]
    pub ttl: String,
    /// Replica placement string such as `001`.
    #[serde(default)]
    pub replication: String,
    /// Compaction revision of the remote super block.
    pub compact_revision: u16,
    /// Length of the remote data log.
    pub tail_offset: u64,
}

/// A volume reported by the master.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSummary {
    /// Collection name.
    #[serde(default)]
    pub collection: String,
    /// Volume ID.
    pub id: u32,
    /// Whether the volume accepts writes.
    #[serde(default)]
    pub read_only: bool,
}

/// The remote side of a backup: master lookups and volume server reads.
pub trait VolumeService: Send + Sync {
    /// Finds the servers holding `vid`.
    fn lookup(&self, vid: VolumeId) -> SyncResult<Vec<Location>>;

    /// Reads the replica state of `vid` on `location`.
    fn sync_status(&self, location: &Location, vid: VolumeId) -> SyncResult<VolumeSyncStatus>;

    /// Fetches the raw needles of `vid` appended after `since_ns`.
    ///
    /// `since_ns == 0` fetches every needle.
    fn fetch_incremental(
        &self,
        location: &Location,
        vid: VolumeId,
        since_ns: u64,
    ) -> SyncResult<Vec<u8>>;

    /// Lists every volume replica the master knows of.
    fn list_volumes(&self) -> SyncResult<Vec<VolumeSummary>>;
}

/// A call received by [`MockVolumeService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceCall {
    /// [`VolumeService::lookup`].
    Lookup(VolumeId),
    /// [`VolumeService::sync_status`].
    SyncStatus(VolumeId),
    /// [`VolumeService::fetch_incremental`].
    FetchIncremental {
        /// Volume fetched.
        vid: VolumeId,
        /// Cursor sent.
        since_ns: u64,
    },
    /// [`VolumeService::list_volumes`].
    ListVolumes,
}

struct RemoteVolume {
    collection: String,
    read_only: bool,
    super_block: SuperBlock,
    log: InMemoryBackend,
    tail_offset: Option<u64>,
}

/// An in-memory volume service for testing.
///
/// Holds complete remote data logs, records every call and can be told to
/// fail the next few calls.
#[derive(Default)]
pub struct MockVolumeService {
    volumes: Mutex<BTreeMap<VolumeId, RemoteVolume>>,
    calls: Mutex<Vec<ServiceCall>>,
    failures: Mutex<u32>,
}

/// Address every mock volume is served from.
pub const MOCK_LOCATION: &str = "mock-volume-server:8080";

impl MockVolumeService {
    /// Creates an empty service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an empty remote volume.
    pub fn add_volume(
        &self,
        collection: impl Into<String>,
        vid: VolumeId,
        super_block: SuperBlock,
    ) -> SyncResult<()> {
        let mut log = InMemoryBackend::new();
        log.write_at(&super_block.to_bytes()?, 0)
            .map_err(volkit_core::CoreError::from)?;
        self.volumes.lock().insert(
            vid,
            RemoteVolume {
                collection: collection.into(),
                read_only: false,
                super_block,
                log,
                tail_offset: None,
            },
        );
        Ok(())
    }

    /// Appends `needle` to the remote log and returns its offset.
    pub fn append_needle(&self, vid: VolumeId, needle: &mut Needle) -> SyncResult<u64> {
        self.with_volume(vid, |volume| {
            let bytes = needle.prepare_write_buffer(volume.super_block.version)?;
            let offset = volume
                .log
                .append(&bytes)
                .map_err(volkit_core::CoreError::from)?;
            Ok(offset)
        })
    }

    /// Marks a remote volume read-only.
    pub fn set_read_only(&self, vid: VolumeId, read_only: bool) -> SyncResult<()> {
        self.with_volume(vid, |volume| {
            volume.read_only = read_only;
            Ok(())
        })
    }

    /// Changes the compaction revision reported for a volume.
    pub fn set_compaction_revision(&self, vid: VolumeId, revision: u16) -> SyncResult<()> {
        self.with_volume(vid, |volume| {
            volume.super_block.compaction_revision = revision;
            let bytes = volume.super_block.to_bytes()?;
            volume
                .log
                .write_at(&bytes, 0)
                .map_err(volkit_core::CoreError::from)?;
            Ok(())
        })
    }

    /// Reports `tail_offset` instead of the real log length.
    pub fn set_tail_offset(&self, vid: VolumeId, tail_offset: u64) -> SyncResult<()> {
        self.with_volume(vid, |volume| {
            volume.tail_offset = Some(tail_offset);
            Ok(())
        })
    }

    /// Length of the remote data log.
    pub fn log_size(&self, vid: VolumeId) -> SyncResult<u64> {
        self.with_volume(vid, |volume| {
            Ok(volume.log.size().map_err(volkit_core::CoreError::from)?)
        })
    }

    /// Fails the next `n` calls with a retryable transport error.
    pub fn fail_next(&self, n: u32) {
        *self.failures.lock() = n;
    }

    /// Calls received so far.
    pub fn calls(&self) -> Vec<ServiceCall> {
        self.calls.lock().clone()
    }

    /// Forgets the calls received so far.
    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    fn record(&self, call: ServiceCall) -> SyncResult<()> {
        self.calls.lock().push(call);
        let mut failures = self.failures.lock();
        if *failures > 0 {
            *failures -= 1;
            return Err(SyncError::transport_retryable("injected failure"));
        }
        Ok(())
    }

    fn with_volume<T>(
        &self,
        vid: VolumeId,
        f: impl FnOnce(&mut RemoteVolume) -> SyncResult<T>,
    ) -> SyncResult<T> {
        let mut volumes = self.volumes.lock();
        let volume = volumes
            .get_mut(&vid)
            .ok_or_else(|| SyncError::ServerError(format!("volume {vid} not found")))?;
        f(volume)
    }
}

impl VolumeService for MockVolumeService {
    fn lookup(&self, vid: VolumeId) -> SyncResult<Vec<Location>> {
        self.record(ServiceCall::Lookup(vid))?;
        if self.volumes.lock().contains_key(&vid) {
            Ok(vec![Location::new(MOCK_LOCATION)])
        } else {
            Ok(Vec::new())
        }
    }

    fn sync_status(&self, _location: &Location, vid: VolumeId) -> SyncResult<VolumeSyncStatus> {
        self.record(ServiceCall::SyncStatus(vid))?;
        self.with_volume(vid, |volume| {
            let size = volume.log.size().map_err(volkit_core::CoreError::from)?;
            Ok(VolumeSyncStatus {
                ttl: volume.super_block.ttl.to_string(),
                replication: volume.super_block.replica_placement.to_string(),
                compact_revision: volume.super_block.compaction_revision,
                tail_offset: volume.tail_offset.unwrap_or(size),
            })
        })
    }

    fn fetch_incremental(
        &self,
        _location: &Location,
        vid: VolumeId,
        since_ns: u64,
    ) -> SyncResult<Vec<u8>> {
        self.record(ServiceCall::FetchIncremental { vid, since_ns })?;
        self.with_volume(vid, |volume| {
            let mut bytes = Vec::new();
            let start = volume.super_block.block_size();
            for scanned in NeedleIterator::new(&volume.log, volume.super_block.version, start, true)? {
                let scanned = scanned?;
                if since_ns == 0 || scanned.needle.append_at_ns > since_ns {
                    bytes.extend_from_slice(&scanned.header);
                    bytes.extend_from_slice(&scanned.body);
                }
            }
            Ok(bytes)
        })
    }

    fn list_volumes(&self) -> SyncResult<Vec<VolumeSummary>> {
        self.record(ServiceCall::ListVolumes)?;
        Ok(self
            .volumes
            .lock()
            .iter()
            .map(|(vid, volume)| VolumeSummary {
                collection: volume.collection.clone(),
                id: vid.as_u32(),
                read_only: volume.read_only,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use volkit_core::{Cookie, NeedleId, ReplicaPlacement, Ttl, Version};

    fn super_block() -> SuperBlock {
        SuperBlock::new(Version::V3, ReplicaPlacement::from_byte(1), Ttl::EMPTY)
    }

    fn needle(id: u64, append_at_ns: u64) -> Needle {
        let mut needle = Needle::new(NeedleId(id), Cookie(7), format!("data-{id}").into_bytes());
        needle.append_at_ns = append_at_ns;
        needle
    }

    #[test]
    fn status_reflects_remote_log() {
        let service = MockVolumeService::new();
        let vid = VolumeId(3);
        service.add_volume("pics", vid, super_block()).unwrap();
        service.append_needle(vid, &mut needle(1, 100)).unwrap();
        service.set_compaction_revision(vid, 2).unwrap();

        let location = &service.lookup(vid).unwrap()[0];
        let status = service.sync_status(location, vid).unwrap();
        assert_eq!(status.replication, "001");
        assert_eq!(status.ttl, "");
        assert_eq!(status.compact_revision, 2);
        assert_eq!(status.tail_offset, service.log_size(vid).unwrap());
    }

    #[test]
    fn fetch_incremental_filters_by_append_time() {
        let service = MockVolumeService::new();
        let vid = VolumeId(1);
        service.add_volume("", vid, super_block()).unwrap();
        service.append_needle(vid, &mut needle(1, 100)).unwrap();
        let second = service.append_needle(vid, &mut needle(2, 200)).unwrap();
        let location = Location::new(MOCK_LOCATION);

        let all = service.fetch_incremental(&location, vid, 0).unwrap();
        let newer = service.fetch_incremental(&location, vid, 100).unwrap();
        let none = service.fetch_incremental(&location, vid, 200).unwrap();

        assert_eq!(all.len() as u64, service.log_size(vid).unwrap() - 8);
        assert_eq!(newer.len() as u64, service.log_size(vid).unwrap() - second);
        assert!(none.is_empty());
    }

    #[test]
    fn unknown_volume_has_no_location() {
        let service = MockVolumeService::new();
        assert!(service.lookup(VolumeId(9)).unwrap().is_empty());
    }

    #[test]
    fn injected_failures_are_consumed() {
        let service = MockVolumeService::new();
        service.fail_next(2);
        assert!(service.list_volumes().is_err());
        assert!(service.list_volumes().is_err());
        assert!(service.list_volumes().is_ok());
        assert_eq!(service.calls().len(), 3);
    }

    #[test]
    fn sync_status_json_field_names() {
        let status: VolumeSyncStatus = serde_json::from_str(
            r#"{"ttl":"3d","replication":"010","compactRevision":4,"tailOffset":4096}"#,
        )
        .unwrap();
        assert_eq!(status.ttl, "3d");
        assert_eq!(status.compact_revision, 4);
        assert_eq!(status.tail_offset, 4096);
    }
}
