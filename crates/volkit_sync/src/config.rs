//! Configuration for volume backup.

use crate::error::{SyncError, SyncResult};
use rand::Rng;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use volkit_core::{ReplicaPlacement, VolumeFiles, VolumeId};

/// A volume to back up.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VolumeTarget {
    /// Collection name; empty for the default collection.
    pub collection: String,
    /// Volume ID.
    pub vid: VolumeId,
}

impl VolumeTarget {
    /// Creates a target.
    pub fn new(collection: impl Into<String>, vid: VolumeId) -> Self {
        Self {
            collection: collection.into(),
            vid,
        }
    }

    /// Local files of this volume under `dir`.
    pub fn files(&self, dir: &Path) -> VolumeFiles {
        VolumeFiles::new(dir, self.collection.as_str(), self.vid)
    }
}

impl fmt::Display for VolumeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.collection.is_empty() {
            write!(f, "{}", self.vid)
        } else {
            write!(f, "{}_{}", self.collection, self.vid)
        }
    }
}

/// Parses `vid` or `collection:vid`.
impl FromStr for VolumeTarget {
    type Err = SyncError;

    fn from_str(s: &str) -> SyncResult<Self> {
        let (collection, vid) = match s.rsplit_once(':') {
            Some((collection, vid)) => (collection, vid),
            None => ("", s),
        };
        let vid = vid
            .trim()
            .parse::<u32>()
            .map_err(|_| SyncError::InvalidConfig(format!("invalid volume id in {s:?}")))?;
        Ok(Self::new(collection.trim(), VolumeId(vid)))
    }
}

/// Configuration for a backup run.
#[derive(Debug, Clone)]
pub struct BackupConfig {
    /// Directory holding the local replicas.
    pub dir: PathBuf,
    /// Master server address, with or without scheme.
    pub master: String,
    /// Replica placement for new local volumes; the remote's when unset.
    pub replication: Option<ReplicaPlacement>,
    /// Volumes to back up; every volume the master lists when empty.
    pub volumes: Vec<VolumeTarget>,
    /// Leave out read-only volumes when listing from the master.
    pub skip_read_only: bool,
    /// Volumes synced concurrently.
    pub workers: usize,
    /// Retry configuration, per volume.
    pub retry: RetryConfig,
    /// Request timeout.
    pub timeout: Duration,
}

impl BackupConfig {
    /// Creates a configuration backing up into `dir` from `master`.
    pub fn new(dir: impl Into<PathBuf>, master: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            master: master.into(),
            replication: None,
            volumes: Vec::new(),
            skip_read_only: false,
            workers: 1,
            retry: RetryConfig::default(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Overrides the replica placement of new local volumes.
    pub fn with_replication(mut self, replication: ReplicaPlacement) -> Self {
        self.replication = Some(replication);
        self
    }

    /// Adds a volume to back up.
    pub fn with_volume(mut self, target: VolumeTarget) -> Self {
        self.volumes.push(target);
        self
    }

    /// Sets whether read-only volumes are skipped.
    pub fn with_skip_read_only(mut self, skip: bool) -> Self {
        self.skip_read_only = skip;
        self
    }

    /// Sets the number of concurrent workers; at least one is used.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self::new(".", "localhost:9333")
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first included.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Delays vary randomly by up to this fraction either way.
    pub randomization_factor: f64,
}

impl RetryConfig {
    /// Creates a retry configuration with `max_attempts` attempts.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 1.5,
            randomization_factor: 0.5,
        }
    }

    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self::new(1).no_delay()
    }

    /// Removes all waiting between attempts.
    pub fn no_delay(mut self) -> Self {
        self.initial_delay = Duration::ZERO;
        self.max_delay = Duration::ZERO;
        self.randomization_factor = 0.0;
        self
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Sets the randomization factor, clamped to `0.0..=1.0`.
    pub fn with_randomization_factor(mut self, factor: f64) -> Self {
        self.randomization_factor = factor.clamp(0.0, 1.0);
        self
    }

    /// Calculates the delay before a given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_delay = self.initial_delay.as_secs_f64()
            * self
                .backoff_multiplier
                .powi(attempt.saturating_sub(1).min(i32::MAX as u32) as i32);
        let delay_secs = base_delay.min(self.max_delay.as_secs_f64());

        if self.randomization_factor > 0.0 && delay_secs > 0.0 {
            let spread = self.randomization_factor;
            let scale = rand::thread_rng().gen_range(1.0 - spread..=1.0 + spread);
            Duration::from_secs_f64(delay_secs * scale)
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(6)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_config_builder() {
        let config = BackupConfig::new("/data/backup", "master:9333")
            .with_replication("010".parse().unwrap())
            .with_volume(VolumeTarget::new("pics", VolumeId(3)))
            .with_skip_read_only(true)
            .with_workers(0)
            .with_timeout(Duration::from_secs(5));

        assert_eq!(config.dir, PathBuf::from("/data/backup"));
        assert_eq!(config.master, "master:9333");
        assert_eq!(config.replication.unwrap().to_string(), "010");
        assert_eq!(config.volumes.len(), 1);
        assert!(config.skip_read_only);
        assert_eq!(config.workers, 1);
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.retry.max_attempts, 6);
    }

    #[test]
    fn volume_target_parse() {
        assert_eq!(
            "7".parse::<VolumeTarget>().unwrap(),
            VolumeTarget::new("", VolumeId(7))
        );
        assert_eq!(
            "pics:12".parse::<VolumeTarget>().unwrap(),
            VolumeTarget::new("pics", VolumeId(12))
        );
        assert!("pics:x".parse::<VolumeTarget>().is_err());
    }

    #[test]
    fn volume_target_display_matches_file_names() {
        let dir = Path::new("/tmp");
        let target = VolumeTarget::new("pics", VolumeId(12));
        assert_eq!(target.to_string(), "pics_12");
        assert_eq!(target.files(dir).dat_path(), dir.join("pics_12.dat"));
        assert_eq!(VolumeTarget::new("", VolumeId(4)).to_string(), "4");
    }

    #[test]
    fn retry_config_no_retry() {
        let config = RetryConfig::no_retry();
        assert_eq!(config.max_attempts, 1);
        assert_eq!(config.delay_for_attempt(3), Duration::ZERO);
    }

    #[test]
    fn retry_delay_calculation() {
        let config = RetryConfig::new(5)
            .with_initial_delay(Duration::from_millis(100))
            .with_backoff_multiplier(2.0)
            .with_randomization_factor(0.0);

        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(400));
    }

    #[test]
    fn retry_delay_jitter_bounds() {
        let config = RetryConfig::new(5)
            .with_initial_delay(Duration::from_millis(100))
            .with_randomization_factor(0.5);

        for _ in 0..50 {
            let delay = config.delay_for_attempt(1);
            assert!(delay >= Duration::from_millis(50));
            assert!(delay <= Duration::from_millis(150));
        }
    }

    #[test]
    fn retry_delay_respects_max() {
        let config = RetryConfig::new(10)
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5))
            .with_backoff_multiplier(10.0)
            .with_randomization_factor(0.0);

        assert_eq!(config.delay_for_attempt(5), Duration::from_secs(5));
    }
}
