//! Backup command implementation.

use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use volkit_sync::{
    BackupBatch, BackupConfig, BatchReport, HttpVolumeService, ReqwestClient, RetryConfig,
    VolumeTarget,
};

/// Backup flags.
#[derive(Debug, Clone)]
pub struct BackupArgs {
    /// Local replica directory.
    pub dir: PathBuf,
    /// Master address.
    pub master: String,
    /// Explicit targets; empty means every listed volume.
    pub volumes: Vec<VolumeTarget>,
    /// Replica placement override.
    pub replication: Option<String>,
    /// Skip read-only volumes.
    pub skip_read_only: bool,
    /// Concurrent volumes.
    pub workers: usize,
    /// Attempts per volume.
    pub attempts: u32,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl BackupArgs {
    /// Builds the backup configuration.
    pub fn config(&self) -> Result<BackupConfig, Box<dyn std::error::Error>> {
        let mut config = BackupConfig::new(&self.dir, &self.master)
            .with_skip_read_only(self.skip_read_only)
            .with_workers(self.workers)
            .with_retry(RetryConfig::new(self.attempts))
            .with_timeout(Duration::from_secs(self.timeout_secs));
        if let Some(replication) = &self.replication {
            config = config.with_replication(replication.parse()?);
        }
        for target in &self.volumes {
            config = config.with_volume(target.clone());
        }
        Ok(config)
    }
}

/// Runs the backup command. Fails if any volume failed.
pub fn run(args: &BackupArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = args.config()?;
    let client = ReqwestClient::new(config.timeout)?;
    let service = HttpVolumeService::new(&config.master, client);
    info!(master = %service.master_url(), dir = %config.dir.display(), "starting backup");

    let report = BackupBatch::new(&service, &config).run()?;
    print_report(&report);

    if report.is_success() {
        Ok(())
    } else {
        Err(format!("{} of {} volumes failed", report.failed(), report.outcomes.len()).into())
    }
}

fn print_report(report: &BatchReport) {
    println!(
        "{:<24} {:<8} {:>10} {:>14} {:>8}",
        "VOLUME", "STATUS", "NEEDLES", "SIZE", "REV"
    );
    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(sync) => {
                let status = if sync.recreated {
                    "reset"
                } else if sync.compacted {
                    "compact"
                } else {
                    "ok"
                };
                println!(
                    "{:<24} {:<8} {:>10} {:>14} {:>8}",
                    outcome.target.to_string(),
                    status,
                    sync.needles_applied,
                    sync.data_size,
                    sync.compaction_revision
                );
            }
            Err(e) => {
                println!("{:<24} {:<8} {}", outcome.target.to_string(), "FAILED", e);
            }
        }
    }
    println!();
    println!(
        "{} volumes synced, {} failed",
        report.succeeded(),
        report.failed()
    );
}
