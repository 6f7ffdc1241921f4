//! # volkit sync
//!
//! Incremental backup of volumes from a remote cluster into local replicas.
//!
//! This crate provides:
//! - The [`VolumeService`] seam to the remote master and volume servers,
//!   with an HTTP implementation and an in-memory mock
//! - [`VolumeSyncer`], which brings one local replica up to date
//! - [`RetryDriver`], which retries a sync after a [`RecoveryAction`]
//! - [`BackupBatch`], which backs up many volumes on worker threads
//!
//! ## Example
//!
//! ```rust,no_run
//! use volkit_sync::{BackupBatch, BackupConfig, HttpVolumeService, ReqwestClient};
//!
//! let config = BackupConfig::new("/data/backup", "localhost:9333").with_workers(4);
//! let client = ReqwestClient::new(config.timeout).unwrap();
//! let service = HttpVolumeService::new(&config.master, client);
//! let report = BackupBatch::new(&service, &config).run().unwrap();
//! println!("{} volumes synced", report.succeeded());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod batch;
mod config;
mod error;
mod http;
mod orchestrator;
mod retry;
mod service;

pub use batch::{BackupBatch, BatchReport, VolumeOutcome};
pub use config::{BackupConfig, RetryConfig, VolumeTarget};
pub use error::{SyncError, SyncResult};
pub use http::{http_url, HttpClient, HttpTimeSource, HttpVolumeService, ReqwestClient};
pub use orchestrator::{SyncReport, SyncStep, VolumeSyncer};
pub use retry::{NoRecovery, RecoveryAction, RemoveVolumeFiles, RetryDriver};
pub use service::{
    Location, MockVolumeService, ServiceCall, VolumeService, VolumeSummary, VolumeSyncStatus,
    MOCK_LOCATION,
};
