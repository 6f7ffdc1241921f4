//! Retries with a recovery step after each failed attempt.

use crate::config::RetryConfig;
use crate::error::{SyncError, SyncResult};
use std::thread;
use tracing::{info, warn};
use volkit_core::{remove_volume_files, VolumeFiles};

/// Work done after a failed attempt, before the next one.
pub trait RecoveryAction {
    /// Prepares for another attempt after `error`.
    fn recover(&self, attempt: u32, error: &SyncError) -> SyncResult<()>;
}

/// Does nothing between attempts.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRecovery;

impl RecoveryAction for NoRecovery {
    fn recover(&self, _attempt: u32, _error: &SyncError) -> SyncResult<()> {
        Ok(())
    }
}

/// Deletes the local replica so the next attempt pulls it from scratch.
#[derive(Debug, Clone)]
pub struct RemoveVolumeFiles {
    files: VolumeFiles,
}

impl RemoveVolumeFiles {
    /// Creates the action for the volume at `files`.
    pub fn new(files: VolumeFiles) -> Self {
        Self { files }
    }
}

impl RecoveryAction for RemoveVolumeFiles {
    fn recover(&self, _attempt: u32, _error: &SyncError) -> SyncResult<()> {
        info!(
            dat = %self.files.dat_path().display(),
            idx = %self.files.idx_path().display(),
            "removing local replica"
        );
        remove_volume_files(&self.files)?;
        Ok(())
    }
}

/// Runs an operation until it succeeds or the attempts run out.
///
/// Every error is retried. After every failed attempt, the last one
/// included, the recovery action runs; between attempts the driver then
/// sleeps for [`RetryConfig::delay_for_attempt`]. A failing recovery action
/// is logged and does not end the retries.
#[derive(Debug, Clone)]
pub struct RetryDriver {
    config: RetryConfig,
}

impl RetryDriver {
    /// Creates a driver.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Runs `operation`, passing the 0-indexed attempt number.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::RetriesExhausted`] holding the last error once
    /// every attempt has failed.
    pub fn run<T, F>(&self, recovery: &dyn RecoveryAction, mut operation: F) -> SyncResult<T>
    where
        F: FnMut(u32) -> SyncResult<T>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            let error = match operation(attempt) {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if let Err(recovery_error) = recovery.recover(attempt, &error) {
                warn!(attempt, error = %recovery_error, "recovery action failed");
            }

            if attempt + 1 >= max_attempts {
                warn!(attempts = max_attempts, error = %error, "giving up");
                return Err(SyncError::RetriesExhausted {
                    attempts: max_attempts,
                    last: Box::new(error),
                });
            }

            attempt += 1;
            let delay = self.config.delay_for_attempt(attempt);
            warn!(
                attempt,
                retryable = error.is_retryable(),
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "attempt failed, retrying"
            );
            if !delay.is_zero() {
                thread::sleep(delay);
            }
        }
    }
}
