//! Error types for volume sync.

use thiserror::Error;
use volkit_core::{CoreError, VolumeId};

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while syncing volumes.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// A response could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The server answered with an error.
    #[error("server error: {0}")]
    ServerError(String),

    /// The master knows no location for the volume.
    #[error("no location found for volume {vid}")]
    NoLocation {
        /// The volume looked up.
        vid: VolumeId,
    },

    /// Local volume error.
    #[error("volume error: {0}")]
    Core(#[from] CoreError),

    /// Timeout.
    #[error("operation timed out")]
    Timeout,

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Every attempt failed.
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Attempts made.
        attempts: u32,
        /// Error of the final attempt.
        #[source]
        last: Box<SyncError>,
    },
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error is expected to clear up on its own.
    ///
    /// The retry driver retries every error; this only feeds its logs.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Timeout => true,
            SyncError::ServerError(_) => true,
            _ => false,
        }
    }
}
