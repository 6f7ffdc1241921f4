//! Error types for volkit core.

use std::fmt;
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// The stage of a destination write that failed.
///
/// Operators branch on this to tell a full disk from a logic error without
/// matching on message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStage {
    /// Creating the destination data log.
    CreateDestination,
    /// Serializing a needle into its write buffer.
    PrepareBuffer,
    /// Querying the destination log end.
    DetermineWriteOffset,
    /// Writing needle bytes.
    WriteBytes,
    /// Inserting the destination index entry.
    UpdateIndex,
    /// Persisting the destination index file.
    PersistIndex,
}

impl fmt::Display for WriteStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CreateDestination => "can not create new data file",
            Self::PrepareBuffer => "can not prepare needle's write buffer",
            Self::DetermineWriteOffset => "can not get write-offset",
            Self::WriteBytes => "can not write needle bytes",
            Self::UpdateIndex => "can not set k/v for needle map",
            Self::PersistIndex => "can not save needle map",
        };
        f.write_str(name)
    }
}

/// Errors that can occur in volkit core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] volkit_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The data log is corrupted.
    #[error("volume corruption at offset {offset}: {message}")]
    Corrupted {
        /// Byte offset of the offending needle.
        offset: u64,
        /// Description of the corruption.
        message: String,
    },

    /// Checksum mismatch detected.
    #[error("checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Checksum stored in the log.
        expected: u32,
        /// Checksum computed over the data.
        actual: u32,
    },

    /// Invalid file format or version.
    #[error("invalid format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// A destination write failed at a specific stage.
    #[error("{stage}: {source}")]
    Stage {
        /// The stage that failed.
        stage: WriteStage,
        /// The underlying failure.
        #[source]
        source: Box<CoreError>,
    },

    /// Operation not permitted with the given options.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },

    /// Encryption was requested without a key.
    #[error("cipher key is required")]
    MissingCipherKey,

    /// Invalid key size.
    #[error("invalid key size: expected 16, 24 or 32 bytes, got {actual}")]
    InvalidKeySize {
        /// Actual size in bytes.
        actual: usize,
    },

    /// The cipher key could not be decoded.
    #[error("invalid cipher key: {message}")]
    InvalidKey {
        /// Description of the failure.
        message: String,
    },

    /// Encryption failed.
    #[error("encryption failed: {message}")]
    EncryptionFailed {
        /// Description of the failure.
        message: String,
    },

    /// Decryption failed.
    #[error("decryption failed: {message}")]
    DecryptionFailed {
        /// Description of the failure.
        message: String,
    },

    /// The time source could not produce a timestamp.
    #[error("time source failed: {message}")]
    TimeSource {
        /// Description of the failure.
        message: String,
    },

    /// The volume is locked by another process.
    #[error("volume locked: another process has exclusive access")]
    VolumeLocked,
}

impl CoreError {
    /// Creates a corruption error for the needle at `offset`.
    pub fn corrupted(offset: u64, message: impl Into<String>) -> Self {
        Self::Corrupted {
            offset,
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Wraps an error with the write stage it happened in.
    pub fn at_stage(stage: WriteStage, source: impl Into<CoreError>) -> Self {
        Self::Stage {
            stage,
            source: Box::new(source.into()),
        }
    }

    /// Returns the failed write stage, if this is a stage error.
    #[must_use]
    pub fn stage(&self) -> Option<WriteStage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Returns true for errors caused by a damaged data log.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::Corrupted { .. } | Self::ChecksumMismatch { .. } | Self::InvalidFormat { .. }
        )
    }

    /// Creates an encryption failed error.
    pub fn encryption_failed(message: impl Into<String>) -> Self {
        Self::EncryptionFailed {
            message: message.into(),
        }
    }

    /// Creates a decryption failed error.
    pub fn decryption_failed(message: impl Into<String>) -> Self {
        Self::DecryptionFailed {
            message: message.into(),
        }
    }

    /// Creates a time source error.
    pub fn time_source(message: impl Into<String>) -> Self {
        Self::TimeSource {
            message: message.into(),
        }
    }
}
