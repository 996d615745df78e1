//! Change-Feed Engine Error Hierarchy
//!
//! Defines error types for the change-feed processing engine, categorized by
//! the layer they originate from: source access, embedded storage, and
//! per-partition processing.
//!
//! Lease contention is deliberately NOT an error: concurrent acquisition is a
//! normal outcome and is modeled as [`crate::AcquireOutcome::Contended`].

use config::ConfigError;
use tokio::task::JoinError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration validation failures (fatal, fail fast at startup)
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Source collection access failures
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Embedded database and serialization failures
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Per-partition processing failures
    #[error(transparent)]
    Processing(#[from] ProcessingError),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Transient source failure; callers may retry with backoff
    #[error("Source unavailable: {0}")]
    Unavailable(String),

    /// Insert rejected because the record identifier already exists
    #[error("Record with id {id} already exists")]
    Conflict { id: String },

    /// Continuation token is stale or corrupt; not retryable
    #[error("Invalid continuation token for partition {partition}")]
    InvalidToken { partition: String },

    /// Collection was never created on this store
    #[error("Collection {0} does not exist")]
    CollectionNotFound(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Disk I/O failures
    #[error(transparent)]
    IoError(#[from] std::io::Error),

    /// Serialization failures for persisted data
    #[error(transparent)]
    BincodeError(#[from] bincode::Error),

    /// Embedded database errors
    #[error("Embedded database error: {0}")]
    DbError(String),

    /// Stored bytes that no longer decode to the expected shape
    #[error("Data corruption detected at {location}")]
    DataCorruption { location: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    /// Ownership of the partition was lost mid-operation. The in-flight batch
    /// was already handled; only the checkpoint is abandoned.
    #[error("Lease for partition {partition} lost mid-operation")]
    LeaseLost { partition: String },

    /// Handler kept failing for the same batch until the retry limit.
    /// Fatal for the partition: its checkpoint stops advancing.
    #[error("Handler failed after {attempts} attempts for partition {partition}")]
    HandlerExhausted { partition: String, attempts: usize },

    /// Shutdown signal channel closed unexpectedly
    #[error("Shutdown signal channel closed")]
    ShutdownChannelClosed,

    /// Background task failed
    #[error("Background task failed: {0}")]
    TaskFailed(#[from] JoinError),
}

/// Failure reported by a user-supplied [`crate::ChangeHandler`].
///
/// The engine retries the same batch per policy; the message is only used for
/// operator-facing logs.
#[derive(Debug, thiserror::Error)]
#[error("Handler failure: {message}")]
pub struct HandlerError {
    pub message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// ============== Conversion Implementations ============== //
impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        StorageError::DbError(err.to_string())
    }
}

impl From<sled::Error> for Error {
    fn from(err: sled::Error) -> Self {
        StorageError::DbError(err.to_string()).into()
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        StorageError::BincodeError(err).into()
    }
}

impl From<JoinError> for Error {
    fn from(err: JoinError) -> Self {
        ProcessingError::TaskFailed(err).into()
    }
}
