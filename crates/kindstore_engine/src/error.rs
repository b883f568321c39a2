//! Engine error types.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Failures raised by stores and the engine registry.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Backend failure.
    #[error("storage error: {0}")]
    Storage(#[from] kindstore_storage::StorageError),

    /// Directory-level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A record in the middle of a store log failed validation.
    #[error("store log corrupted at offset {offset}: {message}")]
    Corrupted {
        /// Offset of the bad record.
        offset: u64,
        /// What failed.
        message: String,
    },

    /// The store was closed, or sealed for a snapshot when writing; reopen it
    /// through the engine.
    #[error("store is closed: {}", .path.display())]
    Closed {
        /// Directory of the closed store.
        path: PathBuf,
    },

    /// The directory already has a live store in this engine.
    #[error("store already open: {}", .path.display())]
    AlreadyOpen {
        /// Directory of the live store.
        path: PathBuf,
    },

    /// Key longer than the record format allows.
    #[error("key of {len} bytes exceeds the {max} byte limit")]
    KeyTooLarge {
        /// Offending key length.
        len: usize,
        /// Maximum accepted key length.
        max: usize,
    },

    /// Key and value together exceed what a record length can describe.
    #[error("value of {len} bytes exceeds the {max} byte limit for its key")]
    RecordTooLarge {
        /// Offending value length.
        len: usize,
        /// Longest value accepted with that key.
        max: usize,
    },

    /// Writing a store's snapshot failed.
    #[error("snapshot of {} failed: {source}", .path.display())]
    Snapshot {
        /// Directory of the store being snapshotted.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: Box<EngineError>,
    },
}

impl EngineError {
    /// Creates a corruption error.
    pub fn corrupted(offset: u64, message: impl Into<String>) -> Self {
        Self::Corrupted {
            offset,
            message: message.into(),
        }
    }

    /// Returns true for [`EngineError::Closed`].
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed { .. })
    }
}
