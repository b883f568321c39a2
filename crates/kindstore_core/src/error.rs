//! Error types for KindStore core.

use crate::kind::RecordKind;
use kindstore_codec::CodecError;
use kindstore_engine::EngineError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors surfaced by [`crate::Db`].
#[derive(Debug, Error)]
pub enum CoreError {
    /// Opening the database failed. No partially opened `Db` exists.
    #[error("initialization failed: {0}")]
    Initialization(#[from] InitializationError),

    /// No store is registered for the kind.
    #[error("no store registered for kind {kind}")]
    UnregisteredKind {
        /// The kind that was looked up.
        kind: RecordKind,
    },

    /// The kind failed to reopen after a compaction; only a fresh open recovers it.
    #[error("kind {kind} is degraded: {reason}")]
    KindDegraded {
        /// The degraded kind.
        kind: RecordKind,
        /// Why the reopen failed.
        reason: String,
    },

    /// Serializing a record failed.
    #[error("failed to encode {kind} record {key:?}: {source}")]
    Encode {
        /// Kind of the record.
        kind: RecordKind,
        /// Key being written.
        key: String,
        /// Codec failure.
        #[source]
        source: CodecError,
    },

    /// The stored bytes exist but do not decode as the requested type.
    #[error("failed to decode {kind} record {key:?}: {source}")]
    Decode {
        /// Kind of the record.
        kind: RecordKind,
        /// Key being read.
        key: String,
        /// Codec failure.
        #[source]
        source: CodecError,
    },

    /// The kind's store failed.
    #[error("{op} on {kind} record {key:?} failed: {source}")]
    Store {
        /// Operation name (`get`, `put`, `del`).
        op: &'static str,
        /// Kind of the record.
        kind: RecordKind,
        /// Key involved.
        key: String,
        /// Engine failure.
        #[source]
        source: EngineError,
    },

    /// Engine failure not tied to a single record.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// A compaction step failed.
    #[error("compaction failed: {0}")]
    Compaction(#[from] CompactionError),

    /// An earlier compaction left kinds unopened; backup is refused.
    #[error("database is degraded, kinds {kinds:?} failed to reopen")]
    Degraded {
        /// Kinds that are not routable.
        kinds: Vec<RecordKind>,
    },

    /// The database has been closed.
    #[error("database is closed")]
    DatabaseClosed,
}

impl CoreError {
    /// Wraps an engine failure for a record operation.
    pub fn store(op: &'static str, kind: &RecordKind, key: &str, source: EngineError) -> Self {
        Self::Store {
            op,
            kind: kind.clone(),
            key: key.to_owned(),
            source,
        }
    }

    /// Wraps a codec failure raised while encoding.
    pub fn encode(kind: &RecordKind, key: &str, source: CodecError) -> Self {
        Self::Encode {
            kind: kind.clone(),
            key: key.to_owned(),
            source,
        }
    }

    /// Wraps a codec failure raised while decoding.
    pub fn decode(kind: &RecordKind, key: &str, source: CodecError) -> Self {
        Self::Decode {
            kind: kind.clone(),
            key: key.to_owned(),
            source,
        }
    }

    /// Returns true when the record was present in its store.
    ///
    /// Only [`CoreError::Decode`] carries this: the bytes were found but are
    /// not a valid value of the requested type.
    #[must_use]
    pub fn found(&self) -> bool {
        matches!(self, Self::Decode { .. })
    }

    /// Returns true when the failure came from a store that is closed,
    /// as happens to records touched during a compaction swap.
    #[must_use]
    pub fn is_store_closed(&self) -> bool {
        matches!(self, Self::Store { source, .. } if source.is_closed())
    }
}

/// Reasons [`crate::Db::open`] or registry construction can fail.
#[derive(Debug, Error)]
pub enum InitializationError {
    /// No kinds were registered.
    #[error("no record kinds registered")]
    EmptyRegistry,

    /// The kind cannot name a store directory.
    #[error("invalid kind {kind:?}: {reason}")]
    InvalidKind {
        /// The rejected kind.
        kind: String,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// Two types declare the same kind.
    #[error("kind {kind} declared by both {first} and {second}")]
    DuplicateKind {
        /// The colliding kind.
        kind: RecordKind,
        /// Type registered first.
        first: &'static str,
        /// Type that collided.
        second: &'static str,
    },

    /// A registration sample did not survive encode then decode.
    #[error("sample for kind {kind} does not round-trip: {source}")]
    SampleRoundTrip {
        /// Kind being registered.
        kind: RecordKind,
        /// Codec failure.
        #[source]
        source: CodecError,
    },

    /// The root directory is missing, not a directory, or cannot be created.
    #[error("root {} unavailable: {source}", .path.display())]
    RootUnavailable {
        /// The root.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },

    /// Another instance holds the root's lock.
    #[error("root {} is locked by another instance", .path.display())]
    Locked {
        /// The lock file.
        path: PathBuf,
    },

    /// A kind's store could not be opened.
    #[error("failed to open store for kind {kind}: {source}")]
    StoreOpen {
        /// The kind.
        kind: RecordKind,
        /// Engine failure.
        #[source]
        source: EngineError,
    },

    /// Restoring `<root>.bak` after an interrupted swap failed.
    #[error("failed to restore {} to {}: {source}", .from.display(), .to.display())]
    Recovery {
        /// The backup directory.
        from: PathBuf,
        /// The root.
        to: PathBuf,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },

    /// The normalizing compaction run at open failed.
    #[error("compaction at open failed: {0}")]
    Compaction(#[source] Box<CoreError>),
}

impl InitializationError {
    pub(crate) fn root_unavailable(path: &std::path::Path, source: io::Error) -> Self {
        Self::RootUnavailable {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Failures of the backup protocol, by step.
#[derive(Debug, Error)]
pub enum CompactionError {
    /// Writing the snapshot failed; live stores were not touched.
    #[error("snapshot failed: {0}")]
    Snapshot(#[source] EngineError),

    /// The scratch directory lies inside the root, which is about to move.
    #[error("scratch directory {} is inside the database root {}", .tmp.display(), .root.display())]
    ScratchInsideRoot {
        /// The scratch directory.
        tmp: PathBuf,
        /// The root.
        root: PathBuf,
    },

    /// Moving the root aside failed; stores were reopened in place.
    #[error("failed to move {} to {}: {source}", .from.display(), .to.display())]
    Rename {
        /// The root.
        from: PathBuf,
        /// Intended backup location.
        to: PathBuf,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },

    /// Moving the snapshot into place failed.
    #[error(
        "failed to move snapshot {} to {}: {source} (rollback {})",
        .from.display(),
        .to.display(),
        outcome(.rolled_back)
    )]
    Swap {
        /// The snapshot directory.
        from: PathBuf,
        /// The root.
        to: PathBuf,
        /// Underlying failure.
        #[source]
        source: io::Error,
        /// Whether the previous root was restored from `<root>.bak`.
        rolled_back: bool,
    },

    /// Some kinds could not be reopened after the swap.
    #[error("{} kind(s) failed to reopen: {}", .failures.len(), describe(.failures))]
    Reopen {
        /// Each failed kind with the reason.
        failures: Vec<(RecordKind, String)>,
    },
}

impl CompactionError {
    /// Returns the kinds that were left degraded, if any.
    #[must_use]
    pub fn degraded_kinds(&self) -> Vec<RecordKind> {
        match self {
            Self::Reopen { failures } => failures.iter().map(|(k, _)| k.clone()).collect(),
            _ => Vec::new(),
        }
    }
}

fn outcome(rolled_back: &bool) -> &'static str {
    if *rolled_back {
        "succeeded"
    } else {
        "failed"
    }
}

fn describe(failures: &[(RecordKind, String)]) -> String {
    failures
        .iter()
        .map(|(kind, reason)| format!("{kind} ({reason})"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_reports_found() {
        let kind = RecordKind::new("Account");
        let err = CoreError::decode(&kind, "acc-1", CodecError::decode("bad"));
        assert!(err.found());
        assert!(err.to_string().contains("acc-1"));

        let err = CoreError::encode(&kind, "acc-1", CodecError::encode("bad"));
        assert!(!err.found());
    }

    #[test]
    fn closed_store_failures_are_recognised() {
        let kind = RecordKind::new("Account");
        let closed = EngineError::Closed {
            path: PathBuf::from("data/Account"),
        };
        assert!(CoreError::store("get", &kind, "k", closed).is_store_closed());
        assert!(!CoreError::DatabaseClosed.is_store_closed());
    }

    #[test]
    fn reopen_lists_failed_kinds() {
        let err = CompactionError::Reopen {
            failures: vec![(RecordKind::new("Device"), "permission denied".into())],
        };
        assert_eq!(err.degraded_kinds(), vec![RecordKind::new("Device")]);
        assert!(err.to_string().contains("Device (permission denied)"));
    }
}
