//! Read-only walk over a database root and its store logs.
//!
//! Nothing here opens a [`kindstore_engine::Store`]: opening truncates a torn
//! tail, and inspection must leave the files as it found them.

use kindstore_core::RecordKind;
use kindstore_engine::{peek_len, LogRecord, HEADER_SIZE, LOG_FILE};
use kindstore_storage::{FileBackend, StorageBackend, StorageError};
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Failures of the maintenance commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// The root does not exist or is not a directory.
    #[error("no database found at {}", .path.display())]
    NoDatabase {
        /// Root that was given.
        path: PathBuf,
    },

    /// Reading the root directory failed.
    #[error("cannot list {}: {source}", .path.display())]
    ListRoot {
        /// Root that was given.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },

    /// Reading a store log failed.
    #[error("cannot read store log: {0}")]
    Storage(#[from] StorageError),

    /// Rendering json output failed.
    #[error("cannot render json: {0}")]
    Json(#[from] serde_json::Error),

    /// Opening or compacting the database failed.
    #[error(transparent)]
    Core(#[from] kindstore_core::CoreError),

    /// At least one store log failed verification.
    #[error("verification failed for {0} store(s)")]
    VerificationFailed(usize),
}

/// Result alias for the maintenance commands.
pub type CliResult<T> = Result<T, CliError>;

/// A subdirectory of the root holding one kind's store.
#[derive(Debug, Clone)]
pub struct KindDir {
    /// The kind, from the directory name.
    pub kind: RecordKind,
    /// The store directory.
    pub path: PathBuf,
}

impl KindDir {
    /// Path of the store log, which may not exist yet.
    pub fn log_path(&self) -> PathBuf {
        self.path.join(LOG_FILE)
    }
}

/// Lists the kind directories under `root`, sorted by kind.
///
/// Entries that are not directories, or whose names are not valid kinds,
/// are skipped with a warning.
pub fn discover_kinds(root: &Path) -> CliResult<Vec<KindDir>> {
    if !root.is_dir() {
        return Err(CliError::NoDatabase {
            path: root.to_path_buf(),
        });
    }
    let list_err = |source: io::Error| CliError::ListRoot {
        path: root.to_path_buf(),
        source,
    };

    let mut kinds = Vec::new();
    for entry in fs::read_dir(root).map_err(list_err)? {
        let entry = entry.map_err(list_err)?;
        if !entry.file_type().map_err(list_err)?.is_dir() {
            continue;
        }
        let Ok(name) = entry.file_name().into_string() else {
            warn!(path = %entry.path().display(), "skipping directory with non UTF-8 name");
            continue;
        };
        let kind = RecordKind::from_name(name);
        if let Err(reason) = kind.validate() {
            warn!(%kind, reason, "skipping directory that is not a kind");
            continue;
        }
        kinds.push(KindDir {
            kind,
            path: entry.path(),
        });
    }
    kinds.sort_by(|a, b| a.kind.cmp(&b.kind));
    Ok(kinds)
}

/// What a walk over one store log found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LogScan {
    /// Records read, including tombstones.
    pub records: usize,
    /// Tombstone records.
    pub tombstones: usize,
    /// Keys whose latest record is a put.
    pub live_entries: usize,
    /// Bytes of the records holding live values.
    pub live_bytes: u64,
    /// Size of the log file.
    pub file_bytes: u64,
    /// Offset of a torn final record; the next open cuts it off.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub torn_tail: Option<u64>,
    /// Corruption before the tail; the store will not open.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corruption: Option<String>,
}

impl LogScan {
    /// Bytes a compaction would drop.
    pub fn reclaimable_bytes(&self) -> u64 {
        self.file_bytes.saturating_sub(self.live_bytes)
    }

    /// Returns true when the store can be opened without losing records.
    pub fn is_ok(&self) -> bool {
        self.corruption.is_none()
    }
}

/// Scans the log of `dir`. A missing log reads as an empty store.
pub fn scan_kind(dir: &KindDir) -> CliResult<LogScan> {
    let log = dir.log_path();
    if !log.is_file() {
        return Ok(LogScan::default());
    }
    let backend = FileBackend::open(&log)?;
    scan_log(&backend)
}

/// Walks every record the way store replay does, without modifying the log.
pub fn scan_log(backend: &dyn StorageBackend) -> CliResult<LogScan> {
    let size = backend.size()?;
    let mut scan = LogScan {
        file_bytes: size,
        ..LogScan::default()
    };
    let mut live: HashMap<Vec<u8>, u64> = HashMap::new();
    let mut offset = 0u64;

    while offset < size {
        let remaining = size - offset;
        if remaining < HEADER_SIZE as u64 {
            scan.torn_tail = Some(offset);
            break;
        }

        let prefix = backend.read_at(offset, 4)?;
        let record_len = peek_len(&[prefix[0], prefix[1], prefix[2], prefix[3]]) as u64;
        if record_len < HEADER_SIZE as u64 || record_len > remaining {
            if offset + record_len.max(HEADER_SIZE as u64) >= size {
                scan.torn_tail = Some(offset);
            } else {
                scan.corruption = Some(format!(
                    "invalid record length {record_len} at offset {offset}"
                ));
            }
            break;
        }

        let data = backend.read_at(offset, record_len as usize)?;
        match LogRecord::decode(&data, offset) {
            Ok(record) => {
                scan.records += 1;
                if record.is_tombstone() {
                    scan.tombstones += 1;
                    live.remove(&record.key);
                } else {
                    live.insert(record.key, record_len);
                }
            }
            Err(_) if offset + record_len == size => {
                scan.torn_tail = Some(offset);
                break;
            }
            Err(e) => {
                scan.corruption = Some(e.to_string());
                break;
            }
        }
        offset += record_len;
    }

    scan.live_entries = live.len();
    scan.live_bytes = live.values().sum();
    Ok(scan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kindstore_storage::InMemoryBackend;
    use tempfile::tempdir;

    fn log(records: &[LogRecord]) -> Vec<u8> {
        records
            .iter()
            .flat_map(|r| r.encode().unwrap())
            .collect()
    }

    #[test]
    fn counts_live_entries_and_garbage() {
        let data = log(&[
            LogRecord::put(b"a", b"1"),
            LogRecord::put(b"a", b"22"),
            LogRecord::put(b"b", b"3"),
            LogRecord::tombstone(b"b"),
        ]);
        let size = data.len() as u64;
        let scan = scan_log(&InMemoryBackend::with_data(data)).unwrap();

        assert_eq!(scan.records, 4);
        assert_eq!(scan.tombstones, 1);
        assert_eq!(scan.live_entries, 1);
        assert_eq!(scan.live_bytes, LogRecord::put(b"a", b"22").encoded_len() as u64);
        assert_eq!(scan.file_bytes, size);
        assert_eq!(scan.reclaimable_bytes(), size - scan.live_bytes);
        assert!(scan.is_ok());
    }

    #[test]
    fn torn_tail_is_reported_not_fatal() {
        let mut data = log(&[LogRecord::put(b"a", b"1")]);
        let intact = data.len() as u64;
        data.extend_from_slice(&log(&[LogRecord::put(b"b", b"value")])[..6]);

        let scan = scan_log(&InMemoryBackend::with_data(data)).unwrap();
        assert_eq!(scan.torn_tail, Some(intact));
        assert_eq!(scan.live_entries, 1);
        assert!(scan.is_ok());
    }

    #[test]
    fn checksum_failure_mid_log_is_corruption() {
        let mut data = log(&[LogRecord::put(b"a", b"1"), LogRecord::put(b"b", b"2")]);
        data[HEADER_SIZE + 1] ^= 0xFF;

        let scan = scan_log(&InMemoryBackend::with_data(data)).unwrap();
        assert!(!scan.is_ok());
        assert!(scan.corruption.unwrap().contains("checksum"));
        assert_eq!(scan.records, 0);
    }

    #[test]
    fn discovers_only_kind_directories() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir(root.join("Device")).unwrap();
        fs::create_dir(root.join("Account")).unwrap();
        fs::create_dir(root.join("not a kind")).unwrap();
        fs::write(root.join("notes.txt"), b"x").unwrap();

        let kinds: Vec<_> = discover_kinds(root)
            .unwrap()
            .into_iter()
            .map(|k| k.kind.to_string())
            .collect();
        assert_eq!(kinds, ["Account", "Device"]);
    }

    #[test]
    fn missing_root_is_no_database() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            discover_kinds(&dir.path().join("absent")),
            Err(CliError::NoDatabase { .. })
        ));
    }

    #[test]
    fn kind_without_log_scans_empty() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("Account")).unwrap();
        let kinds = discover_kinds(dir.path()).unwrap();

        assert_eq!(scan_kind(&kinds[0]).unwrap(), LogScan::default());
        assert!(!kinds[0].log_path().exists());
    }
}
