//! A single key-value store.

use crate::config::StoreConfig;
use crate::error::{EngineError, EngineResult};
use crate::record::{peek_len, LogRecord, HEADER_SIZE};
use kindstore_storage::{FileBackend, StorageBackend};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File holding a store's records inside its directory.
pub const LOG_FILE: &str = "store.log";

/// Location of a key's latest put record.
#[derive(Debug, Clone, Copy)]
struct Slot {
    offset: u64,
    len: u32,
}

struct StoreInner {
    backend: Box<dyn StorageBackend>,
    index: HashMap<Vec<u8>, Slot>,
    garbage_bytes: u64,
    dirty: bool,
    /// Set while a snapshot is taken; writes fail as if closed.
    sealed: bool,
}

/// Size and liveness figures for one store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Keys with a live value.
    pub live_entries: usize,
    /// Bytes of the records holding live values.
    pub live_bytes: u64,
    /// Bytes in the log file.
    pub file_bytes: u64,
    /// Bytes of overwritten values and tombstones.
    pub garbage_bytes: u64,
}

/// Result of writing one store's snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotStats {
    /// Directory the snapshot was written to.
    pub path: PathBuf,
    /// Entries copied.
    pub entries: usize,
    /// Bytes written.
    pub bytes: u64,
}

/// An append-only key-value store rooted at one directory.
///
/// Every put appends a record to `store.log` and points the in-memory index
/// at it; a delete appends a tombstone. Overwritten records stay in the file
/// as garbage until the store is snapshotted into a fresh directory.
///
/// Reads share a lock, writes take it exclusively. A closed store rejects
/// every operation with [`EngineError::Closed`]; a sealed one rejects only
/// writes, the same way.
pub struct Store {
    dir: PathBuf,
    config: StoreConfig,
    inner: RwLock<Option<StoreInner>>,
}

impl Store {
    /// Opens the store in `dir`, creating the directory and log if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or log cannot be opened, or if a
    /// record before the tail of the log is corrupt.
    pub fn open(dir: &Path, config: StoreConfig) -> EngineResult<Self> {
        fs::create_dir_all(dir)?;
        let backend = FileBackend::open(&dir.join(LOG_FILE))?;
        Self::with_backend(dir, Box::new(backend), config)
    }

    /// Opens a store over an existing backend, replaying its records.
    ///
    /// # Errors
    ///
    /// Returns an error if a record before the tail of the log is corrupt.
    pub fn with_backend(
        dir: &Path,
        mut backend: Box<dyn StorageBackend>,
        config: StoreConfig,
    ) -> EngineResult<Self> {
        let (index, garbage_bytes) = replay(backend.as_mut())?;
        debug!(
            path = %dir.display(),
            entries = index.len(),
            garbage_bytes,
            "store opened"
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            config,
            inner: RwLock::new(Some(StoreInner {
                backend,
                index,
                garbage_bytes,
                dirty: false,
                sealed: false,
            })),
        })
    }

    /// Returns the store directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns whether [`Store::close`] has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.read().is_none()
    }

    /// Returns the value for `key`, or `None` if it is absent.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Closed`] on a closed store, or a read or
    /// checksum failure.
    pub fn get(&self, key: &[u8]) -> EngineResult<Option<Vec<u8>>> {
        let guard = self.inner.read();
        let inner = guard.as_ref().ok_or_else(|| self.closed())?;
        let Some(slot) = inner.index.get(key).copied() else {
            return Ok(None);
        };

        if self.config.verify_checksums {
            let data = inner.backend.read_at(slot.offset, slot.len as usize)?;
            let record = LogRecord::decode(&data, slot.offset)?;
            return Ok(Some(record.value));
        }

        let value_offset = slot.offset + (HEADER_SIZE + key.len()) as u64;
        let value_len = slot.len as usize - HEADER_SIZE - key.len();
        Ok(Some(inner.backend.read_at(value_offset, value_len)?))
    }

    /// Returns whether `key` has a live value.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Closed`] on a closed store.
    pub fn contains(&self, key: &[u8]) -> EngineResult<bool> {
        let guard = self.inner.read();
        let inner = guard.as_ref().ok_or_else(|| self.closed())?;
        Ok(inner.index.contains_key(key))
    }

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Closed`] on a closed or sealed store, or a write
    /// failure.
    pub fn set(&self, key: &[u8], value: &[u8]) -> EngineResult<()> {
        let encoded = LogRecord::put(key, value).encode()?;

        let mut guard = self.inner.write();
        let inner = self.writable(&mut guard)?;
        let offset = inner.backend.append(&encoded)?;

        // The record is in the log from here on, so the index follows it
        // even if the sync below fails.
        let slot = Slot {
            offset,
            len: encoded.len() as u32,
        };
        if let Some(old) = inner.index.insert(key.to_vec(), slot) {
            inner.garbage_bytes += u64::from(old.len);
        }
        self.after_append(inner)
    }

    /// Deletes `key`. Returns whether a value was removed.
    ///
    /// Deleting an absent key writes nothing and succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Closed`] on a closed or sealed store, or a write
    /// failure.
    pub fn delete(&self, key: &[u8]) -> EngineResult<bool> {
        let mut guard = self.inner.write();
        let inner = self.writable(&mut guard)?;
        if !inner.index.contains_key(key) {
            return Ok(false);
        }

        let encoded = LogRecord::tombstone(key).encode()?;
        inner.backend.append(&encoded)?;

        if let Some(old) = inner.index.remove(key) {
            inner.garbage_bytes += u64::from(old.len) + encoded.len() as u64;
        }
        self.after_append(inner)?;
        Ok(true)
    }

    /// Rejects writes until [`Store::unseal`], letting reads continue.
    ///
    /// Returns once every in-flight write has finished, so a snapshot taken
    /// afterwards holds every write that was acknowledged. Sealing a closed
    /// store is a no-op.
    pub fn seal(&self) {
        if let Some(inner) = self.inner.write().as_mut() {
            inner.sealed = true;
        }
    }

    /// Accepts writes again after [`Store::seal`].
    pub fn unseal(&self) {
        if let Some(inner) = self.inner.write().as_mut() {
            inner.sealed = false;
        }
    }

    /// Returns whether writes are currently rejected by [`Store::seal`].
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.inner.read().as_ref().is_some_and(|inner| inner.sealed)
    }

    /// Returns every live key in ascending byte order.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Closed`] on a closed store.
    pub fn keys(&self) -> EngineResult<Vec<Vec<u8>>> {
        let guard = self.inner.read();
        let inner = guard.as_ref().ok_or_else(|| self.closed())?;
        let mut keys: Vec<_> = inner.index.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    /// Returns the store's size figures.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Closed`] on a closed store.
    pub fn stats(&self) -> EngineResult<StoreStats> {
        let guard = self.inner.read();
        let inner = guard.as_ref().ok_or_else(|| self.closed())?;
        Ok(StoreStats {
            live_entries: inner.index.len(),
            live_bytes: inner.index.values().map(|s| u64::from(s.len)).sum(),
            file_bytes: inner.backend.size()?,
            garbage_bytes: inner.garbage_bytes,
        })
    }

    /// Writes every live entry, in key order, to a fresh log in `target`.
    ///
    /// The source store is not modified. The snapshot log is synced before
    /// this returns.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Closed`] on a closed store, or any read or write
    /// failure.
    pub fn snapshot_to(&self, target: &Path) -> EngineResult<SnapshotStats> {
        let guard = self.inner.read();
        let inner = guard.as_ref().ok_or_else(|| self.closed())?;

        let mut slots: Vec<_> = inner.index.iter().collect();
        slots.sort_by(|a, b| a.0.cmp(b.0));

        let mut out = FileBackend::create_truncated(&target.join(LOG_FILE))?;
        for (_, slot) in &slots {
            let data = inner.backend.read_at(slot.offset, slot.len as usize)?;
            if self.config.verify_checksums {
                LogRecord::decode(&data, slot.offset)?;
            }
            out.append(&data)?;
        }
        out.sync()?;

        Ok(SnapshotStats {
            path: target.to_path_buf(),
            entries: slots.len(),
            bytes: out.size()?,
        })
    }

    /// Syncs the log if writes happened since the last sync.
    ///
    /// A closed store is skipped.
    ///
    /// # Errors
    ///
    /// Returns the sync failure; the store stays dirty.
    pub fn sync_if_dirty(&self) -> EngineResult<bool> {
        let mut guard = self.inner.write();
        let Some(inner) = guard.as_mut() else {
            return Ok(false);
        };
        if !inner.dirty {
            return Ok(false);
        }
        inner.backend.flush()?;
        inner.backend.sync()?;
        inner.dirty = false;
        Ok(true)
    }

    /// Syncs and releases the log file. Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the final sync failure; the file is released regardless.
    pub fn close(&self) -> EngineResult<()> {
        let Some(mut inner) = self.inner.write().take() else {
            return Ok(());
        };
        inner.backend.flush()?;
        inner.backend.sync()?;
        debug!(path = %self.dir.display(), "store closed");
        Ok(())
    }

    /// Marks the log dirty, then syncs it when every write must be durable.
    /// A failed sync leaves it dirty for the next flush or close.
    fn after_append(&self, inner: &mut StoreInner) -> EngineResult<()> {
        inner.dirty = true;
        if self.config.syncs_every_write() {
            inner.backend.sync()?;
            inner.dirty = false;
        }
        Ok(())
    }

    fn writable<'a>(
        &self,
        guard: &'a mut Option<StoreInner>,
    ) -> EngineResult<&'a mut StoreInner> {
        match guard.as_mut() {
            Some(inner) if !inner.sealed => Ok(inner),
            _ => Err(self.closed()),
        }
    }

    fn closed(&self) -> EngineError {
        EngineError::Closed {
            path: self.dir.clone(),
        }
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("dir", &self.dir)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(path = %self.dir.display(), error = %e, "failed to sync store on drop");
        }
    }
}

/// Rebuilds the index from the log, cutting off a torn final record.
fn replay(backend: &mut dyn StorageBackend) -> EngineResult<(HashMap<Vec<u8>, Slot>, u64)> {
    let size = backend.size()?;
    let mut index: HashMap<Vec<u8>, Slot> = HashMap::new();
    let mut garbage = 0u64;
    let mut offset = 0u64;

    while offset < size {
        let remaining = size - offset;
        if remaining < HEADER_SIZE as u64 {
            return truncate_tail(backend, offset, size, index, garbage);
        }

        let prefix = backend.read_at(offset, 4)?;
        let record_len = peek_len(&[prefix[0], prefix[1], prefix[2], prefix[3]]) as u64;
        if record_len < HEADER_SIZE as u64 || record_len > remaining {
            if offset + record_len.max(HEADER_SIZE as u64) >= size {
                return truncate_tail(backend, offset, size, index, garbage);
            }
            return Err(EngineError::corrupted(offset, "invalid record length"));
        }

        let data = backend.read_at(offset, record_len as usize)?;
        let record = match LogRecord::decode(&data, offset) {
            Ok(record) => record,
            Err(_) if offset + record_len == size => {
                return truncate_tail(backend, offset, size, index, garbage);
            }
            Err(e) => return Err(e),
        };

        if record.is_tombstone() {
            garbage += record_len;
            if let Some(old) = index.remove(&record.key) {
                garbage += u64::from(old.len);
            }
        } else {
            let slot = Slot {
                offset,
                len: record_len as u32,
            };
            if let Some(old) = index.insert(record.key, slot) {
                garbage += u64::from(old.len);
            }
        }
        offset += record_len;
    }

    Ok((index, garbage))
}

fn truncate_tail(
    backend: &mut dyn StorageBackend,
    offset: u64,
    size: u64,
    index: HashMap<Vec<u8>, Slot>,
    garbage: u64,
) -> EngineResult<(HashMap<Vec<u8>, Slot>, u64)> {
    warn!(offset, dropped = size - offset, "truncating torn record at end of store log");
    backend.truncate(offset)?;
    Ok((index, garbage))
}
