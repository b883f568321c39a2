//! The store registry.

use crate::config::StoreConfig;
use crate::error::{EngineError, EngineResult};
use crate::flusher::Flusher;
use crate::store::{SnapshotStats, Store};
use parking_lot::Mutex;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Shared handle to an open store.
pub type StoreHandle = Arc<Store>;

/// Tracks every store opened through it, for bulk snapshot and close.
///
/// At most one live store per directory. Stores opened with a non-zero
/// [`StoreConfig::sync_interval`] are synced by one background flusher,
/// running at the shortest interval requested so far.
///
/// ```rust
/// use kindstore_engine::{Engine, StoreConfig};
///
/// let dir = tempfile::tempdir().unwrap();
/// let engine = Engine::new();
/// let store = engine.open(&dir.path().join("Account"), &StoreConfig::default()).unwrap();
/// store.set(b"acc-1", b"payload").unwrap();
///
/// engine.backup_all(&dir.path().join("tmp")).unwrap();
/// engine.close_all().unwrap();
/// assert!(store.is_closed());
/// ```
pub struct Engine {
    stores: Arc<Mutex<Vec<StoreHandle>>>,
    flusher: Mutex<Option<Flusher>>,
}

impl Engine {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            stores: Arc::new(Mutex::new(Vec::new())),
            flusher: Mutex::new(None),
        }
    }

    /// Opens (or creates) the store in `dir` and registers it.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::AlreadyOpen`] if a live store already uses
    /// `dir`, or any open failure.
    pub fn open(&self, dir: &Path, config: &StoreConfig) -> EngineResult<StoreHandle> {
        let mut stores = self.stores.lock();
        stores.retain(|s| !s.is_closed());
        if stores.iter().any(|s| s.dir() == dir) {
            return Err(EngineError::AlreadyOpen {
                path: dir.to_path_buf(),
            });
        }

        let store = Arc::new(Store::open(dir, config.clone())?);
        stores.push(Arc::clone(&store));
        drop(stores);

        if !config.syncs_every_write() {
            self.ensure_flusher(config.sync_interval)?;
        }
        Ok(store)
    }

    /// Returns the live stores in open order.
    #[must_use]
    pub fn open_stores(&self) -> Vec<StoreHandle> {
        self.stores
            .lock()
            .iter()
            .filter(|s| !s.is_closed())
            .cloned()
            .collect()
    }

    /// Snapshots every live store under `tmp_root`.
    ///
    /// Each store's live entries land in [`snapshot_path`]`(tmp_root, dir)`.
    /// Every store is sealed before the first snapshot and stays sealed on
    /// success, so a write either made it into the snapshot or failed with
    /// [`EngineError::Closed`]. Close the stores next. When a snapshot fails
    /// the stores are unsealed and left as they were.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Snapshot`] naming the first store that failed.
    pub fn backup_all(&self, tmp_root: &Path) -> EngineResult<Vec<SnapshotStats>> {
        let stores = self.open_stores();
        for store in &stores {
            store.seal();
        }

        let results = snapshot_each(&stores, tmp_root);
        if results.is_err() {
            for store in &stores {
                store.unseal();
            }
        }
        let results = results?;

        info!(stores = results.len(), tmp = %tmp_root.display(), "snapshot complete");
        Ok(results)
    }

    /// Closes every registered store and forgets them.
    ///
    /// All stores are closed even if one fails.
    ///
    /// # Errors
    ///
    /// Returns the first close failure.
    pub fn close_all(&self) -> EngineResult<()> {
        let stores: Vec<StoreHandle> = self.stores.lock().drain(..).collect();
        let mut first_err = None;
        for store in &stores {
            if let Err(e) = store.close() {
                first_err.get_or_insert(e);
            }
        }
        debug!(stores = stores.len(), "all stores closed");
        first_err.map_or(Ok(()), Err)
    }

    fn ensure_flusher(&self, interval: std::time::Duration) -> EngineResult<()> {
        let mut flusher = self.flusher.lock();
        let needs_spawn = flusher.as_ref().map_or(true, |f| interval < f.interval());
        if needs_spawn {
            // Dropping the old flusher joins its thread before the new one starts.
            *flusher = None;
            *flusher = Some(Flusher::spawn(interval, Arc::clone(&self.stores))?);
        }
        Ok(())
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        *self.flusher.lock() = None;
    }
}

fn snapshot_each(stores: &[StoreHandle], tmp_root: &Path) -> EngineResult<Vec<SnapshotStats>> {
    let mut results = Vec::with_capacity(stores.len());
    for store in stores {
        let target = snapshot_path(tmp_root, store.dir());
        let stats = store
            .snapshot_to(&target)
            .map_err(|e| EngineError::Snapshot {
                path: store.dir().to_path_buf(),
                source: Box::new(e),
            })?;
        debug!(
            from = %store.dir().display(),
            to = %target.display(),
            entries = stats.entries,
            "store snapshotted"
        );
        results.push(stats);
    }
    Ok(results)
}

/// Maps a store directory to its location under a snapshot root.
///
/// Only the normal components of `dir` are kept, so an absolute `dir` nests
/// under `tmp_root` instead of replacing it: `("tmp", "/srv/data/Account")`
/// maps to `tmp/srv/data/Account`.
#[must_use]
pub fn snapshot_path(tmp_root: &Path, dir: &Path) -> PathBuf {
    let mut path = tmp_root.to_path_buf();
    for component in dir.components() {
        if let Component::Normal(part) = component {
            path.push(part);
        }
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    fn eager() -> StoreConfig {
        StoreConfig::new().sync_interval(Duration::ZERO)
    }

    #[test]
    fn snapshot_path_nests_absolute_dirs() {
        let path = snapshot_path(Path::new("tmp"), Path::new("/srv/data/Account"));
        assert_eq!(path, PathBuf::from("tmp/srv/data/Account"));

        let path = snapshot_path(Path::new("tmp"), Path::new("./data/../data/Device"));
        assert_eq!(path, PathBuf::from("tmp/data/data/Device"));
    }

    #[test]
    fn rejects_second_live_store_on_same_dir() {
        let dir = tempdir().unwrap();
        let engine = Engine::new();
        let path = dir.path().join("Account");

        let first = engine.open(&path, &eager()).unwrap();
        assert!(matches!(
            engine.open(&path, &eager()),
            Err(EngineError::AlreadyOpen { .. })
        ));

        first.close().unwrap();
        engine.open(&path, &eager()).unwrap();
    }

    #[test]
    fn backup_all_snapshots_each_store() {
        let dir = tempdir().unwrap();
        let engine = Engine::new();
        let root = dir.path().join("data");
        let a = engine.open(&root.join("A"), &eager()).unwrap();
        let b = engine.open(&root.join("B"), &eager()).unwrap();
        a.set(b"k", b"a").unwrap();
        b.set(b"k", b"b").unwrap();
        b.set(b"k", b"b2").unwrap();

        let tmp = dir.path().join("tmp");
        let stats = engine.backup_all(&tmp).unwrap();
        assert_eq!(stats.len(), 2);
        assert!(stats.iter().all(|s| s.entries == 1));

        let copy = Store::open(&snapshot_path(&tmp, &root.join("B")), eager()).unwrap();
        assert_eq!(copy.get(b"k").unwrap(), Some(b"b2".to_vec()));
        assert_eq!(a.get(b"k").unwrap(), Some(b"a".to_vec()));
    }

    #[test]
    fn writes_after_backup_fail_instead_of_vanishing() {
        let dir = tempdir().unwrap();
        let engine = Engine::new();
        let store = engine.open(&dir.path().join("A"), &eager()).unwrap();
        store.set(b"k", b"before").unwrap();

        engine.backup_all(&dir.path().join("tmp")).unwrap();
        assert!(store.set(b"k", b"after").unwrap_err().is_closed());
        assert!(store.delete(b"k").unwrap_err().is_closed());
        assert_eq!(store.get(b"k").unwrap(), Some(b"before".to_vec()));
    }

    #[test]
    fn failed_backup_unseals_stores() {
        let dir = tempdir().unwrap();
        let engine = Engine::new();
        let store = engine.open(&dir.path().join("A"), &eager()).unwrap();
        store.set(b"k", b"v").unwrap();

        // A file where the snapshot directory should go.
        let tmp = dir.path().join("tmp");
        std::fs::write(&tmp, b"in the way").unwrap();

        let err = engine.backup_all(&tmp).unwrap_err();
        assert!(matches!(err, EngineError::Snapshot { .. }));
        assert!(!store.is_sealed());
        store.set(b"k", b"v2").unwrap();
        assert_eq!(store.get(b"k").unwrap(), Some(b"v2".to_vec()));
    }

    #[test]
    fn close_all_closes_and_forgets() {
        let dir = tempdir().unwrap();
        let engine = Engine::new();
        let a = engine.open(&dir.path().join("A"), &eager()).unwrap();
        let b = engine.open(&dir.path().join("B"), &eager()).unwrap();

        engine.close_all().unwrap();
        assert!(a.is_closed() && b.is_closed());
        assert!(engine.open_stores().is_empty());
        assert!(engine.backup_all(&dir.path().join("tmp")).unwrap().is_empty());
    }

    #[test]
    fn flusher_syncs_dirty_stores() {
        let dir = tempdir().unwrap();
        let engine = Engine::new();
        let config = StoreConfig::new().sync_interval(Duration::from_millis(10));
        let store = engine.open(&dir.path().join("A"), &config).unwrap();
        store.set(b"k", b"v").unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        loop {
            // Dirty flag cleared means the flusher got there first.
            if !store.sync_if_dirty().unwrap() {
                break;
            }
            assert!(std::time::Instant::now() < deadline);
            store.set(b"k", b"v").unwrap();
            std::thread::sleep(Duration::from_millis(30));
        }
    }
}
