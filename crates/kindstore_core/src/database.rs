//! Database facade.

use crate::compaction::{CompactionManager, CompactionReport};
use crate::config::Config;
use crate::dir::RootDir;
use crate::error::{CoreError, CoreResult, InitializationError};
use crate::kind::{Record, RecordKind};
use crate::registry::TypeRegistry;
use crate::router::StoreRouter;
use kindstore_codec::Codec;
use kindstore_engine::{Engine, StoreHandle, StoreStats};
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Lifecycle of a [`Db`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbState {
    /// Serving every registered kind.
    Open,
    /// A backup is between its snapshot and reopen steps.
    Compacting,
    /// Some kinds failed to reopen after a backup. Healthy kinds keep
    /// working; backup is refused until the database is reopened.
    Degraded,
    /// Closed; every operation fails.
    Closed,
}

/// Store figures for one kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindStats {
    /// The kind.
    pub kind: RecordKind,
    /// Its store's figures.
    pub stats: StoreStats,
}

/// A set of typed record stores under one root.
///
/// Each registered [`Record`] type gets its own store in
/// `<root>/<Record::KIND>`; every operation is routed by the type parameter.
///
/// ```rust
/// use kindstore_core::{Db, Record, RecordKind, TypeRegistry};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, PartialEq, Serialize, Deserialize)]
/// struct Account {
///     name: String,
///     balance: i64,
/// }
///
/// impl Record for Account {
///     const KIND: RecordKind = RecordKind::new("Account");
/// }
///
/// let dir = tempfile::tempdir().unwrap();
/// let mut registry = TypeRegistry::new();
/// registry.register::<Account>().unwrap();
///
/// let db = Db::open(&dir.path().join("data"), registry).unwrap();
/// let alice = Account { name: "alice".into(), balance: 100 };
/// db.put("acc-1", &alice).unwrap();
/// assert_eq!(db.get::<Account>("acc-1").unwrap(), Some(alice));
///
/// db.backup(&dir.path().join("tmp")).unwrap();
/// assert!(db.get::<Account>("acc-1").unwrap().is_some());
/// ```
pub struct Db {
    config: Config,
    registry: TypeRegistry,
    router: StoreRouter,
    codec: Codec,
    engine: Engine,
    state: RwLock<DbState>,
    /// Serializes backups, and close against a running backup.
    backup_lock: Mutex<()>,
    /// Write side held by backup when `exclusive_backup` is set.
    gate: RwLock<()>,
    /// Declared last so the lock is released after every store closes.
    root: RootDir,
}

impl Db {
    /// Opens the database at `path` with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Initialization`] if the registry is empty, the
    /// root cannot be prepared or is locked, a store fails to open, or the
    /// compaction at open fails.
    pub fn open(path: &Path, registry: TypeRegistry) -> CoreResult<Self> {
        Self::open_with_config(path, registry, Config::default())
    }

    /// Opens the database at `path` with a custom configuration.
    ///
    /// Stores are opened in registration order. When any of them fails,
    /// those already opened are closed again.
    ///
    /// # Errors
    ///
    /// As [`Db::open`].
    pub fn open_with_config(
        path: &Path,
        registry: TypeRegistry,
        config: Config,
    ) -> CoreResult<Self> {
        if registry.is_empty() {
            return Err(InitializationError::EmptyRegistry.into());
        }
        let root = RootDir::open(path, config.create_if_missing)?;

        let engine = Engine::new();
        let router = StoreRouter::new();
        for kind in registry.kinds() {
            match engine.open(&root.kind_dir(kind), &config.store) {
                Ok(handle) => router.install(kind.clone(), handle),
                Err(source) => {
                    if let Err(e) = engine.close_all() {
                        warn!(error = %e, "failed to close stores after open failure");
                    }
                    return Err(InitializationError::StoreOpen {
                        kind: kind.clone(),
                        source,
                    }
                    .into());
                }
            }
        }

        let db = Self {
            codec: Codec::with_config(&config.codec),
            config,
            registry,
            router,
            engine,
            state: RwLock::new(DbState::Open),
            backup_lock: Mutex::new(()),
            gate: RwLock::new(()),
            root,
        };
        info!(
            root = %db.root.path().display(),
            kinds = db.registry.len(),
            "database opened"
        );

        if db.config.compact_on_open && db.holds_data()? {
            db.backup(&db.scratch_dir())
                .map_err(|e| InitializationError::Compaction(Box::new(e)))?;
        }
        Ok(db)
    }

    /// Reads the record stored under `key` for `T`'s kind.
    ///
    /// # Errors
    ///
    /// Routing, store and decode failures. A [`CoreError::Decode`] means the
    /// key exists but its bytes are not a valid `T`.
    pub fn get<T: Record>(&self, key: &str) -> CoreResult<Option<T>> {
        let _gate = self.enter()?;
        let Some(bytes) = self.read_raw(&T::KIND, key)? else {
            return Ok(None);
        };
        self.codec
            .decode(&bytes)
            .map(Some)
            .map_err(|e| CoreError::decode(&T::KIND, key, e))
    }

    /// Reads the record under `key` into `out`.
    ///
    /// Returns `Ok(false)` and leaves `out` untouched when the key is absent.
    /// `out` is also untouched when decoding fails.
    ///
    /// # Errors
    ///
    /// As [`Db::get`].
    pub fn get_into<T: Record>(&self, key: &str, out: &mut T) -> CoreResult<bool> {
        let _gate = self.enter()?;
        let Some(bytes) = self.read_raw(&T::KIND, key)? else {
            return Ok(false);
        };
        self.codec
            .decode_into(&bytes, out)
            .map_err(|e| CoreError::decode(&T::KIND, key, e))?;
        Ok(true)
    }

    /// Stores `record` under `key` for `T`'s kind, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Routing, encode and store failures.
    pub fn put<T: Record>(&self, key: &str, record: &T) -> CoreResult<()> {
        let _gate = self.enter()?;
        let store = self.router.route(&T::KIND)?;
        let bytes = self
            .codec
            .encode(record)
            .map_err(|e| CoreError::encode(&T::KIND, key, e))?;
        store
            .set(key.as_bytes(), &bytes)
            .map_err(|e| CoreError::store("put", &T::KIND, key, e))
    }

    /// Deletes `key` from `T`'s kind. Deleting an absent key succeeds.
    ///
    /// # Errors
    ///
    /// Routing and store failures.
    pub fn del<T: Record>(&self, key: &str) -> CoreResult<()> {
        let _gate = self.enter()?;
        let store = self.router.route(&T::KIND)?;
        let existed = store
            .delete(key.as_bytes())
            .map_err(|e| CoreError::store("del", &T::KIND, key, e))?;
        if !existed {
            debug!(kind = T::KIND.as_str(), key, "delete of absent key");
        }
        Ok(())
    }

    /// Returns true if `key` exists for `T`'s kind.
    ///
    /// # Errors
    ///
    /// Routing and store failures.
    pub fn contains<T: Record>(&self, key: &str) -> CoreResult<bool> {
        let _gate = self.enter()?;
        let store = self.router.route(&T::KIND)?;
        store
            .contains(key.as_bytes())
            .map_err(|e| CoreError::store("contains", &T::KIND, key, e))
    }

    /// Returns every key of `T`'s kind, sorted.
    ///
    /// Keys that are not valid UTF-8 are converted lossily.
    ///
    /// # Errors
    ///
    /// Routing and store failures.
    pub fn keys<T: Record>(&self) -> CoreResult<Vec<String>> {
        let _gate = self.enter()?;
        let store = self.router.route(&T::KIND)?;
        let keys = store
            .keys()
            .map_err(|e| CoreError::store("keys", &T::KIND, "", e))?;
        Ok(keys
            .into_iter()
            .map(|k| String::from_utf8_lossy(&k).into_owned())
            .collect())
    }

    /// Compacts every store by swapping in a snapshot of its live entries.
    ///
    /// The snapshot is written under `tmp_path`; only the snapshot tree is
    /// removed from it afterwards. Backups are serialized. Unless
    /// [`Config::exclusive_backup`] is set, record operations keep running
    /// and may fail with a closed-store [`CoreError::Store`] while the swap
    /// is in progress.
    ///
    /// # Errors
    ///
    /// - [`CoreError::DatabaseClosed`] after close
    /// - [`CoreError::Degraded`] once an earlier backup left kinds unopened
    /// - [`CoreError::Compaction`] naming the failed step
    pub fn backup(&self, tmp_path: &Path) -> CoreResult<CompactionReport> {
        let _serial = self.backup_lock.lock();
        {
            let mut state = self.state.write();
            match *state {
                DbState::Closed => return Err(CoreError::DatabaseClosed),
                DbState::Degraded => {
                    return Err(CoreError::Degraded {
                        kinds: self.router.degraded_kinds(),
                    })
                }
                DbState::Open | DbState::Compacting => *state = DbState::Compacting,
            }
        }
        let _exclusive = self.config.exclusive_backup.then(|| self.gate.write());

        let result = CompactionManager {
            root: &self.root,
            registry: &self.registry,
            router: &self.router,
            engine: &self.engine,
            store_config: &self.config.store,
        }
        .run(tmp_path);

        let degraded = self.router.degraded_kinds();
        *self.state.write() = if degraded.is_empty() {
            DbState::Open
        } else {
            warn!(kinds = ?degraded, "database degraded after compaction");
            DbState::Degraded
        };
        result.map_err(CoreError::from)
    }

    /// Syncs and closes every store. Closing twice is a no-op.
    ///
    /// Waits for a running backup to finish.
    ///
    /// # Errors
    ///
    /// Returns the first store close failure; the database is closed regardless.
    pub fn close(&self) -> CoreResult<()> {
        let _serial = self.backup_lock.lock();
        let mut state = self.state.write();
        if *state == DbState::Closed {
            return Ok(());
        }
        *state = DbState::Closed;
        let result = self.engine.close_all();
        info!(root = %self.root.path().display(), "database closed");
        result.map_err(CoreError::from)
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> DbState {
        *self.state.read()
    }

    /// Returns true until [`Db::close`].
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state() != DbState::Closed
    }

    /// Registered kinds in registration order.
    #[must_use]
    pub fn kinds(&self) -> Vec<RecordKind> {
        self.registry.kinds().cloned().collect()
    }

    /// Kinds that failed to reopen after a backup.
    #[must_use]
    pub fn degraded_kinds(&self) -> Vec<RecordKind> {
        self.router.degraded_kinds()
    }

    /// The normalized root path.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// Scratch directory for the backup at open: [`Config::scratch_dir`]
    /// when set, `<root>.tmp` otherwise.
    #[must_use]
    pub fn scratch_dir(&self) -> PathBuf {
        self.config
            .scratch_dir
            .clone()
            .unwrap_or_else(|| self.root.default_scratch())
    }

    /// Returns database configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Store figures for every healthy kind, sorted by kind.
    ///
    /// # Errors
    ///
    /// [`CoreError::DatabaseClosed`] after close, or a store failure.
    pub fn stats(&self) -> CoreResult<Vec<KindStats>> {
        let _gate = self.enter()?;
        self.router
            .handles()
            .into_iter()
            .map(|(kind, store)| -> CoreResult<KindStats> {
                let stats = store.stats()?;
                Ok(KindStats { kind, stats })
            })
            .collect()
    }

    /// Checks the database is open and takes the shared side of the
    /// exclusive-backup gate when it is enabled.
    fn enter(&self) -> CoreResult<Option<RwLockReadGuard<'_, ()>>> {
        if *self.state.read() == DbState::Closed {
            return Err(CoreError::DatabaseClosed);
        }
        Ok(self.config.exclusive_backup.then(|| self.gate.read()))
    }

    fn read_raw(&self, kind: &RecordKind, key: &str) -> CoreResult<Option<Vec<u8>>> {
        let store: StoreHandle = self.router.route(kind)?;
        store
            .get(key.as_bytes())
            .map_err(|e| CoreError::store("get", kind, key, e))
    }

    fn holds_data(&self) -> CoreResult<bool> {
        for (_, store) in self.router.handles() {
            if store.stats()?.file_bytes > 0 {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db")
            .field("root", &self.root.path())
            .field("state", &self.state())
            .field("kinds", &self.kinds())
            .finish_non_exhaustive()
    }
}

impl Drop for Db {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "failed to close database on drop");
        }
    }
}
