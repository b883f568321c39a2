//! Test fixtures and database helpers.
//!
//! Provides convenience functions for setting up test databases
//! and common test scenarios.

use crate::records::sample_registry;
use kindstore_core::{Config, Db, TypeRegistry};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// A test database with automatic cleanup.
///
/// The root is `<temp>/data`; `<temp>/tmp` is free for backups.
pub struct TestDb {
    /// The database instance. `None` only between close and reopen.
    db: Option<Db>,
    config: Config,
    temp_dir: TempDir,
}

impl TestDb {
    /// Opens the sample registry with every write synced.
    pub fn new() -> Self {
        Self::with_registry(sample_registry())
    }

    /// Opens `registry` with every write synced.
    pub fn with_registry(registry: TypeRegistry) -> Self {
        Self::open(registry, Self::default_config())
    }

    /// Opens the sample registry with `config`.
    pub fn with_config(config: Config) -> Self {
        Self::open(sample_registry(), config)
    }

    fn open(registry: TypeRegistry, config: Config) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db = Db::open_with_config(&temp_dir.path().join("data"), registry, config.clone())
            .expect("Failed to open database");
        Self {
            db: Some(db),
            config,
            temp_dir,
        }
    }

    /// Configuration used by [`TestDb::new`].
    pub fn default_config() -> Config {
        Config::new().sync_interval(Duration::ZERO)
    }

    /// The database root.
    pub fn root(&self) -> PathBuf {
        self.temp_dir.path().join("data")
    }

    /// A scratch directory for [`Db::backup`].
    pub fn tmp(&self) -> PathBuf {
        self.temp_dir.path().join("tmp")
    }

    /// The temporary directory holding everything.
    pub fn dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Closes the database and opens it again with the sample registry.
    pub fn reopen(&mut self) {
        self.reopen_with(sample_registry());
    }

    /// Closes the database and opens it again with `registry`.
    pub fn reopen_with(&mut self, registry: TypeRegistry) {
        if let Some(db) = self.db.take() {
            db.close().expect("Failed to close database");
        }
        let db = Db::open_with_config(&self.root(), registry, self.config.clone())
            .expect("Failed to reopen database");
        self.db = Some(db);
    }
}

impl TestDb {
    /// Converts into a database that can be shared across threads.
    pub fn into_shared(mut self) -> SharedTestDb {
        let db = self.db.take().expect("database is open");
        SharedTestDb {
            db: Arc::new(db),
            temp_dir: self.temp_dir,
        }
    }
}

/// A [`TestDb`] behind an `Arc`, for multi-threaded tests.
pub struct SharedTestDb {
    /// The shared database.
    pub db: Arc<Db>,
    temp_dir: TempDir,
}

impl SharedTestDb {
    /// A scratch directory for [`Db::backup`].
    pub fn tmp(&self) -> PathBuf {
        self.temp_dir.path().join("tmp")
    }
}

impl Default for TestDb {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestDb {
    type Target = Db;

    fn deref(&self) -> &Self::Target {
        self.db.as_ref().expect("database is open")
    }
}

/// Runs a test with a temporary database over the sample registry.
///
/// # Example
///
/// ```rust
/// use kindstore_testkit::{with_temp_db, Account};
///
/// with_temp_db(|db| {
///     db.put("acc-1", &Account::new("alice", 1)).unwrap();
/// });
/// ```
pub fn with_temp_db<F, R>(f: F) -> R
where
    F: FnOnce(&Db) -> R,
{
    let test_db = TestDb::new();
    f(&test_db)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;
    use crate::records::{Account, Device};
    use std::sync::Arc;

    /// A database holding `count` accounts (`acc-0`..) and as many devices
    /// (`dev-0`..) sharing one owner.
    pub fn populated(count: usize) -> TestDb {
        let test_db = TestDb::new();
        let owner = Arc::new("shared-owner".to_string());
        for i in 0..count {
            test_db
                .put(&format!("acc-{i}"), &Account::new(format!("user-{i}"), i as i64))
                .expect("Failed to put account");
            test_db
                .put(&format!("dev-{i}"), &Device::new(i as u64, &owner))
                .expect("Failed to put device");
        }
        test_db
    }

    /// A database where every account was overwritten `versions` times,
    /// leaving garbage for compaction to reclaim.
    pub fn churned(count: usize, versions: usize) -> TestDb {
        let test_db = TestDb::new();
        for version in 0..versions {
            for i in 0..count {
                test_db
                    .put(&format!("acc-{i}"), &Account::new("churn", version as i64))
                    .expect("Failed to put account");
            }
        }
        test_db
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::Account;

    #[test]
    fn test_db_layout() {
        let test_db = TestDb::new();
        assert!(test_db.root().join("Account").is_dir());
        assert!(test_db.root().join("Device").is_dir());
        assert!(!test_db.tmp().exists());
    }

    #[test]
    fn test_reopen_keeps_data() {
        let mut test_db = TestDb::new();
        test_db.put("acc-1", &Account::new("alice", 100)).unwrap();
        test_db.reopen();
        assert_eq!(
            test_db.get::<Account>("acc-1").unwrap(),
            Some(Account::new("alice", 100))
        );
    }

    #[test]
    fn test_populated_scenario() {
        let test_db = scenarios::populated(10);
        let stats = test_db.stats().unwrap();
        assert!(stats.iter().all(|s| s.stats.live_entries == 10));
    }

    #[test]
    fn test_churned_scenario_has_garbage() {
        let test_db = scenarios::churned(5, 4);
        let stats = test_db.stats().unwrap();
        assert!(stats[0].stats.garbage_bytes > 0);
    }
}
