//! Database root management.
//!
//! Layout on disk:
//!
//! ```text
//! <root>.lock          # advisory lock, outside the root so the swap keeps it
//! <root>/
//! ├─ Account/store.log # one directory per record kind
//! └─ Device/store.log
//! <root>.bak/          # previous root, only during a compaction swap
//! <root>.tmp/          # default snapshot location for compaction at open
//! ```

use crate::error::{CoreResult, InitializationError};
use crate::kind::RecordKind;
use fs2::FileExt;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// The locked database root.
///
/// Only one `RootDir` can exist per root at a time, across processes.
#[derive(Debug)]
pub(crate) struct RootDir {
    path: PathBuf,
    _lock_file: File,
}

impl RootDir {
    /// Locks and prepares `path` as a database root.
    ///
    /// A root that is missing while `<root>.bak` exists was interrupted between
    /// moving the old root aside and moving the snapshot in; the backup is
    /// restored before anything else.
    pub(crate) fn open(path: &Path, create_if_missing: bool) -> CoreResult<Self> {
        let path: PathBuf = path.components().collect();
        if path.file_name().is_none() {
            return Err(InitializationError::root_unavailable(
                &path,
                io::Error::new(io::ErrorKind::InvalidInput, "root must name a directory"),
            )
            .into());
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if create_if_missing {
                fs::create_dir_all(parent)
                    .map_err(|e| InitializationError::root_unavailable(&path, e))?;
            }
        }

        let lock_path = sibling(&path, ".lock");
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| InitializationError::root_unavailable(&path, e))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(InitializationError::Locked { path: lock_path }.into());
        }

        let root = Self {
            path,
            _lock_file: lock_file,
        };
        root.recover_interrupted_swap()?;

        if !root.path.exists() {
            if !create_if_missing {
                return Err(InitializationError::root_unavailable(
                    &root.path,
                    io::Error::new(io::ErrorKind::NotFound, "root does not exist"),
                )
                .into());
            }
            fs::create_dir_all(&root.path)
                .map_err(|e| InitializationError::root_unavailable(&root.path, e))?;
        }
        if !root.path.is_dir() {
            return Err(InitializationError::root_unavailable(
                &root.path,
                io::Error::new(io::ErrorKind::InvalidInput, "root is not a directory"),
            )
            .into());
        }

        Ok(root)
    }

    fn recover_interrupted_swap(&self) -> CoreResult<()> {
        let backup = self.backup_path();
        if self.path.exists() || !backup.is_dir() {
            return Ok(());
        }
        fs::rename(&backup, &self.path).map_err(|source| InitializationError::Recovery {
            from: backup.clone(),
            to: self.path.clone(),
            source,
        })?;
        info!(
            root = %self.path.display(),
            "restored root from interrupted compaction"
        );
        self.sync_parent();
        Ok(())
    }

    /// The normalized root path.
    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Directory of one kind's store.
    pub(crate) fn kind_dir(&self, kind: &RecordKind) -> PathBuf {
        self.path.join(kind.as_str())
    }

    /// Where the previous root is parked during a swap.
    pub(crate) fn backup_path(&self) -> PathBuf {
        sibling(&self.path, ".bak")
    }

    /// Default snapshot location for compaction at open.
    pub(crate) fn default_scratch(&self) -> PathBuf {
        sibling(&self.path, ".tmp")
    }

    /// Removes a `<root>.bak` left by a failed cleanup.
    pub(crate) fn remove_stale_backup(&self) -> io::Result<()> {
        let backup = self.backup_path();
        if backup.exists() {
            warn!(path = %backup.display(), "removing stale backup");
            fs::remove_dir_all(&backup)?;
        }
        Ok(())
    }

    /// Makes renames of the root durable.
    #[cfg(unix)]
    pub(crate) fn sync_parent(&self) {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        if let Err(e) = File::open(parent).and_then(|dir| dir.sync_all()) {
            warn!(path = %parent.display(), error = %e, "failed to sync root parent");
        }
    }

    #[cfg(not(unix))]
    pub(crate) fn sync_parent(&self) {}
}

/// `<path><suffix>`, e.g. `data` to `data.bak`.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use tempfile::tempdir;

    #[test]
    fn creates_root_and_parents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/data");

        let root = RootDir::open(&path, true).unwrap();
        assert!(path.is_dir());
        assert!(dir.path().join("nested/data.lock").exists());
        assert_eq!(root.kind_dir(&RecordKind::new("Account")), path.join("Account"));
        assert_eq!(root.backup_path(), dir.path().join("nested/data.bak"));
    }

    #[test]
    fn normalizes_trailing_separator() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data/");
        let root = RootDir::open(&path, true).unwrap();
        assert_eq!(root.path(), dir.path().join("data"));
        assert_eq!(root.default_scratch(), dir.path().join("data.tmp"));
    }

    #[test]
    fn missing_root_without_create() {
        let dir = tempdir().unwrap();
        let result = RootDir::open(&dir.path().join("data"), false);
        assert!(matches!(
            result,
            Err(CoreError::Initialization(
                InitializationError::RootUnavailable { .. }
            ))
        ));
    }

    #[test]
    fn second_open_is_locked() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data");
        let _first = RootDir::open(&path, true).unwrap();

        assert!(matches!(
            RootDir::open(&path, true),
            Err(CoreError::Initialization(InitializationError::Locked { .. }))
        ));
    }

    #[test]
    fn lock_released_on_drop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data");
        drop(RootDir::open(&path, true).unwrap());
        RootDir::open(&path, true).unwrap();
    }

    #[test]
    fn restores_backup_when_root_missing() {
        let dir = tempdir().unwrap();
        let backup = dir.path().join("data.bak");
        fs::create_dir_all(backup.join("Account")).unwrap();
        fs::write(backup.join("Account/store.log"), b"").unwrap();

        let root = RootDir::open(&dir.path().join("data"), false).unwrap();
        assert!(root.kind_dir(&RecordKind::new("Account")).is_dir());
        assert!(!backup.exists());
    }

    #[test]
    fn leaves_backup_alone_when_root_present() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("data")).unwrap();
        fs::create_dir_all(dir.path().join("data.bak")).unwrap();

        let root = RootDir::open(&dir.path().join("data"), false).unwrap();
        assert!(root.backup_path().exists());
        root.remove_stale_backup().unwrap();
        assert!(!root.backup_path().exists());
    }

    #[test]
    fn rejects_root_without_a_name() {
        assert!(RootDir::open(Path::new("/"), false).is_err());
        assert!(RootDir::open(Path::new(""), false).is_err());
    }
}
