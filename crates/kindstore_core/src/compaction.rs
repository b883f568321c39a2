//! Directory-level compaction.
//!
//! A backup rewrites every kind's live entries into a snapshot tree, then
//! swaps that tree in for the root:
//!
//! 1. snapshot every open store under `<tmp>/<root>/<kind>`
//! 2. close every store
//! 3. move `<root>` to `<root>.bak`
//! 4. move the snapshot to `<root>` (moving `<root>.bak` back on failure)
//! 5. reopen every registered kind
//! 6. remove the snapshot leftovers and `<root>.bak`
//!
//! Kinds that fail to reopen are marked degraded in the router.

use crate::dir::RootDir;
use crate::error::CompactionError;
use crate::kind::RecordKind;
use crate::registry::TypeRegistry;
use crate::router::StoreRouter;
use kindstore_engine::{snapshot_path, Engine, EngineError, StoreConfig, StoreStats};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Before and after figures for one kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindReport {
    /// The kind.
    pub kind: RecordKind,
    /// Live entries before the swap.
    pub entries_before: usize,
    /// Live entries after the swap.
    pub entries_after: usize,
    /// Log size before the swap.
    pub bytes_before: u64,
    /// Log size after the swap.
    pub bytes_after: u64,
}

/// Outcome of a successful [`crate::Db::backup`].
#[derive(Debug, Clone)]
pub struct CompactionReport {
    /// Per-kind figures in registration order.
    pub kinds: Vec<KindReport>,
    /// Wall time of the whole protocol.
    pub duration: Duration,
}

impl CompactionReport {
    /// Returns the figures for `kind`.
    #[must_use]
    pub fn kind(&self, kind: &RecordKind) -> Option<&KindReport> {
        self.kinds.iter().find(|k| &k.kind == kind)
    }

    /// Total log bytes before the swap.
    #[must_use]
    pub fn bytes_before(&self) -> u64 {
        self.kinds.iter().map(|k| k.bytes_before).sum()
    }

    /// Total log bytes after the swap.
    #[must_use]
    pub fn bytes_after(&self) -> u64 {
        self.kinds.iter().map(|k| k.bytes_after).sum()
    }

    /// Bytes freed by dropping garbage.
    #[must_use]
    pub fn bytes_reclaimed(&self) -> u64 {
        self.bytes_before().saturating_sub(self.bytes_after())
    }
}

/// Runs the backup protocol over the parts of a database.
///
/// The caller serializes runs and owns the database state transitions.
pub(crate) struct CompactionManager<'a> {
    pub(crate) root: &'a RootDir,
    pub(crate) registry: &'a TypeRegistry,
    pub(crate) router: &'a StoreRouter,
    pub(crate) engine: &'a Engine,
    pub(crate) store_config: &'a StoreConfig,
}

impl CompactionManager<'_> {
    pub(crate) fn run(&self, tmp: &Path) -> Result<CompactionReport, CompactionError> {
        let started = Instant::now();
        let root = self.root.path();
        let backup = self.root.backup_path();
        let snapshot = snapshot_path(tmp, root);
        if is_inside(tmp, root) {
            return Err(CompactionError::ScratchInsideRoot {
                tmp: tmp.to_path_buf(),
                root: root.to_path_buf(),
            });
        }
        let before = self.measure();

        if snapshot.exists() {
            warn!(path = %snapshot.display(), "removing stale snapshot");
            fs::remove_dir_all(&snapshot)
                .map_err(|e| CompactionError::Snapshot(EngineError::Io(e)))?;
        }

        if let Err(e) = self.engine.backup_all(tmp) {
            discard_snapshot(tmp, &snapshot);
            return Err(CompactionError::Snapshot(e));
        }
        debug!(snapshot = %snapshot.display(), "step 1: snapshot written");

        if let Err(e) = self.engine.close_all() {
            // Files are released even when the final sync fails; the snapshot
            // already holds every acknowledged write.
            warn!(error = %e, "store close reported an error");
        }
        debug!("step 2: stores closed");

        if let Err(source) = self
            .root
            .remove_stale_backup()
            .and_then(|()| fs::rename(root, &backup))
        {
            self.reopen_all();
            discard_snapshot(tmp, &snapshot);
            return Err(CompactionError::Rename {
                from: root.to_path_buf(),
                to: backup,
                source,
            });
        }
        debug!(backup = %backup.display(), "step 3: root moved aside");

        if let Err(e) = self.swap_in(&snapshot, &backup) {
            if matches!(e, CompactionError::Swap { rolled_back: false, .. }) {
                // Reopening would create an empty root and hide the backup
                // from recovery at the next open.
                for kind in self.registry.kinds() {
                    self.router
                        .mark_degraded(kind.clone(), "root missing after failed rollback".into());
                }
            } else {
                self.reopen_all();
            }
            discard_snapshot(tmp, &snapshot);
            return Err(e);
        }
        self.root.sync_parent();
        debug!("step 4: snapshot moved into place");

        let failures = self.reopen_all();
        discard_snapshot(tmp, &snapshot);
        if !failures.is_empty() {
            warn!(
                backup = %backup.display(),
                "keeping previous root after reopen failure"
            );
            return Err(CompactionError::Reopen { failures });
        }
        debug!("step 5: stores reopened");

        if let Err(e) = fs::remove_dir_all(&backup) {
            warn!(path = %backup.display(), error = %e, "failed to remove previous root");
        }

        let report = CompactionReport {
            kinds: merge(before, self.measure()),
            duration: started.elapsed(),
        };
        info!(
            root = %root.display(),
            kinds = report.kinds.len(),
            bytes_before = report.bytes_before(),
            bytes_after = report.bytes_after(),
            elapsed_ms = report.duration.as_millis() as u64,
            "compaction complete"
        );
        Ok(report)
    }

    /// Moves the snapshot to the root, restoring `<root>.bak` if that fails.
    fn swap_in(&self, snapshot: &Path, backup: &Path) -> Result<(), CompactionError> {
        let root = self.root.path();
        let result = self.carry_foreign_entries(backup, snapshot).and_then(|moved| {
            fs::rename(snapshot, root).inspect_err(|_| restore_entries(&moved))
        });
        let Err(source) = result else {
            return Ok(());
        };

        let rolled_back = match fs::rename(backup, root) {
            Ok(()) => {
                self.root.sync_parent();
                true
            }
            Err(e) => {
                error!(
                    backup = %backup.display(),
                    root = %root.display(),
                    error = %e,
                    "rollback failed, previous root left at backup path"
                );
                false
            }
        };
        Err(CompactionError::Swap {
            from: snapshot.to_path_buf(),
            to: root.to_path_buf(),
            source,
            rolled_back,
        })
    }

    /// Moves entries of the old root that are not registered kind
    /// directories into the snapshot, so the swap keeps them.
    ///
    /// Returns the moves made. On failure they are undone first.
    fn carry_foreign_entries(
        &self,
        from: &Path,
        to: &Path,
    ) -> io::Result<Vec<(PathBuf, PathBuf)>> {
        let mut moved = Vec::new();
        let result = (|| -> io::Result<()> {
            for entry in fs::read_dir(from)? {
                let entry = entry?;
                let name = entry.file_name();
                let registered = name
                    .to_str()
                    .is_some_and(|n| self.registry.contains(&RecordKind::from_name(n)));
                if registered {
                    continue;
                }
                let target = to.join(&name);
                fs::rename(entry.path(), &target)?;
                moved.push((entry.path(), target));
            }
            Ok(())
        })();

        match result {
            Ok(()) => {
                if !moved.is_empty() {
                    debug!(entries = moved.len(), "carried unregistered entries into snapshot");
                }
                Ok(moved)
            }
            Err(e) => {
                restore_entries(&moved);
                Err(e)
            }
        }
    }

    /// Opens every registered kind in registration order.
    ///
    /// Returns the kinds that failed, which are marked degraded.
    pub(crate) fn reopen_all(&self) -> Vec<(RecordKind, String)> {
        let mut failures = Vec::new();
        for kind in self.registry.kinds() {
            match self.engine.open(&self.root.kind_dir(kind), self.store_config) {
                Ok(handle) => self.router.install(kind.clone(), handle),
                Err(e) => {
                    let reason = e.to_string();
                    warn!(kind = %kind, error = %reason, "kind failed to reopen");
                    self.router.mark_degraded(kind.clone(), reason.clone());
                    failures.push((kind.clone(), reason));
                }
            }
        }
        failures
    }

    fn measure(&self) -> Vec<(RecordKind, StoreStats)> {
        self.registry
            .kinds()
            .map(|kind| {
                let stats = self
                    .router
                    .route(kind)
                    .ok()
                    .and_then(|store| store.stats().ok())
                    .unwrap_or_default();
                (kind.clone(), stats)
            })
            .collect()
    }
}

fn merge(
    before: Vec<(RecordKind, StoreStats)>,
    after: Vec<(RecordKind, StoreStats)>,
) -> Vec<KindReport> {
    before
        .into_iter()
        .zip(after)
        .map(|((kind, b), (_, a))| KindReport {
            kind,
            entries_before: b.live_entries,
            entries_after: a.live_entries,
            bytes_before: b.file_bytes,
            bytes_after: a.file_bytes,
        })
        .collect()
}

/// Puts carried entries back where they came from.
fn restore_entries(moved: &[(PathBuf, PathBuf)]) {
    for (original, target) in moved.iter().rev() {
        if let Err(e) = fs::rename(target, original) {
            warn!(path = %target.display(), error = %e, "failed to restore entry");
        }
    }
}

/// Removes what is left of the snapshot tree and its empty ancestors up to
/// and including `tmp`. Never touches anything else under `tmp`.
fn discard_snapshot(tmp: &Path, snapshot: &Path) {
    if snapshot.exists() {
        if let Err(e) = fs::remove_dir_all(snapshot) {
            warn!(path = %snapshot.display(), error = %e, "failed to remove snapshot");
            return;
        }
    }
    let mut dir = snapshot.parent();
    while let Some(current) = dir {
        if !current.starts_with(tmp) || fs::remove_dir(current).is_err() {
            break;
        }
        if current == tmp {
            break;
        }
        dir = current.parent();
    }
}

/// Returns whether `path` is `root` or lies below it, after making both
/// absolute and dropping `.` components.
fn is_inside(path: &Path, root: &Path) -> bool {
    let absolute = |p: &Path| -> PathBuf {
        std::path::absolute(p)
            .unwrap_or_else(|_| p.to_path_buf())
            .components()
            .collect()
    };
    absolute(path).starts_with(absolute(root))
}
