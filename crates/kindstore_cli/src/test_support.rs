//! Databases seeded for command tests.

use kindstore_core::{Config, Db, Record, RecordKind, TypeRegistry};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Note {
    pub text: String,
}

impl Record for Note {
    const KIND: RecordKind = RecordKind::new("Note");
}

/// Opens the database at `root` serving [`Note`], without compaction at open.
pub(crate) fn open_notes(root: &Path) -> Db {
    let mut registry = TypeRegistry::new();
    registry.register::<Note>().unwrap();
    Db::open_with_config(root, registry, Config::new().compact_on_open(false)).unwrap()
}

/// A closed database whose `Note` store holds `live` keys, each written
/// `versions` times.
pub(crate) fn seeded(live: usize, versions: usize) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("data");
    let db = open_notes(&root);
    for v in 0..versions {
        for k in 0..live {
            let note = Note {
                text: format!("note {k} v{v}"),
            };
            db.put(&format!("n-{k}"), &note).unwrap();
        }
    }
    db.close().unwrap();
    (dir, root)
}
