//! Compact command implementation.

use super::inspect::format_size;
use crate::scan::{discover_kinds, scan_kind, CliResult, KindDir};
use kindstore_core::{CompactionReport, Config, Db, TypeRegistry};
use std::path::Path;
use tracing::info;

/// Runs the compact command.
///
/// Every kind directory under `path` is opened as a runtime kind, so
/// databases can be compacted without the record types that wrote them.
pub fn run(path: &Path, tmp: Option<&Path>, dry_run: bool) -> CliResult<()> {
    let kinds = discover_kinds(path)?;

    println!("Compacting database at {}", path.display());
    if dry_run {
        println!("(dry run - no changes will be made)");
    }
    println!();

    if kinds.is_empty() {
        println!("No kinds found - nothing to compact");
        return Ok(());
    }

    if dry_run {
        return analyze(&kinds);
    }

    let report = compact(path, &kinds, tmp)?;
    print_report(&report);
    Ok(())
}

fn analyze(kinds: &[KindDir]) -> CliResult<()> {
    println!("Compaction Analysis:");
    let mut reclaimable = 0;
    for dir in kinds {
        let scan = scan_kind(dir)?;
        reclaimable += scan.reclaimable_bytes();
        println!(
            "  {}: {} of {} records kept, {} -> {}",
            dir.kind,
            scan.live_entries,
            scan.records,
            format_size(scan.file_bytes),
            format_size(scan.live_bytes)
        );
    }
    println!();
    println!("  Space to reclaim: {}", format_size(reclaimable));
    Ok(())
}

fn compact(path: &Path, kinds: &[KindDir], tmp: Option<&Path>) -> CliResult<CompactionReport> {
    let mut registry = TypeRegistry::new();
    for dir in kinds {
        registry.register_kind(dir.kind.clone())?;
    }

    let mut config = Config::new()
        .create_if_missing(false)
        .compact_on_open(false);
    if let Some(tmp) = tmp {
        config = config.scratch_dir(tmp);
    }

    let db = Db::open_with_config(path, registry, config)?;
    let report = db.backup(&db.scratch_dir())?;
    db.close()?;
    info!(
        kinds = report.kinds.len(),
        reclaimed = report.bytes_reclaimed(),
        "compaction complete"
    );
    Ok(report)
}

fn print_report(report: &CompactionReport) {
    println!("Compaction Results:");
    for kind in &report.kinds {
        println!(
            "  {}: {} -> {} entries, {} -> {}",
            kind.kind,
            kind.entries_before,
            kind.entries_after,
            format_size(kind.bytes_before),
            format_size(kind.bytes_after)
        );
    }
    println!();
    println!(
        "  Space saved: {} in {:?}",
        format_size(report.bytes_reclaimed()),
        report.duration
    );
    println!("✓ Compaction complete");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::CliError;
    use crate::test_support::{open_notes, seeded, Note};
    use kindstore_core::CoreError;

    #[test]
    fn compaction_keeps_only_live_entries() {
        let (dir, root) = seeded(4, 5);
        let kinds = discover_kinds(&root).unwrap();
        let before = scan_kind(&kinds[0]).unwrap();

        let scratch = dir.path().join("scratch");
        let report = compact(&root, &kinds, Some(scratch.as_path())).unwrap();
        assert_eq!(report.kinds[0].entries_after, 4);
        assert!(report.bytes_reclaimed() > 0);

        let after = scan_kind(&kinds[0]).unwrap();
        assert_eq!(after.records, 4);
        assert_eq!(after.file_bytes, before.live_bytes);
        assert!(!scratch.exists());

        let db = open_notes(&root);
        assert_eq!(
            db.get::<Note>("n-3").unwrap(),
            Some(Note {
                text: "note 3 v4".into()
            })
        );
    }

    #[test]
    fn dry_run_changes_nothing() {
        let (_dir, root) = seeded(2, 3);
        let kinds = discover_kinds(&root).unwrap();
        let before = scan_kind(&kinds[0]).unwrap();

        run(&root, None, true).unwrap();
        assert_eq!(scan_kind(&kinds[0]).unwrap(), before);
    }

    #[test]
    fn open_database_is_not_compacted() {
        let (_dir, root) = seeded(1, 1);
        let _db = open_notes(&root);

        let result = run(&root, None, false);
        assert!(matches!(result, Err(CliError::Core(CoreError::Initialization(_)))));
    }
}
