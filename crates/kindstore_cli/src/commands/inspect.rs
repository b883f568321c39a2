//! Inspect command implementation.

use crate::scan::{discover_kinds, scan_kind, CliResult, LogScan};
use serde::Serialize;
use std::path::Path;

/// Database inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Database root.
    pub path: String,
    /// Total size of every store log in bytes.
    pub total_size: u64,
    /// Live entries across every kind.
    pub live_entries: usize,
    /// Bytes a compaction would reclaim across every kind.
    pub reclaimable_bytes: u64,
    /// Per-kind statistics, sorted by kind.
    pub kinds: Vec<KindInspection>,
}

/// Statistics for a single kind.
#[derive(Debug, Serialize)]
pub struct KindInspection {
    /// Kind name.
    pub kind: String,
    /// What the log scan found.
    #[serde(flatten)]
    pub scan: LogScan,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> CliResult<()> {
    let result = inspect(path)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text_output(&result),
    }

    Ok(())
}

fn inspect(path: &Path) -> CliResult<InspectResult> {
    let mut kinds = Vec::new();
    for dir in discover_kinds(path)? {
        kinds.push(KindInspection {
            kind: dir.kind.to_string(),
            scan: scan_kind(&dir)?,
        });
    }

    Ok(InspectResult {
        path: path.display().to_string(),
        total_size: kinds.iter().map(|k| k.scan.file_bytes).sum(),
        live_entries: kinds.iter().map(|k| k.scan.live_entries).sum(),
        reclaimable_bytes: kinds.iter().map(|k| k.scan.reclaimable_bytes()).sum(),
        kinds,
    })
}

fn print_text_output(result: &InspectResult) {
    println!("KindStore Database Inspection");
    println!("=============================");
    println!();
    println!("Path: {}", result.path);
    println!();
    println!("Storage:");
    println!("  Total size:   {}", format_size(result.total_size));
    println!("  Reclaimable:  {}", format_size(result.reclaimable_bytes));
    println!("  Live entries: {}", result.live_entries);

    if result.kinds.is_empty() {
        println!();
        println!("No kinds found");
        return;
    }

    println!();
    println!("Kinds:");
    for kind in &result.kinds {
        let scan = &kind.scan;
        println!(
            "  {}: {} live of {} records ({} tombstones), {} on disk, {} reclaimable",
            kind.kind,
            scan.live_entries,
            scan.records,
            scan.tombstones,
            format_size(scan.file_bytes),
            format_size(scan.reclaimable_bytes())
        );
        if let Some(offset) = scan.torn_tail {
            println!("    torn record at offset {offset}");
        }
        if let Some(corruption) = &scan.corruption {
            println!("    CORRUPT: {corruption}");
        }
    }
}

/// Renders a byte count with a binary unit.
pub(crate) fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} bytes")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
