//! Verify command implementation.

use crate::scan::{discover_kinds, scan_kind, CliError, CliResult, LogScan};
use std::path::Path;

/// Runs the verify command.
///
/// Every record of every store log is framed and checksummed. A torn final
/// record is reported but does not fail verification, since opening the
/// store cuts it off without losing a committed write.
pub fn run(path: &Path) -> CliResult<()> {
    println!("Verifying database at {}", path.display());
    println!();

    let results = verify(path)?;
    for (kind, scan) in &results {
        print_result(kind, scan);
    }

    let failed = results.iter().filter(|(_, scan)| !scan.is_ok()).count();
    println!();
    if failed == 0 {
        println!("✓ Database verification passed ({} kinds)", results.len());
        Ok(())
    } else {
        println!("✗ Database verification failed");
        Err(CliError::VerificationFailed(failed))
    }
}

fn verify(path: &Path) -> CliResult<Vec<(String, LogScan)>> {
    discover_kinds(path)?
        .iter()
        .map(|dir| -> CliResult<(String, LogScan)> {
            Ok((dir.kind.to_string(), scan_kind(dir)?))
        })
        .collect()
}

fn print_result(kind: &str, scan: &LogScan) {
    println!(
        "  {kind}: {} records checked, {} live",
        scan.records, scan.live_entries
    );
    if let Some(offset) = scan.torn_tail {
        println!(
            "    WARNING: torn record at offset {offset}, {} bytes will be dropped on open",
            scan.file_bytes - offset
        );
    }
    if let Some(corruption) = &scan.corruption {
        println!("    ERROR: {corruption}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::seeded;
    use kindstore_engine::{HEADER_SIZE, LOG_FILE};
    use std::fs::{self, OpenOptions};
    use std::io::Write;

    #[test]
    fn clean_database_passes() {
        let (_dir, root) = seeded(5, 2);
        assert!(run(&root).is_ok());
    }

    #[test]
    fn torn_tail_only_warns() {
        let (_dir, root) = seeded(2, 1);
        let log = root.join("Note").join(LOG_FILE);
        let mut file = OpenOptions::new().append(true).open(&log).unwrap();
        file.write_all(&[9, 0, 0]).unwrap();

        let results = verify(&root).unwrap();
        assert!(results[0].1.torn_tail.is_some());
        assert!(run(&root).is_ok());
    }

    #[test]
    fn flipped_byte_fails_verification() {
        let (_dir, root) = seeded(3, 1);
        let log = root.join("Note").join(LOG_FILE);
        let mut bytes = fs::read(&log).unwrap();
        bytes[HEADER_SIZE] ^= 0xFF;
        fs::write(&log, bytes).unwrap();

        assert!(matches!(run(&root), Err(CliError::VerificationFailed(1))));
    }
}
