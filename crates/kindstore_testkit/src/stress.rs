//! Stress helpers for KindStore.
//!
//! These drive a shared [`Db`] from many threads and count outcomes instead
//! of panicking, so callers can assert on the totals.

use crate::records::Account;
use kindstore_core::{CoreError, Db};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Reads that returned another key's value or nothing at all.
    pub mismatches: usize,
    /// Acknowledged puts whose value was gone once every thread finished.
    pub lost_writes: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(
        successful: usize,
        failed: usize,
        mismatches: usize,
        lost_writes: usize,
        duration: Duration,
    ) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            mismatches,
            lost_writes,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {name} ===");
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Mismatches: {}", self.mismatches);
        println!("Lost writes: {}", self.lost_writes);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of concurrent threads.
    pub threads: usize,
    /// Put then get cycles per thread.
    pub cycles_per_thread: usize,
    /// Length of the name written in each account.
    pub payload_size: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            threads: 8,
            cycles_per_thread: 1_000,
            payload_size: 64,
        }
    }
}

#[derive(Default)]
struct Counters {
    successful: AtomicUsize,
    failed: AtomicUsize,
    mismatches: AtomicUsize,
}

impl Counters {
    fn record(&self, outcome: Result<bool, CoreError>) -> Result<(), CoreError> {
        match outcome {
            Ok(matched) => {
                self.successful.fetch_add(1, Ordering::Relaxed);
                if !matched {
                    self.mismatches.fetch_add(1, Ordering::Relaxed);
                }
                Ok(())
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    fn result(&self, lost_writes: usize, duration: Duration) -> StressTestResult {
        StressTestResult::new(
            self.successful.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
            self.mismatches.load(Ordering::Relaxed),
            lost_writes,
            duration,
        )
    }
}

/// The account thread `t` writes in cycle `i`. Name and balance both encode
/// the writer, so a value decoded from another call's buffer is detectable.
fn expected_account(t: usize, i: usize, payload_size: usize) -> Account {
    let tag = format!("t{t}-i{i}-");
    let name: String = tag.chars().cycle().take(payload_size.max(tag.len())).collect();
    Account::new(name, (t * 1_000_000 + i) as i64)
}

fn key(t: usize, i: usize) -> String {
    format!("t{t}-k{i}")
}

/// One put/get cycle. Returns whether the read matched.
///
/// `i` lands in `acked` as soon as the put succeeds, even if the read fails.
fn cycle(
    db: &Db,
    t: usize,
    i: usize,
    config: &StressConfig,
    acked: &mut BTreeSet<usize>,
) -> Result<bool, CoreError> {
    let key = key(t, i);
    let account = expected_account(t, i, config.payload_size);
    db.put(&key, &account)?;
    acked.insert(i);
    Ok(db.get::<Account>(&key)?.as_ref() == Some(&account))
}

/// Joins every writer and counts acknowledged puts that no longer read back.
///
/// A read error counts as lost.
fn count_lost_writes(
    db: &Db,
    handles: Vec<thread::JoinHandle<BTreeSet<usize>>>,
    payload_size: usize,
) -> usize {
    let mut lost = 0;
    for (t, handle) in handles.into_iter().enumerate() {
        let acked = handle.join().expect("Thread panicked");
        for i in acked {
            let expected = expected_account(t, i, payload_size);
            if db.get::<Account>(&key(t, i)).ok().flatten() != Some(expected) {
                lost += 1;
            }
        }
    }
    lost
}

/// Every thread puts then reads back its own distinct keys.
///
/// With no other writers, every cycle should succeed with no mismatches
/// and no lost writes.
pub fn stress_concurrent_round_trips(db: Arc<Db>, config: &StressConfig) -> StressTestResult {
    let counters = Arc::new(Counters::default());
    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let db = Arc::clone(&db);
            let counters = Arc::clone(&counters);
            let config = config.clone();

            thread::spawn(move || {
                let mut acked = BTreeSet::new();
                for i in 0..config.cycles_per_thread {
                    let _ = counters.record(cycle(&db, t, i, &config, &mut acked));
                }
                acked
            })
        })
        .collect();

    let lost = count_lost_writes(&db, handles, config.payload_size);
    counters.result(lost, start.elapsed())
}

/// Runs round trips on every thread while the calling thread performs
/// `backups` compactions into `tmp`.
///
/// Without `exclusive_backup`, cycles hitting a store sealed or closed
/// mid-swap fail with a closed-store error; those are counted as failed,
/// anything else panics. Every put that succeeded is read back once the
/// backups are done; misses are reported as lost writes.
pub fn stress_round_trips_during_backup(
    db: Arc<Db>,
    config: &StressConfig,
    tmp: PathBuf,
    backups: usize,
) -> StressTestResult {
    let counters = Arc::new(Counters::default());
    let done = Arc::new(AtomicBool::new(false));
    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let db = Arc::clone(&db);
            let counters = Arc::clone(&counters);
            let done = Arc::clone(&done);
            let config = config.clone();

            thread::spawn(move || {
                let mut acked = BTreeSet::new();
                let mut i = 0;
                while i < config.cycles_per_thread || !done.load(Ordering::Acquire) {
                    let slot = i % config.cycles_per_thread.max(1);
                    match counters.record(cycle(&db, t, slot, &config, &mut acked)) {
                        Ok(()) => {}
                        Err(e) if e.is_store_closed() => {}
                        Err(e) => panic!("unexpected error during backup: {e}"),
                    }
                    i += 1;
                }
                acked
            })
        })
        .collect();

    for _ in 0..backups {
        db.backup(&tmp).expect("Backup failed");
    }
    done.store(true, Ordering::Release);

    let lost = count_lost_writes(&db, handles, config.payload_size);
    counters.result(lost, start.elapsed())
}
