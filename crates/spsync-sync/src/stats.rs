//! Run statistics
//!
//! One [`UploadStatistics`] instance is shared by every worker of a run.
//! All counters are atomics, so workers update them without locking.
//!
//! Each file considered lands in exactly one of new, replaced, skipped or
//! failed, which keeps `new + replaced + skipped + failed` equal to the
//! number of files processed.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Names of the individual counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    NewFiles,
    ReplacedFiles,
    SkippedFiles,
    FailedFiles,
    DeletedFiles,
    BytesUploaded,
    BytesSkipped,
    ComparedByHash,
    ComparedBySize,
    HashNewSaved,
    HashUpdated,
    HashMatched,
    HashSaveFailed,
}

/// Thread-safe counters for one run.
#[derive(Debug, Default)]
pub struct UploadStatistics {
    new_files: AtomicU64,
    replaced_files: AtomicU64,
    skipped_files: AtomicU64,
    failed_files: AtomicU64,
    deleted_files: AtomicU64,
    bytes_uploaded: AtomicU64,
    bytes_skipped: AtomicU64,
    compared_by_hash: AtomicU64,
    compared_by_size: AtomicU64,
    hash_new_saved: AtomicU64,
    hash_updated: AtomicU64,
    hash_matched: AtomicU64,
    hash_save_failed: AtomicU64,
}

impl UploadStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    fn counter(&self, counter: Counter) -> &AtomicU64 {
        match counter {
            Counter::NewFiles => &self.new_files,
            Counter::ReplacedFiles => &self.replaced_files,
            Counter::SkippedFiles => &self.skipped_files,
            Counter::FailedFiles => &self.failed_files,
            Counter::DeletedFiles => &self.deleted_files,
            Counter::BytesUploaded => &self.bytes_uploaded,
            Counter::BytesSkipped => &self.bytes_skipped,
            Counter::ComparedByHash => &self.compared_by_hash,
            Counter::ComparedBySize => &self.compared_by_size,
            Counter::HashNewSaved => &self.hash_new_saved,
            Counter::HashUpdated => &self.hash_updated,
            Counter::HashMatched => &self.hash_matched,
            Counter::HashSaveFailed => &self.hash_save_failed,
        }
    }

    pub fn incr(&self, counter: Counter) {
        self.add(counter, 1);
    }

    pub fn add(&self, counter: Counter, amount: u64) {
        self.counter(counter).fetch_add(amount, Ordering::Relaxed);
    }

    /// Decrements without wrapping below zero.
    pub fn decr(&self, counter: Counter) {
        let _ = self
            .counter(counter)
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.counter(counter).load(Ordering::Relaxed)
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            new_files: self.get(Counter::NewFiles),
            replaced_files: self.get(Counter::ReplacedFiles),
            skipped_files: self.get(Counter::SkippedFiles),
            failed_files: self.get(Counter::FailedFiles),
            deleted_files: self.get(Counter::DeletedFiles),
            bytes_uploaded: self.get(Counter::BytesUploaded),
            bytes_skipped: self.get(Counter::BytesSkipped),
            compared_by_hash: self.get(Counter::ComparedByHash),
            compared_by_size: self.get(Counter::ComparedBySize),
            hash_new_saved: self.get(Counter::HashNewSaved),
            hash_updated: self.get(Counter::HashUpdated),
            hash_matched: self.get(Counter::HashMatched),
            hash_save_failed: self.get(Counter::HashSaveFailed),
        }
    }
}

/// Serializable copy of [`UploadStatistics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub new_files: u64,
    pub replaced_files: u64,
    pub skipped_files: u64,
    pub failed_files: u64,
    pub deleted_files: u64,
    pub bytes_uploaded: u64,
    pub bytes_skipped: u64,
    pub compared_by_hash: u64,
    pub compared_by_size: u64,
    pub hash_new_saved: u64,
    pub hash_updated: u64,
    pub hash_matched: u64,
    pub hash_save_failed: u64,
}

impl StatsSnapshot {
    /// Files that reached a terminal outcome.
    pub fn total_processed(&self) -> u64 {
        self.new_files + self.replaced_files + self.skipped_files + self.failed_files
    }

    /// Share of successfully handled files that needed no transfer.
    pub fn efficiency(&self) -> f64 {
        let handled = self.new_files + self.replaced_files + self.skipped_files;
        if handled == 0 {
            return 0.0;
        }
        self.skipped_files as f64 / handled as f64
    }

    /// Share of bytes that did not have to be sent.
    pub fn bandwidth_saved(&self) -> f64 {
        let total = self.bytes_uploaded + self.bytes_skipped;
        if total == 0 {
            return 0.0;
        }
        self.bytes_skipped as f64 / total as f64
    }
}

/// Human-readable byte count with one decimal, e.g. `1.5 MB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}
