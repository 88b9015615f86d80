use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::TransferError;

/// Worker errors retained beyond this count are dropped; the first one
/// is what the driver re-raises after the run drains.
const MAX_RECORDED_FAILURES: usize = 32;

/// Run-wide transfer counters.
///
/// One instance is shared by every file's coordinator in a run. The
/// counters are independent atomics so coordinators never contend on a
/// shared lock across files.
#[derive(Debug, Default)]
pub struct TransferStats {
    pub files_succeeded: AtomicU64,
    pub files_failed: AtomicU64,
    pub chunks_succeeded: AtomicU64,
    pub chunks_failed: AtomicU64,
    pub chunks_skipped: AtomicU64,
    pub checksums_succeeded: AtomicU64,
    pub checksums_failed: AtomicU64,
    failures: Mutex<Vec<String>>,
}

impl TransferStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a worker error for later surfacing by the driver.
    pub fn record_failure(&self, err: &TransferError) {
        let mut failures = self.failures.lock().unwrap();
        if failures.len() < MAX_RECORDED_FAILURES {
            failures.push(err.to_string());
        }
    }

    /// The first worker error recorded in this run, if any.
    pub fn first_failure(&self) -> Option<String> {
        self.failures.lock().unwrap().first().cloned()
    }

    /// Point-in-time copy of all counters, for reporting.
    pub fn snapshot(&self) -> TransferStatsSnapshot {
        TransferStatsSnapshot {
            files_succeeded: self.files_succeeded.load(Ordering::Relaxed),
            files_failed: self.files_failed.load(Ordering::Relaxed),
            chunks_succeeded: self.chunks_succeeded.load(Ordering::Relaxed),
            chunks_failed: self.chunks_failed.load(Ordering::Relaxed),
            chunks_skipped: self.chunks_skipped.load(Ordering::Relaxed),
            checksums_succeeded: self.checksums_succeeded.load(Ordering::Relaxed),
            checksums_failed: self.checksums_failed.load(Ordering::Relaxed),
            failures: self.failures.lock().unwrap().clone(),
        }
    }
}

/// Serializable view of [`TransferStats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferStatsSnapshot {
    pub files_succeeded: u64,
    pub files_failed: u64,
    pub chunks_succeeded: u64,
    pub chunks_failed: u64,
    pub chunks_skipped: u64,
    pub checksums_succeeded: u64,
    pub checksums_failed: u64,
    pub failures: Vec<String>,
}
