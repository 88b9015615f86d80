use std::io;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

const MAX_RECORDED_FAILURES: usize = 32;

/// Run-wide verification counters, shared across every file's verifier.
#[derive(Debug, Default)]
pub struct VerifyStats {
    pub matched: AtomicU64,
    pub mismatched: AtomicU64,
    pub missing_checksums: AtomicU64,
    pub unreadable_checksums: AtomicU64,
    pub unreadable_chunks: AtomicU64,
    pub unreadable_files: AtomicU64,
    pub chunks_skipped: AtomicU64,
    failures: Mutex<Vec<String>>,
}

impl VerifyStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a worker error for the post-run report.
    pub fn record_failure(&self, err: &io::Error) {
        let mut failures = self.failures.lock().unwrap();
        if failures.len() < MAX_RECORDED_FAILURES {
            failures.push(err.to_string());
        }
    }

    /// `true` when every verified file matched and nothing was missing
    /// or unreadable.
    pub fn is_clean(&self) -> bool {
        self.mismatched.load(Ordering::Relaxed) == 0
            && self.missing_checksums.load(Ordering::Relaxed) == 0
            && self.unreadable_checksums.load(Ordering::Relaxed) == 0
            && self.unreadable_files.load(Ordering::Relaxed) == 0
    }

    pub fn snapshot(&self) -> VerifyStatsSnapshot {
        VerifyStatsSnapshot {
            matched: self.matched.load(Ordering::Relaxed),
            mismatched: self.mismatched.load(Ordering::Relaxed),
            missing_checksums: self.missing_checksums.load(Ordering::Relaxed),
            unreadable_checksums: self.unreadable_checksums.load(Ordering::Relaxed),
            unreadable_chunks: self.unreadable_chunks.load(Ordering::Relaxed),
            unreadable_files: self.unreadable_files.load(Ordering::Relaxed),
            chunks_skipped: self.chunks_skipped.load(Ordering::Relaxed),
            failures: self.failures.lock().unwrap().clone(),
        }
    }
}

/// Serializable view of [`VerifyStats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyStatsSnapshot {
    pub matched: u64,
    pub mismatched: u64,
    pub missing_checksums: u64,
    pub unreadable_checksums: u64,
    pub unreadable_chunks: u64,
    pub unreadable_files: u64,
    pub chunks_skipped: u64,
    pub failures: Vec<String>,
}
