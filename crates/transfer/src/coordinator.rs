use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use shardbak_checksum::StreamingXor;

use crate::TransferError;
use crate::stats::TransferStats;

/// Lifecycle of one file's transfer.
///
/// `Error` is absorbing; there is no way back to a success state once
/// any chunk of the file has failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Pending,
    Error,
    ChunksComplete,
    Committed,
}

/// Per-file state machine shared by sibling chunk workers.
///
/// Tracks the outstanding chunk count, aggregates each chunk's digest
/// into the whole-file digest, and decides which worker performs the
/// one-time commit. Every public method is a single critical section
/// behind a mutex scoped to this file, so chunks of different files
/// never contend with each other.
///
/// The coordination contract: for a file with N chunks, exactly N calls
/// to `chunk_success` / `chunk_error` / `chunk_skipped` occur in total,
/// one per chunk. A call pattern outside the contract is a bug in the
/// caller and panics rather than being absorbed.
pub struct FileTransfer {
    path: String,
    stats: Arc<TransferStats>,
    inner: Mutex<Inner>,
}

struct Inner {
    state: TransferState,
    outstanding: u32,
    digest: StreamingXor,
}

impl FileTransfer {
    pub fn new(path: impl Into<String>, num_chunks: u32, stats: Arc<TransferStats>) -> Self {
        Self {
            path: path.into(),
            stats,
            inner: Mutex::new(Inner {
                state: TransferState::Pending,
                outstanding: num_chunks,
                digest: StreamingXor::new(),
            }),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn state(&self) -> TransferState {
        self.inner.lock().unwrap().state
    }

    /// Whole-file digest aggregated from the chunks reported so far.
    pub fn combined_hex(&self) -> String {
        self.inner.lock().unwrap().digest.to_hex()
    }

    /// Records one successfully transferred chunk and merges its digest.
    ///
    /// Returns `true` only for the call that completes the last
    /// outstanding chunk of a still-healthy file; that caller must then
    /// finalize the transfer and report [`file_committed`]
    /// (Self::file_committed). If the file already failed, the outcome
    /// is still recorded but the file stays failed and `false` is
    /// returned.
    pub fn chunk_success(&self, digest: &StreamingXor) -> bool {
        let mut inner = self.inner.lock().unwrap();
        assert!(
            matches!(inner.state, TransferState::Pending | TransferState::Error),
            "chunk_success for {} in state {:?}",
            self.path,
            inner.state
        );
        inner.digest.merge(digest);
        self.stats.chunks_succeeded.fetch_add(1, Ordering::Relaxed);
        inner.outstanding -= 1;
        if inner.state == TransferState::Pending && inner.outstanding == 0 {
            inner.state = TransferState::ChunksComplete;
            true
        } else {
            false
        }
    }

    /// Records one failed chunk. The first failure moves the file to
    /// `Error` and counts a failed file; later failures count only the
    /// chunk. Only the first failure's error is retained for the
    /// driver's post-run report.
    pub fn chunk_error(&self, err: Option<&TransferError>) {
        let mut inner = self.inner.lock().unwrap();
        assert!(
            matches!(inner.state, TransferState::Pending | TransferState::Error),
            "chunk_error for {} in state {:?}",
            self.path,
            inner.state
        );
        if inner.state == TransferState::Pending {
            if let Some(err) = err {
                self.stats.record_failure(err);
            }
        }
        self.stats.chunks_failed.fetch_add(1, Ordering::Relaxed);
        inner.outstanding -= 1;
        if inner.state != TransferState::Error {
            inner.state = TransferState::Error;
            self.stats.files_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Records a chunk that saw the file had already failed and never
    /// attempted I/O. Calling this while the file is healthy means a
    /// sibling raced incorrectly and panics.
    pub fn chunk_skipped(&self) {
        let mut inner = self.inner.lock().unwrap();
        assert!(
            inner.state == TransferState::Error,
            "chunk_skipped for {} in state {:?}: chunks may only be skipped after a sibling failed",
            self.path,
            inner.state
        );
        self.stats.chunks_skipped.fetch_add(1, Ordering::Relaxed);
        inner.outstanding -= 1;
    }

    /// Marks the one-time finalize as done. Valid only right after
    /// `chunk_success` returned `true`.
    pub fn file_committed(&self) {
        let mut inner = self.inner.lock().unwrap();
        assert!(
            inner.state == TransferState::ChunksComplete,
            "file_committed for {} in state {:?}",
            self.path,
            inner.state
        );
        inner.state = TransferState::Committed;
        self.stats.files_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    /// Records that the one-time finalize exhausted its retries. The
    /// file moves to `Error`; its chunks all transferred but the result
    /// was never made durable.
    pub fn commit_failed(&self, err: &TransferError) {
        let mut inner = self.inner.lock().unwrap();
        assert!(
            inner.state == TransferState::ChunksComplete,
            "commit_failed for {} in state {:?}",
            self.path,
            inner.state
        );
        inner.state = TransferState::Error;
        self.stats.record_failure(err);
        self.stats.files_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Post-commit checksum persistence succeeded.
    pub fn checksum_saved(&self) {
        self.stats.checksums_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    /// Post-commit checksum persistence exhausted its retries. Not a
    /// file failure; the data itself committed.
    pub fn checksum_save_failed(&self) {
        self.stats.checksums_failed.fetch_add(1, Ordering::Relaxed);
    }
}
