use std::sync::Arc;

use shardbak_checksum::ChecksumStore;
use tracing::{error, info, warn};

use crate::TransferError;
use crate::coordinator::{FileTransfer, TransferState};
use crate::session::MultipartCoordinator;
use crate::types::ChunkUnit;

/// Runs one chunk to completion on a pool worker, absorbing recoverable
/// failures so nothing propagates past this file.
///
/// The runner consults the file coordinator before any I/O (skipping if
/// a sibling already failed), retries the chunk attempt within its
/// budget, and reports exactly one outcome. Whichever runner records
/// the final outstanding chunk also performs the one-time finalize and
/// persists the whole-file checksum.
pub struct ChunkRunner {
    file: Arc<FileTransfer>,
    unit: Arc<dyn ChunkUnit>,
    session: Option<Arc<MultipartCoordinator>>,
    store: Option<Arc<dyn ChecksumStore>>,
    retries: u32,
}

impl ChunkRunner {
    pub fn new(
        file: Arc<FileTransfer>,
        unit: Arc<dyn ChunkUnit>,
        session: Option<Arc<MultipartCoordinator>>,
        store: Option<Arc<dyn ChecksumStore>>,
        retries: u32,
    ) -> Self {
        Self {
            file,
            unit,
            session,
            store,
            retries,
        }
    }

    pub fn run(&self) {
        let path = self.file.path();
        if self.file.state() == TransferState::Error {
            info!(path, "skipping chunk because a sibling chunk failed");
            self.file.chunk_skipped();
            return;
        }

        let mut attempt = 0;
        loop {
            match self.unit.attempt() {
                Ok(digest) => {
                    if self.file.chunk_success(&digest) {
                        self.finalize();
                    }
                    return;
                }
                // The session was aborted between our start gate and the
                // upload: the aborting sibling recorded its chunk_error
                // first, so the file is already failed and skipping is
                // legal. No retry; the session will not come back.
                Err(TransferError::SessionAborted) => {
                    info!(path, "skipping chunk, multipart session was aborted");
                    self.file.chunk_skipped();
                    return;
                }
                Err(err) if attempt < self.retries => {
                    warn!(path, error = %err, "chunk transfer error, will retry");
                    attempt += 1;
                }
                Err(err) => {
                    error!(path, error = %err, "exhausted retries for chunk");
                    // Fail the file before touching the session so that
                    // an aborted session always implies a failed file.
                    self.file.chunk_error(Some(&err));
                    if let Some(session) = &self.session {
                        session.chunk_failed();
                    }
                    return;
                }
            }
        }
    }

    /// Runs the one-time finalize, with the same retry budget as the
    /// transfer itself, then persists the aggregated checksum.
    fn finalize(&self) {
        let path = self.file.path();
        let mut attempt = 0;
        loop {
            match self.unit.finalize_all() {
                Ok(()) => break,
                Err(err) if attempt < self.retries => {
                    warn!(path, error = %err, "finalize failed, will retry");
                    attempt += 1;
                }
                Err(err) => {
                    error!(path, error = %err, "finalize failed after all retries");
                    self.file.commit_failed(&err);
                    if let Some(session) = &self.session {
                        session.chunk_failed();
                    }
                    return;
                }
            }
        }
        self.file.file_committed();

        if let Some(store) = &self.store {
            self.save_checksum(store.as_ref());
        }
    }

    fn save_checksum(&self, store: &dyn ChecksumStore) {
        let path = self.file.path();
        let digest = self.file.combined_hex();
        let mut attempt = 0;
        loop {
            match store.put(path, &digest) {
                Ok(()) => {
                    self.file.checksum_saved();
                    return;
                }
                Err(err) if attempt < self.retries => {
                    warn!(path, error = %err, "failed writing checksum, will retry");
                    attempt += 1;
                }
                Err(err) => {
                    error!(path, error = %err, "all checksum write attempts failed");
                    self.file.checksum_save_failed();
                    return;
                }
            }
        }
    }
}
