use std::io;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use shardbak_checksum::ChecksumStore;
use tracing::{debug, info};

use crate::TransferError;
use crate::coordinator::FileTransfer;
use crate::pool::WorkerPool;
use crate::retry::ChunkRunner;
use crate::session::MultipartCoordinator;
use crate::stats::TransferStats;
use crate::types::ChunkUnit;

/// All the work for one file: its chunk units, plus the multipart
/// session they share when the backend needs one.
pub struct TransferJob {
    pub path: String,
    pub chunks: Vec<Arc<dyn ChunkUnit>>,
    pub session: Option<Arc<MultipartCoordinator>>,
}

impl TransferJob {
    pub fn new(path: impl Into<String>, chunks: Vec<Arc<dyn ChunkUnit>>) -> Self {
        Self {
            path: path.into(),
            chunks,
            session: None,
        }
    }

    pub fn with_session(mut self, session: Arc<MultipartCoordinator>) -> Self {
        self.session = Some(session);
        self
    }
}

/// Fans every file's chunks out over a bounded worker pool, waits for
/// the whole run to drain, and re-raises the first worker failure so a
/// single bad chunk anywhere yields a non-zero process exit.
///
/// One file failing never stops other files: failures are absorbed per
/// file and surfaced only after everything has been attempted.
pub fn run_transfers(
    jobs: Vec<TransferJob>,
    concurrency: usize,
    chunk_retries: u32,
    store: Option<Arc<dyn ChecksumStore>>,
    stats: Arc<TransferStats>,
) -> Result<(), TransferError> {
    let pool = WorkerPool::new(concurrency);

    for job in jobs {
        debug!(path = %job.path, chunks = job.chunks.len(), "queueing file for transfer");
        let file = Arc::new(FileTransfer::new(
            job.path,
            job.chunks.len() as u32,
            Arc::clone(&stats),
        ));
        for unit in job.chunks {
            let runner = ChunkRunner::new(
                Arc::clone(&file),
                unit,
                job.session.clone(),
                store.clone(),
                chunk_retries,
            );
            pool.execute(move || runner.run());
        }
    }

    pool.join();

    info!(
        files_copied = stats.files_succeeded.load(Ordering::Relaxed),
        files_failed = stats.files_failed.load(Ordering::Relaxed),
        chunks_copied = stats.chunks_succeeded.load(Ordering::Relaxed),
        chunks_failed = stats.chunks_failed.load(Ordering::Relaxed),
        chunks_skipped = stats.chunks_skipped.load(Ordering::Relaxed),
        "transfer run finished"
    );

    match stats.first_failure() {
        Some(first) => Err(TransferError::Io(io::Error::other(format!(
            "re-raising first worker failure: {first}"
        )))),
        None => Ok(()),
    }
}
