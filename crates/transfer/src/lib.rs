//! Chunk coordination for concurrent multi-part file transfers.
//!
//! A large file is split into disjoint byte ranges ("chunks") that
//! independent blocking workers transfer in parallel. This crate owns
//! the per-file state machine that lets those workers agree, exactly
//! once, on when the file is done: whichever worker completes the last
//! outstanding chunk performs the one-time finalize, a failing chunk
//! fails the whole file without losing committed sibling progress, and
//! chunks that start after a sibling failed skip their I/O entirely.

mod coordinator;
mod pool;
mod retry;
mod runner;
mod session;
mod stats;
mod types;

pub use coordinator::{FileTransfer, TransferState};
pub use pool::WorkerPool;
pub use retry::ChunkRunner;
pub use runner::{TransferJob, run_transfers};
pub use session::{MultipartCoordinator, PartToken, RemoteSession, SessionHandle};
pub use stats::{TransferStats, TransferStatsSnapshot};
pub use types::{ChunkSpec, ChunkUnit};

/// Errors produced while transferring chunks.
///
/// Every variant is recoverable at the chunk level and subject to the
/// retry budget; coordination-contract violations are not errors but
/// panics, so they can never be silently absorbed.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("remote session error: {0}")]
    Session(String),

    #[error("multipart session aborted by a sibling chunk")]
    SessionAborted,
}
