//! Read-side integrity verification for chunked transfers.
//!
//! Re-reads stored files in chunks across many workers, recombines the
//! per-chunk digests, and compares the result against the digest
//! recorded at transfer time. Files classify as matched, mismatched,
//! missing a stored checksum, or unreadable.

mod runner;
mod state;
mod stats;
mod worker;

pub use runner::{VerifyJob, run_verify};
pub use state::{Classification, VerifyMachine, VerifyState};
pub use stats::{VerifyStats, VerifyStatsSnapshot};
pub use worker::{ChunkChecksummer, RangeReader};
