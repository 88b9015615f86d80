use std::sync::Arc;
use std::sync::atomic::Ordering;

use shardbak_checksum::ChecksumStore;
use shardbak_transfer::{ChunkSpec, WorkerPool};
use tracing::{debug, info};

use crate::state::VerifyMachine;
use crate::stats::VerifyStats;
use crate::worker::{ChunkChecksummer, RangeReader};

/// One file to verify: its chunk layout plus byte-range access to the
/// stored bytes.
pub struct VerifyJob {
    pub path: String,
    pub chunks: Vec<ChunkSpec>,
    pub source: Arc<dyn RangeReader>,
}

/// Verifies every job over a bounded worker pool and reports whether
/// the whole run was clean.
///
/// `chunk_retries` bounds re-reads of one chunk; `fetch_retries` bounds
/// fetches of a file's expected digest. Returns `true` only if every
/// file classified as matched.
pub fn run_verify(
    jobs: Vec<VerifyJob>,
    concurrency: usize,
    chunk_retries: u32,
    fetch_retries: u32,
    store: Arc<dyn ChecksumStore>,
    stats: Arc<VerifyStats>,
) -> bool {
    let pool = WorkerPool::new(concurrency);

    for job in jobs {
        debug!(path = %job.path, chunks = job.chunks.len(), "queueing file for verification");
        let machine = Arc::new(VerifyMachine::new(
            job.path,
            job.chunks.len() as u32,
            fetch_retries,
            Arc::clone(&store),
            Arc::clone(&stats),
        ));
        for spec in job.chunks {
            let worker =
                ChunkChecksummer::new(Arc::clone(&job.source), spec, chunk_retries, Arc::clone(&machine));
            pool.execute(move || worker.run());
        }
    }

    pool.join();

    info!(
        matched = stats.matched.load(Ordering::Relaxed),
        mismatched = stats.mismatched.load(Ordering::Relaxed),
        missing = stats.missing_checksums.load(Ordering::Relaxed),
        unreadable_files = stats.unreadable_files.load(Ordering::Relaxed),
        "verification run finished"
    );

    stats.is_clean()
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardbak_checksum::{MemoryChecksumStore, StreamingXor};

    fn whole_digest(data: &[u8]) -> String {
        let mut d = StreamingXor::new();
        d.update_slice(data, 0);
        d.to_hex()
    }

    fn job(path: &str, data: &[u8], part_size: u64) -> VerifyJob {
        VerifyJob {
            path: path.into(),
            chunks: ChunkSpec::split(path, data.len() as u64, part_size),
            source: Arc::new(data.to_vec()) as Arc<dyn RangeReader>,
        }
    }

    #[test]
    fn correct_and_incorrect_checksums_both_detected() {
        let good: Vec<u8> = (0u8..128).collect();
        let bad: Vec<u8> = (0u8..50).collect();

        let store = Arc::new(MemoryChecksumStore::new());
        store.put("good", &whole_digest(&good)).unwrap();
        store.put("bad", "1234567").unwrap();

        let stats = Arc::new(VerifyStats::new());
        let clean = run_verify(
            vec![job("good", &good, 32), job("bad", &bad, 32)],
            2,
            1,
            1,
            store,
            Arc::clone(&stats),
        );

        assert!(!clean);
        let snap = stats.snapshot();
        assert_eq!(snap.matched, 1);
        assert_eq!(snap.mismatched, 1);
    }

    #[test]
    fn all_matching_files_are_clean() {
        let a: Vec<u8> = (0u8..128).collect();
        let b: Vec<u8> = (100u8..228).collect();

        let store = Arc::new(MemoryChecksumStore::new());
        store.put("a", &whole_digest(&a)).unwrap();
        store.put("b", &whole_digest(&b)).unwrap();

        let stats = Arc::new(VerifyStats::new());
        let clean = run_verify(
            // Uneven chunking across many workers.
            vec![job("a", &a, 7), job("b", &b, 128)],
            4,
            1,
            1,
            store,
            Arc::clone(&stats),
        );

        assert!(clean);
        assert_eq!(stats.snapshot().matched, 2);
    }

    #[test]
    fn missing_checksum_reads_nothing_and_fails_run() {
        let data: Vec<u8> = (0u8..128).collect();
        let store = Arc::new(MemoryChecksumStore::new());

        let stats = Arc::new(VerifyStats::new());
        let clean = run_verify(
            vec![job("orphan", &data, 32)],
            2,
            1,
            1,
            store,
            Arc::clone(&stats),
        );

        assert!(!clean);
        let snap = stats.snapshot();
        assert_eq!(snap.missing_checksums, 1);
        assert_eq!(snap.matched, 0);
        // The other three chunks all skipped.
        assert_eq!(snap.chunks_skipped, 3);
    }
}
