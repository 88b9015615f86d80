use std::io;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use shardbak_checksum::{ChecksumStore, StreamingXor};
use tracing::{debug, error, info, warn};

use crate::stats::VerifyStats;

/// Lifecycle of one file's verification. `Error` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyState {
    PreStart,
    InProgress,
    Finished,
    Error,
}

/// Outcome classification once a file finishes verifying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Matched,
    Mismatched,
}

/// Per-file verification state machine, the read-side mirror of the
/// transfer coordinator.
///
/// A file's digest is computed in one or more chunks on separate
/// workers. The first chunk to start fetches the expected digest; the
/// last chunk to finish merges the parts and classifies the file as
/// matched or mismatched. Every method is one critical section behind
/// a per-file mutex.
pub struct VerifyMachine {
    path: String,
    fetch_retries: u32,
    store: Arc<dyn ChecksumStore>,
    stats: Arc<VerifyStats>,
    inner: Mutex<Inner>,
}

struct Inner {
    state: VerifyState,
    outstanding: u32,
    digest: StreamingXor,
    expected: Option<String>,
    classification: Option<Classification>,
}

impl VerifyMachine {
    pub fn new(
        path: impl Into<String>,
        num_chunks: u32,
        fetch_retries: u32,
        store: Arc<dyn ChecksumStore>,
        stats: Arc<VerifyStats>,
    ) -> Self {
        Self {
            path: path.into(),
            fetch_retries,
            store,
            stats,
            inner: Mutex::new(Inner {
                state: VerifyState::PreStart,
                outstanding: num_chunks,
                digest: StreamingXor::new(),
                expected: None,
                classification: None,
            }),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn state(&self) -> VerifyState {
        self.inner.lock().unwrap().state
    }

    /// How the file classified, once [`state`](Self::state) is
    /// `Finished`.
    pub fn classification(&self) -> Option<Classification> {
        self.inner.lock().unwrap().classification
    }

    /// Gate called by every chunk before it reads anything.
    ///
    /// The first caller fetches the expected digest from the store,
    /// with its own bounded retry. Returns whether the caller should
    /// proceed; `false` means the file is unverifiable (missing or
    /// unfetchable checksum, or an earlier chunk failed) and this chunk
    /// must do no I/O.
    pub fn chunk_starting(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            VerifyState::PreStart => {
                let mut attempt = 0;
                loop {
                    match self.store.get(&self.path) {
                        Ok(Some(expected)) => {
                            inner.expected = Some(expected);
                            inner.state = VerifyState::InProgress;
                            return true;
                        }
                        Ok(None) => {
                            warn!(path = %self.path, "no stored checksum, file is unverifiable");
                            self.stats.missing_checksums.fetch_add(1, Ordering::Relaxed);
                            inner.state = VerifyState::Error;
                            return false;
                        }
                        Err(err) if attempt < self.fetch_retries => {
                            error!(path = %self.path, error = %err, "failed fetching expected checksum, will retry");
                            attempt += 1;
                        }
                        Err(err) => {
                            error!(path = %self.path, error = %err, "retries exhausted fetching expected checksum");
                            self.stats.record_failure(&err);
                            self.stats
                                .unreadable_checksums
                                .fetch_add(1, Ordering::Relaxed);
                            self.stats.chunks_skipped.fetch_add(1, Ordering::Relaxed);
                            inner.state = VerifyState::Error;
                            return false;
                        }
                    }
                }
            }
            VerifyState::InProgress => true,
            VerifyState::Error => {
                debug!(path = %self.path, "skipping chunk, file already failed verification");
                self.stats.chunks_skipped.fetch_add(1, Ordering::Relaxed);
                false
            }
            VerifyState::Finished => {
                panic!("chunk_starting for {} after verification finished", self.path)
            }
        }
    }

    /// Merges one chunk's digest. The call that retires the last
    /// outstanding chunk classifies the whole file.
    pub fn chunk_finished(&self, digest: &StreamingXor) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            // A sibling failed while we were reading; our digest is moot.
            VerifyState::Error => {}
            VerifyState::InProgress => {
                inner.digest.merge(digest);
                inner.outstanding -= 1;
                if inner.outstanding == 0 {
                    inner.state = VerifyState::Finished;
                    let expected = inner
                        .expected
                        .as_deref()
                        .expect("expected digest is always set while in progress");
                    let computed = inner.digest.to_hex();
                    if expected == computed {
                        info!(path = %self.path, "checksum matched");
                        self.stats.matched.fetch_add(1, Ordering::Relaxed);
                        inner.classification = Some(Classification::Matched);
                    } else {
                        warn!(path = %self.path, expected, computed, "checksum mismatch");
                        self.stats.mismatched.fetch_add(1, Ordering::Relaxed);
                        inner.classification = Some(Classification::Mismatched);
                    }
                }
            }
            state => panic!("chunk_finished for {} in state {state:?}", self.path),
        }
    }

    /// Records an unreadable chunk. The first one fails the file; later
    /// ones count only the chunk.
    pub fn chunk_read_error(&self, err: Option<&io::Error>) {
        if let Some(err) = err {
            self.stats.record_failure(err);
        }
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            VerifyState::InProgress => {
                self.stats.unreadable_chunks.fetch_add(1, Ordering::Relaxed);
                self.stats.unreadable_files.fetch_add(1, Ordering::Relaxed);
                inner.state = VerifyState::Error;
            }
            VerifyState::Error => {
                self.stats.unreadable_chunks.fetch_add(1, Ordering::Relaxed);
            }
            state => panic!("chunk_read_error for {} in state {state:?}", self.path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardbak_checksum::MemoryChecksumStore;
    use std::thread;

    fn digest_of(bytes: &[u8], offset: u64) -> StreamingXor {
        let mut d = StreamingXor::new();
        d.update_slice(bytes, offset);
        d
    }

    fn store_with(path: &str, digest: &str) -> Arc<MemoryChecksumStore> {
        let store = Arc::new(MemoryChecksumStore::new());
        store.put(path, digest).unwrap();
        store
    }

    #[test]
    fn matching_digest_classifies_matched() {
        let store = store_with("f", "6162630000000000");
        let stats = Arc::new(VerifyStats::new());
        let machine = VerifyMachine::new("f", 1, 1, store, Arc::clone(&stats));

        assert!(machine.chunk_starting());
        machine.chunk_finished(&digest_of(b"abc", 0));

        assert_eq!(machine.state(), VerifyState::Finished);
        assert_eq!(machine.classification(), Some(Classification::Matched));
        assert_eq!(stats.matched.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn wrong_stored_digest_classifies_mismatched() {
        // A malformed stored value is just a mismatch, never an error.
        let store = store_with("f", "1234567");
        let stats = Arc::new(VerifyStats::new());
        let machine = VerifyMachine::new("f", 1, 1, store, Arc::clone(&stats));

        assert!(machine.chunk_starting());
        machine.chunk_finished(&digest_of(b"abc", 0));

        assert_eq!(machine.classification(), Some(Classification::Mismatched));
        assert_eq!(stats.mismatched.load(Ordering::Relaxed), 1);
        assert!(!stats.is_clean());
    }

    #[test]
    fn missing_checksum_blocks_all_chunks() {
        let store = Arc::new(MemoryChecksumStore::new());
        let stats = Arc::new(VerifyStats::new());
        let machine = VerifyMachine::new("f", 2, 1, store, Arc::clone(&stats));

        assert!(!machine.chunk_starting());
        assert_eq!(machine.state(), VerifyState::Error);
        // The second chunk is a plain skip, not another missing checksum.
        assert!(!machine.chunk_starting());

        assert_eq!(stats.missing_checksums.load(Ordering::Relaxed), 1);
        assert_eq!(stats.chunks_skipped.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn fetch_failure_retries_then_fails() {
        struct FlakyStore {
            failures_left: Mutex<u32>,
        }
        impl ChecksumStore for FlakyStore {
            fn get(&self, _path: &str) -> io::Result<Option<String>> {
                let mut left = self.failures_left.lock().unwrap();
                if *left > 0 {
                    *left -= 1;
                    return Err(io::Error::other("store flapping"));
                }
                Ok(Some("6162630000000000".into()))
            }
            fn put(&self, _path: &str, _hex: &str) -> io::Result<()> {
                Ok(())
            }
        }

        // Two failures, budget of two retries: the fetch succeeds.
        let stats = Arc::new(VerifyStats::new());
        let machine = VerifyMachine::new(
            "f",
            1,
            2,
            Arc::new(FlakyStore {
                failures_left: Mutex::new(2),
            }),
            Arc::clone(&stats),
        );
        assert!(machine.chunk_starting());

        // Three failures, budget of one retry: unverifiable.
        let stats = Arc::new(VerifyStats::new());
        let machine = VerifyMachine::new(
            "f",
            1,
            1,
            Arc::new(FlakyStore {
                failures_left: Mutex::new(3),
            }),
            Arc::clone(&stats),
        );
        assert!(!machine.chunk_starting());
        assert_eq!(stats.unreadable_checksums.load(Ordering::Relaxed), 1);
        assert_eq!(stats.chunks_skipped.load(Ordering::Relaxed), 1);
        assert!(stats.snapshot().failures.len() == 1);
    }

    #[test]
    fn read_error_fails_file_once() {
        let store = store_with("f", "6162630000000000");
        let stats = Arc::new(VerifyStats::new());
        let machine = VerifyMachine::new("f", 3, 1, store, Arc::clone(&stats));

        assert!(machine.chunk_starting());
        machine.chunk_read_error(Some(&io::Error::other("read failed")));
        machine.chunk_read_error(None);

        assert_eq!(stats.unreadable_chunks.load(Ordering::Relaxed), 2);
        assert_eq!(stats.unreadable_files.load(Ordering::Relaxed), 1);
        assert_eq!(machine.state(), VerifyState::Error);

        // A chunk finishing after the failure is silently discarded.
        machine.chunk_finished(&digest_of(b"x", 0));
        assert_eq!(machine.state(), VerifyState::Error);
        assert_eq!(stats.matched.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn chunks_merge_out_of_order_to_the_right_verdict() {
        let data: Vec<u8> = (0u8..120).collect();
        let mut whole = StreamingXor::new();
        whole.update_slice(&data, 0);

        let store = store_with("f", &whole.to_hex());
        let stats = Arc::new(VerifyStats::new());
        let machine = VerifyMachine::new("f", 3, 1, store, Arc::clone(&stats));

        assert!(machine.chunk_starting());
        machine.chunk_finished(&digest_of(&data[80..], 80));
        assert!(machine.chunk_starting());
        machine.chunk_finished(&digest_of(&data[..40], 0));
        assert!(machine.chunk_starting());
        machine.chunk_finished(&digest_of(&data[40..80], 40));

        assert_eq!(machine.classification(), Some(Classification::Matched));
    }

    #[test]
    fn concurrent_chunks_classify_exactly_once() {
        for _ in 0..25 {
            let data: Vec<u8> = (0u8..=199).collect();
            let mut whole = StreamingXor::new();
            whole.update_slice(&data, 0);

            let store = store_with("f", &whole.to_hex());
            let stats = Arc::new(VerifyStats::new());
            let machine = Arc::new(VerifyMachine::new("f", 4, 1, store, Arc::clone(&stats)));

            let data = Arc::new(data);
            let handles: Vec<_> = (0..4)
                .map(|i| {
                    let machine = Arc::clone(&machine);
                    let data = Arc::clone(&data);
                    thread::spawn(move || {
                        let (start, end) = (i * 50, (i + 1) * 50);
                        if machine.chunk_starting() {
                            machine.chunk_finished(&digest_of(&data[start..end], start as u64));
                        }
                    })
                })
                .collect();
            for h in handles {
                h.join().unwrap();
            }

            assert_eq!(machine.state(), VerifyState::Finished);
            assert_eq!(stats.matched.load(Ordering::Relaxed), 1);
            assert_eq!(stats.mismatched.load(Ordering::Relaxed), 0);
        }
    }

    #[test]
    #[should_panic(expected = "chunk_finished")]
    fn finish_before_start_panics() {
        let store = store_with("f", "6162630000000000");
        let machine = VerifyMachine::new("f", 1, 1, store, Arc::new(VerifyStats::new()));
        machine.chunk_finished(&StreamingXor::new());
    }
}
