use std::io;
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::TransferError;

/// Opaque handle to an open multipart session, as issued by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle(pub String);

/// Token returned by the backend for one uploaded part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartToken {
    pub index: u32,
    pub token: String,
}

/// Backend surface for assembling separately uploaded parts into one
/// final object. Mirrors the multipart-upload shape of large-object
/// stores.
pub trait RemoteSession: Send + Sync {
    fn open(&self, path: &str) -> io::Result<SessionHandle>;

    fn upload_part(&self, handle: &SessionHandle, index: u32, bytes: &[u8])
    -> io::Result<PartToken>;

    fn complete(&self, handle: &SessionHandle, parts: &[PartToken]) -> io::Result<()>;

    fn abort(&self, handle: &SessionHandle) -> io::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Absent,
    Open,
    Aborted,
    Done,
}

/// Coordinates the one-time open/complete/abort of a multipart session
/// shared by sibling chunk workers.
///
/// The first chunk to run opens the session; the chunk that records the
/// last part completes it; the first chunk to fail aborts it. Each of
/// those remote calls happens at most once per file, guarded by the
/// same critical section that inspects the phase.
pub struct MultipartCoordinator {
    path: String,
    total_parts: u32,
    remote: Arc<dyn RemoteSession>,
    inner: Mutex<SessionInner>,
}

struct SessionInner {
    phase: Phase,
    handle: Option<SessionHandle>,
    parts: Vec<PartToken>,
}

impl MultipartCoordinator {
    pub fn new(path: impl Into<String>, total_parts: u32, remote: Arc<dyn RemoteSession>) -> Self {
        Self {
            path: path.into(),
            total_parts,
            remote,
            inner: Mutex::new(SessionInner {
                phase: Phase::Absent,
                handle: None,
                parts: Vec::new(),
            }),
        }
    }

    /// Returns the session handle, opening the session on first use.
    ///
    /// `None` means a sibling chunk already aborted the session; the
    /// caller must not upload and should surface
    /// [`TransferError::SessionAborted`]. An open failure leaves the
    /// session absent so a retry can attempt the open again.
    pub fn before_chunk(&self) -> Result<Option<SessionHandle>, TransferError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.phase {
            Phase::Aborted => Ok(None),
            Phase::Open => Ok(inner.handle.clone()),
            Phase::Absent => {
                debug!(path = %self.path, "opening multipart session");
                let handle = self.remote.open(&self.path).map_err(|err| {
                    TransferError::Session(format!("opening session for {}: {err}", self.path))
                })?;
                inner.handle = Some(handle.clone());
                inner.phase = Phase::Open;
                Ok(Some(handle))
            }
            Phase::Done => panic!(
                "before_chunk for {} after session completed",
                self.path
            ),
        }
    }

    /// Records one uploaded part. The call that records the last of the
    /// N parts also completes the session against the backend, exactly
    /// once. A completion failure leaves the session open so the caller
    /// can retry; the re-uploaded part replaces its previous token.
    pub fn chunk_completed(&self, part: PartToken) -> Result<(), TransferError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.phase {
            Phase::Open => {
                inner.parts.retain(|p| p.index != part.index);
                inner.parts.push(part);
                if inner.parts.len() as u32 == self.total_parts {
                    inner.parts.sort_by_key(|p| p.index);
                    let handle = inner
                        .handle
                        .clone()
                        .expect("open session always has a handle");
                    info!(path = %self.path, "completing multipart session");
                    self.remote.complete(&handle, &inner.parts).map_err(|err| {
                        TransferError::Session(format!(
                            "completing session for {}: {err}",
                            self.path
                        ))
                    })?;
                    inner.phase = Phase::Done;
                }
                Ok(())
            }
            // A sibling failed after this part uploaded; the abort
            // already discarded the remote parts.
            Phase::Aborted => Ok(()),
            phase => panic!(
                "chunk_completed for {} in phase {:?}",
                self.path, phase
            ),
        }
    }

    /// Reacts to a failed chunk: abort the session if it is open,
    /// best-effort. Abort failures are logged, not propagated; the file
    /// is already failed. No-op if a sibling aborted first.
    pub fn chunk_failed(&self) {
        let mut inner = self.inner.lock().unwrap();
        match inner.phase {
            Phase::Open => {
                inner.phase = Phase::Aborted;
                warn!(path = %self.path, "aborting multipart session");
                if let Some(handle) = &inner.handle {
                    if let Err(err) = self.remote.abort(handle) {
                        warn!(path = %self.path, error = %err, "failed to abort multipart session");
                    }
                }
            }
            // Never opened: mark aborted so siblings stop before
            // opening a session for a file that already failed.
            Phase::Absent => inner.phase = Phase::Aborted,
            Phase::Aborted => {}
            // All parts were assembled before this failure surfaced;
            // the finished object stands.
            Phase::Done => {}
        }
    }
}
