use std::io::{self, Read};
use std::sync::Arc;

use shardbak_checksum::{StreamingXor, XorReader};
use shardbak_transfer::ChunkSpec;
use tracing::{error, warn};

use crate::state::VerifyMachine;

/// Byte-range access to a stored file, as the verifier needs it.
///
/// Implementations are the storage adapters (object store, distributed
/// filesystem, local disk); tests use in-memory buffers.
pub trait RangeReader: Send + Sync {
    /// Opens a reader over `len` bytes starting at byte `offset`.
    fn open_range(&self, offset: u64, len: u64) -> io::Result<Box<dyn Read + Send>>;
}

impl RangeReader for Vec<u8> {
    fn open_range(&self, offset: u64, len: u64) -> io::Result<Box<dyn Read + Send>> {
        let start = offset as usize;
        let end = start + len as usize;
        if end > self.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("range {start}..{end} beyond {} bytes", self.len()),
            ));
        }
        Ok(Box::new(io::Cursor::new(self[start..end].to_vec())))
    }
}

/// Hashes one chunk of one file on a pool worker and reports the
/// outcome to the file's [`VerifyMachine`].
pub struct ChunkChecksummer {
    source: Arc<dyn RangeReader>,
    spec: ChunkSpec,
    retries: u32,
    machine: Arc<VerifyMachine>,
}

impl ChunkChecksummer {
    pub fn new(
        source: Arc<dyn RangeReader>,
        spec: ChunkSpec,
        retries: u32,
        machine: Arc<VerifyMachine>,
    ) -> Self {
        Self {
            source,
            spec,
            retries,
            machine,
        }
    }

    pub fn run(&self) {
        if !self.machine.chunk_starting() {
            return;
        }

        let path = self.machine.path();
        let mut attempt = 0;
        loop {
            match self.checksum_range() {
                Ok(digest) => {
                    self.machine.chunk_finished(&digest);
                    return;
                }
                Err(err) if attempt < self.retries => {
                    warn!(path, chunk = self.spec.index, error = %err, "chunk read error, will retry");
                    attempt += 1;
                }
                Err(err) => {
                    error!(path, chunk = self.spec.index, error = %err, "all retries exhausted checksumming chunk");
                    self.machine.chunk_read_error(Some(&err));
                    return;
                }
            }
        }
    }

    fn checksum_range(&self) -> io::Result<StreamingXor> {
        let reader = self.source.open_range(self.spec.offset, self.spec.len)?;
        XorReader::new(reader, self.spec.offset).drain()
    }
}
