use std::io::{self, Read};

use crate::StreamingXor;

/// Folds every byte passing through a reader into a [`StreamingXor`].
///
/// The wrapped stream is anchored at an absolute starting offset so that
/// chunk workers reading disjoint ranges of one file produce digests
/// that merge into the whole-file digest.
pub struct XorReader<R> {
    inner: R,
    offset: u64,
    digest: StreamingXor,
}

impl<R: Read> XorReader<R> {
    pub fn new(inner: R, start_offset: u64) -> Self {
        Self {
            inner,
            offset: start_offset,
            digest: StreamingXor::new(),
        }
    }

    /// Digest of everything read so far.
    pub fn digest(&self) -> &StreamingXor {
        &self.digest
    }

    /// Consumes the reader, returning the accumulated digest.
    pub fn into_digest(self) -> StreamingXor {
        self.digest
    }

    /// Reads the wrapped stream to exhaustion, discarding the bytes, and
    /// returns the digest. Used when only the checksum is wanted.
    pub fn drain(mut self) -> io::Result<StreamingXor> {
        let mut scratch = [0u8; 16 * 1024];
        loop {
            match self.read(&mut scratch) {
                Ok(0) => return Ok(self.digest),
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }
}

impl<R: Read> Read for XorReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.digest.update_slice(&buf[..n], self.offset);
        self.offset += n as u64;
        Ok(n)
    }
}
