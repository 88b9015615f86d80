use shardbak_checksum::StreamingXor;

use crate::TransferError;

/// Immutable description of one byte range of one file.
///
/// Specs are created once by the driver when it decides a file's chunk
/// boundaries; workers never mutate them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSpec {
    /// Path of the file this chunk belongs to, relative to the
    /// transfer root.
    pub path: String,
    /// Absolute byte offset of the first byte of the chunk.
    pub offset: u64,
    /// Length of the chunk in bytes.
    pub len: u64,
    /// Zero-based chunk index within the file.
    pub index: u32,
}

impl ChunkSpec {
    /// Splits a file of `file_len` bytes into chunks of at most
    /// `part_size` bytes. An empty file still yields one zero-length
    /// chunk so its transfer has an outcome to record.
    pub fn split(path: &str, file_len: u64, part_size: u64) -> Vec<ChunkSpec> {
        assert!(part_size > 0, "part_size must be non-zero");
        let count = (file_len.div_ceil(part_size)).max(1);
        (0..count)
            .map(|i| {
                let offset = i * part_size;
                ChunkSpec {
                    path: path.to_string(),
                    offset,
                    len: part_size.min(file_len - offset),
                    index: i as u32,
                }
            })
            .collect()
    }
}

/// One unit of transfer work: move one byte range of one file.
pub trait ChunkUnit: Send + Sync {
    /// Transfers this chunk's bytes and returns the digest of exactly
    /// the bytes that moved. Failures are recoverable and may be
    /// retried by the runner; each retry must be a clean re-attempt.
    fn attempt(&self) -> Result<StreamingXor, TransferError>;

    /// One-time per-file finalize, invoked by whichever worker
    /// completes the last outstanding chunk. Must be idempotent.
    fn finalize_all(&self) -> Result<(), TransferError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_exact_multiple() {
        let chunks = ChunkSpec::split("f", 100, 25);
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].offset, 0);
        assert_eq!(chunks[3].offset, 75);
        assert!(chunks.iter().all(|c| c.len == 25));
        assert_eq!(chunks[2].index, 2);
    }

    #[test]
    fn split_with_remainder() {
        let chunks = ChunkSpec::split("f", 10, 4);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].offset, 8);
        assert_eq!(chunks[2].len, 2);
    }

    #[test]
    fn split_smaller_than_part() {
        let chunks = ChunkSpec::split("f", 3, 1024);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len, 3);
    }

    #[test]
    fn split_empty_file_yields_one_chunk() {
        let chunks = ChunkSpec::split("f", 0, 1024);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len, 0);
    }
}
