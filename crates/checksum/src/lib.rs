//! Order-independent streaming checksum for out-of-order chunk transfers.
//!
//! Multipart transfers move byte ranges of one file in arbitrary order,
//! so a conventional rolling hash cannot be computed incrementally.
//! [`StreamingXor`] keeps one XOR accumulator per offset residue, which
//! makes partial digests mergeable no matter which order the chunks
//! finish in.

mod reader;
mod store;
mod xor;

pub use reader::XorReader;
pub use store::{ChecksumStore, MemoryChecksumStore};
pub use xor::{HASH_BYTES, StreamingXor};
