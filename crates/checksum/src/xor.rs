/// Number of accumulator slots, and bytes in the rendered digest.
pub const HASH_BYTES: usize = 8;

/// Order-independent checksum over bytes at known absolute offsets.
///
/// A byte at offset `o` folds into slot `o % HASH_BYTES`. The first byte
/// seen for a slot assigns it; every later byte for that slot XORs into
/// the existing value. Because XOR is commutative and associative, any
/// decomposition of a stream into disjoint ranges, hashed independently
/// and merged in any order, produces the same digest as hashing the
/// whole stream sequentially.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamingXor {
    slots: [u8; HASH_BYTES],
    touched: [bool; HASH_BYTES],
}

impl StreamingXor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one byte at the given absolute stream offset.
    pub fn update(&mut self, byte: u8, offset: u64) {
        let slot = (offset % HASH_BYTES as u64) as usize;
        if self.touched[slot] {
            self.slots[slot] ^= byte;
        } else {
            self.slots[slot] = byte;
            self.touched[slot] = true;
        }
    }

    /// Folds a buffer whose first byte sits at absolute offset `offset`.
    pub fn update_slice(&mut self, bytes: &[u8], offset: u64) {
        for (i, b) in bytes.iter().enumerate() {
            self.update(*b, offset + i as u64);
        }
    }

    /// Merges another partial digest into this one.
    ///
    /// Slots only the other side touched copy over verbatim; slots both
    /// sides touched XOR together. The ranges behind the two digests
    /// must be disjoint for the result to be meaningful.
    pub fn merge(&mut self, other: &StreamingXor) {
        for i in 0..HASH_BYTES {
            if other.touched[i] {
                self.update(other.slots[i], i as u64);
            }
        }
    }

    /// Renders the digest as a lowercase hex string of [`HASH_BYTES`]
    /// bytes. Slots that never saw input render as zero.
    pub fn to_hex(&self) -> String {
        hex::encode(self.slots)
    }
}
