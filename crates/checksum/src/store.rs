use std::collections::HashMap;
use std::io;
use std::sync::RwLock;

/// Storage for whole-file digests, keyed by relative path.
///
/// The stored value is the verbatim lowercase hex string produced by
/// [`StreamingXor::to_hex`](crate::StreamingXor::to_hex). Implementations
/// must be safe to call from many worker threads at once.
pub trait ChecksumStore: Send + Sync {
    /// Returns the stored digest for `path`, or `None` if absent.
    fn get(&self, path: &str) -> io::Result<Option<String>>;

    /// Stores the digest for `path`, replacing any previous value.
    fn put(&self, path: &str, hex_digest: &str) -> io::Result<()>;
}

/// Thread-safe in-memory store. Serves as the test double across the
/// workspace; real deployments plug in an object-store implementation.
#[derive(Debug, Default)]
pub struct MemoryChecksumStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryChecksumStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored digests.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ChecksumStore for MemoryChecksumStore {
    fn get(&self, path: &str) -> io::Result<Option<String>> {
        Ok(self.entries.read().unwrap().get(path).cloned())
    }

    fn put(&self, path: &str, hex_digest: &str) -> io::Result<()> {
        self.entries
            .write()
            .unwrap()
            .insert(path.to_string(), hex_digest.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_missing_returns_none() {
        let store = MemoryChecksumStore::new();
        assert_eq!(store.get("nope").unwrap(), None);
    }

    #[test]
    fn put_then_get() {
        let store = MemoryChecksumStore::new();
        store.put("a/b.dat", "6162630000000000").unwrap();
        assert_eq!(
            store.get("a/b.dat").unwrap().as_deref(),
            Some("6162630000000000")
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn put_overwrites() {
        let store = MemoryChecksumStore::new();
        store.put("f", "0000000000000000").unwrap();
        store.put("f", "ffffffffffffffff").unwrap();
        assert_eq!(store.get("f").unwrap().as_deref(), Some("ffffffffffffffff"));
    }
}
