//! Content hashing for deduplication.
//!
//! Digests are lowercase hex SHA-256. Whole-file ingest hashes the buffer once;
//! chunk merges feed [`ContentHasher`] as bytes stream past.

use sha2::{Digest, Sha256};

/// Digest of a complete buffer.
pub fn digest(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Incremental hasher that also counts the bytes it has seen.
#[derive(Clone, Default)]
pub struct ContentHasher {
    inner: Sha256,
    bytes: u64,
}

impl ContentHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
        self.bytes += data.len() as u64;
    }

    pub fn bytes_hashed(&self) -> u64 {
        self.bytes
    }

    pub fn finalize(self) -> String {
        hex::encode(self.inner.finalize())
    }
}
