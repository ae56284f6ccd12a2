//! Content hashing using BLAKE3

use crate::types::Hash;
use blake3::Hasher;

/// Compute content hash for file bytes
///
/// Stored next to file content so changed content can be detected without
/// comparing bytes.
pub fn compute_content_hash(content: &[u8]) -> Hash {
    let mut hasher = Hasher::new();
    hasher.update(content);
    *hasher.finalize().as_bytes()
}

/// First 12 hex characters of a hash, for display.
pub fn short_hex(hash: &Hash) -> String {
    let mut full = hex::encode(hash);
    full.truncate(12);
    full
}
