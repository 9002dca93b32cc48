//! Deterministic cache key generation

use sha2::{Digest, Sha256};

/// Produce a stable content-addressed digest from the given parts.
///
/// Parts are length-prefixed before hashing so that `["ab", "c"]` and
/// `["a", "bc"]` cannot collide. Identical part lists always produce the
/// identical digest.
pub fn generate_key(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// File-safe name for a full cache key, used by the persistent tier
pub(crate) fn key_file_name(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("{}.bin", hex::encode(hasher.finalize()))
}
