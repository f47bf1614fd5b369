//! Stable workspace identifiers derived from a source reference and a prompt.

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 over the length-prefixed `(source_ref, prompt)` pair.
///
/// Each field is preceded by its byte length as a little-endian `u64`, so no
/// choice of field contents can shift bytes from one field into the other.
pub fn fingerprint(source_ref: &str, prompt: &str) -> String {
    let mut hasher = Sha256::new();
    for field in [source_ref, prompt] {
        hasher.update((field.len() as u64).to_le_bytes());
        hasher.update(field.as_bytes());
    }
    hex::encode(hasher.finalize())
}
