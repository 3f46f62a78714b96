// Content hashing shared by the blob store, the indexer and the watcher.

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 digest.
pub type ContentHash = String;

/// Length of a hex-encoded SHA-256 digest.
pub const CONTENT_HASH_LEN: usize = 64;

/// Compute the SHA-256 hash of the given bytes, returned as a lowercase hex string.
pub fn sha256_hex(content: &[u8]) -> ContentHash {
    let digest = Sha256::digest(content);
    let mut out = String::with_capacity(CONTENT_HASH_LEN);
    for byte in digest {
        out.push(HEX[usize::from(byte >> 4)] as char);
        out.push(HEX[usize::from(byte & 0x0f)] as char);
    }
    out
}

/// Stable identity of a workspace file: the hash of its normalized relative
/// path, so it survives content edits.
pub fn file_id(relative_path: &str) -> String {
    sha256_hex(relative_path.as_bytes())
}

/// True when `value` looks like a digest produced by [`sha256_hex`].
pub fn is_content_hash(value: &str) -> bool {
    value.len() == CONTENT_HASH_LEN
        && value.bytes().all(|byte| byte.is_ascii_digit() || (b'a'..=b'f').contains(&byte))
}

const HEX: &[u8; 16] = b"0123456789abcdef";
