//! On-disk archive: entry writer, attachment extraction and filesystem access.

pub mod attachments;
pub mod filename;
pub mod fs;
pub mod meta;
pub mod writer;

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
