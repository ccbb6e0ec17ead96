//! Checksum calculation for migration content

use sha2::{Digest, Sha256};

/// Calculate the SHA-256 checksum of processed migration content
///
/// The digest of the content as it was sent to the database is stored on the
/// execution record, so the audit trail captures exactly what ran.
pub fn content_checksum(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let hash = hasher.finalize();
    format!("{:x}", hash)
}
