//! Shared SHA-256 hex digest utility.
//!
//! Input media are stored under the digest of their bytes so that
//! resubmitting the same reference image lands on the same object.

use sha2::{Digest, Sha256};

/// Compute a SHA-256 hex digest of the given bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    let hash = Sha256::digest(data);
    format!("{hash:x}")
}
