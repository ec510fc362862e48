//! SHA-256 helpers shared across the workspace.
//!
//! All content addressing in opack uses SHA-256 rendered as 64 lowercase hex
//! characters. Declared hashes are validated to that shape at parse time so
//! later comparisons are plain string equality.

use sha2::{Digest, Sha256};

use crate::{Error, Result};

/// Length of a SHA-256 digest in hex characters.
pub const DIGEST_HEX_LEN: usize = 64;

/// Compute the SHA-256 digest of `data` as lowercase hex.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Validate that `digest` is a well-formed SHA-256 hex digest.
///
/// Accepts uppercase input and returns the normalized lowercase form.
///
/// # Errors
///
/// Returns a validation error if the string has the wrong length or contains
/// non-hex characters.
pub fn normalize_digest(digest: &str) -> Result<String> {
    if digest.len() != DIGEST_HEX_LEN {
        return Err(Error::validation(format!(
            "digest must be {DIGEST_HEX_LEN} hex characters, got {}",
            digest.len()
        )));
    }
    if !digest.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::validation(format!(
            "digest contains non-hex characters: '{digest}'"
        )));
    }
    Ok(digest.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hex_known_vector() {
        // SHA-256 of "hello world"
        assert_eq!(
            sha256_hex(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_normalize_digest_lowercases() {
        let upper = "B94D27B9934D3E08A52E52D7DA7DABFAC484EFE37A5380EE9088F7ACE2EFCDE9";
        let normalized = normalize_digest(upper).unwrap();
        assert_eq!(
            normalized,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_normalize_digest_rejects_bad_length() {
        assert!(normalize_digest("abc123").is_err());
        assert!(normalize_digest("").is_err());
    }

    #[test]
    fn test_normalize_digest_rejects_non_hex() {
        let bad = "zz4d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";
        assert!(normalize_digest(bad).is_err());
    }
}
