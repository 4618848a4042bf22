//! SHA256 digest utilities
//!
//! Registries address every blob and manifest by `sha256:<hex>`. This module
//! computes, validates and normalizes those identifiers.

use crate::error::{MigrateError, Result};
use sha2::{Digest, Sha256};

const SHA256_PREFIX: &str = "sha256:";

pub struct DigestUtils;

impl DigestUtils {
    /// Compute the lowercase hex SHA256 of `data`
    pub fn compute_sha256(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        hex::encode(hasher.finalize())
    }

    /// Compute a full registry digest (`sha256:` prefixed) of `data`
    pub fn compute_docker_digest(data: &[u8]) -> String {
        format!("{}{}", SHA256_PREFIX, Self::compute_sha256(data))
    }

    pub fn is_valid_sha256_hex(digest: &str) -> bool {
        digest.len() == 64 && digest.chars().all(|c| c.is_ascii_hexdigit())
    }

    pub fn is_valid_docker_digest(digest: &str) -> bool {
        digest
            .strip_prefix(SHA256_PREFIX)
            .is_some_and(Self::is_valid_sha256_hex)
    }

    /// Normalize to the `sha256:<hex>` form, accepting a bare hex string
    pub fn normalize_digest(digest: &str) -> Result<String> {
        let hex_part = digest.strip_prefix(SHA256_PREFIX).unwrap_or(digest);
        if !Self::is_valid_sha256_hex(hex_part) {
            return Err(MigrateError::Digest(format!(
                "Invalid SHA256 digest: '{}'",
                digest
            )));
        }
        Ok(format!("{}{}", SHA256_PREFIX, hex_part.to_ascii_lowercase()))
    }

    /// Short form used in log lines
    pub fn short(digest: &str) -> &str {
        let hex_part = digest.strip_prefix(SHA256_PREFIX).unwrap_or(digest);
        &hex_part[..hex_part.len().min(12)]
    }
}
