//! Content hashing for change detection.
//!
//! Hashes are SHA-256 over a canonical YAML or JSON rendering, hex
//! encoded. They are stored in state so a later plan can tell whether a
//! resource's desired content changed without a remote read.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{MimirError, Result};

/// Hasher for computing content hashes.
#[derive(Debug, Default)]
pub struct ConfigHasher;

impl ConfigHasher {
    /// Creates a new hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Hashes raw bytes.
    #[must_use]
    pub fn hash_bytes(&self, bytes: &[u8]) -> String {
        hex::encode(Sha256::digest(bytes))
    }

    /// Hashes the YAML serialization of a value.
    ///
    /// This is the hash recorded as `content_hash` for a set of rule groups.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be serialized.
    pub fn hash_yaml<T: Serialize + ?Sized>(&self, value: &T) -> Result<String> {
        let yaml = serde_yaml::to_string(value).map_err(|e| MimirError::yaml("content hash", &e))?;
        Ok(self.hash_bytes(yaml.as_bytes()))
    }

    /// Hashes the JSON serialization of a resource spec.
    ///
    /// Field order follows the struct definitions and maps are `BTreeMap`s,
    /// so the rendering is deterministic.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be serialized.
    pub fn hash_spec<T: Serialize + ?Sized>(&self, value: &T) -> Result<String> {
        let json = serde_json::to_vec(value)
            .map_err(|e| MimirError::internal(format!("failed to serialize spec: {e}")))?;
        Ok(self.hash_bytes(&json))
    }

    /// Computes a short hash (first 8 characters) for display purposes.
    #[must_use]
    pub fn short_hash(&self, hash: &str) -> String {
        hash.chars().take(8).collect()
    }

    /// Compares two hashes in constant time.
    #[must_use]
    pub fn hashes_match(hash1: &str, hash2: &str) -> bool {
        if hash1.len() != hash2.len() {
            return false;
        }

        hash1
            .bytes()
            .zip(hash2.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}
