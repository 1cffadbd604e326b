//! Reading exported model artifacts from disk.
//!
//! Artifacts are JSON files written by the offline training pipeline. Each
//! load also yields a content fingerprint so operators can tell which export
//! a running process is serving.

use crate::SentimenError;
use serde::de::DeserializeOwned;
use std::path::Path;

/// Compute a SipHash fingerprint of raw bytes, returned as 16-char hex string.
pub fn siphash_hex(data: &[u8]) -> String {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::hash::DefaultHasher::new();
    data.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

/// Read and deserialize one artifact. Returns the value and its fingerprint.
pub fn read_artifact<T: DeserializeOwned>(path: &Path) -> Result<(T, String), SentimenError> {
    let raw = std::fs::read(path).map_err(|e| invalid(path, e))?;
    let hash = siphash_hex(&raw);
    let value = serde_json::from_slice(&raw).map_err(|e| invalid(path, e))?;
    Ok((value, hash))
}

/// Attach the artifact path to a load or validation failure.
pub fn invalid(path: &Path, reason: impl std::fmt::Display) -> SentimenError {
    SentimenError::Artifact {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}
