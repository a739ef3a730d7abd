use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::errors::HdxError;
use crate::serde::to_canonical_json_bytes;

/// Lowercase hex SHA-256 of the canonical JSON of `value`.
pub fn stable_hash_string<T: Serialize>(value: &T) -> Result<String, HdxError> {
    let digest = Sha256::digest(to_canonical_json_bytes(value)?);
    Ok(format!("{digest:x}"))
}
