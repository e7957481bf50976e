//! Request fingerprints used as cache keys.

use crate::error::CacheError;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt;

/// SHA-256 digest of a normalized request, rendered as 64 lowercase hex chars.
///
/// Two requests share a fingerprint exactly when they target the same
/// service and operation with parameters that are equal after object keys are
/// sorted. Array order is significant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprints a request.
    pub fn of(service: &str, operation: &str, parameters: &Value) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(service.as_bytes());
        hasher.update([0u8]);
        hasher.update(operation.as_bytes());
        hasher.update([0u8]);
        hasher.update(canonicalize(parameters).to_string().as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Parses a previously rendered fingerprint.
    pub fn from_hex(hex: &str) -> Result<Self, CacheError> {
        let valid = hex.len() == 64
            && hex
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if valid {
            Ok(Self(hex.to_string()))
        } else {
            Err(CacheError::InvalidFingerprint(hex.to_string()))
        }
    }

    /// The hex rendering.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Rebuilds `value` with every object's keys inserted in sorted order.
///
/// The result serializes identically whether or not serde_json keeps
/// insertion order.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::with_capacity(map.len());
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key.as_str()]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
