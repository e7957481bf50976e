//! Error types for the cache.

use std::io;

/// Errors raised by the cache and its backing store.
///
/// None of these reach callers of [`Cache::get`](crate::Cache::get) or
/// [`Cache::put`](crate::Cache::put): they are logged and a failed read is
/// treated as a miss.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// A persisted record could not be decoded.
    #[error("corrupt cache record {key}: {reason}")]
    Corruption {
        /// The record's file stem or key.
        key: String,
        /// What failed to decode.
        reason: String,
    },

    /// The backing store failed an I/O operation.
    #[error("cache store I/O error: {0}")]
    Io(#[from] io::Error),

    /// A string was not a valid fingerprint.
    #[error("invalid fingerprint: {0:?}")]
    InvalidFingerprint(String),
}

impl CacheError {
    /// Returns true for [`CacheError::Corruption`].
    pub fn is_corruption(&self) -> bool {
        matches!(self, CacheError::Corruption { .. })
    }
}
