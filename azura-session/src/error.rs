//! Error types for session operations.

use azura_cache::CacheError;
use thiserror::Error;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Session-specific errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Backing store failure
    #[error("Session store error: {0}")]
    Store(#[from] CacheError),

    /// Value could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Stored payload could not be decoded
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Malformed session ID
    #[error("Invalid session ID: {0}")]
    InvalidSessionId(String),
}
