//! Error types for key-value operations.

use thiserror::Error;

/// Result type for key-value operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Key-value store errors.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Redis-specific error
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Value could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Stored value could not be decoded
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Counter operation on a non-integer value
    #[error("Value at \"{0}\" is not an integer")]
    NotAnInteger(String),

    /// Backend unreachable
    #[error("Connection error: {0}")]
    Connection(String),

    /// Invalid backend configuration
    #[error("Configuration error: {0}")]
    Config(String),
}
