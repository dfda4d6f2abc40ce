//! Error types for rate limiting

use azura_cache::CacheError;
use thiserror::Error;

/// Result type for rate limiting operations
pub type RateLimitResult<T> = Result<T, RateLimitError>;

#[derive(Debug, Error)]
pub enum RateLimitError {
    /// The client used up its window
    #[error("{message}")]
    LimitExceeded {
        group: String,
        ip: String,
        message: String,
    },

    /// The counter store failed
    #[error("Rate limit store error: {0}")]
    Store(#[from] CacheError),
}

impl RateLimitError {
    pub fn limit_exceeded(group: impl Into<String>, ip: impl Into<String>) -> Self {
        Self::LimitExceeded {
            group: group.into(),
            ip: ip.into(),
            message: azura_core::error::RATE_LIMIT_MESSAGE.to_string(),
        }
    }

    pub fn is_limit_exceeded(&self) -> bool {
        matches!(self, Self::LimitExceeded { .. })
    }
}

impl From<RateLimitError> for azura_core::Error {
    fn from(err: RateLimitError) -> Self {
        match err {
            RateLimitError::LimitExceeded { message, .. } => azura_core::Error::RateLimitExceeded(message),
            RateLimitError::Store(e) => azura_core::Error::Cache(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_converts_to_too_many_requests() {
        let err = RateLimitError::limit_exceeded("login", "10.0.0.1");
        assert!(err.is_limit_exceeded());

        let err: azura_core::Error = err.into();
        assert_eq!(err.status_code(), 429);
        assert_eq!(
            err.to_string(),
            "You have exceeded the rate limit for this application."
        );
    }
}
