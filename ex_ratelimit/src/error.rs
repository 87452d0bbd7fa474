use std::time::Duration;

use thiserror::Error;

use crate::category::Category;

/// Result type for rate limiting operations
pub type Result<T> = std::result::Result<T, RateLimitError>;

/// Errors that can occur during rate limiting operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RateLimitError {
    /// Retry budget exhausted before the category admitted the request
    #[error("Rate limit exceeded for {category}, retry after {retry_after:?}")]
    Exceeded { category: Category, retry_after: Duration },

    /// The caller's cancellation fired while waiting; no quota was consumed
    #[error("Acquire for {category} cancelled")]
    Cancelled { category: Category },

    /// Invalid configuration, reported before the coordinator is usable
    #[error("Invalid rate limiter configuration: {0}")]
    InvalidConfig(String),
}

impl RateLimitError {
    /// Suggested wait before trying again, if the error carries one
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            RateLimitError::Exceeded { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }
}
