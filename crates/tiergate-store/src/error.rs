//! Store error types.

use thiserror::Error;

/// Typed store failure. The store classifies by cause only; the resilience
/// layer decides severity, retryability, and fallback.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Backend rejected or failed the query.
    #[error("backend error: {0}")]
    Backend(String),

    /// Transport-level failure reaching the backend.
    #[error("network error: {0}")]
    Network(String),

    /// The call exceeded its deadline.
    #[error("timeout after {0}ms")]
    Timeout(u64),

    /// The row or request shape was invalid.
    #[error("validation error: {0}")]
    Validation(String),
}

impl StoreError {
    #[must_use]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }
}
