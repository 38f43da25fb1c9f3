//! Engine error taxonomy.
//!
//! Every failure inside the engine is classified into one of these variants,
//! each carrying a severity and a retryability flag. Store and catalog
//! errors never escape the query façade; they are converted into fallback
//! results with the `user_message` as the reason.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Severity attached to an error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Engine error taxonomy.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineError {
    #[error("network error: {message}")]
    Network { message: String },

    #[error("store error: {message}")]
    Store { message: String },

    #[error("authentication error: {message}")]
    Authentication { message: String },

    #[error("authorization error: {message}")]
    Authorization { message: String },

    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String },

    #[error("timeout: {message}")]
    Timeout { message: String },

    #[error("unknown error: {message}")]
    Unknown { message: String },
}

impl EngineError {
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn authorization(message: impl Into<String>) -> Self {
        Self::Authorization {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::Unknown {
            message: message.into(),
        }
    }

    /// Stable classification name, used in metrics labels and error stats.
    #[must_use]
    pub const fn class(&self) -> &'static str {
        match self {
            Self::Network { .. } => "network",
            Self::Store { .. } => "store",
            Self::Authentication { .. } => "authentication",
            Self::Authorization { .. } => "authorization",
            Self::Validation { .. } => "validation",
            Self::ServiceUnavailable { .. } => "service_unavailable",
            Self::Timeout { .. } => "timeout",
            Self::Unknown { .. } => "unknown",
        }
    }

    #[must_use]
    pub const fn severity(&self) -> Severity {
        match self {
            Self::Store { .. } | Self::ServiceUnavailable { .. } => Severity::Critical,
            Self::Network { .. } | Self::Authentication { .. } | Self::Timeout { .. } => {
                Severity::High
            }
            Self::Authorization { .. } | Self::Unknown { .. } => Severity::Medium,
            Self::Validation { .. } => Severity::Low,
        }
    }

    /// Whether the resilience layer may schedule a retry for this error.
    #[must_use]
    pub const fn retryable(&self) -> bool {
        matches!(
            self,
            Self::Network { .. }
                | Self::Store { .. }
                | Self::ServiceUnavailable { .. }
                | Self::Timeout { .. }
        )
    }

    /// Human-readable reason surfaced in fallback results.
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::Network { .. } => {
                "Unable to reach the permission service; using cached permissions."
            }
            Self::Store { .. } => {
                "Permission store temporarily unavailable; limited access applies."
            }
            Self::Authentication { .. } => "Please sign in again to continue.",
            Self::Authorization { .. } => "You do not have permission to perform this action.",
            Self::Validation { .. } => "Invalid request; check the input and try again.",
            Self::ServiceUnavailable { .. } => {
                "Permission service is temporarily unavailable; fallback permissions apply."
            }
            Self::Timeout { .. } => "The permission check timed out; conservative access applies.",
            Self::Unknown { .. } => "An unexpected error occurred during the permission check.",
        }
    }
}
