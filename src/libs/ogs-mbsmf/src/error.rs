//! MB-SMF Consumer Error Types
//!
//! Errors raised by the local API of the consumer. The diff engine and the
//! reconciliation never fail on data; remote rejections travel as
//! [`ProblemDetails`](crate::intent::ProblemDetails) through result callbacks.

use thiserror::Error;

use crate::intent::{SessionKey, SubscriptionKey};

/// MB-SMF consumer error type
#[derive(Error, Debug)]
pub enum MbsmfError {
    /// Session key is not (or no longer) known to the context
    #[error("MBS session not found: {0}")]
    SessionNotFound(SessionKey),

    /// Subscription key is not (or no longer) known to the context
    #[error("MBS session subscription not found: {0}")]
    SubscriptionNotFound(SubscriptionKey),

    /// Session pool exhausted
    #[error("Maximum number of MBS sessions [{0}] reached")]
    TooManySessions(usize),

    /// Source and destination addresses do not form a valid SSM
    #[error("Invalid SSM: {0}")]
    InvalidSsm(String),

    /// A value is outside of its allowed range or format
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue {
        field: &'static str,
        reason: String,
    },

    /// The remote side answered with something we cannot interpret
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MbsmfError {
    /// Build an [`MbsmfError::InvalidValue`]
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.into(),
        }
    }

    /// Errors caused by the caller handing in a stale key
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::SessionNotFound(_) | Self::SubscriptionNotFound(_)
        )
    }
}

/// Result type for MB-SMF consumer operations
pub type MbsmfResult<T> = Result<T, MbsmfError>;
