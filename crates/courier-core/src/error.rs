//! Error types for the Courier core.
//!
//! Per-destination failures are never errors: they are reported as
//! [`ActionResponse`](crate::ActionResponse) values. The types here cover
//! call-shape failures that abort a whole dispatch call.

use thiserror::Error;

use crate::token::CorrelationToken;

// =============================================================================
// Derivation Errors
// =============================================================================

/// A group key deriver could not compute routing keys for a message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct DeriveError {
    reason: String,
}

impl DeriveError {
    /// Creates a derivation error with the given reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// Returns the reason.
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl From<String> for DeriveError {
    fn from(reason: String) -> Self {
        Self::new(reason)
    }
}

impl From<&str> for DeriveError {
    fn from(reason: &str) -> Self {
        Self::new(reason)
    }
}

impl From<serde_json::Error> for DeriveError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(err.to_string())
    }
}

// =============================================================================
// Dispatch Errors
// =============================================================================

/// Errors that abort a dispatch call before any destination is reached.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    /// The group key deriver failed, so the group could not be planned.
    #[error("failed to derive routing keys for exchange '{exchange}': {source}")]
    Derivation {
        /// Exchange the group dispatch targeted.
        exchange: String,
        /// The deriver's error.
        #[source]
        source: DeriveError,
    },

    /// A caller supplied an unusable argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Deferred dispatch was requested outside of a tokio runtime.
    #[error("no tokio runtime available for deferred dispatch")]
    NoRuntime,

    /// The result channel can no longer deliver a result for this token.
    #[error("result channel closed for token '{token}'")]
    ChannelClosed {
        /// The token whose result cannot be delivered.
        token: CorrelationToken,
    },
}

impl DispatchError {
    /// Creates a derivation error for `exchange`.
    pub fn derivation(exchange: impl Into<String>, source: impl Into<DeriveError>) -> Self {
        Self::Derivation {
            exchange: exchange.into(),
            source: source.into(),
        }
    }

    /// Creates an invalid-argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for dispatch calls.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Result type for key derivation.
pub type DeriveResult<T> = Result<T, DeriveError>;
