//! Error types for the Courier framework.

use thiserror::Error;

/// Errors that can occur while extracting handler parameters.
#[derive(Debug, Clone, Error)]
pub enum ExtractError {
    /// The message body could not be deserialized into the requested type.
    #[error("invalid message body for '{target}': {reason}")]
    InvalidBody {
        /// Type name the body was decoded into.
        target: &'static str,
        /// Deserializer error text.
        reason: String,
    },

    /// A required message field is missing or empty.
    #[error("missing message field '{0}'")]
    MissingField(&'static str),

    /// Custom extraction error.
    #[error("{0}")]
    Custom(String),
}

impl ExtractError {
    /// Creates a custom extraction error.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }
}

/// Result type for extraction operations.
pub type ExtractResult<T> = Result<T, ExtractError>;
