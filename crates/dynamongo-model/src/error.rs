//! Model-level error types.
//!
//! [`ErrorCode`] gives callers that switch on DynamoDB exception names a
//! stable code for every adapter failure.

use std::fmt;

/// Well-known DynamoDB-style error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum ErrorCode {
    /// Malformed request, bad path, or unsupported operator.
    #[default]
    ValidationException,
    /// Condition check failed.
    ConditionalCheckFailedException,
    /// Table not found.
    ResourceNotFoundException,
    /// Table already exists.
    ResourceInUseException,
    /// Requested item does not exist.
    ItemNotFoundException,
    /// Some writes of a batch were not applied.
    PartialBatchFailure,
    /// Serialization or codec error.
    SerializationException,
    /// Engine or transport failure.
    InternalServerError,
}

impl ErrorCode {
    /// Returns the short code string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationException => "ValidationException",
            Self::ConditionalCheckFailedException => "ConditionalCheckFailedException",
            Self::ResourceNotFoundException => "ResourceNotFoundException",
            Self::ResourceInUseException => "ResourceInUseException",
            Self::ItemNotFoundException => "ItemNotFoundException",
            Self::PartialBatchFailure => "PartialBatchFailure",
            Self::SerializationException => "SerializationException",
            Self::InternalServerError => "InternalServerError",
        }
    }

    /// Whether the failure is caused by the request rather than the engine.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::InternalServerError)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while constructing model values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    /// A path string is not valid `a.b[0]` notation.
    #[error("invalid attribute path '{path}': {reason}")]
    InvalidPath {
        /// The rejected input.
        path: String,
        /// Explanation.
        reason: String,
    },

    /// A schema definition is inconsistent.
    #[error("invalid schema for table '{table}': {reason}")]
    InvalidSchema {
        /// Table the schema describes.
        table: String,
        /// Explanation.
        reason: String,
    },
}
