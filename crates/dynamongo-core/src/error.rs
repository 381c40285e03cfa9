//! Adapter error type.

use dynamongo_docstore::StoreError;
use dynamongo_model::{BatchItemResult, ErrorCode, ModelError};

use crate::expression::ExpressionError;

/// Errors raised by the adapter.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// A path does not resolve against the schema or the item.
    #[error("unresolved attribute path: {path}")]
    UnresolvedPath {
        /// The caller path.
        path: String,
    },

    /// An operator or operand shape has no native translation.
    #[error("unsupported operator {operator}: {reason}")]
    UnsupportedOperator {
        /// Operator name.
        operator: String,
        /// Explanation.
        reason: String,
    },

    /// A pagination token is malformed, foreign, or stale.
    #[error("invalid cursor: {reason}")]
    InvalidCursor {
        /// Explanation.
        reason: String,
    },

    /// Some writes of a batch were not applied.
    #[error("{} of {} batch writes failed", failed_count(.results), .results.len())]
    PartialBatchFailure {
        /// One result per request, in input order.
        results: Vec<BatchItemResult>,
    },

    /// An expression string could not be parsed.
    #[error(transparent)]
    Expression(#[from] ExpressionError),

    /// The request is malformed.
    #[error("validation error: {message}")]
    Validation {
        /// Explanation.
        message: String,
    },

    /// A value could not be converted between attribute and native form.
    #[error("codec error: {message}")]
    Codec {
        /// Explanation.
        message: String,
    },

    /// The requested item does not exist.
    #[error("item not found in table '{table}'")]
    ItemNotFound {
        /// Table name.
        table: String,
    },

    /// The write condition did not hold.
    #[error("the conditional request failed")]
    ConditionalCheckFailed,

    /// The table has not been created.
    #[error("table not found: {table}")]
    TableNotFound {
        /// Table name.
        table: String,
    },

    /// The document store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AdapterError {
    /// The DynamoDB-style code for this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::UnresolvedPath { .. }
            | Self::UnsupportedOperator { .. }
            | Self::InvalidCursor { .. }
            | Self::Expression(_)
            | Self::Validation { .. } => ErrorCode::ValidationException,
            Self::PartialBatchFailure { .. } => ErrorCode::PartialBatchFailure,
            Self::Codec { .. } => ErrorCode::SerializationException,
            Self::ItemNotFound { .. } => ErrorCode::ItemNotFoundException,
            Self::ConditionalCheckFailed => ErrorCode::ConditionalCheckFailedException,
            Self::TableNotFound { .. } => ErrorCode::ResourceNotFoundException,
            Self::Store(StoreError::Connection { .. }) => ErrorCode::InternalServerError,
            Self::Store(StoreError::DuplicateKey { .. }) => {
                ErrorCode::ConditionalCheckFailedException
            }
            Self::Store(_) => ErrorCode::ValidationException,
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub(crate) fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    pub(crate) fn unsupported(operator: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnsupportedOperator {
            operator: operator.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_cursor(reason: impl Into<String>) -> Self {
        Self::InvalidCursor {
            reason: reason.into(),
        }
    }

    pub(crate) fn unresolved(path: impl ToString) -> Self {
        Self::UnresolvedPath {
            path: path.to_string(),
        }
    }
}

impl From<ModelError> for AdapterError {
    fn from(e: ModelError) -> Self {
        match e {
            ModelError::InvalidPath { path, .. } => Self::UnresolvedPath { path },
            ModelError::InvalidSchema { .. } => Self::validation(e.to_string()),
        }
    }
}

fn failed_count(results: &[BatchItemResult]) -> usize {
    results.iter().filter(|r| !r.is_success()).count()
}

/// Convenience result type for adapter operations.
pub type AdapterResult<T> = Result<T, AdapterError>;
