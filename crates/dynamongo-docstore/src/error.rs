//! Document store errors.

/// Errors raised by a [`DocumentStore`](crate::DocumentStore).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    /// A unique index rejected the write.
    #[error("E11000 duplicate key error: index {index} dup key {key}")]
    DuplicateKey {
        /// Name of the violated index.
        index: String,
        /// Rendered key tuple.
        key: String,
    },

    /// The filter document is malformed or uses an unknown operator.
    #[error("invalid query: {message}")]
    InvalidQuery {
        /// Explanation.
        message: String,
    },

    /// The update document is malformed or cannot be applied.
    #[error("invalid update: {message}")]
    InvalidUpdate {
        /// Explanation.
        message: String,
    },

    /// Two update operators target the same or overlapping paths.
    #[error("updating the path '{path}' would create a conflict at '{conflict}'")]
    ConflictingUpdatePaths {
        /// First path.
        path: String,
        /// Overlapping path.
        conflict: String,
    },

    /// A value could not be constructed.
    #[error("invalid value: {message}")]
    InvalidValue {
        /// Explanation.
        message: String,
    },

    /// The named index does not exist.
    #[error("index not found: {name}")]
    IndexNotFound {
        /// Index name.
        name: String,
    },

    /// The store could not be reached or has been closed.
    #[error("connection error: {message}")]
    Connection {
        /// Explanation.
        message: String,
    },
}

impl StoreError {
    pub(crate) fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_update(message: impl Into<String>) -> Self {
        Self::InvalidUpdate {
            message: message.into(),
        }
    }
}

/// Convenience result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
