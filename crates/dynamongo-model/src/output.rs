//! Response types.

use std::fmt;

use crate::attribute_value::Item;

/// One page of query or scan results.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultPage {
    /// Decoded items in result order.
    pub items: Vec<Item>,
    /// Token positioned after the last item; `None` when exhausted.
    pub cursor: Option<String>,
    /// Number of items in the page.
    pub count: usize,
    /// Number of documents examined, before the filter.
    pub scanned_count: usize,
}

impl ResultPage {
    /// Whether no further page exists.
    #[must_use]
    pub fn is_last(&self) -> bool {
        self.cursor.is_none()
    }
}

/// Why a batch request was not applied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BatchFailureReason {
    /// A key attribute is absent.
    #[error("missing key attribute '{attribute}'")]
    MissingKey {
        /// Storage name of the key.
        attribute: String,
    },
    /// A key attribute has the wrong type.
    #[error("key attribute '{attribute}' must be {expected}, got {actual}")]
    InvalidKeyType {
        /// Storage name of the key.
        attribute: String,
        /// Declared type descriptor.
        expected: String,
        /// Supplied type descriptor.
        actual: String,
    },
    /// The item could not be encoded or fails attribute validation.
    #[error("invalid item: {message}")]
    InvalidItem {
        /// Explanation.
        message: String,
    },
    /// The engine rejected the write.
    #[error("rejected by the store: {message}")]
    Rejected {
        /// Engine message.
        message: String,
    },
}

/// Outcome of one batch request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchItemResult {
    /// The write was applied.
    Success,
    /// The write was not applied.
    Failed {
        /// Why.
        reason: BatchFailureReason,
    },
}

impl BatchItemResult {
    /// Whether the write was applied.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Non-fatal conditions reported alongside a successful result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// The update was applied by reading, mutating and replacing the
    /// document, without atomicity against concurrent writers.
    ConsistencyFallback {
        /// Table written.
        table: String,
        /// Why the update could not be expressed atomically.
        reason: String,
    },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConsistencyFallback { table, reason } => write!(
                f,
                "update on '{table}' applied without atomicity: {reason}"
            ),
        }
    }
}

/// Outcome of an update.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpdateOutcome {
    /// The updated item, when requested.
    pub item: Option<Item>,
    /// Warnings raised while applying the update.
    pub warnings: Vec<Warning>,
}

impl UpdateOutcome {
    /// Whether the update took the read-modify-write path.
    #[must_use]
    pub fn used_fallback(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w, Warning::ConsistencyFallback { .. }))
    }
}
