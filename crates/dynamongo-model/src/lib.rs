//! Key-value data model for dynamongo.
//!
//! This crate holds the caller-facing side of the adapter: the tagged
//! [`AttributeValue`] union and its DynamoDB JSON wire form, attribute paths,
//! condition trees and update actions, table schemas, and the request and
//! response descriptors. It has no knowledge of how values are stored.
// "DynamoDB" appears in many doc comments in this crate.
#![allow(clippy::doc_markdown)]
#![allow(clippy::module_name_repetitions)]

pub mod attribute_value;
pub mod condition;
pub mod error;
pub mod input;
pub mod output;
pub mod path;
pub mod types;
pub mod update;

pub use attribute_value::{AttributeValue, Item};
pub use condition::{CompareOp, Condition, MAX_IN_OPERANDS, Path};
pub use error::{ErrorCode, ModelError};
pub use input::{QueryInput, ReturnValues, ScanInput, WriteRequest};
pub use output::{BatchFailureReason, BatchItemResult, ResultPage, UpdateOutcome, Warning};
pub use path::{AttributePath, PathElement};
pub use types::{AttributeKind, AttributeSchema, IndexKind, IndexSchema, ModelSchema};
pub use update::UpdateAction;
