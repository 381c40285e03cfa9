//! Request descriptors.
//!
//! Descriptors are per-call values with no identity. Only the cursor token
//! carried in `exclusive_start` persists across pages.

use typed_builder::TypedBuilder;

use crate::attribute_value::{AttributeValue, Item};
use crate::condition::Condition;

/// A query against the table or one of its secondary indexes.
#[derive(Debug, Clone, PartialEq, TypedBuilder)]
pub struct QueryInput {
    /// Hash key equality value. Without it the query runs as a scan.
    #[builder(default, setter(strip_option, into))]
    pub hash_key: Option<AttributeValue>,
    /// Secondary index to query; `None` queries the table.
    #[builder(default, setter(strip_option, into))]
    pub index_name: Option<String>,
    /// Predicate on the range key of the table or index.
    #[builder(default, setter(strip_option))]
    pub range_condition: Option<Condition>,
    /// Predicate on non-key attributes.
    #[builder(default, setter(strip_option))]
    pub filter: Option<Condition>,
    /// Caller paths to return. Empty returns every attribute.
    #[builder(default)]
    pub projection: Vec<String>,
    /// Maximum number of matching items in the page.
    #[builder(default, setter(strip_option))]
    pub limit: Option<usize>,
    /// Read the primary instead of the nearest replica.
    #[builder(default)]
    pub consistent_read: bool,
    /// Ascending range order when `true`.
    #[builder(default = true)]
    pub scan_forward: bool,
    /// Cursor returned by the previous page.
    #[builder(default, setter(strip_option, into))]
    pub exclusive_start: Option<String>,
}

/// A full-collection scan.
#[derive(Debug, Clone, PartialEq, Default, TypedBuilder)]
pub struct ScanInput {
    /// Predicate evaluated on every document.
    #[builder(default, setter(strip_option))]
    pub filter: Option<Condition>,
    /// Caller paths to return. Empty returns every attribute.
    #[builder(default)]
    pub projection: Vec<String>,
    /// Maximum number of matching items in the page.
    #[builder(default, setter(strip_option))]
    pub limit: Option<usize>,
    /// Read the primary instead of the nearest replica.
    #[builder(default)]
    pub consistent_read: bool,
    /// Cursor returned by the previous page.
    #[builder(default, setter(strip_option, into))]
    pub exclusive_start: Option<String>,
}

/// One request of a batch write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteRequest {
    /// Insert or replace an item.
    Put(Item),
    /// Delete the item with this key.
    Delete(Item),
}

impl WriteRequest {
    /// The item or key carried by the request.
    #[must_use]
    pub fn item(&self) -> &Item {
        match self {
            Self::Put(item) | Self::Delete(item) => item,
        }
    }
}

/// What an update returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnValues {
    /// Nothing.
    None,
    /// The whole item as it is after the update.
    #[default]
    AllNew,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Path;

    #[test]
    fn test_should_default_query_to_forward_order() {
        let input = QueryInput::builder()
            .hash_key("c1")
            .range_condition(Path::new("sk").begins_with("A"))
            .limit(10)
            .build();
        assert!(input.scan_forward);
        assert!(!input.consistent_read);
        assert_eq!(input.hash_key, Some(AttributeValue::S("c1".to_owned())));
        assert_eq!(input.exclusive_start, None);
    }

    #[test]
    fn test_should_build_scan_input() {
        let input = ScanInput::builder().exclusive_start("tok").build();
        assert_eq!(input.exclusive_start.as_deref(), Some("tok"));
        assert!(input.projection.is_empty());
    }
}
