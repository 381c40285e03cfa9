//! Index definitions.

use std::fmt;

use crate::update::get_path;
use crate::value::{Document, NativeValue};

/// Name of the implicit unique index on `_id`.
pub const ID_INDEX_NAME: &str = "_id_";

/// Direction of an index key or sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortDirection {
    /// Ascending order (`1`).
    #[default]
    Ascending,
    /// Descending order (`-1`).
    Descending,
}

impl SortDirection {
    /// Numeric form used in index names.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        match self {
            Self::Ascending => 1,
            Self::Descending => -1,
        }
    }

    /// Returns the opposite direction.
    #[must_use]
    pub fn reverse(self) -> Self {
        match self {
            Self::Ascending => Self::Descending,
            Self::Descending => Self::Ascending,
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_i32())
    }
}

/// A secondary index on a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexModel {
    /// Index name; unique within a collection.
    pub name: String,
    /// Indexed fields in key order.
    pub keys: Vec<(String, SortDirection)>,
    /// Reject documents whose key tuple duplicates an existing one.
    pub unique: bool,
    /// TTL in seconds after the indexed date; recorded but not enforced.
    pub expire_after_seconds: Option<u64>,
}

impl IndexModel {
    /// Creates a non-unique index named after its keys (`a_1_b_-1`).
    #[must_use]
    pub fn new(keys: Vec<(String, SortDirection)>) -> Self {
        Self {
            name: default_index_name(&keys),
            keys,
            unique: false,
            expire_after_seconds: None,
        }
    }

    /// Marks the index unique.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Overrides the generated name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets a TTL.
    #[must_use]
    pub fn expire_after(mut self, seconds: u64) -> Self {
        self.expire_after_seconds = Some(seconds);
        self
    }

    /// The implicit `_id` index every collection carries.
    #[must_use]
    pub fn id_index() -> Self {
        Self::new(vec![("_id".to_owned(), SortDirection::Ascending)])
            .named(ID_INDEX_NAME)
            .unique()
    }

    /// Extracts this index's key tuple from a document; missing fields are null.
    #[must_use]
    pub fn key_of(&self, doc: &Document) -> Vec<NativeValue> {
        self.keys
            .iter()
            .map(|(field, _)| {
                let segments: Vec<&str> = field.split('.').collect();
                get_path(doc, &segments).cloned().unwrap_or(NativeValue::Null)
            })
            .collect()
    }

    /// Returns `true` if two key tuples collide.
    #[must_use]
    pub fn same_key(a: &[NativeValue], b: &[NativeValue]) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loosely_equals(y))
    }
}

/// Builds the conventional name of an index: `field_dir` pairs joined by `_`.
#[must_use]
pub fn default_index_name(keys: &[(String, SortDirection)]) -> String {
    keys.iter()
        .map(|(field, dir)| format!("{field}_{dir}"))
        .collect::<Vec<_>>()
        .join("_")
}
