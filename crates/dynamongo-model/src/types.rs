//! Table schema types.
//!
//! A [`ModelSchema`] describes one collection: its key attributes, declared
//! attributes (with optional storage aliases and typed nested maps),
//! secondary indexes and TTL attribute. Key and index attributes are always
//! named by their storage names.

use std::collections::HashSet;
use std::fmt;

use crate::attribute_value::AttributeValue;
use crate::error::ModelError;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Declared type of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AttributeKind {
    /// `S`
    String,
    /// `N`
    Number,
    /// `B`
    Binary,
    /// `BOOL`
    Boolean,
    /// `NULL`
    Null,
    /// `M`, possibly with typed fields.
    Map,
    /// `L`
    List,
    /// `SS`
    StringSet,
    /// `NS`
    NumberSet,
    /// `BS`
    BinarySet,
    /// Engine-native value passed through unchanged.
    Opaque,
    /// Any type; decided per value.
    #[default]
    Dynamic,
}

impl AttributeKind {
    /// The kind a value would be declared with.
    #[must_use]
    pub fn of(value: &AttributeValue) -> Self {
        match value {
            AttributeValue::S(_) => Self::String,
            AttributeValue::N(_) => Self::Number,
            AttributeValue::B(_) => Self::Binary,
            AttributeValue::Bool(_) => Self::Boolean,
            AttributeValue::Null(_) => Self::Null,
            AttributeValue::M(_) => Self::Map,
            AttributeValue::L(_) => Self::List,
            AttributeValue::Ss(_) => Self::StringSet,
            AttributeValue::Ns(_) => Self::NumberSet,
            AttributeValue::Bs(_) => Self::BinarySet,
            AttributeValue::Opaque(_) => Self::Opaque,
        }
    }

    /// Whether the kind is one of the three set kinds.
    #[must_use]
    pub fn is_set(self) -> bool {
        matches!(self, Self::StringSet | Self::NumberSet | Self::BinarySet)
    }

    /// Whether the kind may be used as a key attribute.
    #[must_use]
    pub fn is_key_type(self) -> bool {
        matches!(self, Self::String | Self::Number | Self::Binary)
    }

    /// The scalar kind of the elements of a set kind.
    #[must_use]
    pub fn element_kind(self) -> Option<Self> {
        match self {
            Self::StringSet => Some(Self::String),
            Self::NumberSet => Some(Self::Number),
            Self::BinarySet => Some(Self::Binary),
            _ => None,
        }
    }

    /// Whether `value` conforms to this kind.
    #[must_use]
    pub fn accepts(self, value: &AttributeValue) -> bool {
        self == Self::Dynamic || self == Self::of(value)
    }

    /// Returns the DynamoDB type descriptor for this kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "S",
            Self::Number => "N",
            Self::Binary => "B",
            Self::Boolean => "BOOL",
            Self::Null => "NULL",
            Self::Map => "M",
            Self::List => "L",
            Self::StringSet => "SS",
            Self::NumberSet => "NS",
            Self::BinarySet => "BS",
            Self::Opaque => "AS_IS",
            Self::Dynamic => "DYNAMIC",
        }
    }
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a secondary index spans all partitions or shares the table hash key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    /// Global secondary index.
    Global,
    /// Local secondary index.
    Local,
}

// ---------------------------------------------------------------------------
// Attributes
// ---------------------------------------------------------------------------

/// A declared attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeSchema {
    /// Caller-visible name.
    pub name: String,
    /// Storage name, when different from `name`.
    pub attr_name: Option<String>,
    /// Declared type.
    pub kind: AttributeKind,
    /// Typed fields of a map attribute.
    pub fields: Vec<AttributeSchema>,
}

impl AttributeSchema {
    /// Declares an attribute stored under its own name.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: AttributeKind) -> Self {
        Self {
            name: name.into(),
            attr_name: None,
            kind,
            fields: Vec::new(),
        }
    }

    /// Declares a typed map attribute.
    #[must_use]
    pub fn map(name: impl Into<String>, fields: Vec<AttributeSchema>) -> Self {
        Self {
            fields,
            ..Self::new(name, AttributeKind::Map)
        }
    }

    /// Stores the attribute under `attr_name`.
    #[must_use]
    pub fn aliased(mut self, attr_name: impl Into<String>) -> Self {
        self.attr_name = Some(attr_name.into());
        self
    }

    /// The name used in stored documents.
    #[must_use]
    pub fn storage_name(&self) -> &str {
        self.attr_name.as_deref().unwrap_or(&self.name)
    }

    /// Looks up a nested field by caller name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&AttributeSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Looks up a nested field by storage name.
    #[must_use]
    pub fn field_by_storage(&self, storage: &str) -> Option<&AttributeSchema> {
        self.fields.iter().find(|f| f.storage_name() == storage)
    }
}

// ---------------------------------------------------------------------------
// Indexes
// ---------------------------------------------------------------------------

/// A secondary index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSchema {
    /// Index name.
    pub name: String,
    /// Global or local.
    pub kind: IndexKind,
    /// Storage name of the index hash key.
    pub hash_key: String,
    /// Storage name of the index range key.
    pub range_key: Option<String>,
}

impl IndexSchema {
    /// A global secondary index.
    #[must_use]
    pub fn global(
        name: impl Into<String>,
        hash_key: impl Into<String>,
        range_key: Option<&str>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: IndexKind::Global,
            hash_key: hash_key.into(),
            range_key: range_key.map(str::to_owned),
        }
    }

    /// A local secondary index over the table hash key.
    #[must_use]
    pub fn local(name: impl Into<String>, hash_key: impl Into<String>, range_key: &str) -> Self {
        Self {
            name: name.into(),
            kind: IndexKind::Local,
            hash_key: hash_key.into(),
            range_key: Some(range_key.to_owned()),
        }
    }
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// Schema of one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSchema {
    /// Collection name.
    pub table_name: String,
    /// Storage name of the hash key.
    pub hash_key: String,
    /// Storage name of the range key.
    pub range_key: Option<String>,
    /// Declared attributes, keys included.
    pub attributes: Vec<AttributeSchema>,
    /// Secondary indexes.
    pub indexes: Vec<IndexSchema>,
    /// Storage name of the TTL attribute.
    pub ttl_attribute: Option<String>,
    /// Whether undeclared top-level attributes are accepted.
    pub allow_undeclared: bool,
}

impl ModelSchema {
    /// A table keyed by `hash_key` alone.
    #[must_use]
    pub fn new(table_name: impl Into<String>, hash_key: AttributeSchema) -> Self {
        Self {
            table_name: table_name.into(),
            hash_key: hash_key.storage_name().to_owned(),
            range_key: None,
            attributes: vec![hash_key],
            indexes: Vec::new(),
            ttl_attribute: None,
            allow_undeclared: false,
        }
    }

    /// Adds a range key.
    #[must_use]
    pub fn with_range_key(mut self, range_key: AttributeSchema) -> Self {
        self.range_key = Some(range_key.storage_name().to_owned());
        self.attributes.push(range_key);
        self
    }

    /// Declares a non-key attribute.
    #[must_use]
    pub fn with_attribute(mut self, attribute: AttributeSchema) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Adds a secondary index.
    #[must_use]
    pub fn with_index(mut self, index: IndexSchema) -> Self {
        self.indexes.push(index);
        self
    }

    /// Marks a declared attribute as the TTL attribute.
    #[must_use]
    pub fn with_ttl(mut self, attribute: impl Into<String>) -> Self {
        self.ttl_attribute = Some(attribute.into());
        self
    }

    /// Accepts undeclared top-level attributes.
    #[must_use]
    pub fn allow_undeclared(mut self) -> Self {
        self.allow_undeclared = true;
        self
    }

    /// Looks up a declared attribute by caller name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&AttributeSchema> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Looks up a declared attribute by storage name.
    #[must_use]
    pub fn attribute_by_storage(&self, storage: &str) -> Option<&AttributeSchema> {
        self.attributes.iter().find(|a| a.storage_name() == storage)
    }

    /// Declared kind of a top-level storage attribute.
    #[must_use]
    pub fn kind_of(&self, storage: &str) -> Option<AttributeKind> {
        self.attribute_by_storage(storage).map(|a| a.kind)
    }

    /// Storage names of the primary key attributes, hash first.
    #[must_use]
    pub fn key_attributes(&self) -> Vec<&str> {
        let mut keys = vec![self.hash_key.as_str()];
        if let Some(range) = &self.range_key {
            keys.push(range);
        }
        keys
    }

    /// Looks up a secondary index.
    #[must_use]
    pub fn index(&self, name: &str) -> Option<&IndexSchema> {
        self.indexes.iter().find(|i| i.name == name)
    }

    /// Checks that keys, indexes and the TTL attribute reference declared
    /// attributes of suitable kinds.
    pub fn validate(&self) -> Result<(), ModelError> {
        let invalid = |reason: String| ModelError::InvalidSchema {
            table: self.table_name.clone(),
            reason,
        };

        if self.table_name.is_empty() {
            return Err(invalid("table name must not be empty".to_owned()));
        }

        let mut storage_names = HashSet::new();
        let mut caller_names = HashSet::new();
        for attr in &self.attributes {
            if !storage_names.insert(attr.storage_name()) || !caller_names.insert(&attr.name) {
                return Err(invalid(format!("attribute '{}' declared twice", attr.name)));
            }
            if attr.storage_name() == "_id" || attr.storage_name().starts_with("__idx_") {
                return Err(invalid(format!(
                    "storage name '{}' is reserved",
                    attr.storage_name()
                )));
            }
        }

        let check_key = |name: &str, role: &str| -> Result<(), ModelError> {
            match self.kind_of(name) {
                Some(kind) if kind.is_key_type() => Ok(()),
                Some(kind) => Err(invalid(format!(
                    "{role} '{name}' has type {kind}; key attributes must be S, N or B"
                ))),
                None => Err(invalid(format!("{role} '{name}' is not declared"))),
            }
        };

        check_key(&self.hash_key, "hash key")?;
        if let Some(range) = &self.range_key {
            check_key(range, "range key")?;
        }

        let mut index_names = HashSet::new();
        for index in &self.indexes {
            if !index_names.insert(index.name.as_str()) {
                return Err(invalid(format!("index '{}' declared twice", index.name)));
            }
            check_key(&index.hash_key, "index hash key")?;
            if let Some(range) = &index.range_key {
                check_key(range, "index range key")?;
            }
            if index.kind == IndexKind::Local && index.hash_key != self.hash_key {
                return Err(invalid(format!(
                    "local index '{}' must use the table hash key",
                    index.name
                )));
            }
        }

        if let Some(ttl) = &self.ttl_attribute {
            match self.kind_of(ttl) {
                Some(AttributeKind::Number | AttributeKind::Opaque) => {}
                Some(kind) => {
                    return Err(invalid(format!(
                        "TTL attribute '{ttl}' has type {kind}; expected N or a native date"
                    )));
                }
                None => return Err(invalid(format!("TTL attribute '{ttl}' is not declared"))),
            }
        }
        Ok(())
    }
}
