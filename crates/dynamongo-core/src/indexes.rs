//! Index planning and composite sort-key emulation.
//!
//! A secondary index whose hash and range keys are both declared strings is
//! emulated with one native field, `__idx_<index>`, holding
//! `escape(hash) + "#" + range`. Sorting that field orders entries by hash
//! and then by range, so a range condition becomes a single string range.
//! Other secondary indexes map to a compound native index on their key
//! fields.

use dynamongo_docstore::{DocumentStore, IndexModel, SortDirection, index::ID_INDEX_NAME};
use dynamongo_model::{AttributeKind, AttributeValue, IndexSchema, Item, ModelSchema};
use tracing::info;

use crate::error::AdapterResult;

/// Prefix of composite index fields.
pub const COMPOSITE_PREFIX: &str = "__idx_";

/// Name of the composite field backing `index_name`.
#[must_use]
pub fn composite_field(index_name: &str) -> String {
    format!("{COMPOSITE_PREFIX}{index_name}")
}

/// Escapes the hash component so the `#` separator stays unambiguous:
/// `\` becomes `\\` and `#` becomes `\#`.
#[must_use]
pub fn escape_hash(hash: &str) -> String {
    let mut out = String::with_capacity(hash.len());
    for c in hash.chars() {
        if c == '\\' || c == '#' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// The composite field value for one entry.
#[must_use]
pub fn composite_value(hash: &str, range: &str) -> String {
    format!("{}#{range}", escape_hash(hash))
}

/// How a secondary index is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexLayout {
    /// One concatenated string field.
    Composite {
        /// The `__idx_<index>` field.
        field: String,
    },
    /// The key fields themselves.
    Decomposed,
}

/// The storage layout of `index` under `schema`.
#[must_use]
pub fn layout(schema: &ModelSchema, index: &IndexSchema) -> IndexLayout {
    let is_string = |name: &str| schema.kind_of(name) == Some(AttributeKind::String);
    match &index.range_key {
        Some(range) if is_string(&index.hash_key) && is_string(range) => IndexLayout::Composite {
            field: composite_field(&index.name),
        },
        _ => IndexLayout::Decomposed,
    }
}

/// Composite fields for `item`: `Some(value)` when both components are
/// present strings, `None` when the field must be cleared.
#[must_use]
pub fn composite_fields(schema: &ModelSchema, item: &Item) -> Vec<(String, Option<String>)> {
    schema
        .indexes
        .iter()
        .filter_map(|index| match layout(schema, index) {
            IndexLayout::Composite { field } => {
                let range = index.range_key.as_deref()?;
                let value = match (item.get(&index.hash_key), item.get(range)) {
                    (Some(AttributeValue::S(h)), Some(AttributeValue::S(r))) => {
                        Some(composite_value(h, r))
                    }
                    _ => None,
                };
                Some((field, value))
            }
            IndexLayout::Decomposed => None,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

/// Derives native indexes from a schema and reconciles them with a store.
#[derive(Debug, Clone, Copy)]
pub struct IndexManager<'a> {
    store: &'a dyn DocumentStore,
}

impl<'a> IndexManager<'a> {
    /// A manager for `store`.
    #[must_use]
    pub fn new(store: &'a dyn DocumentStore) -> Self {
        Self { store }
    }

    /// Native indexes for `schema`: the unique primary key index, one index
    /// per secondary index and the TTL index.
    #[must_use]
    pub fn plan(schema: &ModelSchema) -> Vec<IndexModel> {
        let mut plan = Vec::new();

        let mut primary = vec![(schema.hash_key.clone(), SortDirection::Ascending)];
        if let Some(range) = &schema.range_key {
            primary.push((range.clone(), SortDirection::Descending));
        }
        plan.push(IndexModel::new(primary).unique());

        for index in &schema.indexes {
            let model = match layout(schema, index) {
                IndexLayout::Composite { field } => {
                    IndexModel::new(vec![(field, SortDirection::Ascending)])
                }
                IndexLayout::Decomposed => {
                    let mut keys = vec![(index.hash_key.clone(), SortDirection::Ascending)];
                    if let Some(range) = &index.range_key {
                        keys.push((range.clone(), SortDirection::Descending));
                    }
                    IndexModel::new(keys)
                }
            };
            if !plan.iter().any(|m| m.name == model.name) {
                plan.push(model);
            }
        }

        if let Some(ttl) = &schema.ttl_attribute {
            let model = IndexModel::new(vec![(ttl.clone(), SortDirection::Ascending)]).expire_after(0);
            if !plan.iter().any(|m| m.name == model.name) {
                plan.push(model);
            }
        }
        plan
    }

    /// Creates the planned indexes that are missing. Returns their names.
    pub fn ensure(&self, schema: &ModelSchema) -> AdapterResult<Vec<String>> {
        let existing = self.store.list_indexes(&schema.table_name)?;
        let mut created = Vec::new();
        for model in Self::plan(schema) {
            if existing.iter().any(|e| e.name == model.name) {
                continue;
            }
            let name = self.store.create_index(&schema.table_name, model)?;
            info!(table = %schema.table_name, index = %name, "created index");
            created.push(name);
        }
        Ok(created)
    }

    /// Creates missing indexes and drops the ones absent from the plan,
    /// except the engine's `_id_` index. Returns `(created, dropped)`.
    pub fn sync(&self, schema: &ModelSchema) -> AdapterResult<(Vec<String>, Vec<String>)> {
        let created = self.ensure(schema)?;
        let planned = Self::plan(schema);
        let mut dropped = Vec::new();
        for existing in self.store.list_indexes(&schema.table_name)? {
            if existing.name == ID_INDEX_NAME || planned.iter().any(|m| m.name == existing.name) {
                continue;
            }
            self.store.drop_index(&schema.table_name, &existing.name)?;
            info!(table = %schema.table_name, index = %existing.name, "dropped index");
            dropped.push(existing.name);
        }
        Ok((created, dropped))
    }
}
