//! The document store interface.

use std::fmt;

use typed_builder::TypedBuilder;

use crate::error::StoreResult;
use crate::index::{IndexModel, SortDirection};
use crate::value::{Document, NativeValue};

/// Which copy of the data a read is served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadPreference {
    /// Always read the primary; observes every acknowledged write.
    #[default]
    Primary,
    /// Read the nearest member; may lag behind the primary.
    Nearest,
}

/// Options for [`DocumentStore::find`].
#[derive(Debug, Clone, Default, TypedBuilder)]
pub struct FindOptions {
    /// Sort keys applied in order; ties keep natural (insertion) order.
    #[builder(default)]
    pub sort: Vec<(String, SortDirection)>,
    /// Number of matching documents to skip.
    #[builder(default)]
    pub skip: usize,
    /// Maximum number of documents to return.
    #[builder(default, setter(strip_option))]
    pub limit: Option<usize>,
    /// Inclusion projection. `_id` is always returned.
    #[builder(default, setter(strip_option))]
    pub projection: Option<Vec<String>>,
    /// Read routing.
    #[builder(default)]
    pub read_preference: ReadPreference,
}

/// Outcome of a replace or update.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpdateResult {
    /// Documents that matched the filter.
    pub matched_count: u64,
    /// Documents actually changed.
    pub modified_count: u64,
    /// `_id` of the inserted document, when an upsert inserted.
    pub upserted_id: Option<NativeValue>,
}

/// One operation of an unordered bulk write.
#[derive(Debug, Clone)]
pub enum WriteModel {
    /// Insert a document.
    InsertOne {
        /// Document to insert.
        document: Document,
    },
    /// Replace the first matching document.
    ReplaceOne {
        /// Selector.
        filter: Document,
        /// New content; `_id` is preserved.
        replacement: Document,
        /// Insert when nothing matches.
        upsert: bool,
    },
    /// Apply update operators to the first matching document.
    UpdateOne {
        /// Selector.
        filter: Document,
        /// Update operators.
        update: Document,
        /// Insert when nothing matches.
        upsert: bool,
    },
    /// Delete the first matching document.
    DeleteOne {
        /// Selector.
        filter: Document,
    },
}

/// A synchronous document database.
///
/// Every call blocks until the engine acknowledges it. Implementations hold
/// their own connection state; callers share them behind an `Arc`.
pub trait DocumentStore: Send + Sync + fmt::Debug {
    /// Returns matching documents in sort order.
    fn find(
        &self,
        collection: &str,
        filter: &Document,
        options: &FindOptions,
    ) -> StoreResult<Vec<Document>>;

    /// Returns the first matching document.
    fn find_one(
        &self,
        collection: &str,
        filter: &Document,
        options: &FindOptions,
    ) -> StoreResult<Option<Document>> {
        let options = FindOptions {
            limit: Some(1),
            ..options.clone()
        };
        Ok(self.find(collection, filter, &options)?.into_iter().next())
    }

    /// Counts matching documents on the primary.
    fn count(&self, collection: &str, filter: &Document) -> StoreResult<u64>;

    /// Inserts a document, assigning `_id` when absent. Returns the `_id`.
    fn insert_one(&self, collection: &str, document: Document) -> StoreResult<NativeValue>;

    /// Replaces the first matching document.
    fn replace_one(
        &self,
        collection: &str,
        filter: &Document,
        replacement: Document,
        upsert: bool,
    ) -> StoreResult<UpdateResult>;

    /// Atomically updates the first matching document and returns it as it
    /// is after the update. Returns `None` if nothing matched and `upsert` is
    /// off.
    fn find_one_and_update(
        &self,
        collection: &str,
        filter: &Document,
        update: &Document,
        upsert: bool,
    ) -> StoreResult<Option<Document>>;

    /// Deletes the first matching document and returns the deleted count.
    fn delete_one(&self, collection: &str, filter: &Document) -> StoreResult<u64>;

    /// Runs every operation independently and reports each outcome in input
    /// order. One failure never prevents the others from running.
    fn bulk_write(&self, collection: &str, operations: Vec<WriteModel>) -> Vec<StoreResult<()>>;

    /// Creates an index, returning its name. Re-creating an identical index
    /// is a no-op.
    fn create_index(&self, collection: &str, index: IndexModel) -> StoreResult<String>;

    /// Drops an index by name.
    fn drop_index(&self, collection: &str, name: &str) -> StoreResult<()>;

    /// Lists the indexes of a collection, `_id_` first.
    fn list_indexes(&self, collection: &str) -> StoreResult<Vec<IndexModel>>;

    /// Drops a collection. Returns `false` if it did not exist.
    fn drop_collection(&self, collection: &str) -> StoreResult<bool>;

    /// Lists collection names in lexical order.
    fn list_collection_names(&self) -> StoreResult<Vec<String>>;
}
