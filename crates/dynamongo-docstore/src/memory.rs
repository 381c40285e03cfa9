//! In-process [`DocumentStore`] implementation.
//!
//! Collections live in a [`DashMap`]; each collection keeps its documents in a
//! `BTreeMap` keyed by an insertion sequence, so natural order is insertion
//! order, guarded by a single `RwLock`. Every write takes the collection's
//! write lock, which makes single-document updates atomic with respect to
//! each other.
//!
//! A store created with [`MemoryStore::with_replica_lag`] additionally keeps a
//! per-collection replica snapshot that only catches up on
//! [`MemoryStore::sync_replicas`]. Reads with [`ReadPreference::Nearest`] are
//! served from that snapshot, which makes stale reads reproducible in tests.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::filter::{Filter, equality_seed};
use crate::index::{ID_INDEX_NAME, IndexModel, SortDirection};
use crate::store::{DocumentStore, FindOptions, ReadPreference, UpdateResult, WriteModel};
use crate::update::{apply_update, get_path, set_path, validate_update};
use crate::value::{DisplayDocument, Document, NativeValue, ObjectId};

/// Thread-safe in-memory document store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: DashMap<String, Arc<MemoryCollection>>,
    replica_lag: bool,
}

#[derive(Debug)]
struct MemoryCollection {
    primary: RwLock<CollectionData>,
    replica: RwLock<BTreeMap<u64, Document>>,
}

#[derive(Debug)]
struct CollectionData {
    docs: BTreeMap<u64, Document>,
    next_seq: u64,
    indexes: Vec<IndexModel>,
}

impl Default for CollectionData {
    fn default() -> Self {
        Self {
            docs: BTreeMap::new(),
            next_seq: 0,
            indexes: vec![IndexModel::id_index()],
        }
    }
}

impl MemoryStore {
    /// Creates an empty store whose reads always observe the latest writes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store whose `Nearest` reads lag until
    /// [`sync_replicas`](Self::sync_replicas) is called.
    #[must_use]
    pub fn with_replica_lag() -> Self {
        Self {
            collections: DashMap::new(),
            replica_lag: true,
        }
    }

    /// Brings every replica snapshot up to date with its primary.
    pub fn sync_replicas(&self) {
        for entry in &self.collections {
            let snapshot = entry.value().primary.read().docs.clone();
            *entry.value().replica.write() = snapshot;
        }
    }

    fn collection(&self, name: &str) -> Option<Arc<MemoryCollection>> {
        self.collections.get(name).map(|c| Arc::clone(c.value()))
    }

    fn collection_or_create(&self, name: &str) -> Arc<MemoryCollection> {
        let entry = self.collections.entry(name.to_owned()).or_insert_with(|| {
            debug!(collection = name, "creating collection");
            Arc::new(MemoryCollection {
                primary: RwLock::new(CollectionData::default()),
                replica: RwLock::new(BTreeMap::new()),
            })
        });
        Arc::clone(entry.value())
    }
}

impl DocumentStore for MemoryStore {
    fn find(
        &self,
        collection: &str,
        filter: &Document,
        options: &FindOptions,
    ) -> StoreResult<Vec<Document>> {
        let compiled = Filter::compile(filter)?;
        let Some(coll) = self.collection(collection) else {
            return Ok(Vec::new());
        };
        let results = if self.replica_lag && options.read_preference == ReadPreference::Nearest {
            let replica = coll.replica.read();
            select(replica.values(), &compiled, options)
        } else {
            let primary = coll.primary.read();
            select(primary.docs.values(), &compiled, options)
        };
        debug!(
            collection,
            filter = %DisplayDocument(filter),
            returned = results.len(),
            "find"
        );
        Ok(results)
    }

    fn count(&self, collection: &str, filter: &Document) -> StoreResult<u64> {
        let compiled = Filter::compile(filter)?;
        let Some(coll) = self.collection(collection) else {
            return Ok(0);
        };
        let data = coll.primary.read();
        let count = data.docs.values().filter(|d| compiled.matches(d)).count();
        Ok(u64::try_from(count).unwrap_or(u64::MAX))
    }

    fn insert_one(&self, collection: &str, document: Document) -> StoreResult<NativeValue> {
        let coll = self.collection_or_create(collection);
        let mut data = coll.primary.write();
        data.insert(document)
    }

    fn replace_one(
        &self,
        collection: &str,
        filter: &Document,
        replacement: Document,
        upsert: bool,
    ) -> StoreResult<UpdateResult> {
        let compiled = Filter::compile(filter)?;
        let coll = self.collection_or_create(collection);
        let mut data = coll.primary.write();
        data.replace(filter, &compiled, replacement, upsert)
    }

    fn find_one_and_update(
        &self,
        collection: &str,
        filter: &Document,
        update: &Document,
        upsert: bool,
    ) -> StoreResult<Option<Document>> {
        let compiled = Filter::compile(filter)?;
        validate_update(update)?;
        let coll = self.collection_or_create(collection);
        let mut data = coll.primary.write();
        debug!(
            collection,
            filter = %DisplayDocument(filter),
            update = %DisplayDocument(update),
            upsert,
            "find_one_and_update"
        );
        data.update(filter, &compiled, update, upsert)
    }

    fn delete_one(&self, collection: &str, filter: &Document) -> StoreResult<u64> {
        let compiled = Filter::compile(filter)?;
        let Some(coll) = self.collection(collection) else {
            return Ok(0);
        };
        let mut data = coll.primary.write();
        Ok(data.delete(&compiled))
    }

    fn bulk_write(&self, collection: &str, operations: Vec<WriteModel>) -> Vec<StoreResult<()>> {
        let coll = self.collection_or_create(collection);
        let mut data = coll.primary.write();
        let total = operations.len();
        let results: Vec<StoreResult<()>> = operations
            .into_iter()
            .map(|op| data.apply_write(op))
            .collect();
        let failed = results.iter().filter(|r| r.is_err()).count();
        debug!(collection, total, failed, "bulk_write");
        results
    }

    fn create_index(&self, collection: &str, index: IndexModel) -> StoreResult<String> {
        let coll = self.collection_or_create(collection);
        let mut data = coll.primary.write();
        if let Some(existing) = data.indexes.iter().find(|i| i.name == index.name) {
            if *existing == index {
                return Ok(index.name);
            }
            return Err(StoreError::invalid_query(format!(
                "index with name {} already exists with different options",
                index.name
            )));
        }
        if index.unique {
            let keys: Vec<Vec<NativeValue>> = data.docs.values().map(|d| index.key_of(d)).collect();
            for (i, a) in keys.iter().enumerate() {
                if keys[i + 1..].iter().any(|b| IndexModel::same_key(a, b)) {
                    return Err(StoreError::DuplicateKey {
                        index: index.name.clone(),
                        key: render_key(&index, a),
                    });
                }
            }
        }
        debug!(collection, index = %index.name, unique = index.unique, "created index");
        let name = index.name.clone();
        data.indexes.push(index);
        Ok(name)
    }

    fn drop_index(&self, collection: &str, name: &str) -> StoreResult<()> {
        if name == ID_INDEX_NAME {
            return Err(StoreError::invalid_query("cannot drop _id index"));
        }
        let not_found = || StoreError::IndexNotFound {
            name: name.to_owned(),
        };
        let coll = self.collection(collection).ok_or_else(not_found)?;
        let mut data = coll.primary.write();
        let before = data.indexes.len();
        data.indexes.retain(|i| i.name != name);
        if data.indexes.len() == before {
            return Err(not_found());
        }
        Ok(())
    }

    fn list_indexes(&self, collection: &str) -> StoreResult<Vec<IndexModel>> {
        Ok(self
            .collection(collection)
            .map(|c| c.primary.read().indexes.clone())
            .unwrap_or_default())
    }

    fn drop_collection(&self, collection: &str) -> StoreResult<bool> {
        Ok(self.collections.remove(collection).is_some())
    }

    fn list_collection_names(&self) -> StoreResult<Vec<String>> {
        let mut names: Vec<String> = self.collections.iter().map(|e| e.key().clone()).collect();
        names.sort();
        Ok(names)
    }
}

// ---------------------------------------------------------------------------
// Collection internals
// ---------------------------------------------------------------------------

impl CollectionData {
    fn first_match(&self, filter: &Filter) -> Option<u64> {
        self.docs
            .iter()
            .find(|(_, d)| filter.matches(d))
            .map(|(seq, _)| *seq)
    }

    fn check_unique(&self, candidate: &Document, skip: Option<u64>) -> StoreResult<()> {
        for index in self.indexes.iter().filter(|i| i.unique) {
            let key = index.key_of(candidate);
            let clash = self
                .docs
                .iter()
                .filter(|(seq, _)| Some(**seq) != skip)
                .any(|(_, existing)| IndexModel::same_key(&key, &index.key_of(existing)));
            if clash {
                return Err(StoreError::DuplicateKey {
                    index: index.name.clone(),
                    key: render_key(index, &key),
                });
            }
        }
        Ok(())
    }

    fn insert(&mut self, mut document: Document) -> StoreResult<NativeValue> {
        let id = document
            .entry("_id".to_owned())
            .or_insert_with(|| NativeValue::ObjectId(ObjectId::new()))
            .clone();
        self.check_unique(&document, None)?;
        let seq = self.next_seq;
        self.next_seq += 1;
        self.docs.insert(seq, document);
        Ok(id)
    }

    fn replace(
        &mut self,
        raw_filter: &Document,
        filter: &Filter,
        mut replacement: Document,
        upsert: bool,
    ) -> StoreResult<UpdateResult> {
        if let Some(seq) = self.first_match(filter) {
            let existing_id = self.docs.get(&seq).and_then(|d| d.get("_id")).cloned();
            match (replacement.get("_id"), existing_id) {
                (Some(new_id), Some(old_id)) if !new_id.loosely_equals(&old_id) => {
                    return Err(StoreError::invalid_update(
                        "the _id field cannot be changed by a replacement",
                    ));
                }
                (None, Some(old_id)) => {
                    replacement.insert("_id".to_owned(), old_id);
                }
                _ => {}
            }
            self.check_unique(&replacement, Some(seq))?;
            let modified = self.docs.get(&seq) != Some(&replacement);
            self.docs.insert(seq, replacement);
            return Ok(UpdateResult {
                matched_count: 1,
                modified_count: u64::from(modified),
                upserted_id: None,
            });
        }
        if !upsert {
            return Ok(UpdateResult::default());
        }
        for (field, value) in equality_seed(raw_filter) {
            if !field.contains('.') {
                replacement.entry(field).or_insert(value);
            }
        }
        let id = self.insert(replacement)?;
        Ok(UpdateResult {
            matched_count: 0,
            modified_count: 0,
            upserted_id: Some(id),
        })
    }

    fn update(
        &mut self,
        raw_filter: &Document,
        filter: &Filter,
        update: &Document,
        upsert: bool,
    ) -> StoreResult<Option<Document>> {
        if let Some(seq) = self.first_match(filter) {
            let mut next = self.docs.get(&seq).cloned().unwrap_or_default();
            apply_update(&mut next, update)?;
            self.check_unique(&next, Some(seq))?;
            self.docs.insert(seq, next.clone());
            return Ok(Some(next));
        }
        if !upsert {
            return Ok(None);
        }
        let mut seeded = Document::new();
        for (field, value) in equality_seed(raw_filter) {
            let segments: Vec<&str> = field.split('.').collect();
            set_path(&mut seeded, &segments, value)?;
        }
        apply_update(&mut seeded, update)?;
        self.insert(seeded.clone()).map(|id| {
            seeded.insert("_id".to_owned(), id);
            Some(seeded)
        })
    }

    fn delete(&mut self, filter: &Filter) -> u64 {
        match self.first_match(filter) {
            Some(seq) => u64::from(self.docs.remove(&seq).is_some()),
            None => 0,
        }
    }

    fn apply_write(&mut self, op: WriteModel) -> StoreResult<()> {
        match op {
            WriteModel::InsertOne { document } => self.insert(document).map(|_| ()),
            WriteModel::ReplaceOne {
                filter,
                replacement,
                upsert,
            } => {
                let compiled = Filter::compile(&filter)?;
                self.replace(&filter, &compiled, replacement, upsert).map(|_| ())
            }
            WriteModel::UpdateOne {
                filter,
                update,
                upsert,
            } => {
                let compiled = Filter::compile(&filter)?;
                validate_update(&update)?;
                self.update(&filter, &compiled, &update, upsert).map(|_| ())
            }
            WriteModel::DeleteOne { filter } => {
                let compiled = Filter::compile(&filter)?;
                self.delete(&compiled);
                Ok(())
            }
        }
    }
}

fn select<'a>(
    docs: impl Iterator<Item = &'a Document>,
    filter: &Filter,
    options: &FindOptions,
) -> Vec<Document> {
    let mut matched: Vec<&Document> = docs.filter(|d| filter.matches(d)).collect();
    if !options.sort.is_empty() {
        let sort: Vec<(Vec<&str>, SortDirection)> = options
            .sort
            .iter()
            .map(|(field, dir)| (field.split('.').collect(), *dir))
            .collect();
        matched.sort_by(|a, b| compare_for_sort(a, b, &sort));
    }
    matched
        .into_iter()
        .skip(options.skip)
        .take(options.limit.unwrap_or(usize::MAX))
        .map(|d| match &options.projection {
            Some(fields) => project(d, fields),
            None => d.clone(),
        })
        .collect()
}

fn compare_for_sort(a: &Document, b: &Document, sort: &[(Vec<&str>, SortDirection)]) -> Ordering {
    static NULL: NativeValue = NativeValue::Null;
    for (segments, dir) in sort {
        let va = get_path(a, segments).unwrap_or(&NULL);
        let vb = get_path(b, segments).unwrap_or(&NULL);
        let ord = va.compare(vb);
        let ord = match dir {
            SortDirection::Ascending => ord,
            SortDirection::Descending => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Inclusion projection over dotted paths; `_id` is always kept.
fn project(doc: &Document, fields: &[String]) -> Document {
    let mut out = Document::new();
    if let Some(id) = doc.get("_id") {
        out.insert("_id".to_owned(), id.clone());
    }
    for field in fields {
        let segments: Vec<&str> = field.split('.').collect();
        if let Some(value) = get_path(doc, &segments) {
            // Only document intermediates are rebuilt; a failure here means an
            // earlier projected field already occupies the path as a scalar.
            let _ = set_path(&mut out, &segments, value.clone());
        }
    }
    out
}

fn render_key(index: &IndexModel, key: &[NativeValue]) -> String {
    let parts: Vec<String> = index
        .keys
        .iter()
        .zip(key)
        .map(|((field, _), value)| format!("{field}: {value}"))
        .collect();
    format!("{{ {} }}", parts.join(", "))
}
