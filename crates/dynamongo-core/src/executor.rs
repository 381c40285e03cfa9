//! Table operations against the document store.
//!
//! [`Adapter`] turns model-level reads and writes into native calls. Queries
//! with a hash key become one native `find` over the table or the index
//! layout; everything else goes through a primary-key ordered scan with the
//! filter evaluated client-side. Writes are replace-upserts keyed by the
//! primary key, made conditional by AND-ing the translated condition into
//! the native filter.

use std::sync::Arc;

use dynamongo_docstore::{
    DisplayDocument, Document, DocumentStore, FindOptions, NativeValue, ReadPreference,
    SortDirection, StoreError, doc,
};
use dynamongo_model::{
    AttributePath, AttributeValue, Condition, Item, ModelSchema, QueryInput, ResultPage,
    ReturnValues, ScanInput, UpdateAction, UpdateOutcome, Warning,
};
use tracing::{debug, info, warn};

use crate::batch::BatchWriter;
use crate::codec::{decode_item, encode, encode_item, is_bookkeeping_field};
use crate::condition::{
    ConditionTranslator, composite_hash_predicate, translate_composite_range, validate,
    validate_key_condition,
};
use crate::config::AdapterConfig;
use crate::connection::Connection;
use crate::cursor::{Cursor, CursorScope, strictly_after};
use crate::error::{AdapterError, AdapterResult};
use crate::evaluator::{EvalContext, apply_actions, project, values_equal};
use crate::indexes::{IndexLayout, IndexManager, composite_fields, composite_value, layout};
use crate::iterator::{ItemIterator, ResultIterator};
use crate::model::Model;
use crate::path::{PathResolver, StoragePath};
use crate::update::{UpdatePlan, UpdateTranslator};

/// Maximum number of keys accepted by [`Adapter::batch_get`].
pub const MAX_BATCH_GET: usize = 100;

/// Executes table operations over one connection.
#[derive(Debug, Clone)]
pub struct Adapter {
    connection: Arc<Connection>,
    config: AdapterConfig,
}

impl Adapter {
    /// An adapter issuing calls through `connection`.
    #[must_use]
    pub fn new(connection: Arc<Connection>, config: AdapterConfig) -> Self {
        Self { connection, config }
    }

    /// Runtime settings.
    #[must_use]
    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// The shared connection.
    #[must_use]
    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    pub(crate) fn resolver<'a>(&self, schema: &'a ModelSchema) -> PathResolver<'a> {
        PathResolver::new(schema, self.config.strict_paths)
    }

    pub(crate) fn store(&self) -> AdapterResult<Arc<dyn DocumentStore>> {
        self.connection.store()
    }

    /// The store, once `schema`'s table is known to exist.
    pub(crate) fn table(&self, schema: &ModelSchema) -> AdapterResult<Arc<dyn DocumentStore>> {
        let store = self.store()?;
        if store
            .list_collection_names()?
            .iter()
            .any(|name| *name == schema.table_name)
        {
            Ok(store)
        } else {
            Err(AdapterError::TableNotFound {
                table: schema.table_name.clone(),
            })
        }
    }

    // -----------------------------------------------------------------------
    // Tables
    // -----------------------------------------------------------------------

    /// Creates the table's native indexes. Calling it again is harmless.
    pub fn create_table(&self, schema: &ModelSchema) -> AdapterResult<()> {
        schema.validate()?;
        let store = self.store()?;
        let created = IndexManager::new(store.as_ref()).ensure(schema)?;
        info!(table = %schema.table_name, indexes = created.len(), "created table");
        Ok(())
    }

    /// Reconciles native indexes with the schema, returning the names created
    /// and dropped.
    pub fn sync_indexes(&self, schema: &ModelSchema) -> AdapterResult<(Vec<String>, Vec<String>)> {
        schema.validate()?;
        let store = self.table(schema)?;
        IndexManager::new(store.as_ref()).sync(schema)
    }

    /// Drops the table. Returns whether it existed.
    pub fn delete_table(&self, schema: &ModelSchema) -> AdapterResult<bool> {
        let dropped = self.store()?.drop_collection(&schema.table_name)?;
        if dropped {
            info!(table = %schema.table_name, "dropped table");
        }
        Ok(dropped)
    }

    /// Whether the table has been created.
    pub fn table_exists(&self, schema: &ModelSchema) -> AdapterResult<bool> {
        match self.table(schema) {
            Ok(_) => Ok(true),
            Err(AdapterError::TableNotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    // -----------------------------------------------------------------------
    // Single-item writes
    // -----------------------------------------------------------------------

    /// Stores `item`, replacing any item with the same key. With a
    /// `condition`, the write only happens when it holds for the current
    /// item, or for an empty item when there is none.
    pub fn put(
        &self,
        schema: &ModelSchema,
        item: &Item,
        condition: Option<&Condition>,
    ) -> AdapterResult<()> {
        let store = self.table(schema)?;
        let key = key_filter(schema, item)?;
        let document = self.to_document(schema, item)?;

        let Some(condition) = condition else {
            store.replace_one(&schema.table_name, &key, document, true)?;
            return Ok(());
        };

        let predicate = self.translate_condition(schema, condition)?;
        let result = store.replace_one(
            &schema.table_name,
            &and_all(vec![key.clone(), predicate]),
            document.clone(),
            false,
        )?;
        if result.matched_count > 0 {
            return Ok(());
        }
        self.insert_if_absent(store.as_ref(), schema, &key, condition, document)
    }

    /// Applies `actions` to the item at `key`, creating it when absent.
    ///
    /// Actions with a direct native form run as one atomic update. The rest
    /// read the item, apply the actions in memory and write it back; that
    /// path is reported through [`Warning::ConsistencyFallback`].
    pub fn update(
        &self,
        schema: &ModelSchema,
        key: &Item,
        actions: &[UpdateAction],
        condition: Option<&Condition>,
        return_values: ReturnValues,
    ) -> AdapterResult<UpdateOutcome> {
        let store = self.table(schema)?;
        check_exact_key(schema, key)?;
        let key_doc = key_filter(schema, key)?;
        let resolver = self.resolver(schema);
        let predicate = condition
            .map(|c| self.translate_condition(schema, c))
            .transpose()?
            .unwrap_or_default();

        let plan = UpdateTranslator::new(resolver).translate(actions)?;
        let document = match plan {
            UpdatePlan::Atomic { update, guards } => {
                let filter = and_all(vec![key_doc.clone(), predicate, guards.clone()]);
                debug!(
                    table = %schema.table_name,
                    filter = %DisplayDocument(&filter),
                    update = %DisplayDocument(&update),
                    "atomic update"
                );
                if let Some(updated) =
                    store.find_one_and_update(&schema.table_name, &filter, &update, false)?
                {
                    updated
                } else {
                    let existing = self.find_by_key(store.as_ref(), schema, &key_doc)?;
                    match existing {
                        Some(current) => {
                            if let Some(condition) = condition {
                                let current = decode_item(&current, schema);
                                if !EvalContext::new(&current, resolver).evaluate(condition)? {
                                    return Err(AdapterError::ConditionalCheckFailed);
                                }
                            }
                            return self.read_modify_write(
                                store.as_ref(),
                                schema,
                                key,
                                actions,
                                condition,
                                return_values,
                                "a list position the update addresses does not exist",
                            );
                        }
                        None => {
                            check_on_empty_item(resolver, condition)?;
                            if !guards.is_empty() {
                                return self.read_modify_write(
                                    store.as_ref(),
                                    schema,
                                    key,
                                    actions,
                                    condition,
                                    return_values,
                                    "positional update on a new item",
                                );
                            }
                            store
                                .find_one_and_update(&schema.table_name, &key_doc, &update, true)
                                .map_err(duplicate_as_condition_failure)?
                                .ok_or(AdapterError::ConditionalCheckFailed)?
                        }
                    }
                }
            }
            UpdatePlan::NeedsReadModifyWrite(reason) => {
                return self.read_modify_write(
                    store.as_ref(),
                    schema,
                    key,
                    actions,
                    condition,
                    return_values,
                    &reason,
                );
            }
        };

        Ok(UpdateOutcome {
            item: match return_values {
                ReturnValues::AllNew => Some(decode_item(&document, schema)),
                ReturnValues::None => None,
            },
            warnings: Vec::new(),
        })
    }

    /// Deletes the item at `key`. Returns whether an item was removed.
    pub fn delete(
        &self,
        schema: &ModelSchema,
        key: &Item,
        condition: Option<&Condition>,
    ) -> AdapterResult<bool> {
        let store = self.table(schema)?;
        check_exact_key(schema, key)?;
        let key_doc = key_filter(schema, key)?;
        let Some(condition) = condition else {
            return Ok(store.delete_one(&schema.table_name, &key_doc)? > 0);
        };

        let predicate = self.translate_condition(schema, condition)?;
        let filter = and_all(vec![key_doc.clone(), predicate]);
        if store.delete_one(&schema.table_name, &filter)? > 0 {
            return Ok(true);
        }
        if self.find_by_key(store.as_ref(), schema, &key_doc)?.is_some() {
            return Err(AdapterError::ConditionalCheckFailed);
        }
        check_on_empty_item(self.resolver(schema), Some(condition))?;
        Ok(false)
    }

    fn insert_if_absent(
        &self,
        store: &dyn DocumentStore,
        schema: &ModelSchema,
        key: &Document,
        condition: &Condition,
        document: Document,
    ) -> AdapterResult<()> {
        if self.find_by_key(store, schema, key)?.is_some() {
            return Err(AdapterError::ConditionalCheckFailed);
        }
        check_on_empty_item(self.resolver(schema), Some(condition))?;
        store
            .insert_one(&schema.table_name, document)
            .map_err(duplicate_as_condition_failure)?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn read_modify_write(
        &self,
        store: &dyn DocumentStore,
        schema: &ModelSchema,
        key: &Item,
        actions: &[UpdateAction],
        condition: Option<&Condition>,
        return_values: ReturnValues,
        reason: &str,
    ) -> AdapterResult<UpdateOutcome> {
        let resolver = self.resolver(schema);
        let key_doc = key_filter(schema, key)?;
        let existing = self.find_by_key(store, schema, &key_doc)?;
        let mut item = match &existing {
            Some(doc) => decode_item(doc, schema),
            None => key.clone(),
        };
        if let Some(condition) = condition {
            let holds = if existing.is_some() {
                EvalContext::new(&item, resolver).evaluate(condition)?
            } else {
                EvalContext::new(&Item::new(), resolver).evaluate(condition)?
            };
            if !holds {
                return Err(AdapterError::ConditionalCheckFailed);
            }
        }

        apply_actions(&mut item, resolver, actions)?;
        let document = self.to_document(schema, &item)?;
        warn!(
            table = %schema.table_name,
            %reason,
            "update applied with read-modify-write; concurrent writes may be lost"
        );
        store.replace_one(&schema.table_name, &key_doc, document, true)?;

        Ok(UpdateOutcome {
            item: match return_values {
                ReturnValues::AllNew => Some(item),
                ReturnValues::None => None,
            },
            warnings: vec![Warning::ConsistencyFallback {
                table: schema.table_name.clone(),
                reason: reason.to_owned(),
            }],
        })
    }

    // -----------------------------------------------------------------------
    // Single-item reads
    // -----------------------------------------------------------------------

    /// The item at `key`, or `ItemNotFound`.
    pub fn get(&self, schema: &ModelSchema, key: &Item) -> AdapterResult<Item> {
        self.get_optional(schema, key)?
            .ok_or_else(|| AdapterError::ItemNotFound {
                table: schema.table_name.clone(),
            })
    }

    /// The item at `key`, if any. Always reads the primary.
    pub fn get_optional(&self, schema: &ModelSchema, key: &Item) -> AdapterResult<Option<Item>> {
        let store = self.table(schema)?;
        check_exact_key(schema, key)?;
        let key_doc = key_filter(schema, key)?;
        Ok(self
            .find_by_key(store.as_ref(), schema, &key_doc)?
            .map(|doc| decode_item(&doc, schema)))
    }

    /// Whether an item exists at `key`.
    pub fn exists(&self, schema: &ModelSchema, key: &Item) -> AdapterResult<bool> {
        let store = self.table(schema)?;
        check_exact_key(schema, key)?;
        let key_doc = key_filter(schema, key)?;
        Ok(store.count(&schema.table_name, &key_doc)? > 0)
    }

    /// Fetches up to [`MAX_BATCH_GET`] items by key. Missing items are
    /// skipped; found ones come back in request order.
    pub fn batch_get(&self, schema: &ModelSchema, keys: &[Item]) -> AdapterResult<Vec<Item>> {
        if keys.len() > MAX_BATCH_GET {
            return Err(AdapterError::validation(format!(
                "batch_get accepts at most {MAX_BATCH_GET} keys, got {}",
                keys.len()
            )));
        }
        let store = self.table(schema)?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        for (i, key) in keys.iter().enumerate() {
            check_exact_key(schema, key)?;
            if keys[..i].iter().any(|prior| same_key(schema, prior, key)) {
                return Err(AdapterError::validation("batch_get keys must be unique"));
            }
        }
        let branches = keys
            .iter()
            .map(|key| key_filter(schema, key).map(NativeValue::Document))
            .collect::<AdapterResult<Vec<_>>>()?;
        let found: Vec<Item> = store
            .find(
                &schema.table_name,
                &doc! { "$or" => branches },
                &FindOptions::default(),
            )?
            .iter()
            .map(|doc| decode_item(doc, schema))
            .collect();
        debug!(table = %schema.table_name, requested = keys.len(), found = found.len(), "batch get");

        Ok(keys
            .iter()
            .filter_map(|key| found.iter().find(|item| same_key(schema, key, item)).cloned())
            .collect())
    }

    // -----------------------------------------------------------------------
    // Query and scan
    // -----------------------------------------------------------------------

    /// One page of items sharing a hash key, in range-key order.
    pub fn query(&self, schema: &ModelSchema, input: &QueryInput) -> AdapterResult<ResultPage> {
        let Some(hash) = &input.hash_key else {
            debug!(table = %schema.table_name, "query without a hash key runs as a scan");
            return self.scan(schema, &scan_for_query(schema, input)?);
        };
        check_limit(input.limit)?;
        let store = self.table(schema)?;
        let resolver = self.resolver(schema);
        let plan = self.plan_query(schema, input, hash)?;
        let projection = resolve_projection(resolver, &input.projection)?;

        let mut predicates = plan.predicates.clone();
        if let Some(filter) = &input.filter {
            predicates.push(ConditionTranslator::new(resolver).translate(filter)?);
        }
        if let Some(token) = &input.exclusive_start {
            let cursor = Cursor::decode(token, &plan.scope)?;
            self.ensure_cursor_item(store.as_ref(), schema, &cursor)?;
            predicates.push(strictly_after(&plan.position(&cursor.key)?));
        }
        let filter = and_all(predicates);
        let options = FindOptions {
            sort: plan.native_sort(),
            skip: 0,
            limit: input.limit.map(|limit| limit + 1),
            projection: native_projection(&projection, &plan.scope.key_attributes),
            read_preference: read_preference(input.consistent_read),
        };
        let documents = store.find(&schema.table_name, &filter, &options)?;
        debug!(
            table = %schema.table_name,
            index = ?input.index_name,
            filter = %DisplayDocument(&filter),
            fetched = documents.len(),
            "query"
        );

        let mut items: Vec<Item> = documents.iter().map(|doc| decode_item(doc, schema)).collect();
        let more = input.limit.is_some_and(|limit| items.len() > limit);
        if let Some(limit) = input.limit {
            items.truncate(limit);
        }
        let cursor = match items.last() {
            Some(last) if more => Some(Cursor::from_item(last, &plan.scope)?.encode()?),
            _ => None,
        };
        let items = apply_projection(items, &projection, &plan.scope.key_attributes);
        let count = items.len();
        Ok(ResultPage {
            items,
            cursor,
            count,
            scanned_count: count,
        })
    }

    /// One page of the whole table in primary-key order, filtered
    /// client-side.
    pub fn scan(&self, schema: &ModelSchema, input: &ScanInput) -> AdapterResult<ResultPage> {
        check_limit(input.limit)?;
        let store = self.table(schema)?;
        let resolver = self.resolver(schema);
        if let Some(filter) = &input.filter {
            check_condition_paths(resolver, filter)?;
        }
        let projection = resolve_projection(resolver, &input.projection)?;
        let scope = scan_scope(schema);
        let sort: Vec<(String, SortDirection)> = scope
            .key_attributes
            .iter()
            .map(|name| (name.clone(), SortDirection::Ascending))
            .collect();

        let mut position: Option<Item> = None;
        if let Some(token) = &input.exclusive_start {
            let cursor = Cursor::decode(token, &scope)?;
            self.ensure_cursor_item(store.as_ref(), schema, &cursor)?;
            position = Some(cursor.key);
        }

        let batch_size = self.config.scan_batch_size.max(1);
        let mut items = Vec::new();
        let mut scanned = 0;
        let mut exhausted = false;
        'batches: loop {
            let options = FindOptions {
                sort: sort.clone(),
                skip: 0,
                limit: Some(batch_size),
                projection: None,
                read_preference: read_preference(input.consistent_read),
            };
            let after = after_position(&sort, position.as_ref())?;
            let batch = store.find(&schema.table_name, &after, &options)?;
            let fetched = batch.len();
            for document in &batch {
                let item = decode_item(document, schema);
                scanned += 1;
                position = Some(key_of(&item, &scope.key_attributes));
                let matched = match &input.filter {
                    Some(filter) => EvalContext::new(&item, resolver).evaluate(filter)?,
                    None => true,
                };
                if matched {
                    items.push(item);
                    if input.limit.is_some_and(|limit| items.len() >= limit) {
                        break 'batches;
                    }
                }
            }
            if fetched < batch_size {
                exhausted = true;
                break;
            }
        }

        let cursor = match &position {
            Some(key) if !exhausted => {
                let lookahead = FindOptions {
                    limit: Some(1),
                    read_preference: read_preference(input.consistent_read),
                    ..FindOptions::default()
                };
                let rest =
                    store.find(&schema.table_name, &after_position(&sort, Some(key))?, &lookahead)?;
                if rest.is_empty() {
                    None
                } else {
                    Some(Cursor::from_item(key, &scope)?.encode()?)
                }
            }
            _ => None,
        };
        debug!(table = %schema.table_name, scanned, matched = items.len(), "scan");

        let items = apply_projection(items, &projection, &scope.key_attributes);
        let count = items.len();
        Ok(ResultPage {
            items,
            cursor,
            count,
            scanned_count: scanned,
        })
    }

    /// Number of items a query matches, ignoring its limit and cursor.
    pub fn count(&self, schema: &ModelSchema, input: &QueryInput) -> AdapterResult<usize> {
        let Some(hash) = &input.hash_key else {
            let mut scan = scan_for_query(schema, input)?;
            scan.limit = None;
            scan.exclusive_start = None;
            scan.projection = Vec::new();
            return Ok(self.scan(schema, &scan)?.count);
        };
        let store = self.table(schema)?;
        let plan = self.plan_query(schema, input, hash)?;
        let mut predicates = plan.predicates;
        if let Some(filter) = &input.filter {
            predicates.push(self.translate_condition(schema, filter)?);
        }
        let n = store.count(&schema.table_name, &and_all(predicates))?;
        Ok(usize::try_from(n).unwrap_or(usize::MAX))
    }

    /// Iterates a query across pages. `input.limit` sets the page size.
    pub fn query_iter<'a>(&'a self, schema: &'a ModelSchema, input: QueryInput) -> ItemIterator<'a> {
        ItemIterator::query(self, schema, input)
    }

    /// Iterates a scan across pages. `input.limit` sets the page size.
    pub fn scan_iter<'a>(&'a self, schema: &'a ModelSchema, input: ScanInput) -> ItemIterator<'a> {
        ItemIterator::scan(self, schema, input)
    }

    /// A batch writer for `schema`'s table.
    pub fn batch_writer<'a>(&'a self, schema: &'a ModelSchema) -> BatchWriter<'a> {
        BatchWriter::new(self, schema)
    }

    /// The position scope of pages produced for `input`.
    pub(crate) fn query_scope(
        &self,
        schema: &ModelSchema,
        input: &QueryInput,
    ) -> AdapterResult<CursorScope> {
        match &input.hash_key {
            Some(hash) => Ok(self.plan_query(schema, input, hash)?.scope),
            None => Ok(scan_scope(schema)),
        }
    }

    fn plan_query(
        &self,
        schema: &ModelSchema,
        input: &QueryInput,
        hash: &AttributeValue,
    ) -> AdapterResult<QueryPlan> {
        let resolver = self.resolver(schema);
        let table_keys: Vec<String> = schema
            .key_attributes()
            .into_iter()
            .map(str::to_owned)
            .collect();
        let mut key_attributes = table_keys.clone();
        let mut predicates = Vec::new();
        let mut sort = Vec::new();

        match input.index_name.as_deref() {
            None => {
                check_key_value(schema, &schema.hash_key, hash)?;
                predicates.push(doc! { schema.hash_key.as_str() => encode(hash)? });
                match (&schema.range_key, &input.range_condition) {
                    (Some(range), condition) => {
                        if let Some(condition) = condition {
                            check_range_target(resolver, range, condition)?;
                            predicates.push(ConditionTranslator::new(resolver).translate(condition)?);
                        }
                        sort.push(SortField::Attribute(range.clone()));
                    }
                    (None, Some(_)) => {
                        return Err(AdapterError::validation(format!(
                            "table '{}' has no range key",
                            schema.table_name
                        )));
                    }
                    (None, None) => {}
                }
                sort.push(SortField::Attribute(schema.hash_key.clone()));
            }
            Some(name) => {
                let index = schema.index(name).ok_or_else(|| {
                    AdapterError::validation(format!(
                        "table '{}' has no index '{name}'",
                        schema.table_name
                    ))
                })?;
                check_key_value(schema, &index.hash_key, hash)?;
                for attr in std::iter::once(&index.hash_key).chain(index.range_key.as_ref()) {
                    if !key_attributes.contains(attr) {
                        key_attributes.push(attr.clone());
                    }
                }
                match layout(schema, index) {
                    IndexLayout::Composite { field } => {
                        let (AttributeValue::S(hash), Some(range)) = (hash, &index.range_key) else {
                            return Err(AdapterError::validation(format!(
                                "index '{name}' takes a string hash key"
                            )));
                        };
                        predicates.push(composite_hash_predicate(&field, hash));
                        if let Some(condition) = &input.range_condition {
                            check_range_target(resolver, range, condition)?;
                            predicates.push(translate_composite_range(&field, hash, condition)?);
                        }
                        sort.push(SortField::Composite {
                            field,
                            hash: index.hash_key.clone(),
                            range: range.clone(),
                        });
                    }
                    IndexLayout::Decomposed => {
                        predicates.push(doc! { index.hash_key.as_str() => encode(hash)? });
                        match (&index.range_key, &input.range_condition) {
                            (Some(range), condition) => {
                                predicates.push(doc! { range.as_str() => doc! { "$exists" => true } });
                                if let Some(condition) = condition {
                                    check_range_target(resolver, range, condition)?;
                                    predicates
                                        .push(ConditionTranslator::new(resolver).translate(condition)?);
                                }
                                sort.push(SortField::Attribute(range.clone()));
                            }
                            (None, Some(_)) => {
                                return Err(AdapterError::validation(format!(
                                    "index '{name}' has no range key"
                                )));
                            }
                            (None, None) => {}
                        }
                    }
                }
                for attr in &table_keys {
                    if !sort.iter().any(|s| s.is_attribute(attr)) {
                        sort.push(SortField::Attribute(attr.clone()));
                    }
                }
            }
        }

        Ok(QueryPlan {
            scope: CursorScope {
                table: schema.table_name.clone(),
                index: input.index_name.clone(),
                forward: input.scan_forward,
                key_attributes,
            },
            predicates,
            sort,
            direction: if input.scan_forward {
                SortDirection::Ascending
            } else {
                SortDirection::Descending
            },
        })
    }

    fn translate_condition(
        &self,
        schema: &ModelSchema,
        condition: &Condition,
    ) -> AdapterResult<Document> {
        ConditionTranslator::new(self.resolver(schema)).translate(condition)
    }

    fn find_by_key(
        &self,
        store: &dyn DocumentStore,
        schema: &ModelSchema,
        key: &Document,
    ) -> AdapterResult<Option<Document>> {
        Ok(store.find_one(&schema.table_name, key, &FindOptions::default())?)
    }

    fn ensure_cursor_item(
        &self,
        store: &dyn DocumentStore,
        schema: &ModelSchema,
        cursor: &Cursor,
    ) -> AdapterResult<()> {
        let key = key_filter(schema, &cursor.key)
            .map_err(|e| AdapterError::invalid_cursor(format!("cursor key is unusable: {e}")))?;
        if self.find_by_key(store, schema, &key)?.is_none() {
            return Err(AdapterError::invalid_cursor(
                "the item the cursor points at no longer exists",
            ));
        }
        Ok(())
    }

    /// `item` as a native document, validated against the schema and
    /// carrying its composite index fields.
    pub(crate) fn to_document(&self, schema: &ModelSchema, item: &Item) -> AdapterResult<Document> {
        key_filter(schema, item)?;
        for (name, value) in item {
            if is_bookkeeping_field(name) {
                return Err(AdapterError::validation(format!(
                    "attribute name '{name}' is reserved"
                )));
            }
            match schema.attribute_by_storage(name) {
                Some(attr) if !attr.kind.accepts(value) => {
                    return Err(AdapterError::validation(format!(
                        "attribute '{name}' expects {}, got {}",
                        attr.kind.as_str(),
                        value.type_descriptor()
                    )));
                }
                None if self.config.strict_paths && !schema.allow_undeclared => {
                    return Err(AdapterError::validation(format!(
                        "attribute '{name}' is not declared on table '{}'",
                        schema.table_name
                    )));
                }
                _ => {}
            }
        }
        let mut document = encode_item(item)?;
        for (field, value) in composite_fields(schema, item) {
            if let Some(value) = value {
                document.insert(field, NativeValue::String(value));
            }
        }
        Ok(document)
    }

    // -----------------------------------------------------------------------
    // Typed wrappers
    // -----------------------------------------------------------------------

    /// Stores `model`, replacing any previous version.
    pub fn save<M: Model>(&self, model: &M) -> AdapterResult<()> {
        self.put(M::schema(), &model.to_item(), None)
    }

    /// Stores `model` when `condition` holds.
    pub fn save_if<M: Model>(&self, model: &M, condition: &Condition) -> AdapterResult<()> {
        self.put(M::schema(), &model.to_item(), Some(condition))
    }

    /// Loads the entity at `key`, or `ItemNotFound`.
    pub fn load<M: Model>(&self, key: &Item) -> AdapterResult<M> {
        M::from_item(self.get(M::schema(), key)?)
    }

    /// Loads the entity at `key`, if any.
    pub fn load_optional<M: Model>(&self, key: &Item) -> AdapterResult<Option<M>> {
        self.get_optional(M::schema(), key)?
            .map(M::from_item)
            .transpose()
    }

    /// Re-reads `model` from the store.
    pub fn refresh<M: Model>(&self, model: &mut M) -> AdapterResult<()> {
        *model = self.load(&model.key())?;
        Ok(())
    }

    /// Deletes `model`. Returns whether it was stored.
    pub fn remove<M: Model>(&self, model: &M) -> AdapterResult<bool> {
        self.delete(M::schema(), &model.key(), None)
    }

    /// Iterates entities matched by a query.
    pub fn query_models<M: Model>(&self, input: QueryInput) -> ResultIterator<'_, M> {
        ResultIterator::new(self.query_iter(M::schema(), input))
    }

    /// Iterates every entity of the table.
    pub fn scan_models<M: Model>(&self, input: ScanInput) -> ResultIterator<'_, M> {
        ResultIterator::new(self.scan_iter(M::schema(), input))
    }
}

// ---------------------------------------------------------------------------
// Query plans
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum SortField {
    Attribute(String),
    Composite {
        field: String,
        hash: String,
        range: String,
    },
}

impl SortField {
    fn native_name(&self) -> &str {
        match self {
            Self::Attribute(name) => name,
            Self::Composite { field, .. } => field,
        }
    }

    fn is_attribute(&self, name: &str) -> bool {
        matches!(self, Self::Attribute(a) if a == name)
    }

    /// The native sort value of the item identified by `key`.
    fn value_in(&self, key: &Item) -> AdapterResult<NativeValue> {
        let component = |name: &str| {
            key.get(name)
                .ok_or_else(|| AdapterError::invalid_cursor(format!("cursor lacks '{name}'")))
        };
        match self {
            Self::Attribute(name) => encode(component(name)?)
                .map_err(|e| AdapterError::invalid_cursor(e.to_string())),
            Self::Composite { hash, range, .. } => {
                match (component(hash)?, component(range)?) {
                    (AttributeValue::S(h), AttributeValue::S(r)) => {
                        Ok(NativeValue::String(composite_value(h, r)))
                    }
                    _ => Err(AdapterError::invalid_cursor(
                        "composite index keys in the cursor must be strings",
                    )),
                }
            }
        }
    }
}

#[derive(Debug)]
struct QueryPlan {
    scope: CursorScope,
    predicates: Vec<Document>,
    sort: Vec<SortField>,
    direction: SortDirection,
}

impl QueryPlan {
    fn native_sort(&self) -> Vec<(String, SortDirection)> {
        self.sort
            .iter()
            .map(|s| (s.native_name().to_owned(), self.direction))
            .collect()
    }

    fn position(&self, key: &Item) -> AdapterResult<Vec<(String, SortDirection, NativeValue)>> {
        self.sort
            .iter()
            .map(|s| Ok((s.native_name().to_owned(), self.direction, s.value_in(key)?)))
            .collect()
    }
}

fn scan_scope(schema: &ModelSchema) -> CursorScope {
    CursorScope {
        table: schema.table_name.clone(),
        index: None,
        forward: true,
        key_attributes: schema
            .key_attributes()
            .into_iter()
            .map(str::to_owned)
            .collect(),
    }
}

/// The scan equivalent of a query without a hash key.
fn scan_for_query(schema: &ModelSchema, input: &QueryInput) -> AdapterResult<ScanInput> {
    let mut conditions: Vec<Condition> = Vec::new();
    if let Some(name) = &input.index_name {
        let index = schema.index(name).ok_or_else(|| {
            AdapterError::validation(format!(
                "table '{}' has no index '{name}'",
                schema.table_name
            ))
        })?;
        for attr in std::iter::once(&index.hash_key).chain(index.range_key.as_ref()) {
            conditions.push(Condition::Exists(AttributePath::attribute(attr.as_str())));
        }
    }
    conditions.extend(input.range_condition.clone());
    conditions.extend(input.filter.clone());
    Ok(ScanInput {
        filter: (!conditions.is_empty()).then(|| Condition::and(conditions)),
        projection: input.projection.clone(),
        limit: input.limit,
        consistent_read: input.consistent_read,
        exclusive_start: input.exclusive_start.clone(),
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// AND of the non-empty `parts`.
pub(crate) fn and_all(parts: Vec<Document>) -> Document {
    let mut parts: Vec<Document> = parts.into_iter().filter(|p| !p.is_empty()).collect();
    match parts.len() {
        0 => Document::new(),
        1 => parts.pop().unwrap_or_default(),
        _ => doc! { "$and" => parts.into_iter().map(NativeValue::Document).collect::<Vec<_>>() },
    }
}

/// Equality filter on the key attributes of `item`.
pub(crate) fn key_filter(schema: &ModelSchema, item: &Item) -> AdapterResult<Document> {
    schema
        .key_attributes()
        .into_iter()
        .map(|name| {
            let value = item.get(name).ok_or_else(|| {
                AdapterError::validation(format!("missing key attribute '{name}'"))
            })?;
            check_key_value(schema, name, value)?;
            Ok((name.to_owned(), encode(value)?))
        })
        .collect()
}

/// Checks that `value` can be the key attribute `name`.
pub(crate) fn check_key_value(
    schema: &ModelSchema,
    name: &str,
    value: &AttributeValue,
) -> AdapterResult<()> {
    if !value.is_scalar_key() {
        return Err(AdapterError::validation(format!(
            "key attribute '{name}' must be S, N or B, got {}",
            value.type_descriptor()
        )));
    }
    if let Some(kind) = schema.kind_of(name)
        && !kind.accepts(value)
    {
        return Err(AdapterError::validation(format!(
            "key attribute '{name}' expects {}, got {}",
            kind.as_str(),
            value.type_descriptor()
        )));
    }
    let empty = match value {
        AttributeValue::S(s) => s.is_empty(),
        AttributeValue::B(b) => b.is_empty(),
        _ => false,
    };
    if empty {
        return Err(AdapterError::validation(format!(
            "key attribute '{name}' must not be empty"
        )));
    }
    Ok(())
}

fn check_exact_key(schema: &ModelSchema, key: &Item) -> AdapterResult<()> {
    let keys = schema.key_attributes();
    if let Some(extra) = key.keys().find(|name| !keys.contains(&name.as_str())) {
        return Err(AdapterError::validation(format!(
            "'{extra}' is not a key attribute of table '{}'",
            schema.table_name
        )));
    }
    Ok(())
}

fn same_key(schema: &ModelSchema, a: &Item, b: &Item) -> bool {
    schema
        .key_attributes()
        .into_iter()
        .all(|name| match (a.get(name), b.get(name)) {
            (Some(x), Some(y)) => values_equal(x, y),
            _ => false,
        })
}

fn key_of(item: &Item, key_attributes: &[String]) -> Item {
    key_attributes
        .iter()
        .filter_map(|name| item.get(name).map(|v| (name.clone(), v.clone())))
        .collect()
}

fn after_position(
    sort: &[(String, SortDirection)],
    key: Option<&Item>,
) -> AdapterResult<Document> {
    let Some(key) = key else {
        return Ok(Document::new());
    };
    let position = sort
        .iter()
        .map(|(name, direction)| {
            let value = key
                .get(name)
                .ok_or_else(|| AdapterError::invalid_cursor(format!("cursor lacks '{name}'")))?;
            let value =
                encode(value).map_err(|e| AdapterError::invalid_cursor(e.to_string()))?;
            Ok((name.clone(), *direction, value))
        })
        .collect::<AdapterResult<Vec<_>>>()?;
    Ok(strictly_after(&position))
}

fn check_limit(limit: Option<usize>) -> AdapterResult<()> {
    if limit == Some(0) {
        return Err(AdapterError::validation("limit must be at least 1"));
    }
    Ok(())
}

fn check_range_target(
    resolver: PathResolver<'_>,
    range: &str,
    condition: &Condition,
) -> AdapterResult<()> {
    validate_key_condition(condition)?;
    let path = match condition {
        Condition::Compare { path, .. }
        | Condition::Between { path, .. }
        | Condition::BeginsWith { path, .. } => path,
        other => return Err(AdapterError::unsupported("key condition", other.to_string())),
    };
    let resolved = resolver.resolve(path)?;
    if resolved.path().is_top_level() && resolved.root() == range {
        Ok(())
    } else {
        Err(AdapterError::validation(format!(
            "the range condition must address '{range}', not '{path}'"
        )))
    }
}

fn check_condition_paths(resolver: PathResolver<'_>, condition: &Condition) -> AdapterResult<()> {
    validate(condition)?;
    let mut failure = None;
    condition.for_each_path(&mut |path| {
        if failure.is_none()
            && let Err(e) = resolver.resolve(path)
        {
            failure = Some(e);
        }
    });
    failure.map_or(Ok(()), Err)
}

fn check_on_empty_item(resolver: PathResolver<'_>, condition: Option<&Condition>) -> AdapterResult<()> {
    match condition {
        Some(condition) if !EvalContext::new(&Item::new(), resolver).evaluate(condition)? => {
            Err(AdapterError::ConditionalCheckFailed)
        }
        _ => Ok(()),
    }
}

fn duplicate_as_condition_failure(e: StoreError) -> AdapterError {
    match e {
        StoreError::DuplicateKey { .. } => AdapterError::ConditionalCheckFailed,
        other => AdapterError::Store(other),
    }
}

fn read_preference(consistent_read: bool) -> ReadPreference {
    if consistent_read {
        ReadPreference::Primary
    } else {
        ReadPreference::Nearest
    }
}

fn resolve_projection(
    resolver: PathResolver<'_>,
    projection: &[String],
) -> AdapterResult<Vec<StoragePath>> {
    projection.iter().map(|p| resolver.resolve_str(p)).collect()
}

/// Top-level fields to fetch natively: the projected roots plus the keys.
fn native_projection(paths: &[StoragePath], key_attributes: &[String]) -> Option<Vec<String>> {
    if paths.is_empty() {
        return None;
    }
    let mut fields: Vec<String> = key_attributes.to_vec();
    for path in paths {
        if !fields.iter().any(|f| f == path.root()) {
            fields.push(path.root().to_owned());
        }
    }
    Some(fields)
}

fn apply_projection(items: Vec<Item>, paths: &[StoragePath], key_attributes: &[String]) -> Vec<Item> {
    if paths.is_empty() {
        return items;
    }
    let mut paths = paths.to_vec();
    paths.extend(key_attributes.iter().map(|k| StoragePath::attribute(k.as_str())));
    items.iter().map(|item| project(item, &paths)).collect()
}
