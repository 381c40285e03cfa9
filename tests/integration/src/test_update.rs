//! Update actions, the read-modify-write fallback and its race.

#[cfg(test)]
mod tests {
    use std::fmt;
    use std::sync::Arc;

    use dynamongo_core::AdapterError;
    use dynamongo_docstore::{
        Document, DocumentStore, FindOptions, IndexModel, MemoryStore, NativeValue, StoreResult,
        UpdateResult, WriteModel, doc,
    };
    use dynamongo_model::{AttributeValue, Path, QueryInput, ReturnValues, ScanInput, Warning};
    use parking_lot::Mutex;

    use crate::{adapter_over, memory_adapter, order, order_key, orders_schema, test_table_name};

    type Hook = Box<dyn FnOnce(&MemoryStore) + Send>;

    /// A store that runs a one-shot hook right after serving a read, standing
    /// in for a writer that lands between another writer's read and write.
    struct InterleavingStore {
        inner: MemoryStore,
        hook: Mutex<Option<Hook>>,
    }

    impl fmt::Debug for InterleavingStore {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("InterleavingStore")
                .field("armed", &self.hook.lock().is_some())
                .finish_non_exhaustive()
        }
    }

    impl InterleavingStore {
        fn new() -> Self {
            Self {
                inner: MemoryStore::new(),
                hook: Mutex::new(None),
            }
        }

        fn arm(&self, hook: impl FnOnce(&MemoryStore) + Send + 'static) {
            *self.hook.lock() = Some(Box::new(hook));
        }
    }

    impl DocumentStore for InterleavingStore {
        fn find(
            &self,
            collection: &str,
            filter: &Document,
            options: &FindOptions,
        ) -> StoreResult<Vec<Document>> {
            let found = self.inner.find(collection, filter, options)?;
            let hook = self.hook.lock().take();
            if let Some(hook) = hook {
                hook(&self.inner);
            }
            Ok(found)
        }

        fn count(&self, collection: &str, filter: &Document) -> StoreResult<u64> {
            self.inner.count(collection, filter)
        }

        fn insert_one(&self, collection: &str, document: Document) -> StoreResult<NativeValue> {
            self.inner.insert_one(collection, document)
        }

        fn replace_one(
            &self,
            collection: &str,
            filter: &Document,
            replacement: Document,
            upsert: bool,
        ) -> StoreResult<UpdateResult> {
            self.inner.replace_one(collection, filter, replacement, upsert)
        }

        fn find_one_and_update(
            &self,
            collection: &str,
            filter: &Document,
            update: &Document,
            upsert: bool,
        ) -> StoreResult<Option<Document>> {
            self.inner.find_one_and_update(collection, filter, update, upsert)
        }

        fn delete_one(&self, collection: &str, filter: &Document) -> StoreResult<u64> {
            self.inner.delete_one(collection, filter)
        }

        fn bulk_write(&self, collection: &str, operations: Vec<WriteModel>) -> Vec<StoreResult<()>> {
            self.inner.bulk_write(collection, operations)
        }

        fn create_index(&self, collection: &str, index: IndexModel) -> StoreResult<String> {
            self.inner.create_index(collection, index)
        }

        fn drop_index(&self, collection: &str, name: &str) -> StoreResult<()> {
            self.inner.drop_index(collection, name)
        }

        fn list_indexes(&self, collection: &str) -> StoreResult<Vec<IndexModel>> {
            self.inner.list_indexes(collection)
        }

        fn drop_collection(&self, collection: &str) -> StoreResult<bool> {
            self.inner.drop_collection(collection)
        }

        fn list_collection_names(&self) -> StoreResult<Vec<String>> {
            self.inner.list_collection_names()
        }
    }

    fn counters(values: &[i64]) -> AttributeValue {
        AttributeValue::L(values.iter().map(|v| AttributeValue::n(*v)).collect())
    }

    #[test]
    fn test_should_be_idempotent_for_set() {
        let adapter = memory_adapter();
        let schema = orders_schema(&test_table_name("set"));
        adapter.create_table(&schema).unwrap();
        adapter.put(&schema, &order("c1", 1, "open"), None).unwrap();

        let actions = [
            Path::new("status").set("shipped"),
            Path::new("total").set(AttributeValue::n(42)),
        ];
        let first = adapter
            .update(&schema, &order_key("c1", 1), &actions, None, ReturnValues::AllNew)
            .unwrap();
        let second = adapter
            .update(&schema, &order_key("c1", 1), &actions, None, ReturnValues::AllNew)
            .unwrap();
        assert_eq!(first.item, second.item);
        assert_eq!(
            adapter.get(&schema, &order_key("c1", 1)).unwrap(),
            first.item.unwrap()
        );
    }

    #[test]
    fn test_should_apply_list_and_set_actions() {
        let adapter = memory_adapter();
        let schema = orders_schema(&test_table_name("lists"));
        adapter.create_table(&schema).unwrap();
        let mut o = order("c1", 1, "open");
        o.insert("counters".to_owned(), counters(&[1, 2, 3]));
        o.insert("tags".to_owned(), AttributeValue::Ss(vec!["a".to_owned()]));
        adapter.put(&schema, &o, None).unwrap();

        let outcome = adapter
            .update(
                &schema,
                &order_key("c1", 1),
                &[
                    Path::new("counters").append(vec![AttributeValue::n(4)]),
                    Path::new("tags").add(AttributeValue::Ss(vec!["b".to_owned()])),
                    Path::new("total").add(AttributeValue::n("1.5")),
                ],
                None,
                ReturnValues::AllNew,
            )
            .unwrap();
        assert!(!outcome.used_fallback());
        let item = outcome.item.unwrap();
        assert_eq!(item["counters"], counters(&[1, 2, 3, 4]));
        let AttributeValue::Ss(tags) = &item["tags"] else {
            panic!("tags should stay a string set");
        };
        assert!(tags.contains(&"a".to_owned()) && tags.contains(&"b".to_owned()));
        assert_eq!(item["total"], AttributeValue::n("1.5"));

        let outcome = adapter
            .update(
                &schema,
                &order_key("c1", 1),
                &[Path::new("counters").index(0).remove()],
                None,
                ReturnValues::AllNew,
            )
            .unwrap();
        assert_eq!(outcome.item.unwrap()["counters"], counters(&[2, 3, 4]));
    }

    #[test]
    fn test_should_match_grown_sets_by_equality() {
        let adapter = memory_adapter();
        let schema = orders_schema(&test_table_name("set-order"));
        adapter.create_table(&schema).unwrap();
        let mut o = order("c1", 1, "open");
        o.insert("tags".to_owned(), AttributeValue::Ss(vec!["b".to_owned()]));
        adapter.put(&schema, &o, None).unwrap();

        let outcome = adapter
            .update(
                &schema,
                &order_key("c1", 1),
                &[Path::new("tags").add(AttributeValue::Ss(vec!["a".to_owned()]))],
                None,
                ReturnValues::None,
            )
            .unwrap();
        assert!(!outcome.used_fallback());

        for literal in [["a", "b"], ["b", "a"]] {
            let filter = Path::new("tags").eq(AttributeValue::Ss(
                literal.iter().map(|s| (*s).to_owned()).collect(),
            ));
            let query = QueryInput::builder().hash_key("c1").filter(filter.clone()).build();
            let scan = ScanInput::builder().filter(filter).build();
            assert_eq!(adapter.query(&schema, &query).unwrap().count, 1);
            assert_eq!(adapter.scan(&schema, &scan).unwrap().count, 1);
        }
    }

    #[test]
    fn test_should_warn_when_falling_back() {
        let adapter = memory_adapter();
        let schema = orders_schema(&test_table_name("fallback"));
        adapter.create_table(&schema).unwrap();
        let mut o = order("c1", 1, "open");
        o.insert("counters".to_owned(), counters(&[5, 6]));
        adapter.put(&schema, &o, None).unwrap();

        let outcome = adapter
            .update(
                &schema,
                &order_key("c1", 1),
                &[Path::new("counters").index(1).add(AttributeValue::n(1))],
                Some(&Path::new("status").eq("open")),
                ReturnValues::AllNew,
            )
            .unwrap();
        assert!(outcome.used_fallback());
        assert!(matches!(
            outcome.warnings.as_slice(),
            [Warning::ConsistencyFallback { table, .. }] if *table == schema.table_name
        ));
        assert_eq!(outcome.item.unwrap()["counters"], counters(&[5, 7]));

        // The fallback path still honours the condition.
        let failed = adapter.update(
            &schema,
            &order_key("c1", 1),
            &[Path::new("counters").index(1).add(AttributeValue::n(1))],
            Some(&Path::new("status").eq("closed")),
            ReturnValues::None,
        );
        assert!(matches!(failed, Err(AdapterError::ConditionalCheckFailed)));
    }

    #[test]
    fn test_should_lose_concurrent_write_on_fallback_path() {
        let store = Arc::new(InterleavingStore::new());
        let adapter = adapter_over(Arc::clone(&store) as Arc<dyn DocumentStore>);
        let schema = orders_schema(&test_table_name("race"));
        adapter.create_table(&schema).unwrap();
        let mut o = order("c1", 1, "open");
        o.insert("counters".to_owned(), counters(&[0]));
        adapter.put(&schema, &o, None).unwrap();

        let table = schema.table_name.clone();
        store.arm(move |inner| {
            inner
                .find_one_and_update(
                    &table,
                    &doc! { "pk" => "c1", "sk" => 1_i64 },
                    &doc! { "$set" => doc! { "counters.0" => 100_i64 } },
                    false,
                )
                .unwrap()
                .unwrap();
        });

        let outcome = adapter
            .update(
                &schema,
                &order_key("c1", 1),
                &[Path::new("counters").index(0).add(AttributeValue::n(1))],
                None,
                ReturnValues::AllNew,
            )
            .unwrap();
        assert!(outcome.used_fallback());
        // The concurrent write of 100 is overwritten by 0 + 1.
        assert_eq!(
            adapter.get(&schema, &order_key("c1", 1)).unwrap()["counters"],
            counters(&[1])
        );
    }

    #[test]
    fn test_should_keep_composite_index_in_step_with_updates() {
        let adapter = memory_adapter();
        let schema = orders_schema(&test_table_name("composite-update"));
        adapter.create_table(&schema).unwrap();
        let mut o = order("c1", 1, "open");
        o.insert("category".to_owned(), AttributeValue::from("C1"));
        o.insert("code".to_owned(), AttributeValue::from("A"));
        adapter.put(&schema, &o, None).unwrap();

        // Only one component changes, so the update reads the other one.
        let outcome = adapter
            .update(
                &schema,
                &order_key("c1", 1),
                &[Path::new("code").set("Z")],
                None,
                ReturnValues::None,
            )
            .unwrap();
        assert!(outcome.used_fallback());

        let by_code = |code: &str| {
            let input = QueryInput::builder()
                .hash_key("C1")
                .index_name("by_category")
                .range_condition(Path::new("code").eq(code))
                .build();
            adapter.query(&schema, &input).unwrap().count
        };
        assert_eq!(by_code("A"), 0);
        assert_eq!(by_code("Z"), 1);

        adapter
            .update(
                &schema,
                &order_key("c1", 1),
                &[Path::new("category").remove()],
                None,
                ReturnValues::None,
            )
            .unwrap();
        assert_eq!(by_code("Z"), 0);
    }

    #[test]
    fn test_should_upsert_missing_items() {
        let adapter = memory_adapter();
        let schema = orders_schema(&test_table_name("upsert"));
        adapter.create_table(&schema).unwrap();
        let outcome = adapter
            .update(
                &schema,
                &order_key("c9", 1),
                &[Path::new("total").add(AttributeValue::n(3))],
                Some(&Path::new("pk").does_not_exist()),
                ReturnValues::AllNew,
            )
            .unwrap();
        let created = outcome.item.unwrap();
        assert_eq!(created["total"], AttributeValue::n(3));
        assert_eq!(created["pk"], AttributeValue::from("c9"));

        let again = adapter.update(
            &schema,
            &order_key("c9", 1),
            &[Path::new("total").add(AttributeValue::n(3))],
            Some(&Path::new("pk").does_not_exist()),
            ReturnValues::AllNew,
        );
        assert!(matches!(again, Err(AdapterError::ConditionalCheckFailed)));
    }
}
