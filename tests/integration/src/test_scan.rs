//! Scans, client-side filters and read consistency.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use dynamongo_core::AdapterConfig;
    use dynamongo_docstore::{DocumentStore, MemoryStore};
    use dynamongo_model::{AttributeValue, Item, Path, QueryInput, ScanInput};

    use crate::{adapter_with, memory_adapter, order, order_key, orders_schema, test_table_name};

    fn sks(items: &[Item]) -> Vec<AttributeValue> {
        items.iter().map(|i| i["sk"].clone()).collect()
    }

    #[test]
    fn test_should_count_limit_after_filtering() {
        let adapter = adapter_with(
            Arc::new(MemoryStore::new()),
            AdapterConfig::builder().scan_batch_size(3).build(),
        );
        let schema = orders_schema(&test_table_name("scan"));
        adapter.create_table(&schema).unwrap();
        for sk in 1..=10 {
            let status = if sk % 4 == 0 { "late" } else { "ok" };
            adapter.put(&schema, &order("c1", sk, status), None).unwrap();
        }

        let input = ScanInput::builder()
            .filter(Path::new("status").eq("late"))
            .limit(1)
            .build();
        let page = adapter.scan(&schema, &input).unwrap();
        assert_eq!(page.count, 1);
        assert_eq!(page.scanned_count, 4);
        assert!(page.scanned_count > page.count);
        assert_eq!(sks(&page.items), vec![AttributeValue::n(4)]);

        let next = adapter
            .scan(
                &schema,
                &ScanInput {
                    exclusive_start: page.cursor,
                    ..input.clone()
                },
            )
            .unwrap();
        assert_eq!(sks(&next.items), vec![AttributeValue::n(8)]);
        assert_eq!(next.scanned_count, 4);

        // Items 9 and 10 remain but none matches.
        let last = adapter
            .scan(
                &schema,
                &ScanInput {
                    exclusive_start: next.cursor,
                    ..input
                },
            )
            .unwrap();
        assert_eq!(last.count, 0);
        assert_eq!(last.scanned_count, 2);
        assert!(last.is_last());
    }

    #[test]
    fn test_should_evaluate_filters_client_side() {
        let adapter = memory_adapter();
        let schema = orders_schema(&test_table_name("filters"));
        adapter.create_table(&schema).unwrap();
        for (sk, tags) in [(1, vec!["red", "big"]), (2, vec!["blue"]), (3, vec!["red"])] {
            let mut o = order("c1", sk, "open");
            o.insert(
                "tags".to_owned(),
                AttributeValue::Ss(tags.into_iter().map(str::to_owned).collect()),
            );
            adapter.put(&schema, &o, None).unwrap();
        }
        adapter.put(&schema, &order("c2", 1, "closed"), None).unwrap();

        let scan = |filter| {
            let input = ScanInput::builder().filter(filter).build();
            adapter.scan(&schema, &input).unwrap().count
        };
        assert_eq!(scan(Path::new("tags").contains("red")), 2);
        assert_eq!(scan(!Path::new("tags").contains("red")), 2);
        assert_eq!(scan(Path::new("sk").is_in([AttributeValue::n(1), AttributeValue::n(3)])), 3);
        assert_eq!(scan(Path::new("tags").does_not_exist() | Path::new("pk").eq("nobody")), 1);
        assert_eq!(scan(Path::new("status").begins_with("clo") & Path::new("sk").ge(AttributeValue::n(1))), 1);
    }

    #[test]
    fn test_should_filter_lists_alike_in_query_and_scan() {
        let adapter = memory_adapter();
        let schema = orders_schema(&test_table_name("list-filters"));
        adapter.create_table(&schema).unwrap();
        let mut listed = order("c1", 1, "open");
        listed.insert(
            "labels".to_owned(),
            AttributeValue::L(vec![AttributeValue::from("x"), AttributeValue::n(10)]),
        );
        adapter.put(&schema, &listed, None).unwrap();
        let mut plain = order("c1", 2, "open");
        plain.insert("labels".to_owned(), AttributeValue::from("xyz"));
        adapter.put(&schema, &plain, None).unwrap();

        let filters = [
            (Path::new("labels").eq("x"), 0),
            (Path::new("labels").ne("x"), 2),
            (Path::new("labels").gt(AttributeValue::n(5)), 0),
            (Path::new("labels").begins_with("x"), 1),
            (Path::new("labels").contains("x"), 2),
            (Path::new("labels").contains("y"), 1),
            (Path::new("labels").contains(AttributeValue::n(10)), 1),
            (Path::new("labels").is_in(["x", "xyz"]), 1),
        ];
        for (filter, expected) in filters {
            let query = QueryInput::builder()
                .hash_key("c1")
                .filter(filter.clone())
                .build();
            let scan = ScanInput::builder().filter(filter.clone()).build();
            assert_eq!(adapter.query(&schema, &query).unwrap().count, expected, "query {filter}");
            assert_eq!(adapter.scan(&schema, &scan).unwrap().count, expected, "scan {filter}");
        }
    }

    #[test]
    fn test_should_route_hashless_query_to_scan() {
        let adapter = memory_adapter();
        let schema = orders_schema(&test_table_name("hashless"));
        adapter.create_table(&schema).unwrap();
        for sk in 1..=3 {
            let mut o = order("c1", sk, "open");
            if sk != 2 {
                o.insert("region".to_owned(), AttributeValue::from("eu"));
                o.insert("priority".to_owned(), AttributeValue::n(sk));
            }
            adapter.put(&schema, &o, None).unwrap();
        }
        let input = QueryInput::builder().index_name("by_region").build();
        let page = adapter.query(&schema, &input).unwrap();
        assert_eq!(sks(&page.items), vec![AttributeValue::n(1), AttributeValue::n(3)]);
        assert_eq!(page.scanned_count, 3);
    }

    #[test]
    fn test_should_honour_consistent_read() {
        let store = Arc::new(MemoryStore::with_replica_lag());
        let adapter = adapter_with(
            Arc::clone(&store) as Arc<dyn DocumentStore>,
            AdapterConfig::default(),
        );
        let schema = orders_schema(&test_table_name("lag"));
        adapter.create_table(&schema).unwrap();
        adapter.put(&schema, &order("c1", 1, "open"), None).unwrap();

        let eventual = QueryInput::builder().hash_key("c1").build();
        let strong = QueryInput::builder().hash_key("c1").consistent_read(true).build();
        assert_eq!(adapter.query(&schema, &eventual).unwrap().count, 0);
        assert_eq!(adapter.query(&schema, &strong).unwrap().count, 1);
        assert_eq!(
            adapter
                .scan(&schema, &ScanInput::builder().consistent_read(true).build())
                .unwrap()
                .count,
            1
        );
        // Point reads always go to the primary.
        assert!(adapter.get_optional(&schema, &order_key("c1", 1)).unwrap().is_some());

        store.sync_replicas();
        assert_eq!(adapter.query(&schema, &eventual).unwrap().count, 1);
    }
}
