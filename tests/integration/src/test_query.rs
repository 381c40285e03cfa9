//! Key-condition queries and pagination.

#[cfg(test)]
mod tests {
    use dynamongo_core::Adapter;
    use dynamongo_model::{AttributeValue, Item, ModelSchema, Path, QueryInput};

    use crate::{item, memory_adapter, order, orders_schema, test_table_name};

    fn seeded() -> (Adapter, ModelSchema) {
        let adapter = memory_adapter();
        let schema = orders_schema(&test_table_name("query"));
        adapter.create_table(&schema).unwrap();
        for sk in [4, 7, 1, 3, 6, 2, 5] {
            let mut o = order("c1", sk, if sk % 2 == 0 { "even" } else { "odd" });
            o.insert("total".to_owned(), AttributeValue::n(sk * 10));
            o.insert("region".to_owned(), AttributeValue::from("eu"));
            // Priorities repeat so the index order needs the key tie-breakers.
            o.insert("priority".to_owned(), AttributeValue::n(sk % 3));
            adapter.put(&schema, &o, None).unwrap();
        }
        adapter.put(&schema, &order("c2", 1, "odd"), None).unwrap();
        (adapter, schema)
    }

    fn collect_pages(adapter: &Adapter, schema: &ModelSchema, input: &QueryInput) -> Vec<Item> {
        let mut items = Vec::new();
        let mut input = input.clone();
        loop {
            let page = adapter.query(schema, &input).unwrap();
            if let Some(limit) = input.limit {
                assert!(page.count <= limit);
            }
            items.extend(page.items);
            match page.cursor {
                Some(token) => input.exclusive_start = Some(token),
                None => return items,
            }
        }
    }

    fn sks(items: &[Item]) -> Vec<AttributeValue> {
        items.iter().map(|i| i["sk"].clone()).collect()
    }

    #[test]
    fn test_should_concatenate_pages_for_any_limit() {
        let (adapter, schema) = seeded();
        let inputs = [
            QueryInput::builder().hash_key("c1").build(),
            QueryInput::builder().hash_key("c1").scan_forward(false).build(),
            QueryInput::builder()
                .hash_key("c1")
                .filter(Path::new("status").eq("odd"))
                .build(),
            QueryInput::builder().hash_key("eu").index_name("by_region").build(),
        ];
        for input in inputs {
            let all = adapter.query(&schema, &input).unwrap();
            assert!(all.is_last());
            for k in 1..=8 {
                let paged = collect_pages(
                    &adapter,
                    &schema,
                    &QueryInput {
                        limit: Some(k),
                        ..input.clone()
                    },
                );
                assert_eq!(paged, all.items, "limit {k} on {input:?}");
            }
        }
    }

    #[test]
    fn test_should_order_by_range_key() {
        let (adapter, schema) = seeded();
        let forward = adapter
            .query(&schema, &QueryInput::builder().hash_key("c1").build())
            .unwrap();
        assert_eq!(sks(&forward.items), (1..=7).map(AttributeValue::n).collect::<Vec<_>>());

        let backward = adapter
            .query(&schema, &QueryInput::builder().hash_key("c1").scan_forward(false).build())
            .unwrap();
        assert_eq!(sks(&backward.items), (1..=7).rev().map(AttributeValue::n).collect::<Vec<_>>());
    }

    #[test]
    fn test_should_include_both_between_bounds() {
        let (adapter, schema) = seeded();
        let input = QueryInput::builder()
            .hash_key("c1")
            .range_condition(Path::new("sk").between(AttributeValue::n(2), AttributeValue::n(4)))
            .build();
        let page = adapter.query(&schema, &input).unwrap();
        assert_eq!(sks(&page.items), vec![AttributeValue::n(2), AttributeValue::n(3), AttributeValue::n(4)]);

        let input = QueryInput::builder()
            .hash_key("c1")
            .filter(Path::new("total").between(AttributeValue::n(30), AttributeValue::n(50)))
            .build();
        let page = adapter.query(&schema, &input).unwrap();
        assert_eq!(sks(&page.items), vec![AttributeValue::n(3), AttributeValue::n(4), AttributeValue::n(5)]);
    }

    #[test]
    fn test_should_apply_range_comparisons() {
        let (adapter, schema) = seeded();
        let cases = [
            (Path::new("sk").lt(AttributeValue::n(3)), vec![1, 2]),
            (Path::new("sk").le(AttributeValue::n(3)), vec![1, 2, 3]),
            (Path::new("sk").gt(AttributeValue::n(5)), vec![6, 7]),
            (Path::new("sk").ge(AttributeValue::n(5)), vec![5, 6, 7]),
            (Path::new("sk").eq(AttributeValue::n(4)), vec![4]),
        ];
        for (condition, expected) in cases {
            let input = QueryInput::builder()
                .hash_key("c1")
                .range_condition(condition.clone())
                .build();
            let page = adapter.query(&schema, &input).unwrap();
            assert_eq!(
                sks(&page.items),
                expected.into_iter().map(AttributeValue::n).collect::<Vec<_>>(),
                "{condition}"
            );
        }
    }

    #[test]
    fn test_should_reject_range_conditions_on_other_attributes() {
        let (adapter, schema) = seeded();
        let input = QueryInput::builder()
            .hash_key("c1")
            .range_condition(Path::new("total").gt(AttributeValue::n(1)))
            .build();
        assert!(adapter.query(&schema, &input).is_err());

        let input = QueryInput::builder()
            .hash_key("c1")
            .range_condition(Path::new("sk").ne(AttributeValue::n(1)))
            .build();
        assert!(adapter.query(&schema, &input).is_err());
    }

    #[test]
    fn test_should_project_nested_paths_and_keep_keys() {
        let (adapter, schema) = seeded();
        adapter
            .put(
                &schema,
                &item(&[
                    ("pk", AttributeValue::from("c3")),
                    ("sk", AttributeValue::n(1)),
                    (
                        "address",
                        AttributeValue::M(
                            [
                                ("city".to_owned(), AttributeValue::from("Oslo")),
                                ("zip".to_owned(), AttributeValue::from("0150")),
                            ]
                            .into(),
                        ),
                    ),
                ]),
                None,
            )
            .unwrap();
        let input = QueryInput::builder()
            .hash_key("c3")
            .projection(vec!["address.city".to_owned()])
            .build();
        let page = adapter.query(&schema, &input).unwrap();
        assert_eq!(
            page.items[0],
            item(&[
                ("pk", AttributeValue::from("c3")),
                ("sk", AttributeValue::n(1)),
                (
                    "address",
                    AttributeValue::M([("city".to_owned(), AttributeValue::from("Oslo"))].into()),
                ),
            ])
        );
    }

    #[test]
    fn test_should_count_matches() {
        let (adapter, schema) = seeded();
        let input = QueryInput::builder()
            .hash_key("c1")
            .filter(Path::new("status").eq("even"))
            .limit(1)
            .build();
        assert_eq!(adapter.count(&schema, &input).unwrap(), 3);
    }
}
