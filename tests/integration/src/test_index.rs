//! Secondary index queries over both storage layouts.

#[cfg(test)]
mod tests {
    use dynamongo_core::{Adapter, IndexLayout, indexes};
    use dynamongo_model::{AttributeValue, Item, ModelSchema, Path, QueryInput};

    use crate::{memory_adapter, order, orders_schema, test_table_name};

    fn seeded() -> (Adapter, ModelSchema) {
        let adapter = memory_adapter();
        let schema = orders_schema(&test_table_name("index"));
        adapter.create_table(&schema).unwrap();
        let rows = [
            (1, "C1", Some("B")),
            (2, "C1", Some("AB")),
            (3, "C1", Some("A")),
            (4, "C1", Some("C")),
            (5, "C10", Some("A")),
            (6, "C1#", Some("A")),
            (7, "C1", None),
        ];
        for (sk, category, code) in rows {
            let mut o = order("c1", sk, "open");
            o.insert("category".to_owned(), AttributeValue::from(category));
            if let Some(code) = code {
                o.insert("code".to_owned(), AttributeValue::from(code));
            }
            adapter.put(&schema, &o, None).unwrap();
        }
        (adapter, schema)
    }

    fn codes(items: &[Item]) -> Vec<String> {
        items
            .iter()
            .filter_map(|i| i.get("code").and_then(AttributeValue::as_s).map(str::to_owned))
            .collect()
    }

    #[test]
    fn test_should_use_composite_layout_for_string_keys() {
        let schema = orders_schema("layout");
        let by_category = schema.index("by_category").unwrap();
        let by_region = schema.index("by_region").unwrap();
        assert_eq!(
            indexes::layout(&schema, by_category),
            IndexLayout::Composite {
                field: "__idx_by_category".to_owned()
            }
        );
        assert_eq!(indexes::layout(&schema, by_region), IndexLayout::Decomposed);
        assert_eq!(indexes::composite_value("C1#", "A"), "C1\\##A");
    }

    #[test]
    fn test_should_match_prefix_within_one_hash_key() {
        let (adapter, schema) = seeded();
        let input = QueryInput::builder()
            .hash_key("C1")
            .index_name("by_category")
            .range_condition(Path::new("code").begins_with("A"))
            .build();
        let page = adapter.query(&schema, &input).unwrap();
        assert_eq!(codes(&page.items), vec!["A", "AB"]);
    }

    #[test]
    fn test_should_keep_hash_keys_apart() {
        let (adapter, schema) = seeded();
        let all = |hash: &str| {
            let input = QueryInput::builder()
                .hash_key(hash)
                .index_name("by_category")
                .build();
            codes(&adapter.query(&schema, &input).unwrap().items)
        };
        assert_eq!(all("C1"), vec!["A", "AB", "B", "C"]);
        assert_eq!(all("C10"), vec!["A"]);
        assert_eq!(all("C1#"), vec!["A"]);
    }

    #[test]
    fn test_should_apply_range_bounds_on_composite_field() {
        let (adapter, schema) = seeded();
        let run = |condition| {
            let input = QueryInput::builder()
                .hash_key("C1")
                .index_name("by_category")
                .range_condition(condition)
                .scan_forward(false)
                .build();
            codes(&adapter.query(&schema, &input).unwrap().items)
        };
        assert_eq!(run(Path::new("code").gt("AB")), vec!["C", "B"]);
        assert_eq!(run(Path::new("code").le("AB")), vec!["AB", "A"]);
        assert_eq!(run(Path::new("code").between("AB", "B")), vec!["B", "AB"]);
        assert_eq!(run(Path::new("code").eq("C")), vec!["C"]);
    }

    #[test]
    fn test_should_page_through_composite_index() {
        let (adapter, schema) = seeded();
        let mut input = QueryInput::builder()
            .hash_key("C1")
            .index_name("by_category")
            .limit(1)
            .build();
        let mut seen = Vec::new();
        loop {
            let page = adapter.query(&schema, &input).unwrap();
            seen.extend(codes(&page.items));
            match page.cursor {
                Some(token) => input.exclusive_start = Some(token),
                None => break,
            }
        }
        assert_eq!(seen, vec!["A", "AB", "B", "C"]);
    }

    #[test]
    fn test_should_reject_unknown_index_and_bad_hash_type() {
        let (adapter, schema) = seeded();
        let unknown = QueryInput::builder().hash_key("C1").index_name("nope").build();
        assert!(adapter.query(&schema, &unknown).is_err());
        let numeric = QueryInput::builder()
            .hash_key(AttributeValue::n(1))
            .index_name("by_category")
            .build();
        assert!(adapter.query(&schema, &numeric).is_err());
    }
}
