//! Cursor validation across pages.

#[cfg(test)]
mod tests {
    use dynamongo_core::AdapterError;
    use dynamongo_model::{QueryInput, ScanInput};

    use crate::{memory_adapter, order, order_key, orders_schema, test_table_name};

    fn is_invalid_cursor<T: std::fmt::Debug>(result: Result<T, AdapterError>) -> bool {
        matches!(result, Err(AdapterError::InvalidCursor { .. }))
    }

    #[test]
    fn test_should_reject_cursor_to_deleted_item() {
        let adapter = memory_adapter();
        let schema = orders_schema(&test_table_name("stale"));
        adapter.create_table(&schema).unwrap();
        for sk in 1..=4 {
            adapter.put(&schema, &order("c1", sk, "open"), None).unwrap();
        }
        let input = QueryInput::builder().hash_key("c1").limit(2).build();
        let first = adapter.query(&schema, &input).unwrap();
        let token = first.cursor.clone().unwrap();

        adapter.delete(&schema, &order_key("c1", 2), None).unwrap();
        let resumed = adapter.query(
            &schema,
            &QueryInput {
                exclusive_start: Some(token.clone()),
                ..input
            },
        );
        assert!(is_invalid_cursor(resumed));

        let scan = ScanInput::builder().exclusive_start(token).build();
        assert!(adapter.scan(&schema, &scan).is_err());
    }

    #[test]
    fn test_should_reject_foreign_cursors() {
        let adapter = memory_adapter();
        let orders = orders_schema(&test_table_name("orders"));
        let archive = orders_schema(&test_table_name("archive"));
        for schema in [&orders, &archive] {
            adapter.create_table(schema).unwrap();
            for sk in 1..=3 {
                adapter.put(schema, &order("c1", sk, "open"), None).unwrap();
            }
        }
        let input = QueryInput::builder().hash_key("c1").limit(1).build();
        let token = adapter.query(&orders, &input).unwrap().cursor.unwrap();

        let other_table = QueryInput {
            exclusive_start: Some(token.clone()),
            ..input.clone()
        };
        assert!(is_invalid_cursor(adapter.query(&archive, &other_table)));

        let backwards = QueryInput {
            exclusive_start: Some(token.clone()),
            scan_forward: false,
            ..input.clone()
        };
        assert!(is_invalid_cursor(adapter.query(&orders, &backwards)));

        let other_index = QueryInput {
            exclusive_start: Some(token),
            index_name: Some("by_region".to_owned()),
            ..input
        };
        assert!(is_invalid_cursor(adapter.query(&orders, &other_index)));
    }

    #[test]
    fn test_should_reject_corrupt_cursors() {
        let adapter = memory_adapter();
        let schema = orders_schema(&test_table_name("corrupt"));
        adapter.create_table(&schema).unwrap();
        adapter.put(&schema, &order("c1", 1, "open"), None).unwrap();

        for token in ["%%%", "e30", "eyJ2Ijo5fQ", ""] {
            let input = QueryInput::builder()
                .hash_key("c1")
                .exclusive_start(token)
                .build();
            assert!(is_invalid_cursor(adapter.query(&schema, &input)), "token {token:?}");
            let scan = ScanInput::builder().exclusive_start(token).build();
            assert!(is_invalid_cursor(adapter.scan(&schema, &scan)), "token {token:?}");
        }
    }
}
