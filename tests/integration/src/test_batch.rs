//! Batch writes with per-item outcomes.

#[cfg(test)]
mod tests {
    use dynamongo_core::{AdapterError, MAX_BATCH_WRITE};
    use dynamongo_model::{
        AttributeValue, BatchFailureReason, BatchItemResult, ScanInput, WriteRequest,
    };

    use crate::{memory_adapter, order, order_key, orders_schema, test_table_name};

    #[test]
    fn test_should_apply_valid_items_around_a_malformed_one() {
        let adapter = memory_adapter();
        let schema = orders_schema(&test_table_name("batch"));
        adapter.create_table(&schema).unwrap();

        let mut malformed = order("c1", 3, "open");
        malformed.insert("total".to_owned(), AttributeValue::n("not-a-number"));
        let output = adapter
            .batch_writer(&schema)
            .put(order("c1", 1, "open"))
            .put(order("c1", 2, "open"))
            .put(malformed)
            .put(order("c1", 4, "open"))
            .put(order("c1", 5, "open"))
            .commit()
            .unwrap();

        assert_eq!(output.results.len(), 5);
        for i in [0, 1, 3, 4] {
            assert_eq!(output.results[i], BatchItemResult::Success, "item {}", i + 1);
        }
        assert!(matches!(
            &output.results[2],
            BatchItemResult::Failed {
                reason: BatchFailureReason::InvalidItem { .. }
            }
        ));
        for sk in [1, 2, 4, 5] {
            assert!(adapter.exists(&schema, &order_key("c1", sk)).unwrap());
        }
        assert!(!adapter.exists(&schema, &order_key("c1", 3)).unwrap());

        match output.into_result() {
            Err(AdapterError::PartialBatchFailure { results }) => assert_eq!(results.len(), 5),
            other => panic!("expected a partial failure, got {other:?}"),
        }
    }

    #[test]
    fn test_should_chunk_large_batches() {
        let adapter = memory_adapter();
        let schema = orders_schema(&test_table_name("chunks"));
        adapter.create_table(&schema).unwrap();

        let mut writer = adapter.batch_writer(&schema);
        let total = i64::try_from(MAX_BATCH_WRITE * 2 + 3).unwrap();
        for sk in 0..total {
            writer.push(WriteRequest::Put(order("c1", sk, "open")));
        }
        let output = writer.commit().unwrap();
        assert_eq!(output.succeeded(), MAX_BATCH_WRITE * 2 + 3);
        let page = adapter.scan(&schema, &ScanInput::builder().build()).unwrap();
        assert_eq!(page.count, MAX_BATCH_WRITE * 2 + 3);

        let mut writer = adapter.batch_writer(&schema);
        for sk in 0..total {
            writer.push(WriteRequest::Delete(order_key("c1", sk)));
        }
        assert!(writer.commit().unwrap().into_result().is_ok());
        assert_eq!(adapter.scan(&schema, &ScanInput::builder().build()).unwrap().count, 0);
    }

    #[test]
    fn test_should_reject_batches_for_unknown_tables() {
        let adapter = memory_adapter();
        let schema = orders_schema(&test_table_name("missing"));
        let result = adapter.batch_writer(&schema).put(order("c1", 1, "open")).commit();
        assert!(matches!(result, Err(AdapterError::TableNotFound { .. })));
    }
}
