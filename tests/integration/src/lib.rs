//! End-to-end tests for the dynamongo adapter.
//!
//! Every test runs the adapter against an in-process `MemoryStore`, so no
//! external service is needed:
//! ```text
//! cargo test -p dynamongo-integration
//! ```
//! Set `RUST_LOG=dynamongo_core=debug` to see translated predicates.

use std::sync::{Arc, Once};

use dynamongo_core::{Adapter, AdapterConfig, Connection};
use dynamongo_docstore::{DocumentStore, MemoryStore};
use dynamongo_model::{
    AttributeKind, AttributeSchema, AttributeValue, IndexSchema, Item, ModelSchema,
};

static INIT: Once = Once::new();

/// Initialize tracing (once).
fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// Generate a unique table name for a test.
#[must_use]
pub fn test_table_name(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().to_string()[..8].to_owned();
    format!("test-{prefix}-{id}")
}

/// An adapter over `store` with default settings.
#[must_use]
pub fn adapter_over(store: Arc<dyn DocumentStore>) -> Adapter {
    adapter_with(store, AdapterConfig::default())
}

/// An adapter over `store`.
#[must_use]
pub fn adapter_with(store: Arc<dyn DocumentStore>, config: AdapterConfig) -> Adapter {
    init_tracing();
    Adapter::new(Arc::new(Connection::in_memory(store)), config)
}

/// An adapter over a fresh memory store.
#[must_use]
pub fn memory_adapter() -> Adapter {
    adapter_over(Arc::new(MemoryStore::new()))
}

/// Orders keyed by customer (`pk`) and sequence (`sk`), with a composite
/// index on category/code and a decomposed one on region/priority.
#[must_use]
pub fn orders_schema(table: &str) -> ModelSchema {
    ModelSchema::new(table, AttributeSchema::new("pk", AttributeKind::String))
        .with_range_key(AttributeSchema::new("sk", AttributeKind::Number))
        .with_attribute(AttributeSchema::new("status", AttributeKind::String))
        .with_attribute(AttributeSchema::new("total", AttributeKind::Number))
        .with_attribute(AttributeSchema::new("tags", AttributeKind::StringSet))
        .with_attribute(AttributeSchema::new("counters", AttributeKind::List))
        .with_attribute(AttributeSchema::new("category", AttributeKind::String))
        .with_attribute(AttributeSchema::new("code", AttributeKind::String))
        .with_attribute(AttributeSchema::new("region", AttributeKind::String))
        .with_attribute(AttributeSchema::new("priority", AttributeKind::Number))
        .with_index(IndexSchema::global("by_category", "category", Some("code")))
        .with_index(IndexSchema::global("by_region", "region", Some("priority")))
        .allow_undeclared()
}

/// Builds an item from name/value pairs.
#[must_use]
pub fn item(pairs: &[(&str, AttributeValue)]) -> Item {
    pairs
        .iter()
        .map(|(name, value)| ((*name).to_owned(), value.clone()))
        .collect()
}

/// The primary key of an order.
#[must_use]
pub fn order_key(pk: &str, sk: i64) -> Item {
    item(&[("pk", AttributeValue::from(pk)), ("sk", AttributeValue::n(sk))])
}

/// An order with a status.
#[must_use]
pub fn order(pk: &str, sk: i64, status: &str) -> Item {
    let mut order = order_key(pk, sk);
    order.insert("status".to_owned(), AttributeValue::from(status));
    order
}

mod test_batch;
mod test_cursor;
mod test_expression;
mod test_index;
mod test_model;
mod test_query;
mod test_scan;
mod test_update;
