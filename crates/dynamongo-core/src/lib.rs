//! DynamoDB-semantics adapter over a document store.
//!
//! [`Adapter`] executes key-value operations (conditional puts and deletes,
//! update expressions, key-condition queries, filtered scans, batch writes)
//! against any [`DocumentStore`](dynamongo_docstore::DocumentStore). Item
//! values are translated by [`codec`], caller paths by [`path`], conditions
//! by [`condition`] and update actions by [`update`]. Anything without a
//! faithful native form is either evaluated client-side by [`evaluator`] or
//! rejected with a typed error.
//!
//! ```
//! use std::sync::Arc;
//!
//! use dynamongo_core::{Adapter, AdapterConfig, Connection};
//! use dynamongo_model::{AttributeKind, AttributeSchema, AttributeValue, Item, ModelSchema, Path};
//!
//! let config = AdapterConfig::builder().uri("memory://doc-example").build();
//! let adapter = Adapter::new(Arc::new(Connection::from_config(&config)?), config);
//! let users = ModelSchema::new("users", AttributeSchema::new("id", AttributeKind::String))
//!     .allow_undeclared();
//! adapter.create_table(&users)?;
//!
//! let item = Item::from([
//!     ("id".to_owned(), AttributeValue::from("u1")),
//!     ("visits".to_owned(), AttributeValue::n(1)),
//! ]);
//! adapter.put(&users, &item, Some(&Path::new("id").does_not_exist()))?;
//! let key = Item::from([("id".to_owned(), AttributeValue::from("u1"))]);
//! assert_eq!(adapter.get(&users, &key)?["visits"], AttributeValue::n(1));
//! # Ok::<(), dynamongo_core::AdapterError>(())
//! ```
// "DynamoDB" appears in many doc comments in this crate.
#![allow(clippy::doc_markdown)]
#![allow(clippy::module_name_repetitions)]

pub mod batch;
pub mod codec;
pub mod condition;
pub mod config;
pub mod connection;
pub mod cursor;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod expression;
pub mod indexes;
pub mod iterator;
pub mod model;
pub mod path;
pub mod update;

pub use batch::{BatchWriteOutput, BatchWriter, MAX_BATCH_WRITE};
pub use condition::ConditionTranslator;
pub use config::AdapterConfig;
pub use connection::Connection;
pub use cursor::{Cursor, CursorScope};
pub use error::{AdapterError, AdapterResult};
pub use evaluator::EvalContext;
pub use executor::{Adapter, MAX_BATCH_GET};
pub use indexes::{IndexLayout, IndexManager};
pub use iterator::{ItemIterator, ResultIterator};
pub use model::Model;
pub use path::{PathResolver, StoragePath};
pub use update::{UpdatePlan, UpdateTranslator};
