//! Document store engine for dynamongo.
//!
//! This crate defines the native side of the adapter: the [`NativeValue`]
//! document model, MongoDB-style filter and update documents, index models,
//! and the synchronous [`DocumentStore`] trait the adapter talks to. It also
//! ships [`MemoryStore`], an in-process engine used as the default backend
//! and as the reference target for the adapter's tests.

pub mod error;
pub mod filter;
pub mod index;
pub mod memory;
pub mod store;
pub mod update;
pub mod value;

pub use error::{StoreError, StoreResult};
pub use filter::Filter;
pub use index::{IndexModel, SortDirection};
pub use memory::MemoryStore;
pub use store::{DocumentStore, FindOptions, ReadPreference, UpdateResult, WriteModel};
pub use value::{DisplayDocument, Document, NativeValue, ObjectId};
