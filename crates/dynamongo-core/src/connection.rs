//! Store connections.
//!
//! A [`Connection`] opens its [`DocumentStore`] on first use and keeps the
//! handle until [`Connection::close`]; the next use reopens it. Callers share
//! one connection between adapters by passing an `Arc<Connection>`.

use std::fmt;
use std::sync::{Arc, LazyLock};

use dashmap::DashMap;
use dynamongo_docstore::{DocumentStore, MemoryStore, StoreError};
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::config::AdapterConfig;
use crate::error::{AdapterError, AdapterResult};

type Opener = Box<dyn Fn() -> anyhow::Result<Arc<dyn DocumentStore>> + Send + Sync>;

/// Named in-memory stores behind `memory://<name>` URIs.
static MEMORY_STORES: LazyLock<DashMap<String, Arc<MemoryStore>>> = LazyLock::new(DashMap::new);

/// A lazily opened handle to a document store.
pub struct Connection {
    uri: String,
    opener: Opener,
    handle: RwLock<Option<Arc<dyn DocumentStore>>>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("uri", &self.uri)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// A connection that calls `opener` whenever it needs a handle.
    pub fn new<F>(uri: impl Into<String>, opener: F) -> Self
    where
        F: Fn() -> anyhow::Result<Arc<dyn DocumentStore>> + Send + Sync + 'static,
    {
        Self {
            uri: uri.into(),
            opener: Box::new(opener),
            handle: RwLock::new(None),
        }
    }

    /// A connection for `config.uri`. Only `memory://<name>` is understood;
    /// connections to the same name share one store.
    pub fn from_config(config: &AdapterConfig) -> AdapterResult<Self> {
        let Some(name) = config.uri.strip_prefix("memory://") else {
            return Err(AdapterError::validation(format!(
                "unsupported store URI '{}'",
                config.uri
            )));
        };
        let name = name.to_owned();
        Ok(Self::new(config.uri.clone(), move || {
            anyhow::ensure!(!name.is_empty(), "memory URI needs a store name");
            let entry = MEMORY_STORES
                .entry(name.clone())
                .or_insert_with(|| Arc::new(MemoryStore::new()));
            let store: Arc<dyn DocumentStore> = entry.value().clone();
            Ok(store)
        }))
    }

    /// A connection over an existing store.
    pub fn in_memory(store: Arc<dyn DocumentStore>) -> Self {
        Self::new("memory://", move || Ok(Arc::clone(&store)))
    }

    /// The store URI.
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// The store handle, opening it if needed.
    pub fn store(&self) -> AdapterResult<Arc<dyn DocumentStore>> {
        if let Some(store) = self.handle.read().as_ref() {
            return Ok(Arc::clone(store));
        }
        let mut handle = self.handle.write();
        if let Some(store) = handle.as_ref() {
            return Ok(Arc::clone(store));
        }
        let store = (self.opener)().map_err(|e| StoreError::Connection {
            message: format!("{e:#}"),
        })?;
        info!(uri = %self.uri, "opened store connection");
        *handle = Some(Arc::clone(&store));
        Ok(store)
    }

    /// Whether a handle is currently held.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.handle.read().is_some()
    }

    /// Releases the handle. The next use reopens it.
    pub fn close(&self) {
        if self.handle.write().take().is_some() {
            debug!(uri = %self.uri, "closed store connection");
        }
    }
}
