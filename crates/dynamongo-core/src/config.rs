//! Adapter configuration.

use std::env;

use typed_builder::TypedBuilder;

/// Runtime settings for an [`Adapter`](crate::Adapter).
#[derive(Debug, Clone, PartialEq, Eq, TypedBuilder)]
pub struct AdapterConfig {
    /// Store URI used by [`Connection::from_config`](crate::Connection::from_config).
    #[builder(default = "memory://default".to_owned(), setter(into))]
    pub uri: String,
    /// Documents fetched per native round trip while scanning.
    #[builder(default = 100)]
    pub scan_batch_size: usize,
    /// Requests per native bulk write, capped at 25.
    #[builder(default = 25)]
    pub max_batch_write: usize,
    /// Reject paths naming undeclared attributes unless the schema allows
    /// them.
    #[builder(default = true)]
    pub strict_paths: bool,
}

impl AdapterConfig {
    /// Create configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            uri: env::var("DYNAMONGO_URI").unwrap_or(defaults.uri),
            scan_batch_size: env_usize("DYNAMONGO_SCAN_BATCH_SIZE", defaults.scan_batch_size),
            max_batch_write: env_usize("DYNAMONGO_MAX_BATCH_WRITE", defaults.max_batch_write),
            strict_paths: env_bool("DYNAMONGO_STRICT_PATHS", defaults.strict_paths),
        }
    }
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key).map_or(default, |v| {
        matches!(v.as_str(), "1" | "true" | "yes" | "TRUE" | "YES")
    })
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|n| *n > 0)
        .unwrap_or(default)
}
