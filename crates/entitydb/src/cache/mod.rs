//! Pluggable entity cache
//!
//! The mapper reads through and writes through a [`Cache`] keyed by primary
//! key. Entries are snapshots of entities; they are overwritten on update and
//! invalidated on delete or rollback.
//!
//! # Available Backends
//!
//! - [`NoopCache`] - No-op implementation (caching disabled)
//! - [`InMemoryCache`] - Thread-safe unbounded map behind a read-write lock
//!
//! Wrap any cache with [`TracedCache`] to add tracing spans and logging.

mod config;
mod memory;
mod noop;
mod provider;
mod traced;

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

pub use config::{CacheBackend, CacheConfig};
pub use memory::InMemoryCache;
pub use noop::NoopCache;
pub use provider::{Cache, CacheStats};
pub use traced::TracedCache;

/// Create a cache based on configuration
#[must_use]
pub fn create_cache<K, V>(config: &CacheConfig, name: &str) -> Arc<dyn Cache<K, V>>
where
    K: Eq + Hash + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    if !config.enabled {
        return Arc::new(NoopCache::new());
    }

    match config.backend {
        CacheBackend::Noop => Arc::new(NoopCache::new()),
        CacheBackend::Memory => Arc::new(TracedCache::new(InMemoryCache::new(), name)),
    }
}
