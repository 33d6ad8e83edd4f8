//! In-memory cache implementation

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use super::provider::{Cache, CacheStats};

#[derive(Debug, Default)]
struct InMemoryStats {
    hits: AtomicU64,
    misses: AtomicU64,
    puts: AtomicU64,
    invalidations: AtomicU64,
}

/// Thread-safe unbounded in-memory cache
///
/// Readers share the lock; `put`, `invalidate` and `clear` take it
/// exclusively. Clones share the same store.
pub struct InMemoryCache<K, V> {
    store: Arc<RwLock<HashMap<K, V>>>,
    stats: Arc<InMemoryStats>,
}

impl<K, V> Clone for InMemoryCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            stats: Arc::clone(&self.stats),
        }
    }
}

impl<K, V> fmt::Debug for InMemoryCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryCache")
            .field("entry_count", &self.store.read().len())
            .finish_non_exhaustive()
    }
}

impl<K, V> InMemoryCache<K, V> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(HashMap::new())),
            stats: Arc::default(),
        }
    }
}

impl<K, V> Default for InMemoryCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Cache<K, V> for InMemoryCache<K, V>
where
    K: Eq + Hash + Send + Sync,
    V: Clone + Send + Sync,
{
    fn get(&self, key: &K) -> Option<V> {
        let value = self.store.read().get(key).cloned();
        let counter = if value.is_some() {
            &self.stats.hits
        } else {
            &self.stats.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        value
    }

    fn put(&self, key: K, value: V) {
        self.store.write().insert(key, value);
        self.stats.puts.fetch_add(1, Ordering::Relaxed);
    }

    fn invalidate(&self, key: &K) -> bool {
        let removed = self.store.write().remove(key).is_some();
        if removed {
            self.stats.invalidations.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    fn clear(&self) {
        let mut store = self.store.write();
        let cleared = store.len() as u64;
        store.clear();
        drop(store);
        self.stats
            .invalidations
            .fetch_add(cleared, Ordering::Relaxed);
    }

    fn len(&self) -> usize {
        self.store.read().len()
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            puts: self.stats.puts.load(Ordering::Relaxed),
            invalidations: self.stats.invalidations.load(Ordering::Relaxed),
            entries: self.store.read().len(),
        }
    }
}
