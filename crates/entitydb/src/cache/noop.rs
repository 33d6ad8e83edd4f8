//! No-op cache implementation

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::provider::{Cache, CacheStats};

/// Cache that never stores anything
///
/// Used when caching is disabled.
#[derive(Debug, Clone, Default)]
pub struct NoopCache {
    misses: Arc<AtomicU64>,
}

impl NoopCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl<K, V> Cache<K, V> for NoopCache {
    fn get(&self, _key: &K) -> Option<V> {
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    fn put(&self, _key: K, _value: V) {}

    fn invalidate(&self, _key: &K) -> bool {
        false
    }

    fn clear(&self) {}

    fn len(&self) -> usize {
        0
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            misses: self.misses.load(Ordering::Relaxed),
            ..Default::default()
        }
    }
}
