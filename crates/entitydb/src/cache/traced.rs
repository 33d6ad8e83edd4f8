//! Traced cache wrapper for observability

use std::fmt;

use super::provider::{Cache, CacheStats};

/// Wrapper that adds tracing to any [`Cache`]
///
/// Uses debug-level spans so keys stay out of production logs.
pub struct TracedCache<C> {
    inner: C,
    name: String,
}

impl<C: fmt::Debug> fmt::Debug for TracedCache<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracedCache")
            .field("inner", &self.inner)
            .field("name", &self.name)
            .finish()
    }
}

impl<C: Clone> Clone for TracedCache<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            name: self.name.clone(),
        }
    }
}

impl<C> TracedCache<C> {
    pub fn new(cache: C, name: impl Into<String>) -> Self {
        Self {
            inner: cache,
            name: name.into(),
        }
    }

    #[must_use]
    pub const fn inner(&self) -> &C {
        &self.inner
    }

    #[cfg(feature = "metrics")]
    fn publish_size<K, V>(&self)
    where
        C: Cache<K, V>,
    {
        crate::observability::set_cache_size(&self.name, self.inner.len() as u64);
    }
}

impl<K, V, C> Cache<K, V> for TracedCache<C>
where
    K: fmt::Debug,
    C: Cache<K, V>,
{
    fn get(&self, key: &K) -> Option<V> {
        let span = tracing::debug_span!("cache.get", cache.name = %self.name, cache.key = ?key);
        let _enter = span.enter();

        let value = self.inner.get(key);
        if value.is_some() {
            tracing::debug!(cache.result = "hit");
            #[cfg(feature = "metrics")]
            crate::observability::record_cache_hit(&self.name);
        } else {
            tracing::debug!(cache.result = "miss");
            #[cfg(feature = "metrics")]
            crate::observability::record_cache_miss(&self.name);
        }
        value
    }

    fn put(&self, key: K, value: V) {
        let span = tracing::debug_span!("cache.put", cache.name = %self.name, cache.key = ?key);
        let _enter = span.enter();

        self.inner.put(key, value);
        #[cfg(feature = "metrics")]
        self.publish_size::<K, V>();
    }

    fn invalidate(&self, key: &K) -> bool {
        let span =
            tracing::debug_span!("cache.invalidate", cache.name = %self.name, cache.key = ?key);
        let _enter = span.enter();

        let removed = self.inner.invalidate(key);
        tracing::debug!(cache.removed = removed);
        #[cfg(feature = "metrics")]
        self.publish_size::<K, V>();
        removed
    }

    fn clear(&self) {
        tracing::debug!(cache.name = %self.name, "Clearing cache");
        self.inner.clear();
        #[cfg(feature = "metrics")]
        self.publish_size::<K, V>();
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn stats(&self) -> CacheStats {
        self.inner.stats()
    }
}
