//! Cache trait definition

use std::fmt;

/// Cache statistics for metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub puts: u64,
    pub invalidations: u64,
    pub entries: usize,
}

impl CacheStats {
    /// Fraction of lookups served from the cache, 0.0 when nothing was looked up.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_ratio(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

/// Key-value cache shared between threads.
///
/// Entries live until they are invalidated, overwritten or cleared. The
/// last `put` for a key wins.
pub trait Cache<K, V>: Send + Sync + fmt::Debug {
    fn get(&self, key: &K) -> Option<V>;

    fn put(&self, key: K, value: V);

    /// Removes an entry, reporting whether one was present.
    fn invalidate(&self, key: &K) -> bool;

    fn clear(&self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn stats(&self) -> CacheStats;
}
