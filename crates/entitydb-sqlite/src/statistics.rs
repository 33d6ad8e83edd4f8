use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Statement counter shared by every connection of one manager.
///
/// Counts `execute` and `query` calls. Transaction control and liveness
/// pings are not counted.
#[derive(Debug, Clone, Default)]
pub struct ConnectionStatistics {
    calls: Arc<AtomicU64>,
}

impl ConnectionStatistics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.calls.store(0, Ordering::Relaxed);
    }
}
