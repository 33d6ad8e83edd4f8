//! Metrics for entitydb, emitted through the `metrics` facade.
//!
//! The application installs the recorder (Prometheus, statsd, ...). Until one
//! is installed every call here is a no-op.

use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

use crate::pool::PoolStatus;

// Cache metrics
const METRIC_CACHE_HITS: &str = "entitydb_cache_hits_total";
const METRIC_CACHE_MISSES: &str = "entitydb_cache_misses_total";
const METRIC_CACHE_SIZE: &str = "entitydb_cache_size";

// Connection pool metrics
const METRIC_POOL_SIZE: &str = "entitydb_pool_connections";
const METRIC_POOL_WAIT_TIME: &str = "entitydb_pool_wait_seconds";
const METRIC_POOL_ERRORS: &str = "entitydb_pool_errors_total";

/// Register metric descriptions with the installed recorder.
pub fn register_metrics() {
    describe_counter!(METRIC_CACHE_HITS, "Total cache hits");
    describe_counter!(METRIC_CACHE_MISSES, "Total cache misses");
    describe_gauge!(METRIC_CACHE_SIZE, "Current cache size (entries)");

    describe_gauge!(METRIC_POOL_SIZE, "Connection pool size by state");
    describe_histogram!(
        METRIC_POOL_WAIT_TIME,
        "Time waiting for a connection from pool"
    );
    describe_counter!(METRIC_POOL_ERRORS, "Total pool connection errors");
}

/// Record a cache hit.
pub fn record_cache_hit(cache: &str) {
    counter!(METRIC_CACHE_HITS, "cache" => cache.to_owned()).increment(1);
}

/// Record a cache miss.
pub fn record_cache_miss(cache: &str) {
    counter!(METRIC_CACHE_MISSES, "cache" => cache.to_owned()).increment(1);
}

/// Update cache size gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_cache_size(cache: &str, size: u64) {
    gauge!(METRIC_CACHE_SIZE, "cache" => cache.to_owned()).set(size as f64);
}

/// Update pool size gauges.
#[allow(clippy::cast_precision_loss)]
pub fn set_pool_stats(status: &PoolStatus) {
    gauge!(METRIC_POOL_SIZE, "state" => "max").set(status.max_size as f64);
    gauge!(METRIC_POOL_SIZE, "state" => "open").set(status.size as f64);
    gauge!(METRIC_POOL_SIZE, "state" => "available").set(status.available as f64);
    gauge!(METRIC_POOL_SIZE, "state" => "in_use").set(status.in_use as f64);
    gauge!(METRIC_POOL_SIZE, "state" => "waiting").set(status.waiting as f64);
}

/// Record time spent waiting for a connection.
pub fn record_pool_wait_time(duration: Duration) {
    histogram!(METRIC_POOL_WAIT_TIME).record(duration.as_secs_f64());
}

/// Record a pool checkout error.
pub fn record_pool_error(error_type: &str) {
    counter!(METRIC_POOL_ERRORS, "type" => error_type.to_owned()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        register_metrics();
        record_cache_hit("customer");
        record_cache_miss("customer");
        set_cache_size("customer", 3);
        record_pool_wait_time(Duration::from_millis(2));
        record_pool_error("exhausted");
        set_pool_stats(&PoolStatus {
            size: 2,
            available: 1,
            in_use: 1,
            waiting: 0,
            max_size: 5,
        });
    }
}
