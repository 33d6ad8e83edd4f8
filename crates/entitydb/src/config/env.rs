//! Environment variable loading for configuration

use std::env;
use std::num::NonZeroUsize;
use std::time::Duration;

use url::Url;

use super::builder::ConfigBuilder;
use crate::Result;
use crate::cache::CacheBackend;
use crate::pool::AcquirePolicy;

/// Environment variable names
mod vars {
    pub const URL: &str = "ENTITYDB_URL";
    pub const USERNAME: &str = "ENTITYDB_USERNAME";
    pub const PASSWORD: &str = "ENTITYDB_PASSWORD";
    pub const POOL_SIZE: &str = "ENTITYDB_POOL_SIZE";
    pub const POOL_INITIAL_SIZE: &str = "ENTITYDB_POOL_INITIAL_SIZE";
    pub const POOL_POLICY: &str = "ENTITYDB_POOL_POLICY";
    pub const VALIDATE_ON_ACQUIRE: &str = "ENTITYDB_VALIDATE_ON_ACQUIRE";
    pub const VALIDATION_TIMEOUT_SECS: &str = "ENTITYDB_VALIDATION_TIMEOUT_SECS";
    pub const CACHE_ENABLED: &str = "ENTITYDB_CACHE_ENABLED";
    pub const CACHE_BACKEND: &str = "ENTITYDB_CACHE_BACKEND";
    pub const RUST_LOG: &str = "RUST_LOG";
    pub const JSON_LOGS: &str = "ENTITYDB_JSON_LOGS";
}

/// Load configuration from environment variables
pub fn load_from_env(mut builder: ConfigBuilder) -> Result<ConfigBuilder> {
    if let Ok(url_str) = env::var(vars::URL) {
        let url = Url::parse(&url_str)
            .map_err(|e| crate::Error::Config(format!("Invalid {}: {}", vars::URL, e)))?;
        builder = builder.url(url);
    }

    if let Ok(user) = env::var(vars::USERNAME) {
        builder = builder.username(user);
    }
    if let Ok(password) = env::var(vars::PASSWORD) {
        builder = builder.password(password);
    }

    // Pool
    if let Ok(size_str) = env::var(vars::POOL_SIZE)
        && let Ok(size) = size_str.parse::<usize>()
        && let Some(nz) = NonZeroUsize::new(size)
    {
        builder = builder.pool_size(nz);
    }

    if let Ok(size_str) = env::var(vars::POOL_INITIAL_SIZE)
        && let Ok(size) = size_str.parse::<usize>()
    {
        builder = builder.initial_size(size);
    }

    if let Ok(policy) = env::var(vars::POOL_POLICY) {
        let policy: AcquirePolicy = policy.parse().unwrap_or_default();
        builder = builder.acquire_policy(policy);
    }

    if let Ok(val) = env::var(vars::VALIDATE_ON_ACQUIRE) {
        builder = builder.validate_on_acquire(parse_bool(&val));
    }

    if let Ok(timeout_str) = env::var(vars::VALIDATION_TIMEOUT_SECS)
        && let Ok(secs) = timeout_str.parse::<u64>()
    {
        builder = builder.validation_timeout(Duration::from_secs(secs));
    }

    // Cache
    if let Ok(val) = env::var(vars::CACHE_ENABLED) {
        builder = builder.cache_enabled(parse_bool(&val));
    }

    if let Ok(backend) = env::var(vars::CACHE_BACKEND) {
        let backend: CacheBackend = backend.parse().unwrap_or_default();
        builder = builder.cache_backend(backend);
    }

    // Telemetry
    if let Ok(level) = env::var(vars::RUST_LOG) {
        builder = builder.log_level(level);
    }

    if let Ok(val) = env::var(vars::JSON_LOGS) {
        builder = builder.json_logs(parse_bool(&val));
    }

    Ok(builder)
}

fn parse_bool(s: &str) -> bool {
    matches!(s.to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}
