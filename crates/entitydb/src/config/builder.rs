//! Configuration builder

use std::num::NonZeroUsize;
use std::time::Duration;

use url::Url;

use crate::Error;
use crate::cache::{CacheBackend, CacheConfig};
use crate::pool::{AcquirePolicy, PoolConfig};

/// Data source configuration
#[derive(Debug, Clone)]
pub struct DataSourceConfig {
    pub url: Url,
    pub username: Option<String>,
    pub password: Option<String>,
    pub pool: PoolConfig,
    pub cache: CacheConfig,
    pub telemetry: TelemetryConfig,
}

impl DataSourceConfig {
    #[must_use]
    pub const fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    #[must_use]
    pub const fn pool(&self) -> &PoolConfig {
        &self.pool
    }

    #[must_use]
    pub const fn cache(&self) -> &CacheConfig {
        &self.cache
    }

    /// The username, preferring the explicit setting over the URL's user info.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username
            .as_deref()
            .or_else(|| Some(self.url.username()).filter(|u| !u.is_empty()))
    }

    #[must_use]
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref().or_else(|| self.url.password())
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Default)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub json_logs: bool,
}

/// Configuration builder with fluent API
#[derive(Debug)]
pub struct ConfigBuilder {
    url: Option<Url>,
    username: Option<String>,
    password: Option<String>,
    pool: PoolConfig,
    cache: CacheConfig,
    telemetry: TelemetryConfig,
}

impl ConfigBuilder {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            url: None,
            username: None,
            password: None,
            pool: PoolConfig::new(),
            cache: CacheConfig::new(),
            telemetry: TelemetryConfig {
                log_level: String::new(),
                json_logs: false,
            },
        }
    }

    #[must_use]
    pub fn url(mut self, url: Url) -> Self {
        self.url = Some(url);
        self
    }

    #[must_use]
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set maximum pool size (default: 5)
    #[must_use]
    pub const fn pool_size(mut self, size: NonZeroUsize) -> Self {
        self.pool.max_size = size;
        self
    }

    /// Set connections opened when the pool is built (default: 0)
    #[must_use]
    pub const fn initial_size(mut self, size: usize) -> Self {
        self.pool.initial_size = size;
        self
    }

    #[must_use]
    pub const fn acquire_policy(mut self, policy: AcquirePolicy) -> Self {
        self.pool.policy = policy;
        self
    }

    #[must_use]
    pub const fn validate_on_acquire(mut self, validate: bool) -> Self {
        self.pool.validate_on_acquire = validate;
        self
    }

    #[must_use]
    pub const fn validation_timeout(mut self, timeout: Duration) -> Self {
        self.pool.validation_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn cache_enabled(mut self, enabled: bool) -> Self {
        self.cache.enabled = enabled;
        self
    }

    #[must_use]
    pub const fn cache_backend(mut self, backend: CacheBackend) -> Self {
        self.cache.backend = backend;
        self
    }

    #[must_use]
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.telemetry.log_level = level.into();
        self
    }

    #[must_use]
    pub const fn json_logs(mut self, enabled: bool) -> Self {
        self.telemetry.json_logs = enabled;
        self
    }

    /// Build the configuration
    pub fn build(self) -> crate::Result<DataSourceConfig> {
        let url = self
            .url
            .ok_or_else(|| Error::Config("url is required".into()))?;

        if self.pool.initial_size > self.pool.max_size.get() {
            return Err(Error::Config(format!(
                "initial_size {} exceeds pool size {}",
                self.pool.initial_size, self.pool.max_size
            )));
        }

        let log_level = if self.telemetry.log_level.is_empty() {
            "info".to_string()
        } else {
            self.telemetry.log_level
        };

        Ok(DataSourceConfig {
            url,
            username: self.username,
            password: self.password,
            pool: self.pool,
            cache: self.cache,
            telemetry: TelemetryConfig {
                log_level,
                json_logs: self.telemetry.json_logs,
            },
        })
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite_url() -> Url {
        Url::parse("sqlite:///tmp/entitydb.db").unwrap()
    }

    #[test]
    fn test_builder_defaults() {
        let builder = ConfigBuilder::new();
        assert!(builder.url.is_none());
        assert_eq!(builder.pool, PoolConfig::new());
        assert!(!builder.cache.enabled);
        assert!(!builder.telemetry.json_logs);
    }

    #[test]
    fn test_build_requires_url() {
        let err = ConfigBuilder::new().build().unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("url is required"));
    }

    #[test]
    fn test_build_applies_log_level_default() {
        let config = ConfigBuilder::new().url(sqlite_url()).build().unwrap();
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.pool.max_size.get(), 5);
    }

    #[test]
    fn test_build_with_all_settings() {
        let config = DataSourceConfig::builder()
            .url(sqlite_url())
            .username("sa")
            .password("secret")
            .pool_size(NonZeroUsize::new(8).unwrap())
            .initial_size(2)
            .acquire_policy(AcquirePolicy::FailFast)
            .validate_on_acquire(false)
            .validation_timeout(Duration::from_millis(500))
            .cache_enabled(true)
            .cache_backend(CacheBackend::Memory)
            .log_level("debug")
            .json_logs(true)
            .build()
            .unwrap();

        assert_eq!(config.username(), Some("sa"));
        assert_eq!(config.password(), Some("secret"));
        assert_eq!(config.pool().max_size.get(), 8);
        assert_eq!(config.pool().initial_size, 2);
        assert_eq!(config.pool().policy, AcquirePolicy::FailFast);
        assert!(!config.pool().validate_on_acquire);
        assert_eq!(config.pool().validation_timeout, Duration::from_millis(500));
        assert_eq!(*config.cache(), CacheConfig::memory());
        assert_eq!(config.telemetry.log_level, "debug");
        assert!(config.telemetry.json_logs);
    }

    #[test]
    fn test_build_rejects_initial_size_above_pool_size() {
        let err = ConfigBuilder::new()
            .url(sqlite_url())
            .pool_size(NonZeroUsize::new(2).unwrap())
            .initial_size(3)
            .build()
            .unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_credentials_fall_back_to_url() {
        let config = ConfigBuilder::new()
            .url(Url::parse("postgres://app:pw@localhost/db").unwrap())
            .build()
            .unwrap();
        assert_eq!(config.username(), Some("app"));
        assert_eq!(config.password(), Some("pw"));

        let bare = ConfigBuilder::new().url(sqlite_url()).build().unwrap();
        assert_eq!(bare.username(), None);
        assert_eq!(bare.password(), None);
    }
}
