//! TOML configuration file loading

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use super::builder::ConfigBuilder;
use crate::Result;
use crate::cache::CacheBackend;
use crate::pool::AcquirePolicy;

/// Configuration file locations checked in order
const CONFIG_PATHS: &[&str] = &[
    "./entitydb.toml",
    "~/.config/entitydb/config.toml",
    "/etc/entitydb/config.toml",
];

/// Find the first existing configuration file
pub fn find_config_file() -> Option<PathBuf> {
    for path_str in CONFIG_PATHS {
        let path = if path_str.starts_with('~') {
            if let Ok(home) = std::env::var("HOME") {
                PathBuf::from(path_str.replacen('~', &home, 1))
            } else {
                continue;
            }
        } else {
            PathBuf::from(path_str)
        };

        if path.exists() {
            return Some(path);
        }
    }
    None
}

/// Load configuration from a TOML file
pub fn load_from_file(path: &Path, builder: ConfigBuilder) -> Result<ConfigBuilder> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        crate::Error::Config(format!(
            "Failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;

    let file_config: FileConfig = toml::from_str(&content).map_err(|e| {
        crate::Error::Config(format!(
            "Failed to parse config file {}: {}",
            path.display(),
            e
        ))
    })?;

    apply_file_config(builder, file_config)
}

fn apply_file_config(mut builder: ConfigBuilder, config: FileConfig) -> Result<ConfigBuilder> {
    if let Some(ds) = config.datasource {
        if let Some(url_str) = ds.url {
            let url = Url::parse(&url_str)
                .map_err(|e| crate::Error::Config(format!("Invalid datasource URL: {e}")))?;
            builder = builder.url(url);
        }

        if let Some(user) = ds.username {
            builder = builder.username(user);
        }

        if let Some(password) = ds.password {
            builder = builder.password(password);
        }
    }

    if let Some(pool) = config.pool {
        if let Some(size) = pool.max_size
            && let Some(nz) = NonZeroUsize::new(size)
        {
            builder = builder.pool_size(nz);
        }

        if let Some(size) = pool.initial_size {
            builder = builder.initial_size(size);
        }

        if let Some(policy) = pool.policy {
            let policy: AcquirePolicy = policy.parse().unwrap_or_default();
            builder = builder.acquire_policy(policy);
        }

        if let Some(validate) = pool.validate_on_acquire {
            builder = builder.validate_on_acquire(validate);
        }

        if let Some(secs) = pool.validation_timeout_secs {
            builder = builder.validation_timeout(Duration::from_secs(secs));
        }
    }

    if let Some(cache) = config.cache {
        if let Some(enabled) = cache.enabled {
            builder = builder.cache_enabled(enabled);
        }

        if let Some(backend) = cache.backend {
            let backend: CacheBackend = backend.parse().unwrap_or_default();
            builder = builder.cache_backend(backend);
        }
    }

    if let Some(obs) = config.observability {
        if let Some(level) = obs.log_level {
            builder = builder.log_level(level);
        }

        if let Some(json) = obs.json_logs {
            builder = builder.json_logs(json);
        }
    }

    Ok(builder)
}

/// Root configuration file structure
#[derive(Debug, Deserialize, Default)]
struct FileConfig {
    datasource: Option<DataSourceSection>,
    pool: Option<PoolSection>,
    cache: Option<CacheSection>,
    observability: Option<ObservabilitySection>,
}

#[derive(Debug, Deserialize)]
struct DataSourceSection {
    url: Option<String>,
    username: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PoolSection {
    max_size: Option<usize>,
    initial_size: Option<usize>,
    policy: Option<String>,
    validate_on_acquire: Option<bool>,
    validation_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct CacheSection {
    enabled: Option<bool>,
    backend: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObservabilitySection {
    log_level: Option<String>,
    json_logs: Option<bool>,
}
