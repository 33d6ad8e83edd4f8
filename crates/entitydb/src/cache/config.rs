//! Cache configuration types

use std::str::FromStr;

/// Cache backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheBackend {
    #[default]
    Noop,
    Memory,
}

impl FromStr for CacheBackend {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "memory" | "mem" => Self::Memory,
            _ => Self::Noop,
        })
    }
}

/// Cache configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheConfig {
    /// Whether caching is enabled
    pub enabled: bool,
    /// Cache backend type
    pub backend: CacheBackend,
}

impl CacheConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            enabled: false,
            backend: CacheBackend::Noop,
        }
    }

    /// An enabled in-memory cache.
    #[must_use]
    pub const fn memory() -> Self {
        Self {
            enabled: true,
            backend: CacheBackend::Memory,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_backend_from_str_memory() {
        assert_eq!(
            "memory".parse::<CacheBackend>().unwrap(),
            CacheBackend::Memory
        );
        assert_eq!(
            "MEMORY".parse::<CacheBackend>().unwrap(),
            CacheBackend::Memory
        );
        assert_eq!("mem".parse::<CacheBackend>().unwrap(), CacheBackend::Memory);
    }

    #[test]
    fn test_cache_backend_from_str_unknown_is_noop() {
        assert_eq!("noop".parse::<CacheBackend>().unwrap(), CacheBackend::Noop);
        assert_eq!("redis".parse::<CacheBackend>().unwrap(), CacheBackend::Noop);
    }

    #[test]
    fn test_cache_config_defaults() {
        let config = CacheConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.backend, CacheBackend::Noop);
        assert_eq!(CacheConfig::new(), config);

        let memory = CacheConfig::memory();
        assert!(memory.enabled);
        assert_eq!(memory.backend, CacheBackend::Memory);
    }
}
