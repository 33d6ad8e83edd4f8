//! Pool configuration types

use std::num::NonZeroUsize;
use std::str::FromStr;
use std::time::Duration;

/// What `acquire` does when every slot is checked out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcquirePolicy {
    /// Wait until a connection is released or the pool is closed.
    #[default]
    Blocking,
    /// Fail immediately with `PoolExhausted`.
    FailFast,
}

impl FromStr for AcquirePolicy {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "fail-fast" | "fail_fast" | "failfast" | "fail" => Self::FailFast,
            _ => Self::Blocking,
        })
    }
}

/// Pool configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum number of live connections, idle plus checked out
    pub max_size: NonZeroUsize,
    /// Connections opened eagerly when the pool is built
    pub initial_size: usize,
    /// Behaviour of `acquire` on a saturated pool
    pub policy: AcquirePolicy,
    /// Ping idle connections before handing them out
    pub validate_on_acquire: bool,
    /// Upper bound for a single liveness check
    pub validation_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl PoolConfig {
    pub const DEFAULT_MAX_SIZE: NonZeroUsize = NonZeroUsize::MIN.saturating_add(4); // 5
    pub const DEFAULT_VALIDATION_TIMEOUT: Duration = Duration::from_secs(2);

    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_size: Self::DEFAULT_MAX_SIZE,
            initial_size: 0,
            policy: AcquirePolicy::Blocking,
            validate_on_acquire: true,
            validation_timeout: Self::DEFAULT_VALIDATION_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn with_max_size(mut self, max_size: NonZeroUsize) -> Self {
        self.max_size = max_size;
        self
    }

    #[must_use]
    pub const fn with_initial_size(mut self, initial_size: usize) -> Self {
        self.initial_size = initial_size;
        self
    }

    #[must_use]
    pub const fn with_policy(mut self, policy: AcquirePolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub const fn with_validate_on_acquire(mut self, validate: bool) -> Self {
        self.validate_on_acquire = validate;
        self
    }

    #[must_use]
    pub const fn with_validation_timeout(mut self, timeout: Duration) -> Self {
        self.validation_timeout = timeout;
        self
    }

    /// Number of connections to open up front, clamped to capacity.
    #[must_use]
    pub const fn eager_connections(&self) -> usize {
        if self.initial_size > self.max_size.get() {
            self.max_size.get()
        } else {
            self.initial_size
        }
    }
}
