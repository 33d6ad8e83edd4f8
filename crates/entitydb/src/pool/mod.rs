//! Bounded pool of reusable connections.
//!
//! One mutex guards all bookkeeping; waiters park on a condition variable
//! that is signalled once per returned connection or freed slot. Opening
//! and validating connections happens outside the lock against a slot
//! reserved up front, so `size` never exceeds `max_size`.
//!
//! Connections are handed out as [`PooledConnection`] guards and go back to
//! their pool when the guard is dropped.

mod config;
mod validator;

use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

pub use config::{AcquirePolicy, PoolConfig};
pub use validator::{AlwaysValid, ConnectionValidator, PingValidator};

use crate::connection::{Connection, ConnectionManager};
use crate::error::{Error, Result};

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Live connections, idle plus checked out
    pub size: usize,
    /// Idle connections ready to be handed out
    pub available: usize,
    /// Connections currently checked out
    pub in_use: usize,
    /// Threads blocked in `acquire`
    pub waiting: usize,
    pub max_size: usize,
}

impl fmt::Display for PoolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PoolStatus(size={}, available={}, in_use={}, waiting={}, max_size={})",
            self.size, self.available, self.in_use, self.waiting, self.max_size
        )
    }
}

#[derive(Default)]
struct PoolState {
    idle: VecDeque<Box<dyn Connection>>,
    /// Slots taken by idle, checked-out and in-flight connections.
    size: usize,
    waiting: usize,
    closed: bool,
}

impl PoolState {
    fn status(&self, max_size: usize) -> PoolStatus {
        PoolStatus {
            size: self.size,
            available: self.idle.len(),
            in_use: self.size - self.idle.len(),
            waiting: self.waiting,
            max_size,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Wait {
    Never,
    Forever,
    Until { deadline: Instant, timeout: Duration },
}

enum Checkout {
    Idle(Box<dyn Connection>),
    Open,
}

struct PoolInner {
    manager: Box<dyn ConnectionManager>,
    validator: Box<dyn ConnectionValidator>,
    config: PoolConfig,
    state: Mutex<PoolState>,
    available: Condvar,
}

impl PoolInner {
    const fn max_size(&self) -> usize {
        self.config.max_size.get()
    }

    fn record_stats(&self, state: &PoolState) {
        #[cfg(feature = "metrics")]
        crate::observability::set_pool_stats(&state.status(self.max_size()));
        #[cfg(not(feature = "metrics"))]
        let _ = state;
    }

    fn checkout(&self, wait: Wait) -> Result<Checkout> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(Error::PoolClosed);
            }
            if let Some(conn) = state.idle.pop_front() {
                self.record_stats(&state);
                return Ok(Checkout::Idle(conn));
            }
            if state.size < self.max_size() {
                state.size += 1;
                self.record_stats(&state);
                return Ok(Checkout::Open);
            }

            match wait {
                Wait::Never => return Err(Error::PoolExhausted),
                Wait::Forever => {
                    state.waiting += 1;
                    self.available.wait(&mut state);
                    state.waiting -= 1;
                }
                Wait::Until { deadline, timeout } => {
                    if Instant::now() >= deadline {
                        return Err(Error::PoolTimeout(timeout));
                    }
                    state.waiting += 1;
                    let _ = self.available.wait_until(&mut state, deadline);
                    state.waiting -= 1;
                }
            }
        }
    }

    /// Opens a connection into a slot that was already reserved.
    fn open(&self) -> Result<Box<dyn Connection>> {
        self.manager.create().inspect_err(|e| {
            tracing::warn!(error = %e, "Failed to open pooled connection");
            #[cfg(feature = "metrics")]
            crate::observability::record_pool_error("create");
            self.free_slot();
        })
    }

    /// Checks an idle connection, replacing it in place when it is unusable.
    fn revalidate(&self, mut conn: Box<dyn Connection>) -> Result<Box<dyn Connection>> {
        let healthy = if self.config.validate_on_acquire {
            self.validator
                .is_valid(conn.as_mut(), self.config.validation_timeout)
        } else {
            !conn.is_closed()
        };

        if healthy {
            return Ok(conn);
        }

        tracing::info!("Replacing invalid pooled connection");
        close_quietly(conn.as_mut());
        self.open()
    }

    fn free_slot(&self) {
        let mut state = self.state.lock();
        state.size -= 1;
        self.record_stats(&state);
        self.available.notify_one();
    }

    fn recycle(&self, mut conn: Box<dyn Connection>, discard: bool) {
        let reusable = !discard && !conn.is_closed() && conn.auto_commit();

        let mut state = self.state.lock();
        if state.closed {
            state.size -= 1;
            drop(state);
            tracing::info!("Connection released after pool close; discarding");
            close_quietly(conn.as_mut());
            return;
        }

        if reusable {
            state.idle.push_back(conn);
            self.record_stats(&state);
            self.available.notify_one();
            return;
        }

        state.size -= 1;
        self.record_stats(&state);
        self.available.notify_one();
        drop(state);

        tracing::debug!(
            discard,
            closed = conn.is_closed(),
            "Dropping unusable connection; slot freed"
        );
        close_quietly(conn.as_mut());
    }
}

fn close_quietly(conn: &mut dyn Connection) {
    if conn.is_closed() {
        return;
    }
    if let Err(e) = conn.close() {
        tracing::warn!(error = %e, "Failed to close connection");
    }
}

/// A bounded, thread-safe pool of database connections.
///
/// Cloning is cheap; clones share the same pool.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("manager", &self.inner.manager)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl ConnectionPool {
    /// Creates a pool with default configuration.
    pub fn new(manager: impl ConnectionManager + 'static) -> Result<Self> {
        Self::from_config(manager, &PoolConfig::default())
    }

    /// Creates a pool that validates idle connections with [`PingValidator`].
    ///
    /// `initial_size` connections are opened before this returns.
    pub fn from_config(
        manager: impl ConnectionManager + 'static,
        config: &PoolConfig,
    ) -> Result<Self> {
        Self::with_validator(manager, config, PingValidator)
    }

    pub fn with_validator(
        manager: impl ConnectionManager + 'static,
        config: &PoolConfig,
        validator: impl ConnectionValidator + 'static,
    ) -> Result<Self> {
        let mut state = PoolState::default();
        for _ in 0..config.eager_connections() {
            state.idle.push_back(manager.create()?);
            state.size += 1;
        }

        tracing::info!(
            max_size = config.max_size.get(),
            initial_size = state.size,
            policy = ?config.policy,
            "Connection pool created"
        );

        Ok(Self {
            inner: Arc::new(PoolInner {
                manager: Box::new(manager),
                validator: Box::new(validator),
                config: *config,
                state: Mutex::new(state),
                available: Condvar::new(),
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Checks out a connection according to the configured [`AcquirePolicy`].
    ///
    /// Under [`AcquirePolicy::Blocking`] this waits without bound for a
    /// release; [`ConnectionPool::close_all`] wakes waiters with `PoolClosed`.
    pub fn acquire(&self) -> Result<PooledConnection> {
        match self.inner.config.policy {
            AcquirePolicy::Blocking => self.get(Wait::Forever),
            AcquirePolicy::FailFast => self.get(Wait::Never),
        }
    }

    /// Checks out a connection without ever blocking.
    pub fn try_acquire(&self) -> Result<PooledConnection> {
        self.get(Wait::Never)
    }

    /// Checks out a connection, waiting at most `timeout` for one to free up.
    ///
    /// A timeout too large to express as a deadline waits without bound.
    pub fn acquire_timeout(&self, timeout: Duration) -> Result<PooledConnection> {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.get(Wait::Until { deadline, timeout }),
            None => self.get(Wait::Forever),
        }
    }

    fn get(&self, wait: Wait) -> Result<PooledConnection> {
        let started = Instant::now();

        let checkout = self.inner.checkout(wait).inspect_err(|e| {
            tracing::debug!(error = %e, "Connection checkout failed");
            #[cfg(feature = "metrics")]
            crate::observability::record_pool_error(match e {
                Error::PoolExhausted => "exhausted",
                Error::PoolTimeout(_) => "timeout",
                _ => "closed",
            });
        })?;

        let conn = match checkout {
            Checkout::Idle(conn) => self.inner.revalidate(conn)?,
            Checkout::Open => self.inner.open()?,
        };

        #[cfg(feature = "metrics")]
        crate::observability::record_pool_wait_time(started.elapsed());
        tracing::trace!(elapsed = ?started.elapsed(), "Connection checked out");

        Ok(PooledConnection {
            conn: Some(conn),
            pool: Arc::clone(&self.inner),
            discard: false,
        })
    }

    /// Returns a connection to the pool.
    ///
    /// Dropping the guard does the same. A guard issued by another pool is
    /// sent back to that pool and reported as `ForeignConnection`.
    pub fn release(&self, conn: PooledConnection) -> Result<()> {
        if Arc::ptr_eq(&conn.pool, &self.inner) {
            drop(conn);
            Ok(())
        } else {
            tracing::warn!("Rejected release of a connection issued by another pool");
            drop(conn);
            Err(Error::ForeignConnection)
        }
    }

    /// Closes idle connections and refuses further checkouts.
    ///
    /// Connections still checked out are closed as they come back.
    pub fn close_all(&self) {
        let drained: Vec<_> = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            let drained: Vec<_> = state.idle.drain(..).collect();
            state.size -= drained.len();
            self.inner.record_stats(&state);
            self.inner.available.notify_all();
            drained
        };

        tracing::info!(closed = drained.len(), "Connection pool closed");
        for mut conn in drained {
            close_quietly(conn.as_mut());
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    #[must_use]
    pub fn status(&self) -> PoolStatus {
        self.inner.state.lock().status(self.inner.max_size())
    }
}

/// A connection checked out of a [`ConnectionPool`].
///
/// Returns to its pool when dropped. Closed connections, connections left
/// with auto-commit disabled and discarded connections are closed instead,
/// and their slot is freed.
pub struct PooledConnection {
    /// Present until the guard is dropped.
    conn: Option<Box<dyn Connection>>,
    pool: Arc<PoolInner>,
    discard: bool,
}

impl PooledConnection {
    /// Closes the connection on release instead of reusing it.
    pub const fn discard(&mut self) {
        self.discard = true;
    }

    #[must_use]
    pub const fn is_discarded(&self) -> bool {
        self.discard
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("closed", &self.is_closed())
            .field("auto_commit", &self.auto_commit())
            .field("discard", &self.discard)
            .finish()
    }
}

impl Deref for PooledConnection {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        match &self.conn {
            Some(conn) => conn.as_ref(),
            None => unreachable!("connection is only taken when the guard drops"),
        }
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.conn {
            Some(conn) => conn.as_mut(),
            None => unreachable!("connection is only taken when the guard drops"),
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.recycle(conn, self.discard);
        }
    }
}
