//! Unit-of-work transactions over a single pooled connection.
//!
//! [`TransactionCoordinator::run`] checks out one connection, switches it to
//! manual commit and hands the closure a [`Transaction`] bound to it. The
//! closure's result decides between commit and rollback; auto-commit is
//! restored before the connection goes back to the pool.
//!
//! Savepoints form a stack. Rolling back to a savepoint keeps it active and
//! drops every savepoint set after it; releasing a savepoint drops it
//! together with everything set after it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::metadata::is_valid_identifier;
use crate::pool::{ConnectionPool, PooledConnection};

static NEXT_SAVEPOINT_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle of a [`Transaction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Auto-commit disabled, unit of work not entered yet
    Started,
    /// Unit of work running
    Active,
    Committed,
    RolledBack,
}

impl TransactionState {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::RolledBack)
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Started => "started",
            Self::Active => "active",
            Self::Committed => "committed",
            Self::RolledBack => "rolled back",
        })
    }
}

/// Names a savepoint set inside a [`Transaction`].
///
/// A handle becomes inert once its savepoint is released or discarded by
/// an enclosing release or rollback.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SavepointHandle {
    id: u64,
    name: String,
}

impl SavepointHandle {
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Runs closures as database transactions.
#[derive(Debug, Clone)]
pub struct TransactionCoordinator {
    pool: ConnectionPool,
}

impl TransactionCoordinator {
    #[must_use]
    pub const fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub const fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Runs `work` inside a transaction and commits if it succeeds.
    ///
    /// An error from `work` or from the commit rolls the transaction back
    /// and is returned as [`Error::TransactionFailed`], with any rollback or
    /// auto-commit restore failures attached as cleanup errors.
    pub fn run<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&mut Transaction) -> Result<T>,
    {
        let conn = self.pool.acquire()?;
        let mut tx = Transaction::begin(conn)?;
        tx.state = TransactionState::Active;
        let outcome = work(&mut tx);
        tx.finish(outcome)
    }
}

/// An open transaction bound to one pooled connection.
pub struct Transaction {
    conn: PooledConnection,
    state: TransactionState,
    savepoints: Vec<SavepointHandle>,
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("state", &self.state)
            .field("savepoints", &self.savepoints)
            .finish_non_exhaustive()
    }
}

impl Transaction {
    fn begin(mut conn: PooledConnection) -> Result<Self> {
        if let Err(e) = conn.set_auto_commit(false) {
            conn.discard();
            return Err(e);
        }
        tracing::debug!("Transaction started");

        Ok(Self {
            conn,
            state: TransactionState::Started,
            savepoints: Vec::new(),
        })
    }

    #[must_use]
    pub const fn state(&self) -> TransactionState {
        self.state
    }

    /// The bound connection. Statements run here join the transaction.
    pub fn connection(&mut self) -> &mut dyn Connection {
        &mut *self.conn
    }

    /// Active savepoints, oldest first.
    #[must_use]
    pub fn savepoints(&self) -> &[SavepointHandle] {
        &self.savepoints
    }

    pub fn set_savepoint(&mut self, name: &str) -> Result<SavepointHandle> {
        if !is_valid_identifier(name) {
            return Err(Error::InvalidSavepoint(format!(
                "'{name}' is not a valid savepoint name"
            )));
        }
        if self.savepoints.iter().any(|sp| sp.name == name) {
            return Err(Error::InvalidSavepoint(format!(
                "savepoint '{name}' is already active"
            )));
        }

        self.conn.set_savepoint(name)?;
        let handle = SavepointHandle {
            id: NEXT_SAVEPOINT_ID.fetch_add(1, Ordering::Relaxed),
            name: name.to_string(),
        };
        tracing::debug!(savepoint = name, "Savepoint set");
        self.savepoints.push(handle.clone());
        Ok(handle)
    }

    pub fn release_savepoint(&mut self, handle: &SavepointHandle) -> Result<()> {
        let pos = self.position(handle)?;
        self.conn.release_savepoint(&handle.name)?;
        self.savepoints.truncate(pos);
        tracing::debug!(savepoint = %handle.name, "Savepoint released");
        Ok(())
    }

    /// Undoes everything done after `handle` was set. The savepoint stays active.
    pub fn rollback_to(&mut self, handle: &SavepointHandle) -> Result<()> {
        let pos = self.position(handle)?;
        self.conn.rollback_to_savepoint(&handle.name)?;
        self.savepoints.truncate(pos + 1);
        tracing::debug!(savepoint = %handle.name, "Rolled back to savepoint");
        Ok(())
    }

    /// Runs `work` under a fresh savepoint.
    ///
    /// On success the savepoint is released; on failure the work is rolled
    /// back to it and the error is returned, leaving the outer transaction
    /// usable.
    pub fn nested<T, F>(&mut self, name: &str, work: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let savepoint = self.set_savepoint(name)?;
        match work(self) {
            Ok(value) => {
                self.release_savepoint(&savepoint)?;
                Ok(value)
            }
            Err(e) => {
                self.rollback_to(&savepoint)?;
                self.release_savepoint(&savepoint)?;
                Err(e)
            }
        }
    }

    fn position(&self, handle: &SavepointHandle) -> Result<usize> {
        self.savepoints
            .iter()
            .position(|sp| sp.id == handle.id)
            .ok_or_else(|| {
                Error::InvalidSavepoint(format!("savepoint '{}' is no longer active", handle.name))
            })
    }

    fn finish<T>(mut self, outcome: Result<T>) -> Result<T> {
        let outcome = outcome.and_then(|value| self.conn.commit().map(|()| value));
        self.savepoints.clear();

        match outcome {
            Ok(value) => {
                self.state = TransactionState::Committed;
                tracing::debug!("Transaction committed");
                if let Err(e) = self.conn.set_auto_commit(true) {
                    tracing::warn!(
                        error = %e,
                        "Failed to restore auto-commit; discarding connection"
                    );
                    self.conn.discard();
                }
                Ok(value)
            }
            Err(primary) => {
                let mut cleanup = Vec::new();
                self.state = TransactionState::RolledBack;
                match self.conn.rollback() {
                    Ok(()) => {
                        if let Err(e) = self.conn.set_auto_commit(true) {
                            tracing::warn!(error = %e, "Failed to restore auto-commit");
                            cleanup.push(e);
                        }
                    }
                    Err(e) => {
                        // Re-enabling auto-commit here would commit the failed work.
                        tracing::warn!(error = %e, "Rollback failed; closing connection");
                        cleanup.push(e);
                        cleanup.push(Error::database(
                            "auto-commit not restored after failed rollback; connection closed",
                        ));
                        if let Err(e) = self.conn.close() {
                            tracing::warn!(error = %e, "Failed to close connection");
                            cleanup.push(e);
                        }
                    }
                }
                if !cleanup.is_empty() {
                    self.conn.discard();
                }

                tracing::info!(error = %primary, "Transaction rolled back");
                Err(Error::transaction_failed(primary, cleanup))
            }
        }
    }
}
