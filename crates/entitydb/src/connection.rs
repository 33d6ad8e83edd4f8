//! The database session capability consumed by the pool and the mapper.
//!
//! Drivers implement [`Connection`] for one session and
//! [`ConnectionManager`] to open new sessions on behalf of the pool.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::value::Value;

/// Lightweight statement used by drivers for liveness checks.
pub const VALIDATION_QUERY: &str = "SELECT 1";

/// One database session.
///
/// Implementations must never splice parameter values into SQL text:
/// `params` are bound positionally to `?` placeholders.
pub trait Connection: Send {
    /// Executes a statement and returns the number of affected rows.
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Runs a query and returns a forward-only cursor over its rows.
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Box<dyn RowCursor>>;

    /// Key generated by the most recent insert on this session, if any.
    fn last_insert_id(&self) -> Option<i64>;

    fn auto_commit(&self) -> bool;

    /// Switches auto-commit mode.
    ///
    /// Turning auto-commit back on while a transaction is open commits it.
    fn set_auto_commit(&mut self, enabled: bool) -> Result<()>;

    fn commit(&mut self) -> Result<()>;

    fn rollback(&mut self) -> Result<()>;

    fn set_savepoint(&mut self, name: &str) -> Result<()>;

    fn release_savepoint(&mut self, name: &str) -> Result<()>;

    fn rollback_to_savepoint(&mut self, name: &str) -> Result<()>;

    fn is_closed(&self) -> bool;

    /// Pings the session, giving up after `timeout`.
    fn is_valid(&mut self, timeout: Duration) -> Result<bool>;

    fn close(&mut self) -> Result<()>;
}

/// Opens new sessions for a [`ConnectionPool`](crate::ConnectionPool).
pub trait ConnectionManager: Send + Sync + fmt::Debug {
    fn create(&self) -> Result<Box<dyn Connection>>;
}

/// Single-pass cursor over the rows of one query.
pub trait RowCursor: Iterator<Item = Result<Row>> + Send {
    /// Column names of the result set, available even when it is empty.
    fn columns(&self) -> &[String];
}

/// A result row with named columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    /// Pairs column names with values by position.
    ///
    /// Columns without a value read as absent.
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Looks a column up by name. SQL identifiers are case-insensitive.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
            .and_then(|idx| self.values.get(idx))
    }

    /// Removes a column's value from the row, leaving `Null` behind.
    pub fn take(&mut self, column: &str) -> Option<Value> {
        let idx = self
            .columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))?;
        self.values.get_mut(idx).map(std::mem::take)
    }
}

/// Cursor over rows that were already fetched from the driver.
#[derive(Debug)]
pub struct BufferedCursor {
    columns: Arc<[String]>,
    rows: VecDeque<Vec<Value>>,
}

impl BufferedCursor {
    pub fn new(columns: Vec<String>, rows: impl IntoIterator<Item = Vec<Value>>) -> Self {
        Self {
            columns: columns.into(),
            rows: rows.into_iter().collect(),
        }
    }

    pub fn empty(columns: Vec<String>) -> Self {
        Self::new(columns, Vec::new())
    }
}

impl Iterator for BufferedCursor {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        self.rows
            .pop_front()
            .map(|values| Ok(Row::new(Arc::clone(&self.columns), values)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.rows.len(), Some(self.rows.len()))
    }
}

impl RowCursor for BufferedCursor {
    fn columns(&self) -> &[String] {
        &self.columns
    }
}
