//! A pooled SQLite session.

use std::fmt;
use std::time::Duration;

use entitydb::{BufferedCursor, Connection, Error, Result, RowCursor, VALIDATION_QUERY, Value};
use rusqlite::params_from_iter;

use crate::convert::{Param, column_value};
use crate::statistics::ConnectionStatistics;

/// One SQLite connection implementing the [`Connection`] capability.
///
/// SQLite has no session-level auto-commit switch, so manual-commit mode is
/// emulated: the first statement after auto-commit is turned off opens a
/// transaction with `BEGIN IMMEDIATE`, and `commit`/`rollback` end it.
/// Concurrent writers wait on the busy timeout instead of failing on a lock
/// upgrade.
pub struct SqliteConnection {
    conn: Option<rusqlite::Connection>,
    auto_commit: bool,
    stats: ConnectionStatistics,
}

impl fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("closed", &self.conn.is_none())
            .field("auto_commit", &self.auto_commit)
            .finish_non_exhaustive()
    }
}

impl SqliteConnection {
    pub fn new(conn: rusqlite::Connection, stats: ConnectionStatistics) -> Self {
        Self {
            conn: Some(conn),
            auto_commit: true,
            stats,
        }
    }

    fn raw(&self) -> Result<&rusqlite::Connection> {
        self.conn
            .as_ref()
            .ok_or_else(|| Error::database("connection is closed"))
    }

    fn in_transaction(&self) -> bool {
        self.conn.as_ref().is_some_and(|c| !c.is_autocommit())
    }

    /// Opens the transaction of a manual-commit session on first use.
    fn begin_if_needed(&self) -> Result<()> {
        if !self.auto_commit && !self.in_transaction() {
            tracing::trace!("BEGIN IMMEDIATE");
            self.raw()?
                .execute_batch("BEGIN IMMEDIATE")
                .map_err(Error::database)?;
        }
        Ok(())
    }

    fn batch(&self, sql: &str) -> Result<()> {
        tracing::trace!(sql, "Transaction control");
        self.raw()?.execute_batch(sql).map_err(Error::database)
    }
}

impl Connection for SqliteConnection {
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        self.stats.record_call();
        self.begin_if_needed()?;

        let conn = self.raw()?;
        let mut stmt = conn.prepare(sql).map_err(Error::database)?;
        let changed = stmt
            .execute(params_from_iter(params.iter().map(Param)))
            .map_err(Error::database)?;
        Ok(changed as u64)
    }

    // rusqlite statements borrow the connection, so the result set is read
    // in full before returning. Memory grows with the number of rows.
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Box<dyn RowCursor>> {
        self.stats.record_call();
        self.begin_if_needed()?;

        let conn = self.raw()?;
        let mut stmt = conn.prepare(sql).map_err(Error::database)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();

        let mut rows = stmt
            .query(params_from_iter(params.iter().map(Param)))
            .map_err(Error::database)?;
        let mut buffered = Vec::new();
        while let Some(row) = rows.next().map_err(Error::database)? {
            let values = (0..width)
                .map(|idx| row.get_ref(idx).map(column_value))
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(Error::database)?;
            buffered.push(values);
        }

        Ok(Box::new(BufferedCursor::new(columns, buffered)))
    }

    fn last_insert_id(&self) -> Option<i64> {
        self.conn
            .as_ref()
            .map(rusqlite::Connection::last_insert_rowid)
            .filter(|id| *id != 0)
    }

    fn auto_commit(&self) -> bool {
        self.auto_commit
    }

    fn set_auto_commit(&mut self, enabled: bool) -> Result<()> {
        self.raw()?;
        if enabled && self.in_transaction() {
            self.batch("COMMIT")?;
        }
        self.auto_commit = enabled;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        if self.in_transaction() {
            self.batch("COMMIT")?;
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        if self.in_transaction() {
            self.batch("ROLLBACK")?;
        }
        Ok(())
    }

    fn set_savepoint(&mut self, name: &str) -> Result<()> {
        self.begin_if_needed()?;
        self.batch(&format!("SAVEPOINT {name}"))
    }

    fn release_savepoint(&mut self, name: &str) -> Result<()> {
        self.batch(&format!("RELEASE SAVEPOINT {name}"))
    }

    fn rollback_to_savepoint(&mut self, name: &str) -> Result<()> {
        self.batch(&format!("ROLLBACK TO SAVEPOINT {name}"))
    }

    fn is_closed(&self) -> bool {
        self.conn.is_none()
    }

    // `SELECT 1` reads no table and takes no lock, so it cannot wait long
    // enough for `_timeout` to matter.
    fn is_valid(&mut self, _timeout: Duration) -> Result<bool> {
        let Some(conn) = &self.conn else {
            return Ok(false);
        };
        let one: i64 = conn
            .query_row(VALIDATION_QUERY, [], |row| row.get(0))
            .map_err(Error::database)?;
        Ok(one == 1)
    }

    fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, e)| Error::database(e))?;
        }
        Ok(())
    }
}
