//! Opens SQLite sessions for the pool.

use std::path::{Path, PathBuf};
use std::time::Duration;

use entitydb::{Connection, ConnectionManager, DataSourceConfig, Error, Result};
use rusqlite::OpenFlags;
use url::Url;

use crate::connection::SqliteConnection;
use crate::statistics::ConnectionStatistics;

/// How long a statement waits for a lock held by another connection.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    File(PathBuf),
    /// Named in-memory database shared by every connection of the manager.
    SharedMemory(String),
}

/// [`ConnectionManager`] for a SQLite database file or a named in-memory
/// database.
///
/// Accepted URLs: `sqlite:///absolute/path.db`, `sqlite:relative/path.db`
/// and `sqlite::memory:`.
#[derive(Debug, Clone)]
pub struct SqliteConnectionManager {
    target: Target,
    busy_timeout: Duration,
    stats: ConnectionStatistics,
}

impl SqliteConnectionManager {
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self::with_target(Target::File(path.as_ref().to_path_buf()))
    }

    /// An in-memory database that lives while at least one of its
    /// connections is open.
    pub fn shared_memory(name: impl Into<String>) -> Self {
        Self::with_target(Target::SharedMemory(name.into()))
    }

    fn with_target(target: Target) -> Self {
        Self {
            target,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            stats: ConnectionStatistics::new(),
        }
    }

    pub fn from_url(url: &Url) -> Result<Self> {
        if url.scheme() != "sqlite" {
            return Err(Error::Config(format!(
                "Unsupported URL scheme '{}', expected 'sqlite'",
                url.scheme()
            )));
        }

        if url.path() == ":memory:" {
            return Ok(Self::shared_memory("entitydb"));
        }

        let path = url.path();
        if path.is_empty() || path.ends_with('/') {
            return Err(Error::Config(format!(
                "Invalid SQLite database path in '{url}'"
            )));
        }
        Ok(Self::file(path))
    }

    /// SQLite has no credentials; a configured username or password is ignored.
    pub fn from_config(config: &DataSourceConfig) -> Result<Self> {
        if config.username().is_some() || config.password().is_some() {
            tracing::debug!("Ignoring credentials for SQLite data source");
        }
        Self::from_url(config.url())
    }

    #[must_use]
    pub const fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Statement counter shared by every connection this manager opens.
    #[must_use]
    pub const fn statistics(&self) -> &ConnectionStatistics {
        &self.stats
    }

    fn open(&self) -> rusqlite::Result<rusqlite::Connection> {
        let conn = match &self.target {
            Target::File(path) => rusqlite::Connection::open(path)?,
            Target::SharedMemory(name) => rusqlite::Connection::open_with_flags(
                format!("file:{name}?mode=memory&cache=shared"),
                OpenFlags::default(),
            )?,
        };

        conn.busy_timeout(self.busy_timeout)?;
        if matches!(self.target, Target::File(_)) {
            let _: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        }
        conn.execute_batch("PRAGMA foreign_keys=ON")?;
        Ok(conn)
    }
}

impl ConnectionManager for SqliteConnectionManager {
    fn create(&self) -> Result<Box<dyn Connection>> {
        let conn = self.open().map_err(|e| {
            tracing::warn!(database = ?self.target, error = %e, "Failed to open SQLite connection");
            Error::database(e)
        })?;
        tracing::debug!(database = ?self.target, "Opened SQLite connection");
        Ok(Box::new(SqliteConnection::new(conn, self.stats.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_url_file() {
        let url = Url::parse("sqlite:///var/lib/app/data.db").unwrap();
        let manager = SqliteConnectionManager::from_url(&url).unwrap();
        assert_eq!(
            manager.target,
            Target::File(PathBuf::from("/var/lib/app/data.db"))
        );
    }

    #[test]
    fn test_from_url_memory() {
        let url = Url::parse("sqlite::memory:").unwrap();
        let manager = SqliteConnectionManager::from_url(&url).unwrap();
        assert_eq!(manager.target, Target::SharedMemory("entitydb".to_string()));
    }

    #[test]
    fn test_from_url_relative_and_empty_paths() {
        let url = Url::parse("sqlite:data/app.db").unwrap();
        let manager = SqliteConnectionManager::from_url(&url).unwrap();
        assert_eq!(manager.target, Target::File(PathBuf::from("data/app.db")));

        let url = Url::parse("sqlite:///").unwrap();
        assert!(SqliteConnectionManager::from_url(&url).unwrap_err().is_config());
    }

    #[test]
    fn test_from_url_rejects_other_schemes() {
        let url = Url::parse("postgres://localhost/db").unwrap();
        let err = SqliteConnectionManager::from_url(&url).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_create_opens_file() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SqliteConnectionManager::file(dir.path().join("test.db"))
            .with_busy_timeout(Duration::from_millis(250));

        let mut conn = manager.create().unwrap();
        assert!(conn.auto_commit());
        assert!(conn.is_valid(Duration::from_secs(1)).unwrap());
        conn.close().unwrap();
    }

    #[test]
    fn test_shared_memory_connections_see_same_data() {
        let manager = SqliteConnectionManager::shared_memory("manager_shared_test");
        let mut first = manager.create().unwrap();
        let mut second = manager.create().unwrap();

        first.execute("CREATE TABLE t (id INTEGER)", &[]).unwrap();
        first.execute("INSERT INTO t VALUES (7)", &[]).unwrap();

        let rows = second.query("SELECT id FROM t", &[]).unwrap().count();
        assert_eq!(rows, 1);
        assert_eq!(manager.statistics().call_count(), 3);
    }

    #[test]
    fn test_create_fails_for_missing_directory() {
        let manager = SqliteConnectionManager::file("/nonexistent/dir/test.db");
        let err = manager.create().err().expect("expected create to fail");
        assert!(err.is_database());
    }
}
