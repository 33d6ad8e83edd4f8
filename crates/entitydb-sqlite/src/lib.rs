//! SQLite driver for entitydb.
//!
//! ```no_run
//! use entitydb::{ConfigBuilder, Connection};
//! use url::Url;
//!
//! let config = ConfigBuilder::new()
//!     .url(Url::parse("sqlite:///var/lib/app/data.db")?)
//!     .build()?;
//! let pool = entitydb_sqlite::connect(&config)?;
//! let mut conn = pool.acquire()?;
//! conn.execute("CREATE TABLE IF NOT EXISTS note (id INTEGER PRIMARY KEY)", &[])?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod connection;
mod convert;
mod manager;
mod statistics;

pub use connection::SqliteConnection;
pub use manager::{DEFAULT_BUSY_TIMEOUT, SqliteConnectionManager};
pub use statistics::ConnectionStatistics;

use entitydb::{ConnectionPool, DataSourceConfig, Result};

/// Builds a connection pool for the SQLite database named by `config`.
pub fn connect(config: &DataSourceConfig) -> Result<ConnectionPool> {
    let manager = SqliteConnectionManager::from_config(config)?;
    tracing::info!(
        url = %config.url(),
        max_size = %config.pool().max_size,
        "Creating SQLite pool"
    );
    ConnectionPool::from_config(manager, config.pool())
}
