//! Bounded connection pool, transaction coordinator and metadata-driven
//! entity mapper.
//!
//! Drivers plug in through [`Connection`] and [`ConnectionManager`]; see the
//! `entitydb-sqlite` crate for a SQLite driver.

pub mod cache;
pub mod config;
mod connection;
mod entity;
mod error;
mod mapper;
mod metadata;
pub mod observability;
mod pool;
#[cfg(test)]
mod test_support;
mod transaction;
mod value;

pub use cache::{
    Cache, CacheBackend, CacheConfig, CacheStats, InMemoryCache, NoopCache, TracedCache,
    create_cache,
};
pub use config::{ConfigBuilder, DataSourceConfig, TelemetryConfig};
pub use connection::{
    BufferedCursor, Connection, ConnectionManager, Row, RowCursor, VALIDATION_QUERY,
};
pub use entity::Entity;
pub use error::{Error, Result};
pub use mapper::{BoundMapper, EntityMapper, EntityRows};
pub use metadata::{
    EntityMetadata, EntityMetadataBuilder, FieldMapping, MetadataRegistry, is_valid_identifier,
};
pub use pool::{
    AcquirePolicy, AlwaysValid, ConnectionPool, ConnectionValidator, PingValidator, PoolConfig,
    PoolStatus, PooledConnection,
};
pub use transaction::{SavepointHandle, Transaction, TransactionCoordinator, TransactionState};
pub use value::{FieldType, FromValue, PrimaryKey, Value};
