//! Shared fixtures for the SQLite integration tests
#![allow(dead_code)]

use std::num::NonZeroUsize;
use std::sync::Arc;

use entitydb::{
    Connection, ConnectionPool, Entity, EntityMapper, EntityMetadata, Error, FieldType,
    MetadataRegistry, PoolConfig, Result, Value,
};
use entitydb_sqlite::{ConnectionStatistics, SqliteConnectionManager};
use tempfile::TempDir;

/// Mapped to the `customer` table.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Customer {
    pub id: Option<i64>,
    pub first_name: String,
    pub last_name: String,
}

impl Customer {
    pub fn new(first_name: &str, last_name: &str) -> Self {
        Self {
            id: None,
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
        }
    }

    pub fn with_id(id: i64, first_name: &str, last_name: &str) -> Self {
        Self {
            id: Some(id),
            ..Self::new(first_name, last_name)
        }
    }
}

impl Entity for Customer {
    fn field(&self, name: &str) -> Option<Value> {
        match name {
            "id" => Some(self.id.into()),
            "first_name" => Some(self.first_name.clone().into()),
            "last_name" => Some(self.last_name.clone().into()),
            _ => None,
        }
    }

    fn set_field(&mut self, name: &str, value: Value) -> Result<()> {
        match name {
            "id" => self.id = value.decode(name)?,
            "first_name" => self.first_name = value.decode(name)?,
            "last_name" => self.last_name = value.decode(name)?,
            _ => return Err(Error::mapping(name, "unknown field")),
        }
        Ok(())
    }
}

pub fn customer_metadata() -> EntityMetadata {
    EntityMetadata::builder("customer")
        .primary_key("id", "customerId", FieldType::Integer)
        .field("first_name", "firstname", FieldType::Text)
        .field("last_name", "lastname", FieldType::Text)
        .build::<Customer>()
        .unwrap()
}

pub fn registry() -> Arc<MetadataRegistry> {
    Arc::new(
        MetadataRegistry::new()
            .with::<Customer>(customer_metadata())
            .unwrap(),
    )
}

/// A file-backed database in a temporary directory.
pub struct TestDb {
    pub pool: ConnectionPool,
    pub stats: ConnectionStatistics,
    // Dropped after the pool.
    dir: TempDir,
}

impl TestDb {
    pub fn new(max_size: usize) -> Self {
        Self::with_config(PoolConfig::new().with_max_size(NonZeroUsize::new(max_size).unwrap()))
    }

    pub fn with_config(config: PoolConfig) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let manager = SqliteConnectionManager::file(dir.path().join("entitydb.db"));
        let stats = manager.statistics().clone();
        let pool = ConnectionPool::from_config(manager, &config).unwrap();
        Self { pool, stats, dir }
    }

    pub fn mapper(&self) -> EntityMapper<Customer> {
        EntityMapper::new(self.pool.clone(), registry())
    }

    /// A mapper whose table already exists.
    pub fn customers(&self) -> EntityMapper<Customer> {
        let mapper = self.mapper();
        mapper.create_table().unwrap();
        mapper
    }

    pub fn count(&self, table: &str) -> i64 {
        let mut conn = self.pool.acquire().unwrap();
        let mut rows = conn
            .query(&format!("SELECT COUNT(*) AS n FROM {table}"), &[])
            .unwrap();
        match rows.next().unwrap().unwrap().take("n") {
            Some(Value::Integer(n)) => n,
            other => panic!("unexpected count {other:?}"),
        }
    }
}
