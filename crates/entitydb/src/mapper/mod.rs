//! Metadata-driven CRUD over pooled connections.
//!
//! [`EntityMapper`] resolves the entity's metadata from the registry on
//! every call, so an unregistered type fails with `NotAnEntity` before any
//! connection is touched. Each operation checks a connection out for its own
//! duration; [`EntityMapper::execute_in_transaction`] instead binds every
//! operation of the closure to one transaction.
//!
//! With a cache attached, `find` reads through it and `insert`/`update`
//! write through it. Inside a transaction cache changes are queued and
//! applied only once the transaction commits; rolling back to a savepoint
//! drops the changes queued after it.

mod bound;
mod rows;
mod sql;

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

pub use bound::BoundMapper;
pub use rows::EntityRows;

use bound::PendingCache;

use crate::cache::Cache;
use crate::connection::{Connection, Row};
use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::metadata::{EntityMetadata, FieldMapping, MetadataRegistry, check_identifier};
use crate::pool::ConnectionPool;
use crate::transaction::TransactionCoordinator;
use crate::value::{FieldType, PrimaryKey, Value};

/// Persists one entity type through a connection pool.
pub struct EntityMapper<E: Entity> {
    coordinator: TransactionCoordinator,
    registry: Arc<MetadataRegistry>,
    cache: Option<Arc<dyn Cache<PrimaryKey, E>>>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Clone for EntityMapper<E> {
    fn clone(&self) -> Self {
        Self {
            coordinator: self.coordinator.clone(),
            registry: Arc::clone(&self.registry),
            cache: self.cache.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> fmt::Debug for EntityMapper<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityMapper")
            .field("entity", &std::any::type_name::<E>())
            .field("pool", self.coordinator.pool())
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl<E: Entity> EntityMapper<E> {
    pub fn new(pool: ConnectionPool, registry: Arc<MetadataRegistry>) -> Self {
        Self {
            coordinator: TransactionCoordinator::new(pool),
            registry,
            cache: None,
            _entity: PhantomData,
        }
    }

    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn Cache<PrimaryKey, E>>) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub const fn pool(&self) -> &ConnectionPool {
        self.coordinator.pool()
    }

    #[must_use]
    pub fn cache(&self) -> Option<&dyn Cache<PrimaryKey, E>> {
        self.cache.as_deref()
    }

    pub fn metadata(&self) -> Result<Arc<EntityMetadata>> {
        self.registry.resolve::<E>()
    }

    /// Inserts `entity` and returns its primary key.
    ///
    /// A null primary key is left to the database; the generated key is
    /// read back for integer keys.
    pub fn insert(&self, entity: &E) -> Result<Option<PrimaryKey>> {
        let meta = self.metadata()?;
        let mut conn = self.pool().acquire()?;
        let (key, stored) = insert_on(&mut *conn, &meta, entity)?;
        drop(conn);

        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            cache.put(key.clone(), stored);
        }
        Ok(key)
    }

    /// Looks an entity up by primary key, consulting the cache first.
    pub fn find(&self, key: impl Into<PrimaryKey>) -> Result<Option<E>> {
        let key = key.into();
        let meta = self.metadata()?;

        if let Some(hit) = self.cache.as_ref().and_then(|c| c.get(&key)) {
            tracing::debug!(table = meta.table_name(), %key, "Entity served from cache");
            return Ok(Some(hit));
        }

        let mut conn = self.pool().acquire()?;
        let found = find_on::<E>(&mut *conn, &meta, &key)?;
        drop(conn);

        if let (Some(cache), Some(entity)) = (&self.cache, &found) {
            cache.put(key, entity.clone());
        }
        Ok(found)
    }

    /// Writes every non-key field of `entity`, keyed on its primary key.
    ///
    /// Returns the number of rows changed.
    pub fn update(&self, entity: &E) -> Result<u64> {
        let meta = self.metadata()?;
        let key = primary_key_of(&meta, entity)?
            .ok_or_else(|| Error::missing_primary_key(meta.table_name()))?;

        let mut conn = self.pool().acquire()?;
        let changed = update_on(&mut *conn, &meta, entity, &key)?;
        drop(conn);

        if let Some(cache) = &self.cache {
            if changed > 0 {
                cache.put(key, entity.clone());
            } else {
                cache.invalidate(&key);
            }
        }
        Ok(changed)
    }

    pub fn delete(&self, key: impl Into<PrimaryKey>) -> Result<u64> {
        let key = key.into();
        let meta = self.metadata()?;

        let mut conn = self.pool().acquire()?;
        let deleted = delete_on(&mut *conn, &meta, &key)?;
        drop(conn);

        if let Some(cache) = &self.cache {
            cache.invalidate(&key);
        }
        Ok(deleted)
    }

    /// Creates the entity's table unless it already exists.
    pub fn create_table(&self) -> Result<()> {
        let meta = self.metadata()?;
        let statement = sql::create_table(&meta)?;

        let mut conn = self.pool().acquire()?;
        tracing::debug!(table = meta.table_name(), sql = %statement, "Creating table");
        conn.execute(&statement, &[])?;
        Ok(())
    }

    /// Adds a column to the entity's table.
    ///
    /// Returns `false` without altering anything when the column exists.
    pub fn add_column(&self, column: &str, field_type: FieldType) -> Result<bool> {
        let meta = self.metadata()?;
        check_identifier("column", column)?;
        let alter = sql::add_column(meta.table_name(), column, field_type)?;

        let mut conn = self.pool().acquire()?;
        let probe = conn.query(&sql::probe_columns(meta.table_name()), &[])?;
        if probe
            .columns()
            .iter()
            .any(|existing| existing.eq_ignore_ascii_case(column))
        {
            tracing::debug!(table = meta.table_name(), column, "Column already present");
            return Ok(false);
        }
        drop(probe);

        tracing::info!(table = meta.table_name(), column, %field_type, "Adding column");
        conn.execute(&alter, &[])?;
        Ok(true)
    }

    /// Streams every row of the entity's table.
    ///
    /// Entities are built one at a time as the iterator advances, but the
    /// rows themselves are fetched the way the driver's cursor fetches them.
    /// A driver that buffers its result sets, such as the SQLite one, holds
    /// the whole table in memory until the iterator is dropped.
    pub fn select_all(&self) -> Result<EntityRows<E>> {
        let meta = self.metadata()?;
        let mut conn = self.pool().acquire()?;
        let cursor = conn.query(&sql::select_all(&meta), &[])?;
        Ok(EntityRows::new(cursor, meta, Some(conn)))
    }

    /// Runs `work` in one transaction.
    ///
    /// Every operation on the [`BoundMapper`] shares the transaction's
    /// connection. An error from `work` rolls everything back. Cache changes
    /// made inside the transaction become visible to other callers only
    /// after it commits.
    pub fn execute_in_transaction<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&mut BoundMapper<'_, E>) -> Result<T>,
    {
        let meta = self.metadata()?;
        let cache = self.cache.as_deref();
        let mut pending = PendingCache::new();

        let value = self.coordinator.run(|tx| {
            let mut bound = BoundMapper::new(tx, Arc::clone(&meta), cache, &mut pending);
            work(&mut bound)
        })?;

        if let Some(cache) = cache {
            tracing::debug!(changes = pending.len(), "Applying committed cache changes");
            for (key, entity) in pending {
                match entity {
                    Some(entity) => cache.put(key, entity),
                    None => {
                        cache.invalidate(&key);
                    }
                }
            }
        }
        Ok(value)
    }
}

fn field_value<E: Entity>(entity: &E, field: &FieldMapping) -> Result<Value> {
    entity
        .field(&field.field_name)
        .ok_or_else(|| Error::mapping(&field.field_name, "field is not readable"))
}

fn primary_key_of<E: Entity>(meta: &EntityMetadata, entity: &E) -> Result<Option<PrimaryKey>> {
    let pk = meta.primary_key();
    PrimaryKey::from_field(field_value(entity, pk)?).map_err(|e| match e {
        Error::Mapping { message, .. } => Error::mapping(&pk.field_name, message),
        other => other,
    })
}

/// Builds an entity from a result row.
pub(crate) fn hydrate<E: Entity>(meta: &EntityMetadata, mut row: Row) -> Result<E> {
    let mut entity = E::default();
    for field in meta.fields() {
        let value = row.take(&field.column_name).ok_or_else(|| {
            Error::mapping(
                &field.field_name,
                format!("column '{}' missing from result", field.column_name),
            )
        })?;
        entity.set_field(&field.field_name, value)?;
    }
    Ok(entity)
}

/// Returns the key the row was stored under and the entity as stored.
fn insert_on<E: Entity>(
    conn: &mut dyn Connection,
    meta: &EntityMetadata,
    entity: &E,
) -> Result<(Option<PrimaryKey>, E)> {
    let pk = meta.primary_key();
    let given_key = primary_key_of(meta, entity)?;

    let mut fields = Vec::with_capacity(meta.fields().len());
    let mut params = Vec::with_capacity(meta.fields().len());
    for field in meta.fields() {
        if field.primary_key && given_key.is_none() {
            continue;
        }
        params.push(field_value(entity, field)?);
        fields.push(field);
    }

    let statement = sql::insert(meta, &fields);
    tracing::debug!(table = meta.table_name(), sql = %statement, "Inserting entity");
    conn.execute(&statement, &params)?;

    if given_key.is_some() {
        return Ok((given_key, entity.clone()));
    }

    let generated = match pk.field_type {
        FieldType::Integer => conn.last_insert_id().map(PrimaryKey::Integer),
        _ => None,
    };
    let mut stored = entity.clone();
    if let Some(key) = &generated {
        stored.set_field(&pk.field_name, key.clone().into())?;
    }
    Ok((generated, stored))
}

fn find_on<E: Entity>(
    conn: &mut dyn Connection,
    meta: &EntityMetadata,
    key: &PrimaryKey,
) -> Result<Option<E>> {
    let statement = sql::select_by_key(meta);
    tracing::debug!(table = meta.table_name(), %key, "Looking up entity");
    let mut rows = conn.query(&statement, &[key.clone().into()])?;
    rows.next()
        .transpose()?
        .map(|row| hydrate(meta, row))
        .transpose()
}

fn update_on<E: Entity>(
    conn: &mut dyn Connection,
    meta: &EntityMetadata,
    entity: &E,
    key: &PrimaryKey,
) -> Result<u64> {
    let Some(statement) = sql::update(meta) else {
        tracing::debug!(table = meta.table_name(), "No non-key columns to update");
        return Ok(0);
    };

    let mut params = meta
        .non_key_fields()
        .map(|field| field_value(entity, field))
        .collect::<Result<Vec<_>>>()?;
    params.push(key.clone().into());

    tracing::debug!(table = meta.table_name(), sql = %statement, "Updating entity");
    conn.execute(&statement, &params)
}

fn delete_on(conn: &mut dyn Connection, meta: &EntityMetadata, key: &PrimaryKey) -> Result<u64> {
    tracing::debug!(table = meta.table_name(), %key, "Deleting entity");
    conn.execute(&sql::delete(meta), &[key.clone().into()])
}
