use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::{EntityRows, delete_on, find_on, insert_on, primary_key_of, sql, update_on};
use crate::cache::Cache;
use crate::connection::Connection;
use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::metadata::EntityMetadata;
use crate::transaction::{SavepointHandle, Transaction};
use crate::value::PrimaryKey;

/// Cache changes of one transaction, oldest first. `None` invalidates.
pub(crate) type PendingCache<E> = Vec<(PrimaryKey, Option<E>)>;

/// Mapper operations bound to an open transaction.
///
/// Handed to the closure of
/// [`EntityMapper::execute_in_transaction`](super::EntityMapper::execute_in_transaction).
/// Cache writes are queued and reach the shared cache only after commit.
pub struct BoundMapper<'a, E> {
    tx: &'a mut Transaction,
    meta: Arc<EntityMetadata>,
    cache: Option<&'a dyn Cache<PrimaryKey, E>>,
    pending: &'a mut PendingCache<E>,
    /// Length of `pending` when each savepoint was set.
    marks: HashMap<u64, usize>,
}

impl<E> fmt::Debug for BoundMapper<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundMapper")
            .field("table", &self.meta.table_name())
            .field("transaction", &self.tx)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl<'a, E: Entity> BoundMapper<'a, E> {
    pub(crate) fn new(
        tx: &'a mut Transaction,
        meta: Arc<EntityMetadata>,
        cache: Option<&'a dyn Cache<PrimaryKey, E>>,
        pending: &'a mut PendingCache<E>,
    ) -> Self {
        Self {
            tx,
            meta,
            cache,
            pending,
            marks: HashMap::new(),
        }
    }

    #[must_use]
    pub fn metadata(&self) -> &EntityMetadata {
        &self.meta
    }

    /// The transaction's connection, for statements the mapper does not cover.
    pub fn connection(&mut self) -> &mut dyn Connection {
        self.tx.connection()
    }

    fn remember(&mut self, key: PrimaryKey, entity: E) {
        if self.cache.is_some() {
            self.pending.push((key, Some(entity)));
        }
    }

    fn forget(&mut self, key: PrimaryKey) {
        if self.cache.is_some() {
            self.pending.push((key, None));
        }
    }

    pub fn insert(&mut self, entity: &E) -> Result<Option<PrimaryKey>> {
        let (key, stored) = insert_on(self.tx.connection(), &self.meta, entity)?;
        if let Some(key) = &key {
            self.remember(key.clone(), stored);
        }
        Ok(key)
    }

    pub fn find(&mut self, key: impl Into<PrimaryKey>) -> Result<Option<E>> {
        let key = key.into();
        // The latest queued change wins over the shared cache.
        let queued = self
            .pending
            .iter()
            .rev()
            .find(|(queued, _)| *queued == key)
            .map(|(_, entity)| entity.clone());
        match queued {
            Some(Some(entity)) => return Ok(Some(entity)),
            Some(None) => {}
            None => {
                if let Some(hit) = self.cache.and_then(|c| c.get(&key)) {
                    return Ok(Some(hit));
                }
            }
        }

        let found = find_on::<E>(self.tx.connection(), &self.meta, &key)?;
        if let Some(entity) = &found {
            self.remember(key, entity.clone());
        }
        Ok(found)
    }

    pub fn update(&mut self, entity: &E) -> Result<u64> {
        let key = primary_key_of(&self.meta, entity)?
            .ok_or_else(|| Error::missing_primary_key(self.meta.table_name()))?;

        let changed = update_on(self.tx.connection(), &self.meta, entity, &key)?;
        if changed > 0 {
            self.remember(key, entity.clone());
        } else {
            self.forget(key);
        }
        Ok(changed)
    }

    pub fn delete(&mut self, key: impl Into<PrimaryKey>) -> Result<u64> {
        let key = key.into();
        let deleted = delete_on(self.tx.connection(), &self.meta, &key)?;
        self.forget(key);
        Ok(deleted)
    }

    /// Reads every row of the table as seen inside this transaction.
    pub fn select_all(&mut self) -> Result<EntityRows<E>> {
        let cursor = self
            .tx
            .connection()
            .query(&sql::select_all(&self.meta), &[])?;
        Ok(EntityRows::new(cursor, Arc::clone(&self.meta), None))
    }

    pub fn set_savepoint(&mut self, name: &str) -> Result<SavepointHandle> {
        let handle = self.tx.set_savepoint(name)?;
        self.marks.insert(handle.id(), self.pending.len());
        Ok(handle)
    }

    pub fn release_savepoint(&mut self, handle: &SavepointHandle) -> Result<()> {
        self.tx.release_savepoint(handle)?;
        let active: Vec<u64> = self.tx.savepoints().iter().map(SavepointHandle::id).collect();
        self.marks.retain(|id, _| active.contains(id));
        Ok(())
    }

    /// Rolls back to `handle` and drops the cache changes queued since it was set.
    pub fn rollback_to(&mut self, handle: &SavepointHandle) -> Result<()> {
        self.tx.rollback_to(handle)?;

        let mark = self.marks.get(&handle.id()).copied().unwrap_or(0);
        self.pending.truncate(mark);
        let active: Vec<u64> = self.tx.savepoints().iter().map(SavepointHandle::id).collect();
        self.marks.retain(|id, _| active.contains(id));
        Ok(())
    }

    /// Runs `work` under a savepoint, rolling back to it if `work` fails.
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
}
