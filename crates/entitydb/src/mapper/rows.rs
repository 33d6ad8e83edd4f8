use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use super::hydrate;
use crate::connection::RowCursor;
use crate::entity::Entity;
use crate::error::Result;
use crate::metadata::EntityMetadata;
use crate::pool::PooledConnection;

/// Lazily mapped rows of a `select_all`.
///
/// Single pass. The pooled connection behind the query is held until the
/// rows are exhausted or this value is dropped.
pub struct EntityRows<E> {
    cursor: Box<dyn RowCursor>,
    meta: Arc<EntityMetadata>,
    conn: Option<PooledConnection>,
    _entity: PhantomData<fn() -> E>,
}

impl<E> EntityRows<E> {
    pub(crate) fn new(
        cursor: Box<dyn RowCursor>,
        meta: Arc<EntityMetadata>,
        conn: Option<PooledConnection>,
    ) -> Self {
        Self {
            cursor,
            meta,
            conn,
            _entity: PhantomData,
        }
    }

    /// Column names reported by the database.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        self.cursor.columns()
    }

    /// Whether the rows still hold a pooled connection.
    #[must_use]
    pub const fn holds_connection(&self) -> bool {
        self.conn.is_some()
    }
}

impl<E> fmt::Debug for EntityRows<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityRows")
            .field("table", &self.meta.table_name())
            .field("holds_connection", &self.conn.is_some())
            .finish_non_exhaustive()
    }
}

impl<E: Entity> Iterator for EntityRows<E> {
    type Item = Result<E>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(row) = self.cursor.next() {
            Some(row.and_then(|row| hydrate(&self.meta, row)))
        } else {
            self.conn = None;
            None
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.cursor.size_hint()
    }
}
