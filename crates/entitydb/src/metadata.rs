//! Static entity metadata.
//!
//! Each entity type registers its table name and field-to-column mapping
//! once, at startup, in a [`MetadataRegistry`]. The mapper looks the
//! metadata up by the entity's `TypeId` on every operation.

use std::any::{TypeId, type_name};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::value::FieldType;

const MAX_IDENTIFIER_LEN: usize = 128;

/// Whether `name` can be spliced into SQL as a bare identifier.
///
/// Accepts ASCII letters, digits and underscores, not starting with a digit.
#[must_use]
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };

    name.len() <= MAX_IDENTIFIER_LEN
        && (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub(crate) fn check_identifier(kind: &str, name: &str) -> Result<()> {
    if is_valid_identifier(name) {
        Ok(())
    } else {
        Err(Error::InvalidMetadata(format!(
            "{kind} name '{name}' is not a valid SQL identifier"
        )))
    }
}

/// Maps one entity field to one table column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    pub field_name: String,
    pub column_name: String,
    pub field_type: FieldType,
    pub primary_key: bool,
}

/// Table name and ordered field mappings of one entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityMetadata {
    entity_name: &'static str,
    table_name: String,
    fields: Vec<FieldMapping>,
    primary_key: usize,
}

impl EntityMetadata {
    #[must_use]
    pub fn builder(table_name: impl Into<String>) -> EntityMetadataBuilder {
        EntityMetadataBuilder::new(table_name)
    }

    /// Rust type name of the entity, for diagnostics.
    #[must_use]
    pub const fn entity_name(&self) -> &'static str {
        self.entity_name
    }

    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Field mappings in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[FieldMapping] {
        &self.fields
    }

    #[must_use]
    pub fn primary_key(&self) -> &FieldMapping {
        &self.fields[self.primary_key]
    }

    /// Every field except the primary key, in declaration order.
    pub fn non_key_fields(&self) -> impl Iterator<Item = &FieldMapping> {
        self.fields.iter().filter(|f| !f.primary_key)
    }

    #[must_use]
    pub fn field(&self, field_name: &str) -> Option<&FieldMapping> {
        self.fields.iter().find(|f| f.field_name == field_name)
    }

    #[must_use]
    pub fn column(&self, column_name: &str) -> Option<&FieldMapping> {
        self.fields
            .iter()
            .find(|f| f.column_name.eq_ignore_ascii_case(column_name))
    }
}

/// Builds and validates an [`EntityMetadata`].
#[derive(Debug)]
pub struct EntityMetadataBuilder {
    table_name: String,
    fields: Vec<FieldMapping>,
}

impl EntityMetadataBuilder {
    fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn field(
        mut self,
        field_name: impl Into<String>,
        column_name: impl Into<String>,
        field_type: FieldType,
    ) -> Self {
        self.fields.push(FieldMapping {
            field_name: field_name.into(),
            column_name: column_name.into(),
            field_type,
            primary_key: false,
        });
        self
    }

    #[must_use]
    pub fn primary_key(
        mut self,
        field_name: impl Into<String>,
        column_name: impl Into<String>,
        field_type: FieldType,
    ) -> Self {
        self.fields.push(FieldMapping {
            field_name: field_name.into(),
            column_name: column_name.into(),
            field_type,
            primary_key: true,
        });
        self
    }

    /// Validates the mapping for entity type `E`.
    ///
    /// Table and column names must be SQL identifiers, field and column names
    /// must be unique and exactly one field must be the primary key.
    pub fn build<E: 'static>(self) -> Result<EntityMetadata> {
        check_identifier("table", &self.table_name)?;
        if self.fields.is_empty() {
            return Err(Error::InvalidMetadata(format!(
                "table '{}' has no mapped fields",
                self.table_name
            )));
        }

        for (idx, field) in self.fields.iter().enumerate() {
            check_identifier("column", &field.column_name)?;
            let duplicate = self.fields[..idx].iter().any(|other| {
                other.field_name == field.field_name
                    || other.column_name.eq_ignore_ascii_case(&field.column_name)
            });
            if duplicate {
                return Err(Error::InvalidMetadata(format!(
                    "field '{}' is mapped twice in table '{}'",
                    field.field_name, self.table_name
                )));
            }
        }

        let mut keys = self
            .fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.primary_key)
            .map(|(idx, _)| idx);
        let primary_key = match (keys.next(), keys.next()) {
            (Some(idx), None) => idx,
            (None, _) => {
                return Err(Error::InvalidMetadata(format!(
                    "table '{}' has no primary key",
                    self.table_name
                )));
            }
            (Some(_), Some(_)) => {
                return Err(Error::InvalidMetadata(format!(
                    "table '{}' has more than one primary key",
                    self.table_name
                )));
            }
        };

        Ok(EntityMetadata {
            entity_name: type_name::<E>(),
            table_name: self.table_name,
            fields: self.fields,
            primary_key,
        })
    }
}

/// Entity metadata keyed by Rust type.
///
/// Built once and shared behind an `Arc`; entries are immutable.
#[derive(Debug, Default)]
pub struct MetadataRegistry {
    entries: HashMap<TypeId, Arc<EntityMetadata>>,
}

impl MetadataRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the metadata of `E`. Registering a type twice is an error.
    pub fn register<E: 'static>(&mut self, metadata: EntityMetadata) -> Result<()> {
        match self.entries.entry(TypeId::of::<E>()) {
            Entry::Occupied(_) => Err(Error::InvalidMetadata(format!(
                "{} is already registered",
                type_name::<E>()
            ))),
            Entry::Vacant(slot) => {
                tracing::debug!(
                    entity = type_name::<E>(),
                    table = metadata.table_name(),
                    "Entity registered"
                );
                slot.insert(Arc::new(metadata));
                Ok(())
            }
        }
    }

    /// Builder-style [`MetadataRegistry::register`].
    pub fn with<E: 'static>(mut self, metadata: EntityMetadata) -> Result<Self> {
        self.register::<E>(metadata)?;
        Ok(self)
    }

    pub fn resolve<E: 'static>(&self) -> Result<Arc<EntityMetadata>> {
        self.entries
            .get(&TypeId::of::<E>())
            .cloned()
            .ok_or(Error::NotAnEntity(type_name::<E>()))
    }

    #[must_use]
    pub fn contains<E: 'static>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<E>())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
