//! SQL text generation from entity metadata.
//!
//! Identifiers come from validated metadata; every value is a `?` parameter.

use crate::error::Result;
use crate::metadata::{EntityMetadata, FieldMapping};
use crate::value::FieldType;

fn column_list<'a>(fields: impl Iterator<Item = &'a FieldMapping>) -> String {
    fields
        .map(|f| f.column_name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

/// `INSERT` over `fields`, in the given order.
pub fn insert(meta: &EntityMetadata, fields: &[&FieldMapping]) -> String {
    if fields.is_empty() {
        return format!("INSERT INTO {} DEFAULT VALUES", meta.table_name());
    }
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        meta.table_name(),
        column_list(fields.iter().copied()),
        placeholders(fields.len())
    )
}

pub fn select_all(meta: &EntityMetadata) -> String {
    format!(
        "SELECT {} FROM {}",
        column_list(meta.fields().iter()),
        meta.table_name()
    )
}

pub fn select_by_key(meta: &EntityMetadata) -> String {
    format!(
        "{} WHERE {} = ?",
        select_all(meta),
        meta.primary_key().column_name
    )
}

/// `UPDATE` of every non-key column. `None` when there is nothing to set.
pub fn update(meta: &EntityMetadata) -> Option<String> {
    let assignments: Vec<_> = meta
        .non_key_fields()
        .map(|f| format!("{} = ?", f.column_name))
        .collect();
    if assignments.is_empty() {
        return None;
    }
    Some(format!(
        "UPDATE {} SET {} WHERE {} = ?",
        meta.table_name(),
        assignments.join(", "),
        meta.primary_key().column_name
    ))
}

pub fn delete(meta: &EntityMetadata) -> String {
    format!(
        "DELETE FROM {} WHERE {} = ?",
        meta.table_name(),
        meta.primary_key().column_name
    )
}

pub fn create_table(meta: &EntityMetadata) -> Result<String> {
    let columns = meta
        .fields()
        .iter()
        .map(|f| {
            let sql_type = f.field_type.sql_type()?;
            Ok(if f.primary_key {
                format!("{} {sql_type} PRIMARY KEY", f.column_name)
            } else {
                format!("{} {sql_type}", f.column_name)
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        meta.table_name(),
        columns.join(", ")
    ))
}

/// Returns no rows but exposes the table's current column names.
pub fn probe_columns(table: &str) -> String {
    format!("SELECT * FROM {table} LIMIT 0")
}

pub fn add_column(table: &str, column: &str, field_type: FieldType) -> Result<String> {
    Ok(format!(
        "ALTER TABLE {table} ADD COLUMN {column} {}",
        field_type.sql_type()?
    ))
}
