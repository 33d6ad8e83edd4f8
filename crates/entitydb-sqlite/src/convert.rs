//! Conversions between entitydb values and SQLite values.

use entitydb::Value;
use rusqlite::ToSql;
use rusqlite::types::{self, ToSqlOutput, ValueRef};

/// Binds an entitydb [`Value`] as a statement parameter.
pub struct Param<'a>(pub &'a Value);

impl ToSql for Param<'_> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self.0 {
            Value::Null => ToSqlOutput::Owned(types::Value::Null),
            Value::Integer(v) => ToSqlOutput::Owned(types::Value::Integer(*v)),
            Value::Real(v) => ToSqlOutput::Owned(types::Value::Real(*v)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

/// Copies a column value out of a SQLite row.
///
/// Text that is not valid UTF-8 is converted lossily.
pub fn column_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::Integer(v),
        ValueRef::Real(v) => Value::Real(v),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Blob(b.to_vec()),
    }
}
