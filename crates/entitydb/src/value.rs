//! Values exchanged with a [`Connection`](crate::Connection).
//!
//! Every value reaching the database travels as a bound parameter. Entity
//! fields convert into [`Value`] through `From` and back through
//! [`FromValue`]; a failed conversion is a mapping error.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// A bound parameter or a column value read back from a row.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Name of the variant, used in mapping error messages.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Integer(_) => "integer",
            Self::Real(_) => "real",
            Self::Text(_) => "text",
            Self::Blob(_) => "blob",
        }
    }

    /// Converts the value into an entity field, reporting failures against `field`.
    pub fn decode<T: FromValue>(self, field: &str) -> Result<T> {
        T::from_value(self).map_err(|e| match e {
            Error::Mapping { message, .. } => Error::mapping(field, message),
            other => other,
        })
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Real(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v:?}"),
            Self::Blob(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

fn type_mismatch(expected: &str, got: &Value) -> Error {
    Error::mapping("<value>", format!("expected {expected}, got {}", got.kind()))
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Blob(v)
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

impl From<PrimaryKey> for Value {
    fn from(key: PrimaryKey) -> Self {
        match key {
            PrimaryKey::Integer(v) => Self::Integer(v),
            PrimaryKey::Text(v) => Self::Text(v),
        }
    }
}

/// Conversion from a column value into an entity field type.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self>;
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self> {
        Ok(value)
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Integer(v) => Ok(v),
            other => Err(type_mismatch("integer", &other)),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: Value) -> Result<Self> {
        let wide = i64::from_value(value)?;
        Self::try_from(wide)
            .map_err(|_| Error::mapping("<value>", format!("integer {wide} out of range for i32")))
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Integer(v) => Ok(v != 0),
            other => Err(type_mismatch("boolean", &other)),
        }
    }
}

impl FromValue for f64 {
    #[allow(clippy::cast_precision_loss)]
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Real(v) => Ok(v),
            Value::Integer(v) => Ok(v as Self),
            other => Err(type_mismatch("real", &other)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Text(v) => Ok(v),
            other => Err(type_mismatch("text", &other)),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Blob(v) => Ok(v),
            other => Err(type_mismatch("blob", &other)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// Hashable form of a primary key value; the cache is keyed on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PrimaryKey {
    Integer(i64),
    Text(String),
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

impl From<i64> for PrimaryKey {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for PrimaryKey {
    fn from(v: i32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<String> for PrimaryKey {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for PrimaryKey {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl PrimaryKey {
    /// Reads a primary key out of a field value.
    ///
    /// `Ok(None)` means the key is not set yet.
    pub fn from_field(value: Value) -> Result<Option<Self>> {
        match value {
            Value::Null => Ok(None),
            Value::Integer(v) => Ok(Some(Self::Integer(v))),
            Value::Text(v) => Ok(Some(Self::Text(v))),
            other => Err(Error::mapping(
                "<primary key>",
                format!("{} values cannot be primary keys", other.kind()),
            )),
        }
    }
}

/// Declared type of an entity field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Text,
    Integer,
    Real,
    Boolean,
    Blob,
}

impl FieldType {
    /// SQL column type used in DDL statements.
    ///
    /// Only text and integer fields have a schema mapping.
    pub fn sql_type(self) -> Result<&'static str> {
        match self {
            Self::Text => Ok("TEXT"),
            Self::Integer => Ok("INTEGER"),
            other => Err(Error::UnsupportedFieldType(other)),
        }
    }

    const fn name(self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Integer => "INTEGER",
            Self::Real => "REAL",
            Self::Boolean => "BOOLEAN",
            Self::Blob => "BLOB",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FieldType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_uppercase();
        let base = normalized
            .split_once('(')
            .map_or(normalized.as_str(), |(head, _)| head.trim_end());

        Ok(match base {
            "TEXT" | "VARCHAR" | "CHAR" | "CLOB" | "STRING" => Self::Text,
            "INT" | "INTEGER" | "BIGINT" | "SMALLINT" | "TINYINT" => Self::Integer,
            "REAL" | "FLOAT" | "DOUBLE" | "DECIMAL" | "NUMERIC" => Self::Real,
            "BOOL" | "BOOLEAN" => Self::Boolean,
            "BLOB" | "BINARY" | "VARBINARY" => Self::Blob,
            _ => {
                return Err(Error::InvalidMetadata(format!(
                    "unknown column type '{}'",
                    s.trim()
                )));
            }
        })
    }
}
