use std::time::Duration;

use thiserror::Error;

use crate::value::FieldType;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Not an entity: no metadata registered for {0}")]
    NotAnEntity(&'static str),

    #[error("Primary key is not set for entity in table '{table}'")]
    MissingPrimaryKey { table: String },

    #[error("Unsupported field type: {0}")]
    UnsupportedFieldType(FieldType),

    #[error("Mapping error on field '{field}': {message}")]
    Mapping { field: String, message: String },

    #[error("Invalid entity metadata: {0}")]
    InvalidMetadata(String),

    #[error("Connection pool exhausted")]
    PoolExhausted,

    #[error("Connection pool is closed")]
    PoolClosed,

    #[error("Timed out after {0:?} waiting for a pooled connection")]
    PoolTimeout(Duration),

    #[error("Connection was not issued by this pool")]
    ForeignConnection,

    #[error("Invalid savepoint: {0}")]
    InvalidSavepoint(String),

    #[error("Transaction rolled back: {source}")]
    TransactionFailed {
        #[source]
        source: Box<Self>,
        /// Failures raised while rolling back or restoring auto-commit.
        cleanup: Vec<Self>,
    },

    #[error("Database error: {0}")]
    Database(#[source] BoxError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn mapping(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Mapping {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn database(err: impl Into<BoxError>) -> Self {
        Self::Database(err.into())
    }

    pub fn missing_primary_key(table: impl Into<String>) -> Self {
        Self::MissingPrimaryKey {
            table: table.into(),
        }
    }

    pub(crate) fn transaction_failed(primary: Self, cleanup: Vec<Self>) -> Self {
        Self::TransactionFailed {
            source: Box::new(primary),
            cleanup,
        }
    }

    /// The error that originally caused a transaction to roll back.
    ///
    /// Returns `self` for every other variant.
    #[must_use]
    pub fn cause(&self) -> &Self {
        match self {
            Self::TransactionFailed { source, .. } => source.cause(),
            other => other,
        }
    }

    /// Failures that happened while cleaning up after the original error.
    #[must_use]
    pub fn cleanup_errors(&self) -> &[Self] {
        match self {
            Self::TransactionFailed { cleanup, .. } => cleanup,
            _ => &[],
        }
    }

    #[must_use]
    pub const fn is_not_an_entity(&self) -> bool {
        matches!(self, Self::NotAnEntity(_))
    }

    #[must_use]
    pub const fn is_missing_primary_key(&self) -> bool {
        matches!(self, Self::MissingPrimaryKey { .. })
    }

    #[must_use]
    pub const fn is_unsupported_field_type(&self) -> bool {
        matches!(self, Self::UnsupportedFieldType(_))
    }

    #[must_use]
    pub const fn is_mapping(&self) -> bool {
        matches!(self, Self::Mapping { .. })
    }

    #[must_use]
    pub const fn is_pool_exhausted(&self) -> bool {
        matches!(self, Self::PoolExhausted)
    }

    #[must_use]
    pub const fn is_pool_closed(&self) -> bool {
        matches!(self, Self::PoolClosed)
    }

    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::PoolTimeout(_))
    }

    #[must_use]
    pub const fn is_invalid_savepoint(&self) -> bool {
        matches!(self, Self::InvalidSavepoint(_))
    }

    #[must_use]
    pub const fn is_transaction_failed(&self) -> bool {
        matches!(self, Self::TransactionFailed { .. })
    }

    #[must_use]
    pub const fn is_database(&self) -> bool {
        matches!(self, Self::Database(_))
    }

    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_an_entity_predicate() {
        let err = Error::NotAnEntity("app::Customer");
        assert!(err.is_not_an_entity());
        assert!(!err.is_mapping());
        assert!(err.to_string().contains("app::Customer"));
    }

    #[test]
    fn test_missing_primary_key_display() {
        let err = Error::missing_primary_key("customer");
        assert!(err.is_missing_primary_key());
        assert_eq!(
            err.to_string(),
            "Primary key is not set for entity in table 'customer'"
        );
    }

    #[test]
    fn test_unsupported_field_type_display() {
        let err = Error::UnsupportedFieldType(FieldType::Real);
        assert!(err.is_unsupported_field_type());
        assert!(err.to_string().contains("REAL"));
    }

    #[test]
    fn test_mapping_constructor() {
        let err = Error::mapping("first_name", "expected text, got integer");
        assert!(err.is_mapping());
        assert!(err.to_string().contains("first_name"));
        assert!(err.to_string().contains("expected text"));
    }

    #[test]
    fn test_pool_predicates() {
        assert!(Error::PoolExhausted.is_pool_exhausted());
        assert!(Error::PoolClosed.is_pool_closed());
        assert!(Error::PoolTimeout(Duration::from_secs(2)).is_timeout());
        assert!(!Error::PoolClosed.is_pool_exhausted());
    }

    #[test]
    fn test_transaction_failed_keeps_primary_first() {
        let err = Error::transaction_failed(
            Error::InvalidSavepoint("sp1".into()),
            vec![Error::database("rollback failed")],
        );

        assert!(err.is_transaction_failed());
        assert!(err.cause().is_invalid_savepoint());
        assert_eq!(err.cleanup_errors().len(), 1);
        assert!(err.to_string().contains("sp1"));
    }

    #[test]
    fn test_cause_of_plain_error_is_itself() {
        let err = Error::PoolClosed;
        assert!(err.cause().is_pool_closed());
        assert!(err.cleanup_errors().is_empty());
    }

    #[test]
    fn test_database_error_source() {
        let io = std::io::Error::other("disk full");
        let err = Error::database(io);
        assert!(err.is_database());
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().contains("disk full"));
    }
}
