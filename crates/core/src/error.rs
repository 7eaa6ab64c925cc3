//! Storage-layer error types for keel.

use crate::types::DataType;
use thiserror::Error;

/// Result type alias for storage-layer operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Failures raised by the storage engine and row-level constraint checks.
///
/// The execution core propagates these unchanged through the cursor tree.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Row or record not found.
    #[error("Not found in table {table}: {key}")]
    NotFound { table: String, key: String },

    /// Null constraint violation.
    #[error("Null constraint violation on {table}.{column}")]
    NullConstraint { table: String, column: String },

    /// Unique constraint violation.
    #[error("Unique constraint violation in table {table}: duplicate key {key}")]
    UniqueConstraint { table: String, key: String },

    /// Type mismatch error.
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: DataType, got: DataType },

    /// Table not found.
    #[error("Table not found: {name}")]
    TableNotFound { name: String },

    /// Index not found.
    #[error("Index {index} not found on table {table}")]
    IndexNotFound { table: String, index: String },

    /// Invalid operation.
    #[error("Invalid operation: {message}")]
    InvalidOperation { message: String },
}

impl Error {
    /// Creates a not found error.
    pub fn not_found(table: impl Into<String>, key: impl ToString) -> Self {
        Error::NotFound {
            table: table.into(),
            key: key.to_string(),
        }
    }

    /// Creates a null constraint error.
    pub fn null_constraint(table: impl Into<String>, column: impl Into<String>) -> Self {
        Error::NullConstraint {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Creates a unique constraint error.
    pub fn unique_constraint(table: impl Into<String>, key: impl ToString) -> Self {
        Error::UniqueConstraint {
            table: table.into(),
            key: key.to_string(),
        }
    }

    /// Creates a type mismatch error.
    pub fn type_mismatch(expected: DataType, got: DataType) -> Self {
        Error::TypeMismatch { expected, got }
    }

    /// Creates a table not found error.
    pub fn table_not_found(name: impl Into<String>) -> Self {
        Error::TableNotFound { name: name.into() }
    }

    /// Creates an index not found error.
    pub fn index_not_found(table: impl Into<String>, index: impl Into<String>) -> Self {
        Error::IndexNotFound {
            table: table.into(),
            index: index.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Error::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns true for constraint violations raised while writing a row.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            Error::NullConstraint { .. } | Error::UniqueConstraint { .. } | Error::TypeMismatch { .. }
        )
    }
}
