//! Keel Core - Value, row and row-type definitions for the keel execution engine.
//!
//! This crate provides the foundational types shared by the execution core
//! and storage adapters:
//!
//! - `DataType`: Supported scalar types
//! - `Value`: Runtime scalar values
//! - `RowType`: Row shapes, table-backed or derived, allocated by a `TypeRegistry`
//! - `HKey`: Hierarchical storage keys
//! - `Row`: Immutable, shareable rows
//! - `Error`: Storage-layer error types
//!
//! # Example
//!
//! ```rust
//! use keel_core::{DataType, FieldDef, Row, TypeRegistry, Value};
//!
//! let registry = TypeRegistry::new();
//! let users = registry.table_type(
//!     "users",
//!     vec![
//!         FieldDef::not_null("id", DataType::Int64),
//!         FieldDef::new("name", DataType::String),
//!     ],
//!     vec![0],
//! );
//!
//! let row = Row::new(users, vec![Value::Int64(1), Value::String("Alice".into())]);
//! assert_eq!(row.field(1), Some(&Value::String("Alice".into())));
//! ```

mod error;
mod hkey;
mod row;
mod row_type;
mod types;
mod value;

pub use error::{Error, Result};
pub use hkey::{HKey, HKeySegment};
pub use row::Row;
pub use row_type::{DerivedKind, FieldDef, RowType, RowTypeId, RowTypeKind, RowTypeRef, TypeRegistry};
pub use types::DataType;
pub use value::Value;
