//! Keel Storage - In-memory storage adapter for the keel execution core.
//!
//! `MemoryStore` implements `keel_query::StoreAdapter` over tables held in
//! memory:
//!
//! - `table`: Per-table rows ordered by hierarchical key, primary-key lookup, secondary indexes
//! - `store`: The adapter itself: table hierarchy, writes, counts, hkeys, cancellation
//! - `cursor`: Group and index cursors (snapshot on open, `jump` support)
//! - `sorter`: Stable in-memory sorter with optional duplicate suppression
//!
//! # Example
//!
//! ```rust
//! use keel_core::{DataType, FieldDef, Row, TypeRegistry, Value};
//! use keel_query::{api, executor::GroupScan, OperatorRef, QueryBindings, QueryContext, StoreAdapter};
//! use keel_storage::MemoryStore;
//! use std::sync::Arc;
//!
//! let registry = TypeRegistry::new();
//! let users = registry.table_type("users", vec![FieldDef::not_null("id", DataType::Int64)], vec![0]);
//!
//! let store = MemoryStore::new();
//! store.create_table(&users).unwrap();
//! store.write_row(&Row::new(users.clone(), vec![Value::Int64(1)])).unwrap();
//!
//! let context = QueryContext::new(Arc::new(store));
//! let plan: OperatorRef = Arc::new(GroupScan::new(users));
//! let mut cursor = api::execute(&plan, &context).unwrap();
//! let rows = api::collect_rows(&mut cursor, &Arc::new(QueryBindings::new())).unwrap();
//! assert_eq!(rows.len(), 1);
//! ```

mod cursor;
mod sorter;
mod store;
mod table;

pub use store::MemoryStore;
pub use table::{ParentLink, SecondaryIndex, TableStore};
