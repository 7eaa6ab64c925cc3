//! Keel Query - Pull-based query execution core.
//!
//! This crate provides the machinery that turns an immutable operator tree
//! into rows:
//!
//! - `cursor`: The cursor protocol and its IDLE / ACTIVE / DESTROYED state machine
//! - `operator`: Immutable plan nodes that build cursor trees
//! - `bindings`: Per-scan parameter and intermediate value slots
//! - `bindings_cursor`: Streams of bindings sets feeding nested scans
//! - `context`: Per-query context: storage adapter, settings, cancellation
//! - `adapter`: The storage engine boundary and sorter contract
//! - `row_buffer`: Bounded lookahead queue and re-scannable row buffer
//! - `executor`: Concrete operators (scans, hierarchy lookups, filter, count, sort, joins, bloom filter semi-joins, mutations)
//! - `api`: `execute` / `run` entry points
//!
//! # Example
//!
//! ```rust,ignore
//! use keel_query::{api, executor::GroupScan, QueryBindings, QueryContext};
//! use std::sync::Arc;
//!
//! let context = QueryContext::new(store);
//! let plan: keel_query::OperatorRef = Arc::new(GroupScan::new(users));
//! let mut cursor = api::execute(&plan, &context)?;
//! let rows = api::collect_rows(&mut cursor, &Arc::new(QueryBindings::new()))?;
//! ```

pub mod adapter;
pub mod api;
pub mod bindings;
pub mod bindings_cursor;
pub mod bloom;
pub mod context;
pub mod cursor;
pub mod error;
pub mod executor;
pub mod observer;
pub mod operator;
pub mod row_buffer;
pub mod scan_limit;

#[cfg(test)]
mod test_support;

pub use adapter::{
    IndexBound, IndexDef, IndexKeyRange, IndexOrdering, IndexScanSelector, ResolvedKeyRange,
    RowOrdering, SortKey, SortOption, SortedRows, Sorter, StoreAdapter,
};
pub use bindings::{ArrayBindings, BindingValue, Bindings, BoundValue, QueryBindings, Slot, SparseArray};
pub use bindings_cursor::{
    BindingsCursor, BoxedBindingsCursor, PrefetchBindingsCursor, SingletonBindingsCursor,
};
pub use bloom::BloomFilter;
pub use context::{ExecutionConfig, QueryContext};
pub use cursor::{settle_next, BoxedCursor, Cursor, CursorBase, CursorLifecycle, CursorState};
pub use error::{ExecutionError, Result};
pub use observer::{ExecutionObserver, NoopObserver, OperatorCounts, OperatorStats};
pub use operator::{Operator, OperatorRef, UpdatePlannable, UpdateResult};
pub use row_buffer::{BoundedRowQueue, RowHolder, RowScanBuffer};
pub use scan_limit::{no_limit, Limit, NoLimit, PredicateLimit};
