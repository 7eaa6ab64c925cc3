//! The storage adapter boundary.
//!
//! `StoreAdapter` is everything the execution core asks of the storage
//! engine. Calls are synchronous and treated as atomic; locking and
//! durability are the engine's business. Any error an adapter returns is
//! propagated unchanged through the cursor tree.

use crate::bindings::{BoundValue, QueryBindings};
use crate::context::QueryContext;
use crate::cursor::{BoxedCursor, Cursor};
use crate::error::Result;
use crate::scan_limit::Limit;
use core::cmp::Ordering;
use core::fmt;
use core::ops::Bound;
use keel_core::{HKey, Row, RowType, RowTypeId, RowTypeRef, Value};
use std::sync::Arc;
use std::time::Instant;

/// Storage engine operations used by the execution core.
pub trait StoreAdapter: Send + Sync {
    /// Creates a cursor over every row of `table` in hkey order, stopping
    /// early at the first row `limit` reports as reached.
    fn new_group_cursor(
        &self,
        context: &QueryContext,
        table: &RowTypeRef,
        limit: Arc<dyn Limit>,
    ) -> Result<BoxedCursor>;

    /// Creates a cursor over the rows of `index` whose key falls in `range`.
    /// The range is resolved against the bindings given at each `open`.
    fn new_index_cursor(
        &self,
        context: &QueryContext,
        index: &IndexDef,
        range: &IndexKeyRange,
        ordering: IndexOrdering,
        selector: &IndexScanSelector,
    ) -> Result<BoxedCursor>;

    /// Creates a single-use sorter.
    fn create_sorter(
        &self,
        context: &QueryContext,
        row_type: &RowTypeRef,
        ordering: &RowOrdering,
        option: SortOption,
    ) -> Result<Box<dyn Sorter>>;

    /// Stores a new row.
    fn write_row(&self, row: &Row) -> Result<()>;

    /// Replaces `old` with `new`. Both rows have the same type.
    fn update_row(&self, old: &Row, new: &Row) -> Result<()>;

    /// Deletes `row`. With `cascade`, rows nested under its hkey go too.
    fn delete_row(&self, row: &Row, cascade: bool) -> Result<()>;

    /// Returns the stored row count of `table` without scanning it.
    fn row_count(&self, table: &RowType) -> Result<u64>;

    /// Returns an empty hierarchical key for a row of `table`.
    fn new_hkey(&self, table: &RowType) -> HKey;

    /// Fails if the storage engine wants the query started at
    /// `query_start` to stop.
    fn check_query_cancelation(&self, _query_start: Instant) -> Result<()> {
        Ok(())
    }
}

/// Rows produced by a sorter, in sorted order.
pub type SortedRows = Box<dyn Iterator<Item = Result<Row>> + Send>;

/// Single-use component that materializes and orders a row stream.
///
/// `sort` consumes the sorter, so a sorter can never be used for a
/// second scan.
pub trait Sorter: Send {
    /// Drains the already open `input` and returns its rows in order.
    fn sort(self: Box<Self>, input: &mut dyn Cursor) -> Result<SortedRows>;
}

/// Whether a sort keeps rows that compare equal on every key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SortOption {
    /// Keep every row.
    #[default]
    PreserveDuplicates,
    /// Keep the first of each run of rows with equal values.
    SuppressDuplicates,
}

/// One sort key: a field index and a direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SortKey {
    /// Field index in the input row.
    pub field: usize,
    /// Ascending when true.
    pub ascending: bool,
}

impl SortKey {
    /// Ascending key on `field`.
    pub fn asc(field: usize) -> Self {
        Self {
            field,
            ascending: true,
        }
    }

    /// Descending key on `field`.
    pub fn desc(field: usize) -> Self {
        Self {
            field,
            ascending: false,
        }
    }
}

/// A lexicographic row ordering.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RowOrdering {
    keys: Vec<SortKey>,
}

impl RowOrdering {
    /// Creates an ordering from keys, most significant first.
    pub fn new(keys: Vec<SortKey>) -> Self {
        Self { keys }
    }

    /// Appends a less significant key.
    pub fn then(mut self, key: SortKey) -> Self {
        self.keys.push(key);
        self
    }

    /// Returns the keys.
    pub fn keys(&self) -> &[SortKey] {
        &self.keys
    }

    /// Compares two rows. Null sorts before every other value.
    pub fn compare(&self, a: &Row, b: &Row) -> Ordering {
        for key in &self.keys {
            let ord = a.field(key.field).cmp(&b.field(key.field));
            let ord = if key.ascending { ord } else { ord.reverse() };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

impl fmt::Display for RowOrdering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, key) in self.keys.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "${} {}", key.field, if key.ascending { "ASC" } else { "DESC" })?;
        }
        Ok(())
    }
}

/// A single-column secondary index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexDef {
    /// Index name, unique per table.
    pub name: String,
    /// Indexed table.
    pub table: RowTypeRef,
    /// Indexed field.
    pub column: usize,
    /// Whether keys are unique.
    pub unique: bool,
}

impl IndexDef {
    /// Creates an index definition.
    pub fn new(name: impl Into<String>, table: RowTypeRef, column: usize, unique: bool) -> Self {
        Self {
            name: name.into(),
            table,
            column,
            unique,
        }
    }
}

/// Direction of an index scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum IndexOrdering {
    /// Increasing keys.
    #[default]
    Ascending,
    /// Decreasing keys.
    Descending,
}

/// Which tables an index scan returns rows for.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum IndexScanSelector {
    /// Every row the index covers.
    #[default]
    All,
    /// Only rows of these types.
    Tables(Vec<RowTypeId>),
}

impl IndexScanSelector {
    /// Returns true if rows of `row_type` are selected.
    pub fn matches(&self, row_type: &RowType) -> bool {
        match self {
            IndexScanSelector::All => true,
            IndexScanSelector::Tables(ids) => ids.contains(&row_type.id()),
        }
    }
}

/// One end of an index key range.
#[derive(Clone, Debug, PartialEq)]
pub struct IndexBound {
    /// Bound value, fixed or read from a binding.
    pub value: BoundValue,
    /// Whether the bound value itself is in range.
    pub inclusive: bool,
}

impl IndexBound {
    /// Inclusive bound.
    pub fn inclusive(value: impl Into<BoundValue>) -> Self {
        Self {
            value: value.into(),
            inclusive: true,
        }
    }

    /// Exclusive bound.
    pub fn exclusive(value: impl Into<BoundValue>) -> Self {
        Self {
            value: value.into(),
            inclusive: false,
        }
    }

    fn resolve(&self, bindings: &QueryBindings) -> Result<Bound<Value>> {
        let value = self.value.resolve(bindings)?;
        Ok(if self.inclusive {
            Bound::Included(value)
        } else {
            Bound::Excluded(value)
        })
    }
}

/// Key range of an index scan. Missing ends are unbounded.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct IndexKeyRange {
    /// Lower end.
    pub lo: Option<IndexBound>,
    /// Upper end.
    pub hi: Option<IndexBound>,
}

impl IndexKeyRange {
    /// The range covering every key.
    pub fn all() -> Self {
        Self::default()
    }

    /// The range holding exactly `value`.
    pub fn point(value: impl Into<BoundValue>) -> Self {
        let value = value.into();
        Self {
            lo: Some(IndexBound::inclusive(value.clone())),
            hi: Some(IndexBound::inclusive(value)),
        }
    }

    /// Creates a range from optional ends.
    pub fn between(lo: Option<IndexBound>, hi: Option<IndexBound>) -> Self {
        Self { lo, hi }
    }

    /// Resolves binding-slot bounds for one scan.
    pub fn resolve(&self, bindings: &QueryBindings) -> Result<ResolvedKeyRange> {
        let lo = match &self.lo {
            Some(bound) => bound.resolve(bindings)?,
            None => Bound::Unbounded,
        };
        let hi = match &self.hi {
            Some(bound) => bound.resolve(bindings)?,
            None => Bound::Unbounded,
        };
        Ok(ResolvedKeyRange { lo, hi })
    }
}

impl fmt::Display for IndexKeyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.lo {
            Some(b) => write!(f, "{}{}", if b.inclusive { "[" } else { "(" }, b.value)?,
            None => f.write_str("(-inf")?,
        }
        f.write_str(", ")?;
        match &self.hi {
            Some(b) => write!(f, "{}{}", b.value, if b.inclusive { "]" } else { ")" }),
            None => f.write_str("+inf)"),
        }
    }
}

/// An index key range with concrete values.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedKeyRange {
    /// Lower end.
    pub lo: Bound<Value>,
    /// Upper end.
    pub hi: Bound<Value>,
}

impl ResolvedKeyRange {
    /// Returns true if `key` is in range.
    pub fn contains(&self, key: &Value) -> bool {
        let above_lo = match &self.lo {
            Bound::Included(lo) => key >= lo,
            Bound::Excluded(lo) => key > lo,
            Bound::Unbounded => true,
        };
        let below_hi = match &self.hi {
            Bound::Included(hi) => key <= hi,
            Bound::Excluded(hi) => key < hi,
            Bound::Unbounded => true,
        };
        above_lo && below_hi
    }

    /// Returns true if no key can be in range.
    pub fn is_empty(&self) -> bool {
        match (&self.lo, &self.hi) {
            (Bound::Included(lo), Bound::Included(hi)) => lo > hi,
            (Bound::Included(lo), Bound::Excluded(hi))
            | (Bound::Excluded(lo), Bound::Included(hi))
            | (Bound::Excluded(lo), Bound::Excluded(hi)) => lo >= hi,
            _ => false,
        }
    }
}
