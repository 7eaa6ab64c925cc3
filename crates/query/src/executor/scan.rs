//! Storage scans: full-table group scans and index range scans.

use crate::adapter::{IndexDef, IndexKeyRange, IndexOrdering, IndexScanSelector};
use crate::bindings::QueryBindings;
use crate::context::QueryContext;
use crate::cursor::{settle_next, BoxedCursor, Cursor, CursorBase, CursorLifecycle, CursorState};
use crate::error::Result;
use crate::operator::Operator;
use crate::scan_limit::{no_limit, Limit};
use keel_core::{Row, RowTypeRef};
use std::sync::Arc;

/// Scans every row of a table in hierarchical key order.
pub struct GroupScan {
    table: RowTypeRef,
    limit: Arc<dyn Limit>,
}

impl GroupScan {
    /// Creates an unlimited scan of `table`.
    pub fn new(table: RowTypeRef) -> Self {
        Self {
            table,
            limit: no_limit(),
        }
    }

    /// Stops the scan at the first row `limit` reports as reached.
    pub fn with_limit(mut self, limit: Arc<dyn Limit>) -> Self {
        self.limit = limit;
        self
    }
}

impl Operator for GroupScan {
    fn name(&self) -> &'static str {
        "GroupScan"
    }

    fn row_type(&self) -> Option<&RowTypeRef> {
        Some(&self.table)
    }

    fn cursor(&self, context: &QueryContext) -> Result<BoxedCursor> {
        tracing::debug!(table = %self.table, "creating group cursor");
        let storage = context
            .adapter()
            .new_group_cursor(context, &self.table, Arc::clone(&self.limit))?;
        Ok(Box::new(StorageScanCursor {
            base: CursorBase::new("GroupScan", context),
            storage,
            last_bindings: None,
        }))
    }

    fn describe(&self) -> String {
        format!("GroupScan({})", self.table.name())
    }
}

/// Scans an index over a key range.
pub struct IndexScan {
    index: IndexDef,
    range: IndexKeyRange,
    ordering: IndexOrdering,
    selector: IndexScanSelector,
}

impl IndexScan {
    /// Creates an ascending scan of `index` over `range`.
    pub fn new(index: IndexDef, range: IndexKeyRange) -> Self {
        Self {
            index,
            range,
            ordering: IndexOrdering::Ascending,
            selector: IndexScanSelector::All,
        }
    }

    /// Sets the scan direction.
    pub fn ordering(mut self, ordering: IndexOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    /// Restricts which tables' rows are returned.
    pub fn selector(mut self, selector: IndexScanSelector) -> Self {
        self.selector = selector;
        self
    }
}

impl Operator for IndexScan {
    fn name(&self) -> &'static str {
        "IndexScan"
    }

    fn row_type(&self) -> Option<&RowTypeRef> {
        Some(&self.index.table)
    }

    fn cursor(&self, context: &QueryContext) -> Result<BoxedCursor> {
        tracing::debug!(index = %self.index.name, range = %self.range, "creating index cursor");
        let storage = context.adapter().new_index_cursor(
            context,
            &self.index,
            &self.range,
            self.ordering,
            &self.selector,
        )?;
        Ok(Box::new(StorageScanCursor {
            base: CursorBase::new("IndexScan", context),
            storage,
            last_bindings: None,
        }))
    }

    fn describe(&self) -> String {
        let direction = match self.ordering {
            IndexOrdering::Ascending => "ASC",
            IndexOrdering::Descending => "DESC",
        };
        format!(
            "IndexScan({}.{} {} {})",
            self.index.table.name(),
            self.index.name,
            self.range,
            direction
        )
    }
}

/// Wraps a storage cursor, adding cancellation checks and observation.
struct StorageScanCursor {
    base: CursorBase,
    storage: BoxedCursor,
    // Kept between scans so an IDLE cursor can be repositioned by `jump`.
    last_bindings: Option<Arc<QueryBindings>>,
}

impl StorageScanCursor {
    fn next_row(&mut self) -> Result<Option<Row>> {
        self.base.check_cancellation()?;
        let row = self.storage.next()?;
        if let Some(row) = &row {
            self.base.row_produced(row);
        }
        Ok(row)
    }

    fn reposition(&mut self, row: &Row) -> Result<()> {
        if self.storage.is_idle() {
            let Some(bindings) = self.last_bindings.clone() else {
                return CursorLifecycle::check_active(self.base.name(), CursorState::Idle);
            };
            self.storage.open(&bindings)?;
        }
        self.storage.jump(row)
    }
}

impl Cursor for StorageScanCursor {
    fn open(&mut self, bindings: &Arc<QueryBindings>) -> Result<()> {
        self.base.open()?;
        self.last_bindings = Some(Arc::clone(bindings));
        if let Err(err) = self.storage.open(bindings) {
            self.close();
            return Err(err);
        }
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Row>> {
        if !self.base.check_next()? {
            return Ok(None);
        }
        let result = self.next_row();
        settle_next(self, result)
    }

    fn jump(&mut self, row: &Row) -> Result<()> {
        self.base.jump()?;
        if let Err(err) = self.reposition(row) {
            self.close();
            return Err(err);
        }
        Ok(())
    }

    fn close(&mut self) {
        if self.base.close() {
            self.storage.close();
        }
    }

    fn destroy(&mut self) {
        self.close();
        self.storage.destroy();
        self.last_bindings = None;
        self.base.destroy();
    }

    fn state(&self) -> CursorState {
        self.base.state()
    }

    fn name(&self) -> &'static str {
        self.base.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExecutionError;
    use crate::scan_limit::PredicateLimit;
    use crate::test_support::{test_context, TestAdapter};
    use keel_core::{DataType, FieldDef, TypeRegistry, Value};

    fn setup() -> (RowTypeRef, TestAdapter) {
        let t = TypeRegistry::new().table_type(
            "nums",
            vec![FieldDef::not_null("n", DataType::Int64)],
            vec![0],
        );
        let rows = (1..=5).map(|n| Row::new(t.clone(), vec![Value::Int64(n)])).collect();
        let adapter = TestAdapter::new().with_table(&t, rows);
        (t, adapter)
    }

    fn drain(cursor: &mut BoxedCursor) -> Vec<i64> {
        let mut out = Vec::new();
        while let Some(row) = cursor.next().unwrap() {
            out.push(row.field(0).and_then(Value::as_i64).unwrap());
        }
        out
    }

    #[test]
    fn test_group_scan_all_rows() {
        let (t, adapter) = setup();
        let context = test_context(adapter);
        let mut cursor = GroupScan::new(t).cursor(&context).unwrap();
        cursor.open(&Arc::new(QueryBindings::new())).unwrap();
        assert_eq!(drain(&mut cursor), vec![1, 2, 3, 4, 5]);
        assert!(cursor.next().unwrap().is_none());
        cursor.destroy();
        assert!(cursor.is_destroyed());
    }

    #[test]
    fn test_group_scan_limit() {
        let (t, adapter) = setup();
        let context = test_context(adapter);
        let limit = PredicateLimit::new("n > 3", |row: &Row| {
            row.field(0).and_then(Value::as_i64).is_some_and(|n| n > 3)
        });
        let scan = GroupScan::new(t).with_limit(Arc::new(limit));
        let mut cursor = scan.cursor(&context).unwrap();
        cursor.open(&Arc::new(QueryBindings::new())).unwrap();
        assert_eq!(drain(&mut cursor), vec![1, 2, 3]);
    }

    #[test]
    fn test_adapter_cancellation_stops_scan() {
        let (t, adapter) = setup();
        let context = test_context(adapter.clone());
        let mut cursor = GroupScan::new(t).cursor(&context).unwrap();
        cursor.open(&Arc::new(QueryBindings::new())).unwrap();
        assert!(cursor.next().unwrap().is_some());
        adapter.cancel();
        assert_eq!(cursor.next(), Err(ExecutionError::QueryCanceled));
        assert!(cursor.is_idle());
    }

    #[test]
    fn test_jump_unsupported_by_group_cursor() {
        let (t, adapter) = setup();
        let context = test_context(adapter);
        let mut cursor = GroupScan::new(t.clone()).cursor(&context).unwrap();
        let row = Row::new(t, vec![Value::Int64(3)]);
        assert!(matches!(
            cursor.jump(&row),
            Err(ExecutionError::LifecycleViolation { .. })
        ));
        cursor.open(&Arc::new(QueryBindings::new())).unwrap();
        assert!(matches!(
            cursor.jump(&row),
            Err(ExecutionError::Unsupported { .. })
        ));
        assert!(cursor.is_idle());
    }

    #[test]
    fn test_index_scan_describe() {
        let (t, _) = setup();
        let index = IndexDef::new("nums_n", t, 0, true);
        let scan = IndexScan::new(index, IndexKeyRange::point(Value::Int64(2)))
            .ordering(IndexOrdering::Descending);
        assert_eq!(scan.describe(), "IndexScan(nums.nums_n [2, 2] DESC)");
    }
}
