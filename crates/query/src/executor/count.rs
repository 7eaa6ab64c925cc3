//! Table row count from stored table status.

use crate::bindings::QueryBindings;
use crate::context::QueryContext;
use crate::cursor::{settle_next, BoxedCursor, Cursor, CursorBase, CursorState};
use crate::error::Result;
use crate::operator::Operator;
use hashbrown::HashSet;
use keel_core::{Row, RowTypeRef, Value};
use std::sync::Arc;

/// Produces a single row holding the stored row count of a table.
///
/// The count comes straight from the storage adapter; no rows are read.
pub struct CountTableStatus {
    table: RowTypeRef,
    result_type: RowTypeRef,
}

impl CountTableStatus {
    /// Creates a count of `table`. `result_type` must have a single
    /// Int64 field, see `TypeRegistry::count_type`.
    pub fn new(table: RowTypeRef, result_type: RowTypeRef) -> Self {
        debug_assert_eq!(result_type.n_fields(), 1);
        Self { table, result_type }
    }
}

impl Operator for CountTableStatus {
    fn name(&self) -> &'static str {
        "CountTableStatus"
    }

    fn row_type(&self) -> Option<&RowTypeRef> {
        Some(&self.result_type)
    }

    fn find_derived_types(&self, derived: &mut HashSet<RowTypeRef>) {
        derived.insert(self.result_type.clone());
    }

    fn cursor(&self, context: &QueryContext) -> Result<BoxedCursor> {
        Ok(Box::new(CountCursor {
            base: CursorBase::new("CountTableStatus", context),
            table: self.table.clone(),
            result_type: self.result_type.clone(),
            pending: false,
        }))
    }

    fn describe(&self) -> String {
        format!("CountTableStatus({})", self.table.name())
    }
}

struct CountCursor {
    base: CursorBase,
    table: RowTypeRef,
    result_type: RowTypeRef,
    pending: bool,
}

impl CountCursor {
    fn next_row(&mut self) -> Result<Option<Row>> {
        self.base.check_cancellation()?;
        if !self.pending {
            return Ok(None);
        }
        self.pending = false;
        let count = self.base.context().adapter().row_count(&self.table)?;
        let row = Row::new(self.result_type.clone(), vec![Value::Int64(count as i64)]);
        self.base.row_produced(&row);
        Ok(Some(row))
    }
}

impl Cursor for CountCursor {
    fn open(&mut self, _bindings: &Arc<QueryBindings>) -> Result<()> {
        self.base.open()?;
        self.pending = true;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Row>> {
        if !self.base.check_next()? {
            return Ok(None);
        }
        let result = self.next_row();
        let result = settle_next(self, result);
        // The single result row ends the scan.
        if let Ok(Some(_)) = &result {
            self.close();
        }
        result
    }

    fn close(&mut self) {
        if self.base.close() {
            self.pending = false;
        }
    }

    fn destroy(&mut self) {
        self.close();
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
    use crate::test_support::{test_context, TestAdapter};
    use keel_core::{DataType, FieldDef, TypeRegistry};

    fn setup() -> (RowTypeRef, RowTypeRef) {
        let registry = TypeRegistry::new();
        let table = registry.table_type("orders", vec![FieldDef::new("id", DataType::Int64)], vec![0]);
        (table, registry.count_type())
    }

    #[test]
    fn test_returns_stored_count_once() {
        let (table, count_type) = setup();
        let adapter = TestAdapter::new();
        adapter.set_row_count(&table, 42);
        let context = test_context(adapter);
        let count = CountTableStatus::new(table, count_type.clone());
        let mut cursor = count.cursor(&context).unwrap();
        let bindings = Arc::new(QueryBindings::new());

        cursor.open(&bindings).unwrap();
        assert_eq!(
            cursor.next().unwrap(),
            Some(Row::new(count_type, vec![Value::Int64(42)]))
        );
        assert!(cursor.is_idle());
        assert!(cursor.next().unwrap().is_none());

        cursor.open(&bindings).unwrap();
        assert!(cursor.next().unwrap().is_some());
        cursor.destroy();
    }

    #[test]
    fn test_close_before_next_discards_result() {
        let (table, count_type) = setup();
        let adapter = TestAdapter::new();
        adapter.set_row_count(&table, 1);
        let count = CountTableStatus::new(table, count_type);
        let mut cursor = count.cursor(&test_context(adapter)).unwrap();
        cursor.open(&Arc::new(QueryBindings::new())).unwrap();
        cursor.close();
        assert!(cursor.next().unwrap().is_none());
    }

    #[test]
    fn test_storage_error_propagates() {
        let (table, count_type) = setup();
        let count = CountTableStatus::new(table, count_type);
        let mut cursor = count.cursor(&test_context(TestAdapter::new())).unwrap();
        cursor.open(&Arc::new(QueryBindings::new())).unwrap();
        assert_eq!(
            cursor.next().unwrap_err(),
            ExecutionError::Storage(keel_core::Error::table_not_found("orders"))
        );
        assert!(cursor.is_idle());
    }

    #[test]
    fn test_result_type_is_derived() {
        let (table, count_type) = setup();
        let count = CountTableStatus::new(table, count_type.clone());
        let mut derived = HashSet::new();
        count.find_derived_types(&mut derived);
        assert_eq!(derived.len(), 1);
        assert!(derived.contains(&count_type));
    }
}
