//! Delete, as a one-shot modification or as a pass-through cursor.

use super::modify_each;
use crate::bindings::QueryBindings;
use crate::context::QueryContext;
use crate::cursor::{settle_next, BoxedCursor, Cursor, CursorBase, CursorState};
use crate::error::Result;
use crate::operator::{Operator, OperatorRef, UpdatePlannable, UpdateResult};
use keel_core::{Row, RowTypeRef};
use std::sync::Arc;

/// Deletes every input row.
pub struct Delete {
    input: OperatorRef,
    cascade: bool,
}

impl Delete {
    /// Creates a delete of the rows `input` produces.
    pub fn new(input: OperatorRef) -> Self {
        Self {
            input,
            cascade: false,
        }
    }

    /// Also deletes rows nested under each deleted row.
    pub fn cascading(mut self) -> Self {
        self.cascade = true;
        self
    }
}

impl UpdatePlannable for Delete {
    fn name(&self) -> &'static str {
        "Delete"
    }

    fn input_operators(&self) -> Vec<&dyn Operator> {
        vec![self.input.as_ref()]
    }

    fn describe(&self) -> String {
        if self.cascade {
            "Delete(cascade)".to_string()
        } else {
            "Delete".to_string()
        }
    }

    fn run(&self, context: &QueryContext, bindings: &Arc<QueryBindings>) -> Result<UpdateResult> {
        modify_each(self.name(), &self.input, context, bindings, |row| {
            context.adapter().delete_row(&row, self.cascade)?;
            Ok(true)
        })
    }
}

/// Deletes each input row and passes it on, for `DELETE ... RETURNING`.
///
/// A row the storage engine cannot find aborts the whole scan.
pub struct DeleteReturning {
    input: OperatorRef,
    cascade: bool,
}

impl DeleteReturning {
    /// Creates a returning delete of the rows `input` produces.
    pub fn new(input: OperatorRef) -> Self {
        Self {
            input,
            cascade: false,
        }
    }

    /// Also deletes rows nested under each deleted row.
    pub fn cascading(mut self) -> Self {
        self.cascade = true;
        self
    }
}

impl Operator for DeleteReturning {
    fn name(&self) -> &'static str {
        "DeleteReturning"
    }

    fn row_type(&self) -> Option<&RowTypeRef> {
        self.input.row_type()
    }

    fn input_operators(&self) -> Vec<&dyn Operator> {
        vec![self.input.as_ref()]
    }

    fn cursor(&self, context: &QueryContext) -> Result<BoxedCursor> {
        Ok(Box::new(DeleteReturningCursor {
            base: CursorBase::new("DeleteReturning", context),
            input: self.input.cursor(context)?,
            cascade: self.cascade,
            deleted: 0,
        }))
    }
}

struct DeleteReturningCursor {
    base: CursorBase,
    input: BoxedCursor,
    cascade: bool,
    deleted: u64,
}

impl DeleteReturningCursor {
    fn next_row(&mut self) -> Result<Option<Row>> {
        self.base.check_cancellation()?;
        let Some(row) = self.input.next()? else {
            return Ok(None);
        };
        self.base.context().adapter().delete_row(&row, self.cascade)?;
        self.deleted += 1;
        self.base.row_produced(&row);
        Ok(Some(row))
    }
}

impl Cursor for DeleteReturningCursor {
    fn open(&mut self, bindings: &Arc<QueryBindings>) -> Result<()> {
        self.base.open()?;
        self.deleted = 0;
        if let Err(err) = self.input.open(bindings) {
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

    fn close(&mut self) {
        if self.base.close() {
            self.input.close();
            let result = UpdateResult::new(self.deleted, self.deleted);
            self.base.context().observer().rows_modified("DeleteReturning", &result);
            tracing::debug!(operator = "DeleteReturning", %result, "scan closed");
        }
    }

    fn destroy(&mut self) {
        self.close();
        self.input.destroy();
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
    use crate::executor::GroupScan;
    use crate::observer::OperatorStats;
    use crate::test_support::{test_context, RowsOperator, TestAdapter};
    use keel_core::{DataType, Error, FieldDef, TypeRegistry, Value};

    fn setup() -> (RowTypeRef, Vec<Row>, TestAdapter) {
        let t = TypeRegistry::new().table_type(
            "people",
            vec![FieldDef::not_null("id", DataType::Int64)],
            vec![0],
        );
        let rows: Vec<Row> = (1..=3)
            .map(|n| Row::new(t.clone(), vec![Value::Int64(n)]))
            .collect();
        let adapter = TestAdapter::new().with_table(&t, rows.clone());
        (t, rows, adapter)
    }

    #[test]
    fn test_delete_runs_to_completion() {
        let (t, rows, adapter) = setup();
        let context = test_context(adapter.clone());
        let delete = Delete::new(Arc::new(RowsOperator::new(rows.clone())));

        let result = delete.run(&context, &Arc::new(QueryBindings::new())).unwrap();
        assert_eq!(result, UpdateResult::new(3, 3));
        assert_eq!(adapter.deleted(), rows);
        assert!(adapter.rows(&t).is_empty());
    }

    #[test]
    fn test_delete_returning_passes_rows_through() {
        let (t, rows, adapter) = setup();
        let stats = Arc::new(OperatorStats::new());
        let context = test_context(adapter.clone()).with_observer(stats.clone());
        let delete = DeleteReturning::new(Arc::new(RowsOperator::new(rows.clone())));
        assert_eq!(delete.row_type(), None);

        let mut cursor = delete.cursor(&context).unwrap();
        cursor.open(&Arc::new(QueryBindings::new())).unwrap();
        let mut returned = Vec::new();
        while let Some(row) = cursor.next().unwrap() {
            returned.push(row);
        }
        assert_eq!(returned, rows);
        assert!(adapter.rows(&t).is_empty());
        assert_eq!(stats.get("DeleteReturning").modified, 3);
    }

    #[test]
    fn test_missing_row_aborts_scan() {
        let (t, rows, adapter) = setup();
        let ghost = Row::new(t.clone(), vec![Value::Int64(99)]);
        let input = RowsOperator::new(vec![rows[0].clone(), ghost.clone(), rows[1].clone()]);
        let context = test_context(adapter.clone());
        let mut cursor = DeleteReturning::new(Arc::new(input)).cursor(&context).unwrap();
        cursor.open(&Arc::new(QueryBindings::new())).unwrap();

        assert_eq!(cursor.next().unwrap(), Some(rows[0].clone()));
        assert_eq!(
            cursor.next().unwrap_err(),
            ExecutionError::Storage(Error::not_found("people", &ghost))
        );
        assert!(cursor.is_idle());
        assert_eq!(adapter.rows(&t), rows[1..].to_vec());
    }

    #[test]
    fn test_delete_over_group_scan() {
        let (t, _, adapter) = setup();
        let context = test_context(adapter.clone());
        let scan: OperatorRef = Arc::new(GroupScan::new(t.clone()));
        let delete = Delete::new(scan).cascading();
        assert_eq!(delete.describe_plan(), "Delete(cascade)\n  GroupScan(people)\n");

        let result = delete.run(&context, &Arc::new(QueryBindings::new())).unwrap();
        assert_eq!(result.rows_modified(), 3);
        assert!(adapter.rows(&t).is_empty());
    }
}
