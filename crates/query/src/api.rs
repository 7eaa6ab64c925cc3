//! Entry points for driving plans.

use crate::bindings::QueryBindings;
use crate::context::QueryContext;
use crate::cursor::BoxedCursor;
use crate::error::Result;
use crate::operator::{Operator, OperatorRef, UpdatePlannable, UpdateResult};
use hashbrown::HashSet;
use keel_core::{Row, RowTypeRef};
use std::sync::Arc;

/// Builds the cursor tree of a read plan for one execution. The cursor is
/// IDLE; open it with the bindings of each scan.
pub fn execute(root: &OperatorRef, context: &QueryContext) -> Result<BoxedCursor> {
    cursor(root.as_ref(), context)
}

/// Like `execute`, for any operator reference.
pub fn cursor(root: &dyn Operator, context: &QueryContext) -> Result<BoxedCursor> {
    tracing::debug!(plan = %root.describe(), "building cursor tree");
    root.cursor(context)
}

/// Runs a modification plan to completion.
pub fn run(
    plan: &dyn UpdatePlannable,
    context: &QueryContext,
    bindings: &Arc<QueryBindings>,
) -> Result<UpdateResult> {
    tracing::debug!(plan = %plan.describe(), "running update plan");
    plan.run(context, bindings)
}

/// Opens `cursor` with `bindings`, reads every row, and leaves it IDLE.
pub fn collect_rows(cursor: &mut BoxedCursor, bindings: &Arc<QueryBindings>) -> Result<Vec<Row>> {
    cursor.open(bindings)?;
    let mut rows = Vec::new();
    loop {
        match cursor.next() {
            Ok(Some(row)) => rows.push(row),
            Ok(None) => return Ok(rows),
            Err(err) => {
                cursor.close();
                return Err(err);
            }
        }
    }
}

/// Returns the derived row types introduced anywhere in the plan.
pub fn derived_types(root: &dyn Operator) -> HashSet<RowTypeRef> {
    let mut derived = HashSet::new();
    root.find_derived_types(&mut derived);
    derived
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{CountTableStatus, Filter, Insert, ValuesScan};
    use crate::test_support::{test_context, TestAdapter};
    use keel_core::{DataType, FieldDef, TypeRegistry, Value};

    #[test]
    fn test_execute_and_collect() {
        let registry = TypeRegistry::new();
        let t = registry.values_type(vec![FieldDef::new("n", DataType::Int64)]);
        let rows: Vec<Row> = (0..3).map(|n| Row::new(t.clone(), vec![Value::Int64(n)])).collect();
        let values: OperatorRef = Arc::new(ValuesScan::from_rows(t.clone(), rows.clone()));
        let root: OperatorRef = Arc::new(Filter::new(values, &[t.clone()]));

        let context = test_context(TestAdapter::new());
        let mut cursor = execute(&root, &context).unwrap();
        let bindings = Arc::new(QueryBindings::new());
        assert_eq!(collect_rows(&mut cursor, &bindings).unwrap(), rows);
        assert_eq!(collect_rows(&mut cursor, &bindings).unwrap(), rows);
        assert!(cursor.is_idle());

        let derived = derived_types(root.as_ref());
        assert_eq!(derived.len(), 1);
        assert!(derived.contains(&t));
    }

    #[test]
    fn test_run_insert_then_count() {
        let registry = TypeRegistry::new();
        let t = registry.table_type("t", vec![FieldDef::not_null("n", DataType::Int64)], vec![0]);
        let rows: Vec<Row> = (0..4).map(|n| Row::new(t.clone(), vec![Value::Int64(n)])).collect();
        let adapter = TestAdapter::new().with_table(&t, Vec::new());
        let context = test_context(adapter);
        let bindings = Arc::new(QueryBindings::new());

        let insert = Insert::new(Arc::new(ValuesScan::from_rows(t.clone(), rows)));
        assert_eq!(run(&insert, &context, &bindings).unwrap(), UpdateResult::new(4, 4));

        let count = CountTableStatus::new(t, registry.count_type());
        let mut cursor = cursor(&count, &context).unwrap();
        let counted = collect_rows(&mut cursor, &bindings).unwrap();
        assert_eq!(counted.len(), 1);
        assert_eq!(counted[0].field(0), Some(&Value::Int64(4)));
    }
}
