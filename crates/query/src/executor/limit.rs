//! Skip and limit.

use crate::bindings::{BoundValue, QueryBindings};
use crate::context::QueryContext;
use crate::cursor::{settle_next, BoxedCursor, Cursor, CursorBase, CursorState};
use crate::error::Result;
use crate::operator::{Operator, OperatorRef};
use keel_core::{Row, RowTypeRef};
use std::sync::Arc;

/// Discards the first `skip` input rows and then passes at most `limit`.
///
/// Both counts are literals or binding slots, resolved when a scan opens.
pub struct SkipLimit {
    input: OperatorRef,
    skip: BoundValue,
    limit: Option<BoundValue>,
}

impl SkipLimit {
    /// Creates an operator passing rows unchanged; configure with
    /// `skip` and `limit`.
    pub fn new(input: OperatorRef) -> Self {
        Self {
            input,
            skip: BoundValue::Literal(0i64.into()),
            limit: None,
        }
    }

    /// Sets the number of leading rows to discard.
    pub fn skip(mut self, skip: impl Into<BoundValue>) -> Self {
        self.skip = skip.into();
        self
    }

    /// Sets the maximum number of rows to pass.
    pub fn limit(mut self, limit: impl Into<BoundValue>) -> Self {
        self.limit = Some(limit.into());
        self
    }
}

impl Operator for SkipLimit {
    fn name(&self) -> &'static str {
        "Limit"
    }

    fn row_type(&self) -> Option<&RowTypeRef> {
        self.input.row_type()
    }

    fn input_operators(&self) -> Vec<&dyn Operator> {
        vec![self.input.as_ref()]
    }

    fn cursor(&self, context: &QueryContext) -> Result<BoxedCursor> {
        Ok(Box::new(SkipLimitCursor {
            base: CursorBase::new("Limit", context),
            input: self.input.cursor(context)?,
            skip_arg: self.skip.clone(),
            limit_arg: self.limit.clone(),
            skip_left: 0,
            limit_left: None,
        }))
    }

    fn describe(&self) -> String {
        match &self.limit {
            Some(limit) => format!("Limit(skip {}, limit {})", self.skip, limit),
            None => format!("Limit(skip {})", self.skip),
        }
    }
}

struct SkipLimitCursor {
    base: CursorBase,
    input: BoxedCursor,
    skip_arg: BoundValue,
    limit_arg: Option<BoundValue>,
    skip_left: usize,
    limit_left: Option<usize>,
}

impl SkipLimitCursor {
    fn start_scan(&mut self, bindings: &Arc<QueryBindings>) -> Result<()> {
        self.skip_left = self.skip_arg.resolve_count(bindings)?;
        self.limit_left = match &self.limit_arg {
            Some(limit) => Some(limit.resolve_count(bindings)?),
            None => None,
        };
        self.input.open(bindings)
    }

    fn next_row(&mut self) -> Result<Option<Row>> {
        if self.limit_left == Some(0) {
            return Ok(None);
        }
        loop {
            self.base.check_cancellation()?;
            let Some(row) = self.input.next()? else {
                return Ok(None);
            };
            if self.skip_left > 0 {
                self.skip_left -= 1;
                continue;
            }
            if let Some(left) = self.limit_left.as_mut() {
                *left -= 1;
            }
            self.base.row_produced(&row);
            return Ok(Some(row));
        }
    }
}

impl Cursor for SkipLimitCursor {
    fn open(&mut self, bindings: &Arc<QueryBindings>) -> Result<()> {
        self.base.open()?;
        if let Err(err) = self.start_scan(bindings) {
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
    use crate::observer::OperatorStats;
    use crate::test_support::{test_context, RowsOperator, TestAdapter};
    use keel_core::{DataType, FieldDef, TypeRegistry, Value};

    fn numbers(n: i64) -> OperatorRef {
        let t = TypeRegistry::new().values_type(vec![FieldDef::new("n", DataType::Int64)]);
        let rows = (0..n).map(|i| Row::new(t.clone(), vec![Value::Int64(i)])).collect();
        Arc::new(RowsOperator::new(rows))
    }

    fn run(op: &SkipLimit, bindings: QueryBindings) -> Result<Vec<i64>> {
        let context = test_context(TestAdapter::new());
        let mut cursor = op.cursor(&context)?;
        cursor.open(&Arc::new(bindings))?;
        let mut out = Vec::new();
        while let Some(row) = cursor.next()? {
            out.push(row.field(0).and_then(Value::as_i64).unwrap());
        }
        Ok(out)
    }

    #[test]
    fn test_skip_and_limit_literals() {
        let op = SkipLimit::new(numbers(10)).skip(Value::Int64(2)).limit(Value::Int64(3));
        assert_eq!(run(&op, QueryBindings::new()).unwrap(), vec![2, 3, 4]);
        assert_eq!(op.describe(), "Limit(skip 2, limit 3)");
    }

    #[test]
    fn test_counts_from_bindings() {
        let op = SkipLimit::new(numbers(10))
            .skip(BoundValue::Binding(0))
            .limit(BoundValue::Binding(1));
        let mut bindings = QueryBindings::new();
        bindings.set_value(0, Value::Int32(8));
        bindings.set_value(1, Value::Int64(5));
        assert_eq!(run(&op, bindings).unwrap(), vec![8, 9]);
    }

    #[test]
    fn test_limit_stops_pulling_input() {
        let stats = Arc::new(OperatorStats::new());
        let context = test_context(TestAdapter::new()).with_observer(stats.clone());
        let op = SkipLimit::new(numbers(100)).limit(Value::Int64(2));
        let mut cursor = op.cursor(&context).unwrap();
        cursor.open(&Arc::new(QueryBindings::new())).unwrap();
        while cursor.next().unwrap().is_some() {}
        assert_eq!(stats.get("Rows").rows, 2);
        assert_eq!(stats.get("Rows").closes, 1);
    }

    #[test]
    fn test_bad_count_fails_open() {
        let op = SkipLimit::new(numbers(3)).limit(BoundValue::Binding(0));
        let context = test_context(TestAdapter::new());
        let mut cursor = op.cursor(&context).unwrap();
        assert_eq!(
            cursor.open(&Arc::new(QueryBindings::new())),
            Err(ExecutionError::BindingNotSet { index: 0 })
        );
        assert!(cursor.is_idle());

        let mut bindings = QueryBindings::new();
        bindings.set_value(0, Value::Int64(-1));
        assert!(matches!(
            cursor.open(&Arc::new(bindings)),
            Err(ExecutionError::InvalidArgument(_))
        ));
    }
}
