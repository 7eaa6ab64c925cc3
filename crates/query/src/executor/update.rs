//! Update: rewrites selected input rows.

use super::modify_each;
use crate::bindings::QueryBindings;
use crate::context::QueryContext;
use crate::error::Result;
use crate::operator::{Operator, OperatorRef, UpdatePlannable, UpdateResult};
use keel_core::Row;
use std::sync::Arc;

/// Computes the new version of a row.
pub trait UpdateFunction: Send + Sync {
    /// Returns true if `row` should be updated at all.
    fn row_is_selected(&self, row: &Row) -> bool;

    /// Returns the updated row. Must have the same type as `original`.
    fn evaluate(&self, original: &Row, bindings: &QueryBindings) -> Result<Row>;
}

/// Applies an `UpdateFunction` to every input row and stores the result.
pub struct Update {
    input: OperatorRef,
    function: Arc<dyn UpdateFunction>,
}

impl Update {
    /// Creates an update of the rows `input` produces.
    pub fn new(input: OperatorRef, function: Arc<dyn UpdateFunction>) -> Self {
        Self { input, function }
    }
}

impl UpdatePlannable for Update {
    fn name(&self) -> &'static str {
        "Update"
    }

    fn input_operators(&self) -> Vec<&dyn Operator> {
        vec![self.input.as_ref()]
    }

    fn run(&self, context: &QueryContext, bindings: &Arc<QueryBindings>) -> Result<UpdateResult> {
        modify_each(self.name(), &self.input, context, bindings, |row| {
            if !self.function.row_is_selected(&row) {
                return Ok(false);
            }
            let updated = self.function.evaluate(&row, bindings)?;
            context.check_constraints(&updated)?;
            context.adapter().update_row(&row, &updated)?;
            Ok(true)
        })
    }
}
