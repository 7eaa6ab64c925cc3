//! Insert: writes every input row.

use super::modify_each;
use crate::bindings::QueryBindings;
use crate::context::QueryContext;
use crate::error::Result;
use crate::operator::{Operator, OperatorRef, UpdatePlannable, UpdateResult};
use std::sync::Arc;

/// Writes each row of its input through the storage adapter after
/// checking row-level constraints.
///
/// The first failure aborts the insert. Rows written before it stay
/// written as far as this layer is concerned; undoing them is up to the
/// storage engine's transaction.
pub struct Insert {
    input: OperatorRef,
}

impl Insert {
    /// Creates an insert of the rows `input` produces.
    pub fn new(input: OperatorRef) -> Self {
        Self { input }
    }
}

impl UpdatePlannable for Insert {
    fn name(&self) -> &'static str {
        "Insert"
    }

    fn input_operators(&self) -> Vec<&dyn Operator> {
        vec![self.input.as_ref()]
    }

    fn run(&self, context: &QueryContext, bindings: &Arc<QueryBindings>) -> Result<UpdateResult> {
        modify_each(self.name(), &self.input, context, bindings, |row| {
            context.check_constraints(&row)?;
            context.adapter().write_row(&row)?;
            Ok(true)
        })
    }
}
