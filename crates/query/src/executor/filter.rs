//! Type filter: keeps rows whose type is in a fixed set.

use crate::bindings::QueryBindings;
use crate::context::QueryContext;
use crate::cursor::{settle_next, BoxedCursor, Cursor, CursorBase, CursorState};
use crate::error::Result;
use crate::operator::{Operator, OperatorRef};
use hashbrown::HashSet;
use keel_core::{Row, RowTypeId, RowTypeRef};
use std::sync::Arc;

/// Passes through input rows whose row type is one of `keep_types`.
///
/// Membership is exact: a row matches only if its type id is in the set.
/// Planners that want a type's descendants to match put them in the set.
pub struct Filter {
    input: OperatorRef,
    keep_types: Arc<HashSet<RowTypeId>>,
    names: Vec<String>,
}

impl Filter {
    /// Creates a filter keeping rows of `keep_types`.
    pub fn new(input: OperatorRef, keep_types: &[RowTypeRef]) -> Self {
        Self {
            input,
            keep_types: Arc::new(keep_types.iter().map(|t| t.id()).collect()),
            names: keep_types.iter().map(|t| t.name().to_string()).collect(),
        }
    }
}

impl Operator for Filter {
    fn name(&self) -> &'static str {
        "Filter"
    }

    fn row_type(&self) -> Option<&RowTypeRef> {
        self.input.row_type()
    }

    fn input_operators(&self) -> Vec<&dyn Operator> {
        vec![self.input.as_ref()]
    }

    fn cursor(&self, context: &QueryContext) -> Result<BoxedCursor> {
        Ok(Box::new(FilterCursor {
            base: CursorBase::new("Filter", context),
            input: self.input.cursor(context)?,
            keep_types: Arc::clone(&self.keep_types),
        }))
    }

    fn describe(&self) -> String {
        format!("Filter({})", self.names.join(", "))
    }
}

struct FilterCursor {
    base: CursorBase,
    input: BoxedCursor,
    keep_types: Arc<HashSet<RowTypeId>>,
}

impl FilterCursor {
    fn next_row(&mut self) -> Result<Option<Row>> {
        loop {
            self.base.check_cancellation()?;
            let Some(row) = self.input.next()? else {
                return Ok(None);
            };
            if self.keep_types.contains(&row.row_type().id()) {
                self.base.row_produced(&row);
                return Ok(Some(row));
            }
        }
    }
}

impl Cursor for FilterCursor {
    fn open(&mut self, bindings: &Arc<QueryBindings>) -> Result<()> {
        self.base.open()?;
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
