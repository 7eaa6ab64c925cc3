//! Nested loops map: re-runs an inner plan once per outer row.

use crate::bindings::QueryBindings;
use crate::bindings_cursor::{BindingsCursor, BoxedBindingsCursor, PrefetchBindingsCursor};
use crate::context::QueryContext;
use crate::cursor::{settle_next, BoxedCursor, Cursor, CursorBase, CursorState};
use crate::error::Result;
use crate::operator::{Operator, OperatorRef};
use keel_core::{Row, RowTypeRef};
use std::sync::Arc;

/// For each outer row, binds it at `binding_position` and yields every
/// row the inner plan produces under that binding.
///
/// Each outer row gets its own child scope of the scan's bindings, so the
/// inner plan sees the outer row while the bindings passed to `open` are
/// never modified. A pipelined map reads up to `depth` outer rows ahead and
/// queues one bindings set per row; inner scans still run in outer order.
pub struct MapNestedLoops {
    outer: OperatorRef,
    inner: OperatorRef,
    binding_position: usize,
    depth: usize,
}

impl MapNestedLoops {
    /// Creates the map. `inner` reads the outer row from `binding_position`.
    pub fn new(outer: OperatorRef, inner: OperatorRef, binding_position: usize) -> Self {
        Self {
            outer,
            inner,
            binding_position,
            depth: 1,
        }
    }

    /// Queues the bindings of up to `depth` outer rows ahead of the inner scan.
    pub fn pipelined(mut self, depth: usize) -> Self {
        self.depth = depth.max(1);
        self
    }
}

impl Operator for MapNestedLoops {
    fn name(&self) -> &'static str {
        "MapNestedLoops"
    }

    fn row_type(&self) -> Option<&RowTypeRef> {
        self.inner.row_type()
    }

    fn input_operators(&self) -> Vec<&dyn Operator> {
        vec![self.outer.as_ref(), self.inner.as_ref()]
    }

    fn cursor(&self, context: &QueryContext) -> Result<BoxedCursor> {
        Ok(Box::new(MapNestedLoopsCursor {
            base: CursorBase::new("MapNestedLoops", context),
            bindings: self.bindings_cursor(context)?,
            inner: self.inner.cursor(context)?,
        }))
    }

    /// One child scope per outer row, holding the row at `binding_position`.
    fn bindings_cursor(&self, context: &QueryContext) -> Result<BoxedBindingsCursor> {
        let rows = RowToBindingsCursor {
            input: self.outer.cursor(context)?,
            binding_position: self.binding_position,
            parent: None,
        };
        Ok(Box::new(PrefetchBindingsCursor::new(Box::new(rows), self.depth)))
    }

    fn describe(&self) -> String {
        if self.depth > 1 {
            format!("MapNestedLoops(${}, pipelined {})", self.binding_position, self.depth)
        } else {
            format!("MapNestedLoops(${})", self.binding_position)
        }
    }
}

/// Turns each row of `input` into a child scope of the stream's bindings.
struct RowToBindingsCursor {
    input: BoxedCursor,
    binding_position: usize,
    parent: Option<Arc<QueryBindings>>,
}

impl BindingsCursor for RowToBindingsCursor {
    fn open_bindings(&mut self, bindings: &Arc<QueryBindings>) -> Result<()> {
        self.input.open(bindings)?;
        self.parent = Some(Arc::clone(bindings));
        Ok(())
    }

    fn next_bindings(&mut self) -> Result<Option<Arc<QueryBindings>>> {
        let Some(parent) = &self.parent else {
            return Ok(None);
        };
        match self.input.next()? {
            Some(row) => {
                let mut scope = parent.create_bindings();
                scope.set_row(self.binding_position, row);
                Ok(Some(Arc::new(scope)))
            }
            None => {
                self.parent = None;
                Ok(None)
            }
        }
    }

    fn close_bindings(&mut self) {
        self.input.close();
        self.parent = None;
    }

    fn cancel_bindings(&mut self, bindings: &QueryBindings) {
        if self.parent.as_ref().is_some_and(|p| bindings.is_ancestor(p)) {
            self.close_bindings();
        }
    }

    fn destroy_bindings(&mut self) {
        self.close_bindings();
        self.input.destroy();
    }
}

struct MapNestedLoopsCursor {
    base: CursorBase,
    bindings: BoxedBindingsCursor,
    inner: BoxedCursor,
}

impl MapNestedLoopsCursor {
    fn next_row(&mut self) -> Result<Option<Row>> {
        loop {
            self.base.check_cancellation()?;
            if self.inner.is_active() {
                if let Some(row) = self.inner.next()? {
                    self.base.row_produced(&row);
                    return Ok(Some(row));
                }
            }
            let Some(scope) = self.bindings.next_bindings()? else {
                return Ok(None);
            };
            self.inner.open(&scope)?;
        }
    }
}

impl Cursor for MapNestedLoopsCursor {
    fn open(&mut self, bindings: &Arc<QueryBindings>) -> Result<()> {
        self.base.open()?;
        if let Err(err) = self.bindings.open_bindings(bindings) {
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
            self.inner.close();
            self.bindings.close_bindings();
        }
    }

    fn destroy(&mut self) {
        self.close();
        self.inner.destroy();
        self.bindings.destroy_bindings();
        self.base.destroy();
    }

    fn state(&self) -> CursorState {
        self.base.state()
    }

    fn name(&self) -> &'static str {
        self.base.name()
    }
}
