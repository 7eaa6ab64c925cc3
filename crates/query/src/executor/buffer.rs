//! Buffer: bounded input prefetch.

use crate::bindings::QueryBindings;
use crate::context::QueryContext;
use crate::cursor::{settle_next, BoxedCursor, Cursor, CursorBase, CursorState};
use crate::error::Result;
use crate::operator::{Operator, OperatorRef};
use crate::row_buffer::BoundedRowQueue;
use keel_core::{Row, RowTypeRef};
use std::sync::Arc;

/// Reads ahead up to `capacity` input rows and returns them in input
/// order.
pub struct Buffer {
    input: OperatorRef,
    capacity: Option<usize>,
}

impl Buffer {
    /// Creates a buffer using the context's configured prefetch capacity.
    pub fn new(input: OperatorRef) -> Self {
        Self {
            input,
            capacity: None,
        }
    }

    /// Sets an explicit capacity. Must be at least 1.
    pub fn with_capacity(input: OperatorRef, capacity: usize) -> Self {
        Self {
            input,
            capacity: Some(capacity.max(1)),
        }
    }
}

impl Operator for Buffer {
    fn name(&self) -> &'static str {
        "Buffer"
    }

    fn row_type(&self) -> Option<&RowTypeRef> {
        self.input.row_type()
    }

    fn input_operators(&self) -> Vec<&dyn Operator> {
        vec![self.input.as_ref()]
    }

    fn cursor(&self, context: &QueryContext) -> Result<BoxedCursor> {
        let capacity = self
            .capacity
            .unwrap_or(context.config().prefetch_capacity)
            .max(1);
        Ok(Box::new(BufferCursor {
            base: CursorBase::new("Buffer", context),
            input: self.input.cursor(context)?,
            queue: BoundedRowQueue::new(capacity),
            input_done: false,
        }))
    }

    fn describe(&self) -> String {
        match self.capacity {
            Some(capacity) => format!("Buffer({})", capacity),
            None => "Buffer".to_string(),
        }
    }
}

struct BufferCursor {
    base: CursorBase,
    input: BoxedCursor,
    queue: BoundedRowQueue,
    input_done: bool,
}

impl BufferCursor {
    fn fill(&mut self) -> Result<()> {
        while !self.input_done && !self.queue.is_full() {
            match self.input.next()? {
                Some(row) => self.queue.add(row),
                None => self.input_done = true,
            }
        }
        Ok(())
    }

    fn next_row(&mut self) -> Result<Option<Row>> {
        self.base.check_cancellation()?;
        if self.queue.is_empty() {
            self.fill()?;
        }
        let row = self.queue.take();
        if let Some(row) = &row {
            self.base.row_produced(row);
        }
        Ok(row)
    }
}

impl Cursor for BufferCursor {
    fn open(&mut self, bindings: &Arc<QueryBindings>) -> Result<()> {
        self.base.open()?;
        self.input_done = false;
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
            self.queue.clear();
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
