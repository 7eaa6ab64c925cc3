//! Sort through a storage-provided sorter.

use crate::adapter::{RowOrdering, SortOption, SortedRows};
use crate::bindings::QueryBindings;
use crate::context::QueryContext;
use crate::cursor::{settle_next, BoxedCursor, Cursor, CursorBase, CursorState};
use crate::error::{ExecutionError, Result};
use crate::operator::{Operator, OperatorRef};
use keel_core::{Row, RowTypeRef};
use std::sync::Arc;

/// Orders its input.
///
/// Each scan asks the storage adapter for a new sorter, hands it the open
/// input, and replays the sorted rows. Sorters are consumed by use, so no
/// sorter outlives the scan it was created for.
pub struct Sort {
    input: OperatorRef,
    ordering: RowOrdering,
    option: SortOption,
}

impl Sort {
    /// Creates a sort of `input` by `ordering`, keeping duplicates.
    pub fn new(input: OperatorRef, ordering: RowOrdering) -> Self {
        Self {
            input,
            ordering,
            option: SortOption::PreserveDuplicates,
        }
    }

    /// Sets the duplicate handling.
    pub fn option(mut self, option: SortOption) -> Self {
        self.option = option;
        self
    }
}

impl Operator for Sort {
    fn name(&self) -> &'static str {
        "Sort"
    }

    fn row_type(&self) -> Option<&RowTypeRef> {
        self.input.row_type()
    }

    fn input_operators(&self) -> Vec<&dyn Operator> {
        vec![self.input.as_ref()]
    }

    fn cursor(&self, context: &QueryContext) -> Result<BoxedCursor> {
        let row_type = self.input.row_type().cloned().ok_or_else(|| {
            ExecutionError::InvalidArgument(format!(
                "sort input {} has no single row type",
                self.input.name()
            ))
        })?;
        Ok(Box::new(SortCursor {
            base: CursorBase::new("Sort", context),
            input: self.input.cursor(context)?,
            row_type,
            ordering: self.ordering.clone(),
            option: self.option,
            sorted: None,
        }))
    }

    fn describe(&self) -> String {
        match self.option {
            SortOption::PreserveDuplicates => format!("Sort({})", self.ordering),
            SortOption::SuppressDuplicates => format!("Sort({}, distinct)", self.ordering),
        }
    }
}

struct SortCursor {
    base: CursorBase,
    input: BoxedCursor,
    row_type: RowTypeRef,
    ordering: RowOrdering,
    option: SortOption,
    sorted: Option<SortedRows>,
}

impl SortCursor {
    fn start_scan(&mut self, bindings: &Arc<QueryBindings>) -> Result<()> {
        let context = self.base.context().clone();
        let sorter =
            context
                .adapter()
                .create_sorter(&context, &self.row_type, &self.ordering, self.option)?;
        self.input.open(bindings)?;
        self.sorted = Some(sorter.sort(self.input.as_mut())?);
        Ok(())
    }

    fn next_row(&mut self) -> Result<Option<Row>> {
        self.base.check_cancellation()?;
        let Some(sorted) = self.sorted.as_mut() else {
            return Ok(None);
        };
        match sorted.next().transpose()? {
            Some(row) => {
                self.base.row_produced(&row);
                Ok(Some(row))
            }
            None => Ok(None),
        }
    }
}

impl Cursor for SortCursor {
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
            self.sorted = None;
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
