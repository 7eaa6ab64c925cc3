//! Scripted storage adapter and row source for unit tests.

use crate::adapter::{
    IndexDef, IndexKeyRange, IndexOrdering, IndexScanSelector, RowOrdering, SortOption,
    SortedRows, Sorter, StoreAdapter,
};
use crate::bindings::QueryBindings;
use crate::context::QueryContext;
use crate::cursor::{settle_next, BoxedCursor, Cursor, CursorBase, CursorState};
use crate::error::{ExecutionError, Result};
use crate::operator::Operator;
use crate::scan_limit::Limit;
use hashbrown::HashMap;
use keel_core::{Error, HKey, Row, RowType, RowTypeId, RowTypeRef};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Default)]
struct TestState {
    tables: Mutex<HashMap<RowTypeId, Vec<Row>>>,
    row_counts: Mutex<HashMap<RowTypeId, u64>>,
    written: Mutex<Vec<Row>>,
    updated: Mutex<Vec<(Row, Row)>>,
    deleted: Mutex<Vec<Row>>,
    write_attempts: AtomicUsize,
    fail_write_at: Mutex<Option<usize>>,
    canceled: AtomicBool,
}

/// In-memory adapter whose contents and failures are set up by the test.
#[derive(Clone, Default)]
pub struct TestAdapter {
    state: Arc<TestState>,
}

impl TestAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `rows` as the contents of `table` and sets its row count.
    pub fn with_table(self, table: &RowTypeRef, rows: Vec<Row>) -> Self {
        self.set_row_count(table, rows.len() as u64);
        self.state.tables.lock().insert(table.id(), rows);
        self
    }

    pub fn set_row_count(&self, table: &RowTypeRef, count: u64) {
        self.state.row_counts.lock().insert(table.id(), count);
    }

    /// Makes the `n`th write (0-based) fail with a unique constraint violation.
    pub fn fail_write_at(&self, n: usize) {
        *self.state.fail_write_at.lock() = Some(n);
    }

    pub fn rows(&self, table: &RowTypeRef) -> Vec<Row> {
        self.state.tables.lock().get(&table.id()).cloned().unwrap_or_default()
    }

    pub fn written(&self) -> Vec<Row> {
        self.state.written.lock().clone()
    }

    pub fn updated(&self) -> Vec<(Row, Row)> {
        self.state.updated.lock().clone()
    }

    pub fn deleted(&self) -> Vec<Row> {
        self.state.deleted.lock().clone()
    }

    pub fn cancel(&self) {
        self.state.canceled.store(true, Ordering::SeqCst);
    }
}

impl StoreAdapter for TestAdapter {
    fn new_group_cursor(
        &self,
        context: &QueryContext,
        table: &RowTypeRef,
        limit: Arc<dyn Limit>,
    ) -> Result<BoxedCursor> {
        Ok(Box::new(TestGroupCursor {
            base: CursorBase::new("TestGroupScan", context),
            adapter: self.clone(),
            table: table.clone(),
            limit,
            rows: Vec::new(),
            position: 0,
        }))
    }

    fn new_index_cursor(
        &self,
        _context: &QueryContext,
        _index: &IndexDef,
        _range: &IndexKeyRange,
        _ordering: IndexOrdering,
        _selector: &IndexScanSelector,
    ) -> Result<BoxedCursor> {
        Err(ExecutionError::unsupported("TestAdapter", "index cursors"))
    }

    fn create_sorter(
        &self,
        _context: &QueryContext,
        _row_type: &RowTypeRef,
        ordering: &RowOrdering,
        option: SortOption,
    ) -> Result<Box<dyn Sorter>> {
        Ok(Box::new(TestSorter {
            ordering: ordering.clone(),
            option,
        }))
    }

    fn write_row(&self, row: &Row) -> Result<()> {
        let attempt = self.state.write_attempts.fetch_add(1, Ordering::SeqCst);
        if *self.state.fail_write_at.lock() == Some(attempt) {
            return Err(Error::unique_constraint(row.row_type().name(), row).into());
        }
        self.state.written.lock().push(row.clone());
        self.state
            .tables
            .lock()
            .entry(row.row_type().id())
            .or_default()
            .push(row.clone());
        *self
            .state
            .row_counts
            .lock()
            .entry(row.row_type().id())
            .or_default() += 1;
        Ok(())
    }

    fn update_row(&self, old: &Row, new: &Row) -> Result<()> {
        let mut tables = self.state.tables.lock();
        let rows = tables.entry(old.row_type().id()).or_default();
        match rows.iter_mut().find(|r| *r == old) {
            Some(slot) => *slot = new.clone(),
            None => return Err(Error::not_found(old.row_type().name(), old).into()),
        }
        self.state.updated.lock().push((old.clone(), new.clone()));
        Ok(())
    }

    fn delete_row(&self, row: &Row, _cascade: bool) -> Result<()> {
        let mut tables = self.state.tables.lock();
        let rows = tables.entry(row.row_type().id()).or_default();
        match rows.iter().position(|r| r == row) {
            Some(i) => {
                rows.remove(i);
            }
            None => return Err(Error::not_found(row.row_type().name(), row).into()),
        }
        self.state.deleted.lock().push(row.clone());
        Ok(())
    }

    fn row_count(&self, table: &RowType) -> Result<u64> {
        self.state
            .row_counts
            .lock()
            .get(&table.id())
            .copied()
            .ok_or_else(|| Error::table_not_found(table.name()).into())
    }

    fn new_hkey(&self, _table: &RowType) -> HKey {
        HKey::new()
    }

    fn check_query_cancelation(&self, _query_start: Instant) -> Result<()> {
        if self.state.canceled.load(Ordering::SeqCst) {
            Err(ExecutionError::QueryCanceled)
        } else {
            Ok(())
        }
    }
}

struct TestGroupCursor {
    base: CursorBase,
    adapter: TestAdapter,
    table: RowTypeRef,
    limit: Arc<dyn Limit>,
    rows: Vec<Row>,
    position: usize,
}

impl TestGroupCursor {
    fn next_row(&mut self) -> Result<Option<Row>> {
        self.base.check_cancellation()?;
        let Some(row) = self.rows.get(self.position).cloned() else {
            return Ok(None);
        };
        if self.limit.limit_reached(&row) {
            return Ok(None);
        }
        self.position += 1;
        self.base.row_produced(&row);
        Ok(Some(row))
    }
}

impl Cursor for TestGroupCursor {
    fn open(&mut self, _bindings: &Arc<QueryBindings>) -> Result<()> {
        self.base.open()?;
        self.rows = self.adapter.rows(&self.table);
        self.position = 0;
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
            self.rows.clear();
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

struct TestSorter {
    ordering: RowOrdering,
    option: SortOption,
}

impl Sorter for TestSorter {
    fn sort(self: Box<Self>, input: &mut dyn Cursor) -> Result<SortedRows> {
        let mut rows = Vec::new();
        while let Some(row) = input.next()? {
            rows.push(row);
        }
        rows.sort_by(|a, b| self.ordering.compare(a, b));
        if self.option == SortOption::SuppressDuplicates {
            rows.dedup();
        }
        Ok(Box::new(rows.into_iter().map(Ok)))
    }
}

/// Builds a context over `adapter` with default settings.
pub fn test_context(adapter: TestAdapter) -> QueryContext {
    QueryContext::new(Arc::new(adapter))
}

/// Operator replaying fixed rows of any mix of types, optionally failing
/// after a number of rows.
pub struct RowsOperator {
    rows: Arc<Vec<Row>>,
    fail_after: Option<(usize, ExecutionError)>,
    polls_cancellation: bool,
}

impl RowsOperator {
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows: Arc::new(rows),
            fail_after: None,
            polls_cancellation: true,
        }
    }

    pub fn fail_after(mut self, n: usize, error: ExecutionError) -> Self {
        self.fail_after = Some((n, error));
        self
    }

    /// Keeps producing rows after the query is canceled.
    pub fn ignoring_cancellation(mut self) -> Self {
        self.polls_cancellation = false;
        self
    }
}

impl Operator for RowsOperator {
    fn name(&self) -> &'static str {
        "Rows"
    }

    fn cursor(&self, context: &QueryContext) -> Result<BoxedCursor> {
        Ok(Box::new(RowsCursor {
            base: CursorBase::new("Rows", context),
            rows: Arc::clone(&self.rows),
            fail_after: self.fail_after.clone(),
            polls_cancellation: self.polls_cancellation,
            position: 0,
        }))
    }
}

struct RowsCursor {
    base: CursorBase,
    rows: Arc<Vec<Row>>,
    fail_after: Option<(usize, ExecutionError)>,
    polls_cancellation: bool,
    position: usize,
}

impl RowsCursor {
    fn next_row(&mut self) -> Result<Option<Row>> {
        if self.polls_cancellation {
            self.base.check_cancellation()?;
        }
        if let Some((n, error)) = &self.fail_after {
            if self.position == *n {
                return Err(error.clone());
            }
        }
        let row = self.rows.get(self.position).cloned();
        if let Some(row) = &row {
            self.position += 1;
            self.base.row_produced(row);
        }
        Ok(row)
    }
}

impl Cursor for RowsCursor {
    fn open(&mut self, _bindings: &Arc<QueryBindings>) -> Result<()> {
        self.base.open()?;
        self.position = 0;
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
        self.base.close();
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
