//! Storage cursors over `MemoryStore` tables.
//!
//! Both cursors take a snapshot of the rows they will return when opened
//! and release it on close, so no store lock is held between calls and
//! writes made during a scan are not seen by it.

use crate::store::MemoryStore;
use keel_core::{HKey, Row, RowTypeRef, Value};
use keel_query::{
    settle_next, Cursor, CursorBase, CursorState, IndexDef, IndexKeyRange, IndexOrdering,
    IndexScanSelector, Limit, QueryBindings, QueryContext, Result,
};
use std::cmp::Ordering;
use std::sync::Arc;

/// Full scan of one table in hierarchical key order.
pub(crate) struct GroupCursor {
    base: CursorBase,
    store: MemoryStore,
    table: RowTypeRef,
    limit: Arc<dyn Limit>,
    rows: Vec<Row>,
    position: usize,
}

impl GroupCursor {
    pub(crate) fn new(
        context: &QueryContext,
        store: MemoryStore,
        table: RowTypeRef,
        limit: Arc<dyn Limit>,
    ) -> Self {
        Self {
            base: CursorBase::new("MemoryGroupScan", context),
            store,
            table,
            limit,
            rows: Vec::new(),
            position: 0,
        }
    }

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

impl Cursor for GroupCursor {
    fn open(&mut self, _bindings: &Arc<QueryBindings>) -> Result<()> {
        self.base.open()?;
        match self.store.scan(&self.table) {
            Ok(rows) => {
                self.rows = rows;
                self.position = 0;
                Ok(())
            }
            Err(err) => {
                self.close();
                Err(err.into())
            }
        }
    }

    fn next(&mut self) -> Result<Option<Row>> {
        if !self.base.check_next()? {
            return Ok(None);
        }
        let result = self.next_row();
        settle_next(self, result)
    }

    fn jump(&mut self, row: &Row) -> Result<()> {
        self.base.jump()?;
        let target = row.hkey().cloned().unwrap_or_default();
        self.position = self
            .rows
            .partition_point(|r| r.hkey().is_some_and(|k| *k < target));
        Ok(())
    }

    fn close(&mut self) {
        if self.base.close() {
            self.rows = Vec::new();
            self.position = 0;
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

/// Range scan of a single-column index.
pub(crate) struct IndexCursor {
    base: CursorBase,
    store: MemoryStore,
    index: IndexDef,
    range: IndexKeyRange,
    ordering: IndexOrdering,
    selector: IndexScanSelector,
    entries: Vec<(Value, HKey, Row)>,
    position: usize,
}

impl IndexCursor {
    pub(crate) fn new(
        context: &QueryContext,
        store: MemoryStore,
        index: IndexDef,
        range: IndexKeyRange,
        ordering: IndexOrdering,
        selector: IndexScanSelector,
    ) -> Self {
        Self {
            base: CursorBase::new("MemoryIndexScan", context),
            store,
            index,
            range,
            ordering,
            selector,
            entries: Vec::new(),
            position: 0,
        }
    }

    fn load(&mut self, bindings: &QueryBindings) -> Result<()> {
        let range = self.range.resolve(bindings)?;
        let mut entries = self.store.index_range(&self.index, &range)?;
        entries.retain(|(_, _, row)| self.selector.matches(row.row_type()));
        if self.ordering == IndexOrdering::Descending {
            entries.reverse();
        }
        self.entries = entries;
        self.position = 0;
        Ok(())
    }

    // Position of `(key, hkey)` relative to the entry, in scan direction.
    fn scan_order(&self, entry: &(Value, HKey, Row), key: &Value, hkey: &HKey) -> Ordering {
        let ascending = entry.0.cmp(key).then_with(|| entry.1.cmp(hkey));
        match self.ordering {
            IndexOrdering::Ascending => ascending,
            IndexOrdering::Descending => ascending.reverse(),
        }
    }

    fn next_row(&mut self) -> Result<Option<Row>> {
        self.base.check_cancellation()?;
        let Some((_, _, row)) = self.entries.get(self.position) else {
            return Ok(None);
        };
        let row = row.clone();
        self.position += 1;
        self.base.row_produced(&row);
        Ok(Some(row))
    }
}

impl Cursor for IndexCursor {
    fn open(&mut self, bindings: &Arc<QueryBindings>) -> Result<()> {
        self.base.open()?;
        if let Err(err) = self.load(bindings) {
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

    fn jump(&mut self, row: &Row) -> Result<()> {
        self.base.jump()?;
        let key = row.field(self.index.column).cloned().unwrap_or(Value::Null);
        let hkey = row.hkey().cloned().unwrap_or_default();
        self.position = self
            .entries
            .partition_point(|entry| self.scan_order(entry, &key, &hkey) == Ordering::Less);
        Ok(())
    }

    fn close(&mut self) {
        if self.base.close() {
            self.entries = Vec::new();
            self.position = 0;
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
