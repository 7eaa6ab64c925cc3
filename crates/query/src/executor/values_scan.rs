//! Values scan: replays a fixed list of rows.

use crate::bindings::{BoundValue, QueryBindings};
use crate::context::QueryContext;
use crate::cursor::{settle_next, BoxedCursor, Cursor, CursorBase, CursorState};
use crate::error::Result;
use crate::operator::Operator;
use hashbrown::HashSet;
use keel_core::{Row, RowTypeRef};
use std::sync::Arc;

/// Produces one row per entry of a values list, in list order.
///
/// Entries are either literals or binding slots, resolved against the
/// bindings of each scan, so one plan can yield different rows per
/// execution.
pub struct ValuesScan {
    row_type: RowTypeRef,
    rows: Arc<Vec<Vec<BoundValue>>>,
}

impl ValuesScan {
    /// Creates a scan of `rows`, each of which must have one entry per
    /// field of `row_type`.
    pub fn new(row_type: RowTypeRef, rows: Vec<Vec<BoundValue>>) -> Self {
        debug_assert!(rows.iter().all(|r| r.len() == row_type.n_fields()));
        Self {
            row_type,
            rows: Arc::new(rows),
        }
    }

    /// Creates a scan replaying literal rows of a single type.
    pub fn from_rows(row_type: RowTypeRef, rows: Vec<Row>) -> Self {
        let rows = rows
            .into_iter()
            .map(|row| row.values().iter().cloned().map(BoundValue::Literal).collect())
            .collect();
        Self::new(row_type, rows)
    }
}

impl Operator for ValuesScan {
    fn name(&self) -> &'static str {
        "ValuesScan"
    }

    fn row_type(&self) -> Option<&RowTypeRef> {
        Some(&self.row_type)
    }

    fn find_derived_types(&self, derived: &mut HashSet<RowTypeRef>) {
        if self.row_type.is_derived() {
            derived.insert(self.row_type.clone());
        }
    }

    fn cursor(&self, context: &QueryContext) -> Result<BoxedCursor> {
        Ok(Box::new(ValuesScanCursor {
            base: CursorBase::new("ValuesScan", context),
            row_type: self.row_type.clone(),
            rows: Arc::clone(&self.rows),
            bindings: None,
            position: 0,
        }))
    }

    fn describe(&self) -> String {
        format!("ValuesScan({} rows)", self.rows.len())
    }
}

struct ValuesScanCursor {
    base: CursorBase,
    row_type: RowTypeRef,
    rows: Arc<Vec<Vec<BoundValue>>>,
    bindings: Option<Arc<QueryBindings>>,
    position: usize,
}

impl ValuesScanCursor {
    fn next_row(&mut self) -> Result<Option<Row>> {
        self.base.check_cancellation()?;
        let (Some(entry), Some(bindings)) = (self.rows.get(self.position), &self.bindings) else {
            return Ok(None);
        };
        let values = entry
            .iter()
            .map(|value| value.resolve(bindings))
            .collect::<Result<Vec<_>>>()?;
        self.position += 1;
        let row = Row::new(self.row_type.clone(), values);
        self.base.row_produced(&row);
        Ok(Some(row))
    }
}

impl Cursor for ValuesScanCursor {
    fn open(&mut self, bindings: &Arc<QueryBindings>) -> Result<()> {
        self.base.open()?;
        self.bindings = Some(Arc::clone(bindings));
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
            self.bindings = None;
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
