//! Cross product of two inputs.

use crate::bindings::QueryBindings;
use crate::context::QueryContext;
use crate::cursor::{settle_next, BoxedCursor, Cursor, CursorBase, CursorState};
use crate::error::Result;
use crate::operator::{Operator, OperatorRef};
use crate::row_buffer::RowScanBuffer;
use hashbrown::HashSet;
use keel_core::{Row, RowTypeRef};
use std::sync::Arc;

/// Pairs every outer row with every inner row.
///
/// The inner input is read once per scan into a `RowScanBuffer` and
/// replayed for each outer row. Output rows have the derived product type,
/// outer fields first.
pub struct Product {
    outer: OperatorRef,
    inner: OperatorRef,
    product_type: RowTypeRef,
}

impl Product {
    /// Creates a product. `product_type` is normally
    /// `TypeRegistry::product_type(outer, inner)`.
    pub fn new(outer: OperatorRef, inner: OperatorRef, product_type: RowTypeRef) -> Self {
        Self {
            outer,
            inner,
            product_type,
        }
    }
}

impl Operator for Product {
    fn name(&self) -> &'static str {
        "Product"
    }

    fn row_type(&self) -> Option<&RowTypeRef> {
        Some(&self.product_type)
    }

    fn find_derived_types(&self, derived: &mut HashSet<RowTypeRef>) {
        derived.insert(self.product_type.clone());
        self.outer.find_derived_types(derived);
        self.inner.find_derived_types(derived);
    }

    fn input_operators(&self) -> Vec<&dyn Operator> {
        vec![self.outer.as_ref(), self.inner.as_ref()]
    }

    fn cursor(&self, context: &QueryContext) -> Result<BoxedCursor> {
        Ok(Box::new(ProductCursor {
            base: CursorBase::new("Product", context),
            outer: self.outer.cursor(context)?,
            inner: self.inner.cursor(context)?,
            product_type: self.product_type.clone(),
            inner_rows: RowScanBuffer::new(),
            inner_loaded: false,
            outer_row: None,
            bindings: None,
        }))
    }

    fn describe(&self) -> String {
        format!("Product({})", self.product_type.name())
    }
}

struct ProductCursor {
    base: CursorBase,
    outer: BoxedCursor,
    inner: BoxedCursor,
    product_type: RowTypeRef,
    inner_rows: RowScanBuffer,
    inner_loaded: bool,
    outer_row: Option<Row>,
    bindings: Option<Arc<QueryBindings>>,
}

impl ProductCursor {
    fn load_inner(&mut self) -> Result<()> {
        let Some(bindings) = &self.bindings else {
            return Ok(());
        };
        self.inner.open(bindings)?;
        while let Some(row) = self.inner.next()? {
            self.base.check_cancellation()?;
            self.inner_rows.append(row);
        }
        self.inner_loaded = true;
        Ok(())
    }

    fn next_row(&mut self) -> Result<Option<Row>> {
        loop {
            self.base.check_cancellation()?;
            if let Some(outer_row) = &self.outer_row {
                if let Some(inner_row) = self.inner_rows.next() {
                    let values = outer_row
                        .values()
                        .iter()
                        .chain(inner_row.values())
                        .cloned()
                        .collect();
                    let row = Row::new(self.product_type.clone(), values);
                    self.base.row_produced(&row);
                    return Ok(Some(row));
                }
            }
            let Some(outer_row) = self.outer.next()? else {
                return Ok(None);
            };
            if !self.inner_loaded {
                self.load_inner()?;
            }
            if self.inner_rows.is_empty() {
                return Ok(None);
            }
            self.inner_rows.reset_scan();
            self.outer_row = Some(outer_row);
        }
    }
}

impl Cursor for ProductCursor {
    fn open(&mut self, bindings: &Arc<QueryBindings>) -> Result<()> {
        self.base.open()?;
        self.bindings = Some(Arc::clone(bindings));
        if let Err(err) = self.outer.open(bindings) {
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
            self.outer.close();
            self.inner.close();
            self.inner_rows.clear();
            self.inner_loaded = false;
            self.outer_row = None;
            self.bindings = None;
        }
    }

    fn destroy(&mut self) {
        self.close();
        self.outer.destroy();
        self.inner.destroy();
        self.base.destroy();
    }

    fn state(&self) -> CursorState {
        self.base.state()
    }

    fn name(&self) -> &'static str {
        self.base.name()
    }
}
