//! Semi-join pruning with a bloom filter.
//!
//! `UsingBloomFilter` loads the keys of one input into a `BloomFilter` and
//! binds it for the duration of a scan. `SelectBloomFilter`, somewhere
//! below it in the plan, probes that filter and confirms each candidate
//! by running an `on_positive` plan with the candidate row bound.

use crate::bindings::QueryBindings;
use crate::bloom::BloomFilter;
use crate::context::QueryContext;
use crate::cursor::{settle_next, BoxedCursor, Cursor, CursorBase, CursorState};
use crate::error::{ExecutionError, Result};
use crate::operator::{Operator, OperatorRef};
use keel_core::{Row, RowTypeRef, Value};
use std::sync::Arc;

fn project_key(row: &Row, fields: &[usize]) -> Result<Vec<Value>> {
    fields
        .iter()
        .map(|&f| {
            row.field(f).cloned().ok_or_else(|| {
                ExecutionError::InvalidArgument(format!("{} has no field {}", row, f))
            })
        })
        .collect()
}

fn fields_text(fields: &[usize]) -> String {
    fields.iter().map(|f| f.to_string()).collect::<Vec<_>>().join(", ")
}

/// Builds a bloom filter over `filter_input` at open, binds it at
/// `binding_position`, then yields the rows of `input`.
pub struct UsingBloomFilter {
    filter_input: OperatorRef,
    input: OperatorRef,
    key_fields: Arc<[usize]>,
    binding_position: usize,
    estimated_rows: usize,
    error_rate: f64,
}

impl UsingBloomFilter {
    /// Creates the operator. Each `filter_input` row contributes the values
    /// of `key_fields`, in order, as one filter key.
    pub fn new(
        filter_input: OperatorRef,
        input: OperatorRef,
        key_fields: Vec<usize>,
        binding_position: usize,
    ) -> Self {
        Self {
            filter_input,
            input,
            key_fields: key_fields.into(),
            binding_position,
            estimated_rows: 1024,
            error_rate: 0.01,
        }
    }

    /// Sizes the filter for `rows` keys at `error_rate` false positives.
    pub fn sizing(mut self, rows: usize, error_rate: f64) -> Self {
        self.estimated_rows = rows;
        self.error_rate = error_rate;
        self
    }
}

impl Operator for UsingBloomFilter {
    fn name(&self) -> &'static str {
        "UsingBloomFilter"
    }

    fn row_type(&self) -> Option<&RowTypeRef> {
        self.input.row_type()
    }

    fn input_operators(&self) -> Vec<&dyn Operator> {
        vec![self.filter_input.as_ref(), self.input.as_ref()]
    }

    fn cursor(&self, context: &QueryContext) -> Result<BoxedCursor> {
        Ok(Box::new(UsingBloomFilterCursor {
            base: CursorBase::new("UsingBloomFilter", context),
            filter_input: self.filter_input.cursor(context)?,
            input: self.input.cursor(context)?,
            key_fields: Arc::clone(&self.key_fields),
            binding_position: self.binding_position,
            estimated_rows: self.estimated_rows,
            error_rate: self.error_rate,
        }))
    }

    fn describe(&self) -> String {
        format!(
            "UsingBloomFilter(${}, fields [{}])",
            self.binding_position,
            fields_text(&self.key_fields)
        )
    }
}

struct UsingBloomFilterCursor {
    base: CursorBase,
    filter_input: BoxedCursor,
    input: BoxedCursor,
    key_fields: Arc<[usize]>,
    binding_position: usize,
    estimated_rows: usize,
    error_rate: f64,
}

impl UsingBloomFilterCursor {
    fn load_filter(&mut self, bindings: &Arc<QueryBindings>) -> Result<BloomFilter> {
        let mut filter = BloomFilter::new(self.estimated_rows, self.error_rate);
        self.filter_input.open(bindings)?;
        let mut loaded = 0usize;
        let outcome = (|| -> Result<()> {
            while let Some(row) = self.filter_input.next()? {
                self.base.check_cancellation()?;
                filter.add(&project_key(&row, &self.key_fields)?);
                loaded += 1;
            }
            Ok(())
        })();
        self.filter_input.close();
        outcome?;
        tracing::debug!(keys = loaded, bits = filter.n_bits(), "bloom filter loaded");
        Ok(filter)
    }

    fn next_row(&mut self) -> Result<Option<Row>> {
        self.base.check_cancellation()?;
        let row = self.input.next()?;
        if let Some(row) = &row {
            self.base.row_produced(row);
        }
        Ok(row)
    }

    fn open_input(&mut self, bindings: &Arc<QueryBindings>) -> Result<()> {
        let filter = self.load_filter(bindings)?;
        let mut scope = bindings.create_bindings();
        scope.set_bloom_filter(self.binding_position, Arc::new(filter));
        self.input.open(&Arc::new(scope))
    }
}

impl Cursor for UsingBloomFilterCursor {
    fn open(&mut self, bindings: &Arc<QueryBindings>) -> Result<()> {
        self.base.open()?;
        if let Err(err) = self.open_input(bindings) {
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
            self.filter_input.close();
        }
    }

    fn destroy(&mut self) {
        self.close();
        self.input.destroy();
        self.filter_input.destroy();
        self.base.destroy();
    }

    fn state(&self) -> CursorState {
        self.base.state()
    }

    fn name(&self) -> &'static str {
        self.base.name()
    }
}

/// Passes input rows whose key may be in the bloom filter bound at
/// `binding_position` and for which `on_positive` yields at least one row.
///
/// `on_positive` runs in a child scope with the candidate row bound at
/// `binding_position`; only its first row is read.
pub struct SelectBloomFilter {
    input: OperatorRef,
    on_positive: OperatorRef,
    key_fields: Arc<[usize]>,
    binding_position: usize,
}

impl SelectBloomFilter {
    /// Creates the operator. `key_fields` project the probe key from each
    /// input row and must line up with the fields the filter was built from.
    pub fn new(
        input: OperatorRef,
        on_positive: OperatorRef,
        key_fields: Vec<usize>,
        binding_position: usize,
    ) -> Self {
        Self {
            input,
            on_positive,
            key_fields: key_fields.into(),
            binding_position,
        }
    }
}

impl Operator for SelectBloomFilter {
    fn name(&self) -> &'static str {
        "SelectBloomFilter"
    }

    fn row_type(&self) -> Option<&RowTypeRef> {
        self.input.row_type()
    }

    fn input_operators(&self) -> Vec<&dyn Operator> {
        vec![self.input.as_ref(), self.on_positive.as_ref()]
    }

    fn cursor(&self, context: &QueryContext) -> Result<BoxedCursor> {
        Ok(Box::new(SelectBloomFilterCursor {
            base: CursorBase::new("SelectBloomFilter", context),
            input: self.input.cursor(context)?,
            on_positive: self.on_positive.cursor(context)?,
            key_fields: Arc::clone(&self.key_fields),
            binding_position: self.binding_position,
            filter: None,
            bindings: None,
        }))
    }

    fn describe(&self) -> String {
        format!(
            "SelectBloomFilter(${}, fields [{}])",
            self.binding_position,
            fields_text(&self.key_fields)
        )
    }
}

struct SelectBloomFilterCursor {
    base: CursorBase,
    input: BoxedCursor,
    on_positive: BoxedCursor,
    key_fields: Arc<[usize]>,
    binding_position: usize,
    filter: Option<Arc<BloomFilter>>,
    bindings: Option<Arc<QueryBindings>>,
}

impl SelectBloomFilterCursor {
    fn has_match(&mut self, row: &Row, bindings: &Arc<QueryBindings>) -> Result<bool> {
        let mut scope = bindings.create_bindings();
        scope.set_row(self.binding_position, row.clone());
        self.on_positive.open(&Arc::new(scope))?;
        let found = self.on_positive.next();
        self.on_positive.close();
        Ok(found?.is_some())
    }

    fn next_row(&mut self) -> Result<Option<Row>> {
        let (Some(filter), Some(bindings)) = (self.filter.clone(), self.bindings.clone()) else {
            return Ok(None);
        };
        loop {
            self.base.check_cancellation()?;
            let Some(row) = self.input.next()? else {
                return Ok(None);
            };
            if !filter.maybe_contains(&project_key(&row, &self.key_fields)?) {
                continue;
            }
            if self.has_match(&row, &bindings)? {
                self.base.row_produced(&row);
                return Ok(Some(row));
            }
        }
    }

    fn open_input(&mut self, bindings: &Arc<QueryBindings>) -> Result<()> {
        self.filter = Some(Arc::clone(bindings.bloom_filter(self.binding_position)?));
        self.bindings = Some(Arc::clone(bindings));
        self.input.open(bindings)
    }
}

impl Cursor for SelectBloomFilterCursor {
    fn open(&mut self, bindings: &Arc<QueryBindings>) -> Result<()> {
        self.base.open()?;
        if let Err(err) = self.open_input(bindings) {
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
            self.on_positive.close();
            self.input.close();
            self.filter = None;
            self.bindings = None;
        }
    }

    fn destroy(&mut self) {
        self.close();
        self.on_positive.destroy();
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
