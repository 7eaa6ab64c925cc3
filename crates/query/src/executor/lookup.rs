//! Hierarchical lookups driven by a bound row or hkey.
//!
//! Both operators read a hierarchical key from a binding slot, derive the
//! key of an enclosing row from it, and reposition group scans with `jump`
//! to read the rows stored at or under that key. They are meant to run as
//! the inner plan of a `MapNestedLoops`.

use crate::bindings::{BindingValue, QueryBindings};
use crate::context::QueryContext;
use crate::cursor::{settle_next, BoxedCursor, Cursor, CursorBase, CursorState};
use crate::error::{ExecutionError, Result};
use crate::operator::Operator;
use crate::scan_limit::no_limit;
use keel_core::{HKey, Row, RowTypeRef, Value};
use std::collections::VecDeque;
use std::sync::Arc;

fn bound_hkey(bindings: &QueryBindings, position: usize) -> Result<HKey> {
    match bindings.get_binding(position)? {
        BindingValue::Row(row) => row
            .hkey()
            .cloned()
            .ok_or_else(|| ExecutionError::InvalidArgument(format!("{} has no hkey", row))),
        BindingValue::HKey(hkey) => Ok(hkey.clone()),
        other => Err(ExecutionError::BindingKindMismatch {
            index: position,
            expected: "row or hkey",
            actual: other.kind(),
        }),
    }
}

/// Returns the key of the row of `table` enclosing `target`.
fn enclosing_key(target: &HKey, template: &HKey, table: &RowTypeRef) -> Result<HKey> {
    if !template.ordinals_lead(target) {
        return Err(ExecutionError::InvalidArgument(format!(
            "{} is not located under a {} row",
            target,
            table.name()
        )));
    }
    Ok(target.truncated(template.depth()))
}

fn type_names(types: &[RowTypeRef]) -> String {
    types.iter().map(|t| t.name()).collect::<Vec<_>>().join(", ")
}

/// Positions `scan` at `hkey`. The scan is left open.
fn seek(
    scan: &mut BoxedCursor,
    table: &RowTypeRef,
    hkey: &HKey,
    bindings: &Arc<QueryBindings>,
) -> Result<()> {
    let target = Row::new(table.clone(), vec![Value::Null; table.n_fields()]).with_hkey(hkey.clone());
    scan.open(bindings)?;
    if let Err(err) = scan.jump(&target) {
        scan.close();
        return Err(err);
    }
    Ok(())
}

/// One table read by a lookup: its empty hkey and a group scan over it.
struct TableScan {
    table: RowTypeRef,
    template: HKey,
    scan: BoxedCursor,
}

impl TableScan {
    fn new(context: &QueryContext, table: &RowTypeRef) -> Result<Self> {
        let adapter = context.adapter();
        Ok(Self {
            table: table.clone(),
            template: adapter.new_hkey(table),
            scan: adapter.new_group_cursor(context, table, no_limit())?,
        })
    }
}

/// Finds the stored ancestors of the row (or hkey) bound at
/// `binding_position`, one lookup per ancestor table.
///
/// Ancestors are produced outermost first. A missing ancestor is skipped.
pub struct AncestorLookupNested {
    row_type: RowTypeRef,
    ancestors: Vec<RowTypeRef>,
    binding_position: usize,
}

impl AncestorLookupNested {
    /// Creates the lookup. `row_type` is the type of the bound rows and every
    /// entry of `ancestors` must be a table enclosing it.
    pub fn new(row_type: RowTypeRef, ancestors: Vec<RowTypeRef>, binding_position: usize) -> Self {
        Self {
            row_type,
            ancestors,
            binding_position,
        }
    }
}

impl Operator for AncestorLookupNested {
    fn name(&self) -> &'static str {
        "AncestorLookupNested"
    }

    fn row_type(&self) -> Option<&RowTypeRef> {
        match self.ancestors.as_slice() {
            [single] => Some(single),
            _ => None,
        }
    }

    fn cursor(&self, context: &QueryContext) -> Result<BoxedCursor> {
        if self.ancestors.is_empty() {
            return Err(ExecutionError::InvalidArgument(
                "ancestor lookup needs at least one ancestor type".into(),
            ));
        }
        let input = context.adapter().new_hkey(&self.row_type);
        let mut ancestors = Vec::with_capacity(self.ancestors.len());
        for table in &self.ancestors {
            let scan = TableScan::new(context, table)?;
            if scan.template.depth() >= input.depth() || !scan.template.ordinals_lead(&input) {
                return Err(ExecutionError::InvalidArgument(format!(
                    "{} is not an ancestor of {}",
                    table.name(),
                    self.row_type.name()
                )));
            }
            ancestors.push(scan);
        }
        ancestors.sort_by_key(|a| a.template.depth());
        Ok(Box::new(AncestorLookupCursor {
            base: CursorBase::new("AncestorLookupNested", context),
            ancestors,
            binding_position: self.binding_position,
            bindings: None,
            target: None,
            next_ancestor: 0,
        }))
    }

    fn describe(&self) -> String {
        format!(
            "AncestorLookupNested(${}, {} -> [{}])",
            self.binding_position,
            self.row_type.name(),
            type_names(&self.ancestors)
        )
    }
}

struct AncestorLookupCursor {
    base: CursorBase,
    ancestors: Vec<TableScan>,
    binding_position: usize,
    bindings: Option<Arc<QueryBindings>>,
    target: Option<HKey>,
    next_ancestor: usize,
}

impl AncestorLookupCursor {
    fn next_row(&mut self) -> Result<Option<Row>> {
        let (Some(target), Some(bindings)) = (&self.target, &self.bindings) else {
            return Ok(None);
        };
        while let Some(ancestor) = self.ancestors.get_mut(self.next_ancestor) {
            self.base.check_cancellation()?;
            self.next_ancestor += 1;
            let hkey = enclosing_key(target, &ancestor.template, &ancestor.table)?;
            seek(&mut ancestor.scan, &ancestor.table, &hkey, bindings)?;
            let found = ancestor.scan.next();
            ancestor.scan.close();
            if let Some(row) = found?.filter(|row| row.hkey() == Some(&hkey)) {
                self.base.row_produced(&row);
                return Ok(Some(row));
            }
        }
        Ok(None)
    }
}

impl Cursor for AncestorLookupCursor {
    fn open(&mut self, bindings: &Arc<QueryBindings>) -> Result<()> {
        self.base.open()?;
        match bound_hkey(bindings, self.binding_position) {
            Ok(target) => {
                self.target = Some(target);
                self.bindings = Some(Arc::clone(bindings));
                self.next_ancestor = 0;
                Ok(())
            }
            Err(err) => {
                self.close();
                Err(err)
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

    fn close(&mut self) {
        if self.base.close() {
            for ancestor in &mut self.ancestors {
                ancestor.scan.close();
            }
            self.target = None;
            self.bindings = None;
        }
    }

    fn destroy(&mut self) {
        self.close();
        for ancestor in &mut self.ancestors {
            ancestor.scan.destroy();
        }
        self.base.destroy();
    }

    fn state(&self) -> CursorState {
        self.base.state()
    }

    fn name(&self) -> &'static str {
        self.base.name()
    }
}

/// Retrieves the branch of the hierarchy rooted at the `branch_root` row
/// enclosing the row (or hkey) bound at `binding_position`.
///
/// Rows of every `outputs` table stored at or under the branch key are
/// produced in hkey order, orphans included. With `keep_input`, the bound
/// row is produced too, in its hkey position, unless it was retrieved.
pub struct BranchLookupNested {
    row_type: RowTypeRef,
    branch_root: RowTypeRef,
    outputs: Vec<RowTypeRef>,
    binding_position: usize,
    keep_input: bool,
}

impl BranchLookupNested {
    /// Creates the lookup. `branch_root` must be `row_type` or one of its
    /// ancestors; every output table must be `branch_root` or nested in it.
    pub fn new(
        row_type: RowTypeRef,
        branch_root: RowTypeRef,
        outputs: Vec<RowTypeRef>,
        binding_position: usize,
    ) -> Self {
        Self {
            row_type,
            branch_root,
            outputs,
            binding_position,
            keep_input: false,
        }
    }

    /// Also produces the bound row.
    pub fn keep_input(mut self) -> Self {
        self.keep_input = true;
        self
    }
}

impl Operator for BranchLookupNested {
    fn name(&self) -> &'static str {
        "BranchLookupNested"
    }

    fn row_type(&self) -> Option<&RowTypeRef> {
        match self.outputs.as_slice() {
            [single] if !self.keep_input => Some(single),
            _ => None,
        }
    }

    fn cursor(&self, context: &QueryContext) -> Result<BoxedCursor> {
        let adapter = context.adapter();
        let root = adapter.new_hkey(&self.branch_root);
        if !root.ordinals_lead(&adapter.new_hkey(&self.row_type)) {
            return Err(ExecutionError::InvalidArgument(format!(
                "{} does not enclose {}",
                self.branch_root.name(),
                self.row_type.name()
            )));
        }
        let mut outputs = Vec::with_capacity(self.outputs.len());
        for table in &self.outputs {
            let scan = TableScan::new(context, table)?;
            if !root.ordinals_lead(&scan.template) {
                return Err(ExecutionError::InvalidArgument(format!(
                    "{} is outside the {} branch",
                    table.name(),
                    self.branch_root.name()
                )));
            }
            outputs.push(scan);
        }
        Ok(Box::new(BranchLookupCursor {
            base: CursorBase::new("BranchLookupNested", context),
            root_table: self.branch_root.clone(),
            root,
            outputs,
            binding_position: self.binding_position,
            keep_input: self.keep_input,
            rows: VecDeque::new(),
        }))
    }

    fn describe(&self) -> String {
        format!(
            "BranchLookupNested(${}, {} -> {} [{}]{})",
            self.binding_position,
            self.row_type.name(),
            self.branch_root.name(),
            type_names(&self.outputs),
            if self.keep_input { ", keep input" } else { "" }
        )
    }
}

struct BranchLookupCursor {
    base: CursorBase,
    root_table: RowTypeRef,
    root: HKey,
    outputs: Vec<TableScan>,
    binding_position: usize,
    keep_input: bool,
    rows: VecDeque<Row>,
}

impl BranchLookupCursor {
    fn load_branch(&mut self, bindings: &Arc<QueryBindings>) -> Result<()> {
        let target = bound_hkey(bindings, self.binding_position)?;
        let branch = enclosing_key(&target, &self.root, &self.root_table)?;
        let mut rows = Vec::new();
        for output in &mut self.outputs {
            seek(&mut output.scan, &output.table, &branch, bindings)?;
            let outcome = (|| -> Result<()> {
                while let Some(row) = output.scan.next()? {
                    self.base.check_cancellation()?;
                    match row.hkey() {
                        Some(hkey) if *hkey == branch || branch.is_ancestor_of(hkey) => rows.push(row),
                        _ => break,
                    }
                }
                Ok(())
            })();
            output.scan.close();
            outcome?;
        }
        if self.keep_input {
            let input = bindings.row(self.binding_position)?;
            if !rows.iter().any(|row| row.hkey() == Some(&target)) {
                rows.push(input.clone());
            }
        }
        rows.sort_by(|a, b| a.hkey().cmp(&b.hkey()));
        tracing::trace!(branch = %branch, rows = rows.len(), "branch loaded");
        self.rows = rows.into();
        Ok(())
    }

    fn next_row(&mut self) -> Result<Option<Row>> {
        self.base.check_cancellation()?;
        let row = self.rows.pop_front();
        if let Some(row) = &row {
            self.base.row_produced(row);
        }
        Ok(row)
    }
}

impl Cursor for BranchLookupCursor {
    fn open(&mut self, bindings: &Arc<QueryBindings>) -> Result<()> {
        self.base.open()?;
        if let Err(err) = self.load_branch(bindings) {
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
            for output in &mut self.outputs {
                output.scan.close();
            }
            self.rows.clear();
        }
    }

    fn destroy(&mut self) {
        self.close();
        for output in &mut self.outputs {
            output.scan.destroy();
        }
        self.base.destroy();
    }

    fn state(&self) -> CursorState {
        self.base.state()
    }

    fn name(&self) -> &'static str {
        self.base.name()
    }
}
