//! Operator abstraction.
//!
//! An `Operator` is an immutable plan node. It is built once, shared
//! freely (`Arc<dyn Operator>`), and asked for a fresh cursor tree for
//! every execution. Operators carry configuration only; all per-scan state
//! lives in the cursors they create.

use crate::bindings::QueryBindings;
use crate::bindings_cursor::{BoxedBindingsCursor, SingletonBindingsCursor};
use crate::context::QueryContext;
use crate::cursor::BoxedCursor;
use crate::error::Result;
use core::fmt;
use hashbrown::HashSet;
use keel_core::RowTypeRef;
use std::sync::Arc;

/// A row-producing plan node.
pub trait Operator: Send + Sync {
    /// Returns the operator name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Returns the type of the rows this operator produces, if it has a
    /// single output type.
    fn row_type(&self) -> Option<&RowTypeRef> {
        None
    }

    /// Adds the derived types introduced by this operator and its inputs.
    fn find_derived_types(&self, derived: &mut HashSet<RowTypeRef>) {
        for input in self.input_operators() {
            input.find_derived_types(derived);
        }
    }

    /// Returns the input operators, in plan order.
    fn input_operators(&self) -> Vec<&dyn Operator> {
        Vec::new()
    }

    /// Creates a cursor tree for one query execution.
    fn cursor(&self, context: &QueryContext) -> Result<BoxedCursor>;

    /// Creates the stream of bindings sets this operator opens the plans
    /// nested under it with. By default that is the scan's own bindings,
    /// once.
    fn bindings_cursor(&self, _context: &QueryContext) -> Result<BoxedBindingsCursor> {
        Ok(Box::new(SingletonBindingsCursor::new()))
    }

    /// Returns a one-line description of this node.
    fn describe(&self) -> String {
        self.name().to_string()
    }

    /// Returns the plan rooted here as indented text, one node per line.
    fn describe_plan(&self) -> String {
        let mut out = String::new();
        write_plan(&mut out, 0, &self.describe(), &self.input_operators());
        out
    }
}

/// Shared handle to a plan node.
pub type OperatorRef = Arc<dyn Operator>;

impl fmt::Debug for dyn Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// A plan whose root modifies stored rows and is run to completion.
pub trait UpdatePlannable: Send + Sync {
    /// Returns the operator name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Returns the input operators, in plan order.
    fn input_operators(&self) -> Vec<&dyn Operator>;

    /// Returns a one-line description of this node.
    fn describe(&self) -> String {
        self.name().to_string()
    }

    /// Returns the plan rooted here as indented text.
    fn describe_plan(&self) -> String {
        let mut out = String::new();
        write_plan(&mut out, 0, &self.describe(), &self.input_operators());
        out
    }

    /// Adds the derived types introduced by the inputs.
    fn find_derived_types(&self, derived: &mut HashSet<RowTypeRef>) {
        for input in self.input_operators() {
            input.find_derived_types(derived);
        }
    }

    /// Runs the modification with `bindings` and reports what it did.
    fn run(&self, context: &QueryContext, bindings: &Arc<QueryBindings>) -> Result<UpdateResult>;
}

fn write_plan(out: &mut String, depth: usize, line: &str, inputs: &[&dyn Operator]) {
    for _ in 0..depth {
        out.push_str("  ");
    }
    out.push_str(line);
    out.push('\n');
    for input in inputs {
        write_plan(out, depth + 1, &input.describe(), &input.input_operators());
    }
}

/// Summary of a completed modification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateResult {
    rows_touched: u64,
    rows_modified: u64,
}

impl UpdateResult {
    /// Creates a result.
    pub fn new(rows_touched: u64, rows_modified: u64) -> Self {
        debug_assert!(rows_modified <= rows_touched);
        Self {
            rows_touched,
            rows_modified,
        }
    }

    /// Rows the operation looked at.
    #[inline]
    pub fn rows_touched(&self) -> u64 {
        self.rows_touched
    }

    /// Rows the operation actually changed.
    #[inline]
    pub fn rows_modified(&self) -> u64 {
        self.rows_modified
    }
}

impl fmt::Display for UpdateResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rows touched: {}, rows modified: {}",
            self.rows_touched, self.rows_modified
        )
    }
}
