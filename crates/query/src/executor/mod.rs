//! Operators and their cursors.

mod bloom_filter;
mod buffer;
mod count;
mod delete;
mod filter;
mod insert;
mod limit;
mod lookup;
mod nested_loops;
mod product;
mod scan;
mod sort;
mod update;
mod values_scan;

pub use bloom_filter::{SelectBloomFilter, UsingBloomFilter};
pub use buffer::Buffer;
pub use count::CountTableStatus;
pub use delete::{Delete, DeleteReturning};
pub use filter::Filter;
pub use insert::Insert;
pub use limit::SkipLimit;
pub use lookup::{AncestorLookupNested, BranchLookupNested};
pub use nested_loops::MapNestedLoops;
pub use product::Product;
pub use scan::{GroupScan, IndexScan};
pub use sort::Sort;
pub use update::{Update, UpdateFunction};
pub use values_scan::ValuesScan;

use crate::bindings::QueryBindings;
use crate::context::QueryContext;
use crate::error::Result;
use crate::operator::{OperatorRef, UpdateResult};
use keel_core::Row;
use std::sync::Arc;

/// Drives `input` to exhaustion, calling `modify` on each row. `modify`
/// returns whether it changed the row. The first error aborts the run;
/// the input cursor is closed and destroyed on every path.
pub(crate) fn modify_each(
    name: &'static str,
    input: &OperatorRef,
    context: &QueryContext,
    bindings: &Arc<QueryBindings>,
    mut modify: impl FnMut(Row) -> Result<bool>,
) -> Result<UpdateResult> {
    let mut cursor = input.cursor(context)?;
    let mut touched = 0u64;
    let mut modified = 0u64;
    let outcome = (|| -> Result<()> {
        cursor.open(bindings)?;
        while let Some(row) = cursor.next()? {
            context.check_query_cancelation()?;
            touched += 1;
            if modify(row)? {
                modified += 1;
            }
        }
        Ok(())
    })();
    cursor.close();
    cursor.destroy();

    match outcome {
        Ok(()) => {
            let result = UpdateResult::new(touched, modified);
            context.observer().rows_modified(name, &result);
            tracing::debug!(operator = name, %result, "modification finished");
            Ok(result)
        }
        Err(err) => {
            tracing::debug!(operator = name, touched, modified, error = %err, "modification aborted");
            Err(err)
        }
    }
}
