//! In-memory sorter.

use hashbrown::HashSet;
use keel_core::{Row, Value};
use keel_query::{Cursor, QueryContext, Result, RowOrdering, SortOption, SortedRows, Sorter};

/// Rows read between cancellation checks while loading.
const CANCEL_CHECK_INTERVAL: usize = 1024;

/// Loads its input fully, then sorts with a stable sort so rows with equal
/// sort keys keep their input order.
pub(crate) struct MemorySorter {
    context: QueryContext,
    ordering: RowOrdering,
    option: SortOption,
}

impl MemorySorter {
    pub(crate) fn new(context: &QueryContext, ordering: RowOrdering, option: SortOption) -> Self {
        Self {
            context: context.clone(),
            ordering,
            option,
        }
    }

    fn load(&self, input: &mut dyn Cursor) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        let mut seen: HashSet<Vec<Value>> = HashSet::new();
        while let Some(row) = input.next()? {
            if rows.len() % CANCEL_CHECK_INTERVAL == 0 {
                self.context.check_query_cancelation()?;
            }
            if self.option == SortOption::SuppressDuplicates && !seen.insert(row.values().to_vec()) {
                continue;
            }
            rows.push(row);
        }
        Ok(rows)
    }
}

impl Sorter for MemorySorter {
    fn sort(self: Box<Self>, input: &mut dyn Cursor) -> Result<SortedRows> {
        let mut rows = self.load(input)?;
        rows.sort_by(|a, b| self.ordering.compare(a, b));
        tracing::debug!(rows = rows.len(), ordering = %self.ordering, "sorted");
        Ok(Box::new(rows.into_iter().map(Ok)))
    }
}
