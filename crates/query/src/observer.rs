//! Execution observation hooks.
//!
//! A query carries one `ExecutionObserver` in its `QueryContext`. Cursors
//! report lifecycle events and produced rows to it; mutating operators
//! report their `UpdateResult`. The default observer does nothing.

use crate::operator::UpdateResult;
use hashbrown::HashMap;
use parking_lot::Mutex;

/// Receives execution events. All hooks default to no-ops.
pub trait ExecutionObserver: Send + Sync {
    /// A cursor of `operator` started a scan.
    fn cursor_opened(&self, _operator: &'static str) {}

    /// A cursor of `operator` produced a row.
    fn row_produced(&self, _operator: &'static str) {}

    /// A cursor of `operator` ended a scan.
    fn cursor_closed(&self, _operator: &'static str) {}

    /// A mutating operator finished.
    fn rows_modified(&self, _operator: &'static str, _result: &UpdateResult) {}
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ExecutionObserver for NoopObserver {}

/// Counters for one operator.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OperatorCounts {
    /// Scans started.
    pub opens: u64,
    /// Rows produced.
    pub rows: u64,
    /// Scans ended.
    pub closes: u64,
    /// Rows written, updated or deleted.
    pub modified: u64,
}

/// Observer that aggregates per-operator counts.
#[derive(Debug, Default)]
pub struct OperatorStats {
    counts: Mutex<HashMap<&'static str, OperatorCounts>>,
}

impl OperatorStats {
    /// Creates empty stats.
    pub fn new() -> Self {
        Self::default()
    }

    fn update(&self, operator: &'static str, f: impl FnOnce(&mut OperatorCounts)) {
        let mut counts = self.counts.lock();
        f(counts.entry(operator).or_default());
    }

    /// Returns the counts for `operator`.
    pub fn get(&self, operator: &str) -> OperatorCounts {
        self.counts.lock().get(operator).copied().unwrap_or_default()
    }

    /// Returns a copy of all counts, sorted by operator name.
    pub fn snapshot(&self) -> Vec<(&'static str, OperatorCounts)> {
        let mut all: Vec<_> = self
            .counts
            .lock()
            .iter()
            .map(|(name, counts)| (*name, *counts))
            .collect();
        all.sort_by_key(|(name, _)| *name);
        all
    }

    /// Resets all counts.
    pub fn reset(&self) {
        self.counts.lock().clear();
    }
}

impl ExecutionObserver for OperatorStats {
    fn cursor_opened(&self, operator: &'static str) {
        self.update(operator, |c| c.opens += 1);
    }

    fn row_produced(&self, operator: &'static str) {
        self.update(operator, |c| c.rows += 1);
    }

    fn cursor_closed(&self, operator: &'static str) {
        self.update(operator, |c| c.closes += 1);
    }

    fn rows_modified(&self, operator: &'static str, result: &UpdateResult) {
        self.update(operator, |c| c.modified += result.rows_modified());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_accumulate() {
        let stats = OperatorStats::new();
        stats.cursor_opened("Filter");
        stats.row_produced("Filter");
        stats.row_produced("Filter");
        stats.cursor_closed("Filter");
        stats.rows_modified("Insert", &UpdateResult::new(3, 2));

        assert_eq!(
            stats.get("Filter"),
            OperatorCounts {
                opens: 1,
                rows: 2,
                closes: 1,
                modified: 0
            }
        );
        assert_eq!(stats.get("Insert").modified, 2);
        assert_eq!(stats.snapshot().len(), 2);

        stats.reset();
        assert_eq!(stats.get("Filter"), OperatorCounts::default());
    }
}
