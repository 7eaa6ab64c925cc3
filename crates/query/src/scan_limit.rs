//! Early-stop predicates for storage scans.

use core::fmt;
use keel_core::Row;
use std::sync::{Arc, OnceLock};

/// Decides whether a storage scan should stop at a row.
pub trait Limit: Send + Sync + fmt::Debug {
    /// Returns true if the scan should stop before producing `row`.
    fn limit_reached(&self, row: &Row) -> bool;
}

/// A limit that never stops a scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoLimit;

impl Limit for NoLimit {
    #[inline]
    fn limit_reached(&self, _row: &Row) -> bool {
        false
    }
}

/// Returns the shared `NoLimit` instance.
pub fn no_limit() -> Arc<dyn Limit> {
    static NO_LIMIT: OnceLock<Arc<dyn Limit>> = OnceLock::new();
    Arc::clone(NO_LIMIT.get_or_init(|| Arc::new(NoLimit)))
}

/// A limit backed by a row predicate.
pub struct PredicateLimit<F> {
    description: String,
    predicate: F,
}

impl<F> PredicateLimit<F>
where
    F: Fn(&Row) -> bool + Send + Sync,
{
    /// Stops the scan at the first row for which `predicate` holds.
    pub fn new(description: impl Into<String>, predicate: F) -> Self {
        Self {
            description: description.into(),
            predicate,
        }
    }
}

impl<F> Limit for PredicateLimit<F>
where
    F: Fn(&Row) -> bool + Send + Sync,
{
    fn limit_reached(&self, row: &Row) -> bool {
        (self.predicate)(row)
    }
}

impl<F> fmt::Debug for PredicateLimit<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PredicateLimit({})", self.description)
    }
}
