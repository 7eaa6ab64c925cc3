//! Streams of bindings sets.
//!
//! A `BindingsCursor` hands out the bindings an inner plan is opened with,
//! one set per scan. The default stream yields the enclosing scan's
//! bindings once. Nested loops derive one child scope per outer row, and a
//! `PrefetchBindingsCursor` can read several of those ahead so that more
//! than one inner scan is queued at a time.
//!
//! `cancel_bindings` withdraws a bindings set: every pending set that is
//! that set or was derived from it is dropped without being handed out.

use crate::bindings::QueryBindings;
use crate::error::Result;
use std::collections::VecDeque;
use std::sync::Arc;

/// A pull stream of bindings sets.
pub trait BindingsCursor: Send {
    /// Starts the stream from the bindings of the enclosing scan.
    fn open_bindings(&mut self, bindings: &Arc<QueryBindings>) -> Result<()>;

    /// Returns the next bindings set, or `None` once the stream is done.
    fn next_bindings(&mut self) -> Result<Option<Arc<QueryBindings>>>;

    /// Ends the stream and drops every pending set. Idempotent.
    fn close_bindings(&mut self);

    /// Drops pending sets that are `bindings` or descend from it.
    fn cancel_bindings(&mut self, bindings: &QueryBindings);

    /// Closes the stream and releases whatever it reads from for good.
    fn destroy_bindings(&mut self) {
        self.close_bindings();
    }
}

/// Boxed bindings stream for dynamic dispatch.
pub type BoxedBindingsCursor = Box<dyn BindingsCursor>;

/// Yields the bindings it was opened with, once.
#[derive(Debug, Default)]
pub struct SingletonBindingsCursor {
    pending: Option<Arc<QueryBindings>>,
}

impl SingletonBindingsCursor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BindingsCursor for SingletonBindingsCursor {
    fn open_bindings(&mut self, bindings: &Arc<QueryBindings>) -> Result<()> {
        self.pending = Some(Arc::clone(bindings));
        Ok(())
    }

    fn next_bindings(&mut self) -> Result<Option<Arc<QueryBindings>>> {
        Ok(self.pending.take())
    }

    fn close_bindings(&mut self) {
        self.pending = None;
    }

    fn cancel_bindings(&mut self, bindings: &QueryBindings) {
        if self.pending.as_ref().is_some_and(|p| bindings.is_ancestor(p)) {
            self.pending = None;
        }
    }
}

/// Reads up to `capacity` sets ahead of its consumer.
pub struct PrefetchBindingsCursor {
    source: BoxedBindingsCursor,
    pending: VecDeque<Arc<QueryBindings>>,
    capacity: usize,
    exhausted: bool,
}

impl PrefetchBindingsCursor {
    /// Wraps `source`. A capacity of 1 reads nothing ahead.
    pub fn new(source: BoxedBindingsCursor, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            source,
            pending: VecDeque::with_capacity(capacity),
            capacity,
            exhausted: true,
        }
    }

    /// Returns the number of sets read but not yet handed out.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    fn fill(&mut self) -> Result<()> {
        while !self.exhausted && self.pending.len() < self.capacity {
            match self.source.next_bindings()? {
                Some(bindings) => self.pending.push_back(bindings),
                None => self.exhausted = true,
            }
        }
        Ok(())
    }
}

impl BindingsCursor for PrefetchBindingsCursor {
    fn open_bindings(&mut self, bindings: &Arc<QueryBindings>) -> Result<()> {
        self.pending.clear();
        self.exhausted = false;
        self.source.open_bindings(bindings)
    }

    fn next_bindings(&mut self) -> Result<Option<Arc<QueryBindings>>> {
        if let Err(err) = self.fill() {
            self.close_bindings();
            return Err(err);
        }
        Ok(self.pending.pop_front())
    }

    fn close_bindings(&mut self) {
        self.pending.clear();
        self.exhausted = true;
        self.source.close_bindings();
    }

    fn cancel_bindings(&mut self, bindings: &QueryBindings) {
        let before = self.pending.len();
        self.pending.retain(|p| !bindings.is_ancestor(p));
        let dropped = before - self.pending.len();
        if dropped > 0 {
            tracing::trace!(dropped, "pending bindings canceled");
        }
        self.source.cancel_bindings(bindings);
    }

    fn destroy_bindings(&mut self) {
        self.close_bindings();
        self.source.destroy_bindings();
    }
}
