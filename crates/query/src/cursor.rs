//! Cursor trait and lifecycle enforcement.
//!
//! Cursors form a tree mirroring the operator tree and are driven by the
//! `open / next* / close` protocol:
//!
//! 1. `open()` - IDLE -> ACTIVE. Bindings for the scan are supplied here.
//! 2. `next()` - returns rows while ACTIVE; returning `None` ends the scan (-> IDLE).
//! 3. `close()` - ends the scan early (-> IDLE). Idempotent.
//! 4. `destroy()` - releases the cursor for good (-> DESTROYED). Idempotent.
//!
//! A cursor may be reopened any number of times between `close` and `destroy`.
//! Calling `next` on an IDLE cursor returns `None`; calling anything but
//! `close`/`destroy` on a DESTROYED cursor is a lifecycle violation.

use crate::bindings::QueryBindings;
use crate::context::QueryContext;
use crate::error::{ExecutionError, Result};
use core::fmt;
use keel_core::Row;
use std::sync::Arc;

/// The three states every cursor is in exactly one of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CursorState {
    /// No scan in progress: never opened, or the last scan finished or was closed.
    Idle,
    /// A scan is in progress.
    Active,
    /// Terminal. No further scans are possible.
    Destroyed,
}

impl CursorState {
    /// Returns the upper-case state name used in diagnostics.
    pub fn as_str(&self) -> &'static str {
        match self {
            CursorState::Idle => "IDLE",
            CursorState::Active => "ACTIVE",
            CursorState::Destroyed => "DESTROYED",
        }
    }
}

impl fmt::Display for CursorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State precondition checks shared by all cursors.
pub struct CursorLifecycle;

impl CursorLifecycle {
    /// Fails unless the cursor is IDLE.
    pub fn check_idle(cursor: &'static str, state: CursorState) -> Result<()> {
        match state {
            CursorState::Idle => Ok(()),
            actual => Err(ExecutionError::lifecycle(cursor, "IDLE", actual)),
        }
    }

    /// Fails unless the cursor is ACTIVE.
    pub fn check_active(cursor: &'static str, state: CursorState) -> Result<()> {
        match state {
            CursorState::Active => Ok(()),
            actual => Err(ExecutionError::lifecycle(cursor, "ACTIVE", actual)),
        }
    }

    /// Fails if the cursor has been destroyed.
    pub fn check_idle_or_active(cursor: &'static str, state: CursorState) -> Result<()> {
        match state {
            CursorState::Destroyed => Err(ExecutionError::lifecycle(
                cursor,
                "IDLE or ACTIVE",
                CursorState::Destroyed,
            )),
            _ => Ok(()),
        }
    }
}

/// A stateful pull iterator over rows, created by an operator for one query.
///
/// A cursor is used by one scan at a time and is not shared between threads
/// while in use; the `Send` bound lets a cursor tree be built on one thread
/// and driven on another.
pub trait Cursor: Send {
    /// Starts a scan using `bindings` for parameter and outer-row lookups.
    ///
    /// Valid only when IDLE. The bindings are not retained past the scan.
    fn open(&mut self, bindings: &Arc<QueryBindings>) -> Result<()>;

    /// Returns the next row, or `None` when the scan is exhausted.
    ///
    /// Returning `None` leaves the cursor IDLE. On error the cursor closes
    /// itself before returning.
    fn next(&mut self) -> Result<Option<Row>>;

    /// Repositions an ordered scan so the next row is the first one at or
    /// after `row`'s position in the scan order.
    fn jump(&mut self, _row: &Row) -> Result<()> {
        Err(ExecutionError::unsupported(self.name(), "jump"))
    }

    /// Ends the current scan and releases scan resources. Safe to call in
    /// any state; a no-op unless ACTIVE.
    fn close(&mut self);

    /// Closes if needed and moves to DESTROYED, destroying child cursors.
    /// A second call has no effect.
    fn destroy(&mut self);

    /// Returns the current lifecycle state.
    fn state(&self) -> CursorState;

    /// Returns the name of the operator that created this cursor.
    fn name(&self) -> &'static str;

    /// Returns true if no scan is in progress.
    fn is_idle(&self) -> bool {
        self.state() == CursorState::Idle
    }

    /// Returns true if a scan is in progress.
    fn is_active(&self) -> bool {
        self.state() == CursorState::Active
    }

    /// Returns true once destroyed.
    fn is_destroyed(&self) -> bool {
        self.state() == CursorState::Destroyed
    }
}

/// Boxed cursor for dynamic dispatch.
pub type BoxedCursor = Box<dyn Cursor>;

impl fmt::Debug for dyn Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("name", &self.name())
            .field("state", &self.state())
            .finish()
    }
}

/// Closes `cursor` when `result` ends its scan, by exhaustion or by error,
/// then hands `result` back unchanged.
///
/// Every row-producing cursor routes its `next` result through here so that
/// storage resources are released even when the caller never calls `close`.
pub fn settle_next<C: Cursor + ?Sized>(
    cursor: &mut C,
    result: Result<Option<Row>>,
) -> Result<Option<Row>> {
    match result {
        Ok(Some(row)) => Ok(Some(row)),
        Ok(None) => {
            cursor.close();
            Ok(None)
        }
        Err(err) => {
            cursor.close();
            Err(err)
        }
    }
}

/// State and context shared by every cursor implementation.
///
/// Embeds the lifecycle state machine: concrete cursors call `open`,
/// `check_next`, `close` and `destroy` here and layer their own logic on top.
pub struct CursorBase {
    name: &'static str,
    context: QueryContext,
    state: CursorState,
}

impl CursorBase {
    /// Creates an IDLE cursor base.
    pub fn new(name: &'static str, context: &QueryContext) -> Self {
        Self {
            name,
            context: context.clone(),
            state: CursorState::Idle,
        }
    }

    /// Returns the operator name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the query context.
    pub fn context(&self) -> &QueryContext {
        &self.context
    }

    /// Returns the current state.
    #[inline]
    pub fn state(&self) -> CursorState {
        self.state
    }

    fn checks_enabled(&self) -> bool {
        self.context.config().lifecycle_checks
    }

    /// IDLE -> ACTIVE.
    pub fn open(&mut self) -> Result<()> {
        if self.checks_enabled() {
            CursorLifecycle::check_idle(self.name, self.state)?;
        }
        self.state = CursorState::Active;
        self.context.observer().cursor_opened(self.name);
        if self.context.config().log_execution {
            tracing::trace!(operator = self.name, "open");
        }
        Ok(())
    }

    /// Validates a `next` call. Returns `Ok(false)` when the cursor is not
    /// ACTIVE and the call should report exhaustion.
    pub fn check_next(&self) -> Result<bool> {
        if self.checks_enabled() {
            CursorLifecycle::check_idle_or_active(self.name, self.state)?;
        }
        Ok(self.state == CursorState::Active)
    }

    /// Validates a `jump` call and makes the cursor ACTIVE.
    pub fn jump(&mut self) -> Result<()> {
        if self.checks_enabled() {
            CursorLifecycle::check_idle_or_active(self.name, self.state)?;
        }
        if self.state == CursorState::Idle {
            self.context.observer().cursor_opened(self.name);
        }
        self.state = CursorState::Active;
        Ok(())
    }

    /// ACTIVE -> IDLE. Returns true if a scan was actually ended, in which
    /// case the caller releases its own scan resources and closes children.
    pub fn close(&mut self) -> bool {
        if self.state != CursorState::Active {
            return false;
        }
        self.state = CursorState::Idle;
        self.context.observer().cursor_closed(self.name);
        if self.context.config().log_execution {
            tracing::trace!(operator = self.name, "close");
        }
        true
    }

    /// Any -> DESTROYED. Returns false if already destroyed. Callers close
    /// before destroying.
    pub fn destroy(&mut self) -> bool {
        if self.state == CursorState::Destroyed {
            return false;
        }
        debug_assert!(self.state != CursorState::Active, "{} destroyed while active", self.name);
        self.state = CursorState::Destroyed;
        true
    }

    /// Polls for cancellation; called once per row produced.
    #[inline]
    pub fn check_cancellation(&self) -> Result<()> {
        self.context.check_query_cancelation()
    }

    /// Records a produced row with the observer.
    #[inline]
    pub fn row_produced(&self, row: &Row) {
        self.context.observer().row_produced(self.name);
        if self.context.config().log_execution {
            tracing::trace!(operator = self.name, row = %row, "yield");
        }
    }
}

impl Drop for CursorBase {
    fn drop(&mut self) {
        if self.state == CursorState::Active {
            tracing::warn!(operator = self.name, "cursor dropped during an open scan");
        }
    }
}

impl fmt::Debug for CursorBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CursorBase")
            .field("name", &self.name)
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::Operator;
    use crate::test_support::{test_context, RowsOperator, TestAdapter};

    #[test]
    fn test_state_names() {
        assert_eq!(CursorState::Idle.to_string(), "IDLE");
        assert_eq!(CursorState::Active.to_string(), "ACTIVE");
        assert_eq!(CursorState::Destroyed.to_string(), "DESTROYED");
    }

    #[test]
    fn test_lifecycle_checks() {
        assert!(CursorLifecycle::check_idle("X", CursorState::Idle).is_ok());
        assert!(CursorLifecycle::check_idle("X", CursorState::Active).is_err());
        assert!(CursorLifecycle::check_active("X", CursorState::Idle).is_err());
        assert!(CursorLifecycle::check_idle_or_active("X", CursorState::Active).is_ok());

        let err = CursorLifecycle::check_idle_or_active("X", CursorState::Destroyed).unwrap_err();
        assert_eq!(
            err,
            ExecutionError::lifecycle("X", "IDLE or ACTIVE", CursorState::Destroyed)
        );
    }

    #[test]
    fn test_base_transitions() {
        let context = test_context(TestAdapter::new());
        let mut base = CursorBase::new("Test", &context);
        assert_eq!(base.state(), CursorState::Idle);
        assert!(!base.check_next().unwrap());

        base.open().unwrap();
        assert_eq!(base.state(), CursorState::Active);
        assert!(base.check_next().unwrap());
        assert!(base.open().is_err());

        assert!(base.close());
        assert!(!base.close());
        assert_eq!(base.state(), CursorState::Idle);

        assert!(base.destroy());
        assert!(!base.destroy());
        assert!(base.check_next().is_err());
        assert!(base.open().is_err());
    }

    #[test]
    fn test_boxed_cursor_debug() {
        let context = test_context(TestAdapter::new());
        let mut cursor = RowsOperator::new(Vec::new()).cursor(&context).unwrap();
        assert_eq!(format!("{:?}", cursor), "Cursor { name: \"Rows\", state: Idle }");
        cursor.destroy();

        let failed: Result<BoxedCursor> = Err(ExecutionError::QueryCanceled);
        assert_eq!(failed.unwrap_err(), ExecutionError::QueryCanceled);
    }

    #[test]
    fn test_checks_can_be_disabled() {
        let context = test_context(TestAdapter::new())
            .with_config(crate::context::ExecutionConfig::default().lifecycle_checks(false));
        let mut base = CursorBase::new("Test", &context);
        base.open().unwrap();
        base.open().unwrap();
        assert!(base.close());
        base.destroy();
        assert!(!base.check_next().unwrap());
    }
}
