//! Error types for query execution.

use crate::cursor::CursorState;
use thiserror::Error;

/// Query execution errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    /// A cursor call was made in a state that does not allow it.
    ///
    /// Always a defect in the plan or in the code driving the cursor.
    #[error("{cursor} cursor lifecycle violation: expected {expected}, was {actual}")]
    LifecycleViolation {
        cursor: &'static str,
        expected: &'static str,
        actual: CursorState,
    },

    /// A binding slot was read before anything was stored in it.
    #[error("Binding {index} is not set")]
    BindingNotSet { index: usize },

    /// A binding slot holds a different kind of value than was requested.
    #[error("Binding {index} holds a {actual}, expected a {expected}")]
    BindingKindMismatch {
        index: usize,
        expected: &'static str,
        actual: &'static str,
    },

    /// The query was canceled by its owner.
    #[error("Query canceled")]
    QueryCanceled,

    /// The query ran past its configured timeout.
    #[error("Query timed out after {elapsed_ms} ms")]
    QueryTimedOut { elapsed_ms: u64 },

    /// Failure raised by the storage engine.
    #[error(transparent)]
    Storage(#[from] keel_core::Error),

    /// The cursor does not implement the requested operation.
    #[error("{cursor} does not support {operation}")]
    Unsupported {
        cursor: &'static str,
        operation: &'static str,
    },

    /// An operator or binding was given an argument it cannot use.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl ExecutionError {
    /// Creates a lifecycle violation error.
    pub fn lifecycle(cursor: &'static str, expected: &'static str, actual: CursorState) -> Self {
        ExecutionError::LifecycleViolation {
            cursor,
            expected,
            actual,
        }
    }

    /// Creates an unsupported operation error.
    pub fn unsupported(cursor: &'static str, operation: &'static str) -> Self {
        ExecutionError::Unsupported { cursor, operation }
    }

    /// Returns true for errors that indicate a bug in plan construction or
    /// in the caller, as opposed to runtime conditions.
    pub fn is_programming_error(&self) -> bool {
        matches!(
            self,
            ExecutionError::LifecycleViolation { .. }
                | ExecutionError::BindingNotSet { .. }
                | ExecutionError::BindingKindMismatch { .. }
                | ExecutionError::Unsupported { .. }
        )
    }

    /// Returns true if the query was stopped by cancellation or timeout.
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            ExecutionError::QueryCanceled | ExecutionError::QueryTimedOut { .. }
        )
    }
}

/// Result type for query execution.
pub type Result<T> = std::result::Result<T, ExecutionError>;
