//! Per-query execution context.
//!
//! One `QueryContext` exists per query execution and is shared by every
//! cursor in the tree. It gives cursors the storage adapter, the execution
//! settings, the observer, and cooperative cancellation.

use crate::adapter::StoreAdapter;
use crate::error::{ExecutionError, Result};
use crate::observer::{ExecutionObserver, NoopObserver};
use core::fmt;
use core::time::Duration;
use keel_core::{Error, Row};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Settings for one query execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExecutionConfig {
    /// Enforce the cursor state machine.
    pub lifecycle_checks: bool,
    /// Cancel the query once this much time has passed since it started.
    pub query_timeout: Option<Duration>,
    /// Emit a trace event for every cursor open, close and produced row.
    pub log_execution: bool,
    /// Default lookahead capacity of the `Buffer` operator.
    pub prefetch_capacity: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            lifecycle_checks: true,
            query_timeout: None,
            log_execution: false,
            prefetch_capacity: 16,
        }
    }
}

impl ExecutionConfig {
    /// Sets whether lifecycle preconditions are checked.
    pub fn lifecycle_checks(mut self, enabled: bool) -> Self {
        self.lifecycle_checks = enabled;
        self
    }

    /// Sets the query timeout.
    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = Some(timeout);
        self
    }

    /// Sets whether per-row trace events are emitted.
    pub fn log_execution(mut self, enabled: bool) -> Self {
        self.log_execution = enabled;
        self
    }

    /// Sets the default prefetch capacity. Must be at least 1.
    pub fn prefetch_capacity(mut self, capacity: usize) -> Self {
        self.prefetch_capacity = capacity.max(1);
        self
    }
}

/// Handle shared by all cursors of one query execution.
///
/// Cloning is cheap and clones observe the same cancellation flag.
#[derive(Clone)]
pub struct QueryContext {
    adapter: Arc<dyn StoreAdapter>,
    config: ExecutionConfig,
    observer: Arc<dyn ExecutionObserver>,
    start: Instant,
    canceled: Arc<AtomicBool>,
}

impl QueryContext {
    /// Creates a context over `adapter` with default settings. The query
    /// start time is now.
    pub fn new(adapter: Arc<dyn StoreAdapter>) -> Self {
        Self {
            adapter,
            config: ExecutionConfig::default(),
            observer: Arc::new(NoopObserver),
            start: Instant::now(),
            canceled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Replaces the execution settings.
    pub fn with_config(mut self, config: ExecutionConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the observer.
    pub fn with_observer(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Returns the storage adapter.
    #[inline]
    pub fn adapter(&self) -> &dyn StoreAdapter {
        self.adapter.as_ref()
    }

    /// Returns the execution settings.
    #[inline]
    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Returns the observer.
    #[inline]
    pub fn observer(&self) -> &dyn ExecutionObserver {
        self.observer.as_ref()
    }

    /// Returns when the query started.
    pub fn start_time(&self) -> Instant {
        self.start
    }

    /// Requests cancellation. Cursors notice on their next row.
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::Release);
    }

    /// Returns true once `cancel` has been called on this context or a clone.
    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }

    /// Fails if the query was canceled, timed out, or the storage engine
    /// asks for it to stop.
    pub fn check_query_cancelation(&self) -> Result<()> {
        if self.is_canceled() {
            return Err(ExecutionError::QueryCanceled);
        }
        if let Some(timeout) = self.config.query_timeout {
            let elapsed = self.start.elapsed();
            if elapsed >= timeout {
                return Err(ExecutionError::QueryTimedOut {
                    elapsed_ms: elapsed.as_millis() as u64,
                });
            }
        }
        self.adapter.check_query_cancelation(self.start)
    }

    /// Validates `row` against its type: every non-null value must conform
    /// to its field's data type and non-nullable fields must not be null.
    pub fn check_constraints(&self, row: &Row) -> Result<()> {
        let row_type = row.row_type();
        for (field, value) in row_type.fields().iter().zip(row.values()) {
            match value.data_type() {
                None if !field.nullable => {
                    return Err(Error::null_constraint(row_type.name(), field.name.clone()).into());
                }
                Some(got) if !value.conforms_to(field.data_type) => {
                    return Err(Error::type_mismatch(field.data_type, got).into());
                }
                _ => {}
            }
        }
        Ok(())
    }
}

impl fmt::Debug for QueryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryContext")
            .field("config", &self.config)
            .field("canceled", &self.is_canceled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_context, TestAdapter};
    use keel_core::{DataType, FieldDef, TypeRegistry, Value};

    #[test]
    fn test_config_defaults() {
        let config = ExecutionConfig::default();
        assert!(config.lifecycle_checks);
        assert_eq!(config.query_timeout, None);
        assert!(!config.log_execution);
        assert_eq!(config.prefetch_capacity, 16);
        assert_eq!(ExecutionConfig::default().prefetch_capacity(0).prefetch_capacity, 1);
    }

    #[test]
    fn test_cancel_is_shared_by_clones() {
        let context = test_context(TestAdapter::new());
        let clone = context.clone();
        assert!(context.check_query_cancelation().is_ok());
        clone.cancel();
        assert_eq!(
            context.check_query_cancelation(),
            Err(ExecutionError::QueryCanceled)
        );
    }

    #[test]
    fn test_timeout() {
        let context = test_context(TestAdapter::new())
            .with_config(ExecutionConfig::default().query_timeout(Duration::ZERO));
        assert!(matches!(
            context.check_query_cancelation(),
            Err(ExecutionError::QueryTimedOut { .. })
        ));
    }

    #[test]
    fn test_adapter_cancellation() {
        let adapter = TestAdapter::new();
        let context = test_context(adapter.clone());
        adapter.cancel();
        assert_eq!(
            context.check_query_cancelation(),
            Err(ExecutionError::QueryCanceled)
        );
    }

    #[test]
    fn test_check_constraints() {
        let registry = TypeRegistry::new();
        let t = registry.table_type(
            "t",
            vec![
                FieldDef::not_null("id", DataType::Int64),
                FieldDef::new("name", DataType::String),
            ],
            vec![0],
        );
        let context = test_context(TestAdapter::new());

        let ok = Row::new(t.clone(), vec![Value::Int64(1), Value::Null]);
        assert!(context.check_constraints(&ok).is_ok());

        let null_id = Row::new(t.clone(), vec![Value::Null, Value::Null]);
        assert_eq!(
            context.check_constraints(&null_id),
            Err(Error::null_constraint("t", "id").into())
        );

        let bad_type = Row::new(t, vec![Value::Int64(1), Value::Int64(2)]);
        assert_eq!(
            context.check_constraints(&bad_type),
            Err(Error::type_mismatch(DataType::String, DataType::Int64).into())
        );
    }
}
