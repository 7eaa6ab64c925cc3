//! Property-based tests for keel-query using proptest.

use keel_core::{DataType, FieldDef, HKey, Row, RowType, RowTypeRef, TypeRegistry, Value};
use keel_query::{
    api, executor::Filter, settle_next, BoundedRowQueue, BoxedCursor, Cursor, CursorBase,
    CursorState, ExecutionError, IndexDef, IndexKeyRange, IndexOrdering, IndexScanSelector, Limit,
    Operator, QueryBindings, QueryContext, Result, RowOrdering, RowScanBuffer, SortOption, Sorter,
    StoreAdapter,
};
use proptest::prelude::*;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Adapter for plans that never reach storage.
struct NoStorage;

impl StoreAdapter for NoStorage {
    fn new_group_cursor(&self, _: &QueryContext, _: &RowTypeRef, _: Arc<dyn Limit>) -> Result<BoxedCursor> {
        Err(ExecutionError::unsupported("NoStorage", "group cursors"))
    }

    fn new_index_cursor(
        &self,
        _: &QueryContext,
        _: &IndexDef,
        _: &IndexKeyRange,
        _: IndexOrdering,
        _: &IndexScanSelector,
    ) -> Result<BoxedCursor> {
        Err(ExecutionError::unsupported("NoStorage", "index cursors"))
    }

    fn create_sorter(&self, _: &QueryContext, _: &RowTypeRef, _: &RowOrdering, _: SortOption) -> Result<Box<dyn Sorter>> {
        Err(ExecutionError::unsupported("NoStorage", "sorters"))
    }

    fn write_row(&self, _: &Row) -> Result<()> {
        Err(ExecutionError::unsupported("NoStorage", "writes"))
    }

    fn update_row(&self, _: &Row, _: &Row) -> Result<()> {
        Err(ExecutionError::unsupported("NoStorage", "updates"))
    }

    fn delete_row(&self, _: &Row, _: bool) -> Result<()> {
        Err(ExecutionError::unsupported("NoStorage", "deletes"))
    }

    fn row_count(&self, table: &RowType) -> Result<u64> {
        Err(keel_core::Error::table_not_found(table.name()).into())
    }

    fn new_hkey(&self, _: &RowType) -> HKey {
        HKey::new()
    }
}

/// Replays rows of mixed types.
struct MixedRows(Arc<Vec<Row>>);

struct MixedRowsCursor {
    base: CursorBase,
    rows: Arc<Vec<Row>>,
    position: usize,
}

impl Operator for MixedRows {
    fn name(&self) -> &'static str {
        "MixedRows"
    }

    fn cursor(&self, context: &QueryContext) -> Result<BoxedCursor> {
        Ok(Box::new(MixedRowsCursor {
            base: CursorBase::new("MixedRows", context),
            rows: Arc::clone(&self.0),
            position: 0,
        }))
    }
}

impl Cursor for MixedRowsCursor {
    fn open(&mut self, _: &Arc<QueryBindings>) -> Result<()> {
        self.base.open()?;
        self.position = 0;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Row>> {
        if !self.base.check_next()? {
            return Ok(None);
        }
        let row = self.rows.get(self.position).cloned();
        self.position += 1;
        settle_next(self, Ok(row))
    }

    fn close(&mut self) {
        self.base.close();
    }

    fn destroy(&mut self) {
        self.close();
        self.base.destroy();
    }

    fn state(&self) -> CursorState {
        self.base.state()
    }

    fn name(&self) -> &'static str {
        self.base.name()
    }
}

fn types() -> Vec<RowTypeRef> {
    let registry = TypeRegistry::new();
    (0..4)
        .map(|i| registry.table_type(format!("t{}", i), vec![FieldDef::new("n", DataType::Int64)], vec![0]))
        .collect()
}

#[derive(Debug, Clone)]
enum QueueOp {
    Add(i64),
    Take,
}

fn queue_op() -> impl Strategy<Value = QueueOp> {
    prop_oneof![any::<i64>().prop_map(QueueOp::Add), Just(QueueOp::Take)]
}

proptest! {
    /// Filter output is exactly the accepted input rows, in input order.
    #[test]
    fn filter_preserves_order(
        picks in prop::collection::vec(0usize..4, 0..64),
        keep in prop::collection::vec(any::<bool>(), 4),
    ) {
        let types = types();
        let rows: Vec<Row> = picks
            .iter()
            .enumerate()
            .map(|(i, &t)| Row::new(types[t].clone(), vec![Value::Int64(i as i64)]))
            .collect();
        let keep_types: Vec<RowTypeRef> = types
            .iter()
            .zip(&keep)
            .filter(|(_, k)| **k)
            .map(|(t, _)| t.clone())
            .collect();
        let expected: Vec<Row> = rows
            .iter()
            .filter(|r| keep_types.contains(r.row_type()))
            .cloned()
            .collect();

        let filter = Filter::new(Arc::new(MixedRows(Arc::new(rows))), &keep_types);
        let context = QueryContext::new(Arc::new(NoStorage));
        let mut cursor = api::cursor(&filter, &context).unwrap();
        let got = api::collect_rows(&mut cursor, &Arc::new(QueryBindings::new())).unwrap();
        prop_assert_eq!(got, expected);
        prop_assert!(cursor.next().unwrap().is_none());
    }

    /// The bounded queue behaves like a FIFO of limited length.
    #[test]
    fn bounded_queue_is_fifo(capacity in 1usize..8, ops in prop::collection::vec(queue_op(), 0..100)) {
        let t = TypeRegistry::new().values_type(vec![FieldDef::new("n", DataType::Int64)]);
        let mut queue = BoundedRowQueue::new(capacity);
        let mut model: VecDeque<i64> = VecDeque::new();
        for op in ops {
            match op {
                QueueOp::Add(n) => {
                    if model.len() < capacity {
                        queue.add(Row::new(t.clone(), vec![Value::Int64(n)]));
                        model.push_back(n);
                    }
                }
                QueueOp::Take => {
                    let got = queue.take().map(|r| r.field(0).and_then(Value::as_i64).unwrap());
                    prop_assert_eq!(got, model.pop_front());
                }
            }
            prop_assert_eq!(queue.len(), model.len());
            prop_assert_eq!(queue.is_full(), model.len() == capacity);
        }
    }

    /// Bindings read back what was last stored; unset slots fail with their index.
    #[test]
    fn bindings_match_model(
        writes in prop::collection::vec((0usize..32, any::<i64>()), 0..64),
        probe in 0usize..32,
    ) {
        let mut bindings = QueryBindings::new();
        let mut model = HashMap::new();
        for (slot, n) in writes {
            bindings.set_value(slot, Value::Int64(n));
            model.insert(slot, n);
        }
        match model.get(&probe) {
            Some(n) => prop_assert_eq!(bindings.value(probe).unwrap(), &Value::Int64(*n)),
            None => prop_assert_eq!(
                bindings.value(probe).unwrap_err(),
                ExecutionError::BindingNotSet { index: probe }
            ),
        }
        bindings.clear();
        for slot in model.keys() {
            prop_assert!(bindings.value(*slot).is_err());
        }
    }

    /// A scan buffer replays the same rows on every rescan.
    #[test]
    fn scan_buffer_replays(values in prop::collection::vec(any::<i64>(), 0..100), rescans in 1usize..4) {
        let t = TypeRegistry::new().values_type(vec![FieldDef::new("n", DataType::Int64)]);
        let mut buffer = RowScanBuffer::new();
        for v in &values {
            buffer.append(Row::new(t.clone(), vec![Value::Int64(*v)]));
        }
        for _ in 0..rescans {
            buffer.reset_scan();
            let mut got = Vec::new();
            while let Some(row) = buffer.next() {
                got.push(row.field(0).and_then(Value::as_i64).unwrap());
            }
            prop_assert_eq!(&got, &values);
        }
    }
}
