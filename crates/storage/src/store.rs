//! In-memory implementation of the storage adapter.

use crate::cursor::{GroupCursor, IndexCursor};
use crate::sorter::MemorySorter;
use crate::table::{pk_text, ParentLink, TableStore};
use core::time::Duration;
use hashbrown::HashMap;
use keel_core::{Error, HKey, Row, RowType, RowTypeId, RowTypeRef, Value};
use keel_query::{
    BoxedCursor, ExecutionError, IndexDef, IndexKeyRange, IndexOrdering, IndexScanSelector, Limit,
    QueryContext, ResolvedKeyRange, RowOrdering, SortOption, Sorter, StoreAdapter,
};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Default)]
struct StoreState {
    tables: RwLock<HashMap<RowTypeId, TableStore>>,
    shutting_down: AtomicBool,
    max_query_time: RwLock<Option<Duration>>,
}

/// An in-memory store of tables arranged in a parent/child hierarchy.
///
/// Every stored row carries a hierarchical key: the key of its parent row
/// followed by a segment holding its own table ordinal and primary key, so
/// a parent sorts immediately before its descendants.
///
/// Clones share the same tables. Every adapter call takes the store lock
/// for its own duration only.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<StoreState>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a top-level table.
    pub fn create_table(&self, table: &RowTypeRef) -> keel_core::Result<()> {
        self.register(table, None)
    }

    /// Registers `child` beneath `parent`. `parent_columns` are the child
    /// fields holding the parent's primary key, in parent key order.
    pub fn create_child_table(
        &self,
        child: &RowTypeRef,
        parent: &RowTypeRef,
        parent_columns: Vec<usize>,
    ) -> keel_core::Result<()> {
        if !self.state.tables.read().contains_key(&parent.id()) {
            return Err(Error::table_not_found(parent.name()));
        }
        if parent_columns.len() != parent.primary_key().len() {
            return Err(Error::invalid_operation(format!(
                "{} needs {} parent key columns to join {}",
                child.name(),
                parent.primary_key().len(),
                parent.name()
            )));
        }
        self.register(
            child,
            Some(ParentLink {
                table: parent.id(),
                columns: parent_columns,
            }),
        )
    }

    fn register(&self, table: &RowTypeRef, parent: Option<ParentLink>) -> keel_core::Result<()> {
        if table.table_ordinal().is_none() {
            return Err(Error::invalid_operation(format!(
                "{} is not a table type",
                table.name()
            )));
        }
        let mut tables = self.state.tables.write();
        if tables.contains_key(&table.id()) {
            return Err(Error::invalid_operation(format!(
                "table {} already exists",
                table.name()
            )));
        }
        tracing::debug!(table = %table, "creating table");
        tables.insert(table.id(), TableStore::new(table.clone(), parent));
        Ok(())
    }

    /// Creates a single-column secondary index and fills it.
    pub fn create_index(&self, index: &IndexDef) -> keel_core::Result<()> {
        let mut tables = self.state.tables.write();
        let table = tables
            .get_mut(&index.table.id())
            .ok_or_else(|| Error::table_not_found(index.table.name()))?;
        tracing::debug!(index = %index.name, table = %index.table, "creating index");
        table.create_index(index.clone())
    }

    /// Returns the rows of `table` in hierarchical key order.
    pub fn scan(&self, table: &RowTypeRef) -> keel_core::Result<Vec<Row>> {
        let tables = self.state.tables.read();
        let store = tables
            .get(&table.id())
            .ok_or_else(|| Error::table_not_found(table.name()))?;
        Ok(store.scan())
    }

    /// Gets a row of `table` by primary key.
    pub fn get(&self, table: &RowTypeRef, pk: &[Value]) -> keel_core::Result<Option<Row>> {
        let tables = self.state.tables.read();
        let store = tables
            .get(&table.id())
            .ok_or_else(|| Error::table_not_found(table.name()))?;
        Ok(store.hkey_of(pk).and_then(|hkey| store.get(hkey)).cloned())
    }

    /// Returns the index entries of `index` whose keys lie in `range`.
    pub(crate) fn index_range(
        &self,
        index: &IndexDef,
        range: &ResolvedKeyRange,
    ) -> keel_core::Result<Vec<(Value, HKey, Row)>> {
        let tables = self.state.tables.read();
        let store = tables
            .get(&index.table.id())
            .ok_or_else(|| Error::table_not_found(index.table.name()))?;
        let secondary = store
            .index(&index.name)
            .ok_or_else(|| Error::index_not_found(index.table.name(), index.name.clone()))?;
        Ok(secondary.range(range))
    }

    /// Makes every running and future query fail its next cancellation check.
    pub fn shut_down(&self) {
        self.state.shutting_down.store(true, Ordering::Release);
    }

    /// Fails queries running longer than `limit` at their next cancellation check.
    pub fn set_max_query_time(&self, limit: Option<Duration>) {
        *self.state.max_query_time.write() = limit;
    }

    fn hkey_for(tables: &HashMap<RowTypeId, TableStore>, row: &Row) -> keel_core::Result<HKey> {
        let row_type = row.row_type();
        let table = tables
            .get(&row_type.id())
            .ok_or_else(|| Error::table_not_found(row_type.name()))?;
        let ordinal = row_type
            .table_ordinal()
            .ok_or_else(|| Error::invalid_operation(format!("{} is not a table type", row_type.name())))?;
        let mut hkey = match table.parent() {
            None => HKey::new(),
            Some(link) => {
                let parent = tables
                    .get(&link.table)
                    .ok_or_else(|| Error::invalid_operation("parent table dropped"))?;
                let parent_pk: Vec<Value> = link
                    .columns
                    .iter()
                    .map(|&i| row.field(i).cloned().unwrap_or(Value::Null))
                    .collect();
                parent
                    .hkey_of(&parent_pk)
                    .cloned()
                    .ok_or_else(|| Error::not_found(parent.row_type().name(), pk_text(&parent_pk)))?
            }
        };
        hkey.push_segment(ordinal, row.key_values());
        Ok(hkey)
    }

    // Stored rows carry their key; rows built by operators are located by
    // primary key.
    fn locate(table: &TableStore, row: &Row) -> keel_core::Result<HKey> {
        if let Some(hkey) = row.hkey() {
            if table.get(hkey).is_some() {
                return Ok(hkey.clone());
            }
        }
        let pk = row.key_values();
        table
            .hkey_of(&pk)
            .cloned()
            .ok_or_else(|| Error::not_found(table.row_type().name(), pk_text(&pk)))
    }
}

impl StoreAdapter for MemoryStore {
    fn new_group_cursor(
        &self,
        context: &QueryContext,
        table: &RowTypeRef,
        limit: Arc<dyn Limit>,
    ) -> keel_query::Result<BoxedCursor> {
        if !self.state.tables.read().contains_key(&table.id()) {
            return Err(Error::table_not_found(table.name()).into());
        }
        Ok(Box::new(GroupCursor::new(context, self.clone(), table.clone(), limit)))
    }

    fn new_index_cursor(
        &self,
        context: &QueryContext,
        index: &IndexDef,
        range: &IndexKeyRange,
        ordering: IndexOrdering,
        selector: &IndexScanSelector,
    ) -> keel_query::Result<BoxedCursor> {
        {
            let tables = self.state.tables.read();
            let table = tables
                .get(&index.table.id())
                .ok_or_else(|| Error::table_not_found(index.table.name()))?;
            if table.index(&index.name).is_none() {
                return Err(Error::index_not_found(index.table.name(), index.name.clone()).into());
            }
        }
        Ok(Box::new(IndexCursor::new(
            context,
            self.clone(),
            index.clone(),
            range.clone(),
            ordering,
            selector.clone(),
        )))
    }

    fn create_sorter(
        &self,
        context: &QueryContext,
        _row_type: &RowTypeRef,
        ordering: &RowOrdering,
        option: SortOption,
    ) -> keel_query::Result<Box<dyn Sorter>> {
        Ok(Box::new(MemorySorter::new(context, ordering.clone(), option)))
    }

    fn write_row(&self, row: &Row) -> keel_query::Result<()> {
        let mut tables = self.state.tables.write();
        let hkey = Self::hkey_for(&tables, row)?;
        let table = tables
            .get_mut(&row.row_type().id())
            .ok_or_else(|| Error::table_not_found(row.row_type().name()))?;
        table.insert(row, hkey)?;
        Ok(())
    }

    fn update_row(&self, old: &Row, new: &Row) -> keel_query::Result<()> {
        if old.row_type().id() != new.row_type().id() {
            return Err(Error::invalid_operation(format!(
                "cannot update a {} row into a {} row",
                old.row_type().name(),
                new.row_type().name()
            ))
            .into());
        }
        let mut tables = self.state.tables.write();
        let new_hkey = Self::hkey_for(&tables, new)?;
        let table = tables
            .get_mut(&old.row_type().id())
            .ok_or_else(|| Error::table_not_found(old.row_type().name()))?;
        let old_hkey = Self::locate(table, old)?;
        if new_hkey == old_hkey {
            table.replace(&old_hkey, new)?;
            return Ok(());
        }
        // The key moves; descendants would be stranded under the old key.
        let has_children = tables.values().any(|t| t.has_descendants(&old_hkey));
        if has_children {
            return Err(Error::invalid_operation(format!(
                "cannot change the key of a {} row with descendants",
                old.row_type().name()
            ))
            .into());
        }
        let table = tables
            .get_mut(&old.row_type().id())
            .ok_or_else(|| Error::table_not_found(old.row_type().name()))?;
        let Some(removed) = table.remove(&old_hkey) else {
            return Err(Error::not_found(old.row_type().name(), &old_hkey).into());
        };
        if let Err(err) = table.insert(new, new_hkey) {
            table.insert(&removed, old_hkey)?;
            return Err(err.into());
        }
        Ok(())
    }

    fn delete_row(&self, row: &Row, cascade: bool) -> keel_query::Result<()> {
        let mut tables = self.state.tables.write();
        let table = tables
            .get_mut(&row.row_type().id())
            .ok_or_else(|| Error::table_not_found(row.row_type().name()))?;
        let hkey = Self::locate(table, row)?;
        table.remove(&hkey);
        if cascade {
            let removed: usize = tables.values_mut().map(|t| t.remove_descendants(&hkey)).sum();
            tracing::debug!(row = %row, descendants = removed, "cascading delete");
        }
        Ok(())
    }

    fn row_count(&self, table: &RowType) -> keel_query::Result<u64> {
        let tables = self.state.tables.read();
        let store = tables
            .get(&table.id())
            .ok_or_else(|| Error::table_not_found(table.name()))?;
        Ok(store.len() as u64)
    }

    fn new_hkey(&self, table: &RowType) -> HKey {
        let tables = self.state.tables.read();
        let mut ordinals = Vec::new();
        let mut current = tables.get(&table.id());
        while let Some(store) = current {
            if let Some(ordinal) = store.row_type().table_ordinal() {
                ordinals.push(ordinal);
            }
            current = store.parent().and_then(|link| tables.get(&link.table));
        }
        if ordinals.is_empty() {
            ordinals.extend(table.table_ordinal());
        }
        ordinals
            .into_iter()
            .rev()
            .fold(HKey::new(), |hkey, ordinal| hkey.with_segment(ordinal, Vec::new()))
    }

    fn check_query_cancelation(&self, query_start: Instant) -> keel_query::Result<()> {
        if self.state.shutting_down.load(Ordering::Acquire) {
            return Err(ExecutionError::QueryCanceled);
        }
        if let Some(limit) = *self.state.max_query_time.read() {
            let elapsed = query_start.elapsed();
            if elapsed > limit {
                return Err(ExecutionError::QueryTimedOut {
                    elapsed_ms: elapsed.as_millis() as u64,
                });
            }
        }
        Ok(())
    }
}
