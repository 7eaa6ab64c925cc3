//! Row storage for a single table.
//!
//! A `TableStore` keeps the rows of one table ordered by hierarchical key,
//! a primary-key lookup, and any single-column secondary indexes.

use hashbrown::HashMap;
use keel_core::{Error, HKey, Result, Row, RowTypeId, RowTypeRef, Value};
use keel_query::{IndexDef, ResolvedKeyRange};
use std::collections::BTreeMap;
use std::ops::Bound;

/// Link from a child table to its parent in the table hierarchy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParentLink {
    /// Parent table.
    pub table: RowTypeId,
    /// Child fields holding the parent's primary key, in parent key order.
    pub columns: Vec<usize>,
}

/// Secondary index over one column.
///
/// Entries are ordered by `(key, hkey)`, so rows sharing a key come back in
/// hierarchical key order.
pub struct SecondaryIndex {
    def: IndexDef,
    entries: BTreeMap<(Value, HKey), Row>,
}

impl SecondaryIndex {
    fn new(def: IndexDef) -> Self {
        Self {
            def,
            entries: BTreeMap::new(),
        }
    }

    /// Returns the index definition.
    pub fn def(&self) -> &IndexDef {
        &self.def
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the index holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn key_of(&self, row: &Row) -> Value {
        row.field(self.def.column).cloned().unwrap_or(Value::Null)
    }

    fn contains_key(&self, key: &Value) -> bool {
        let start = (key.clone(), HKey::new());
        self.entries
            .range(start..)
            .next()
            .is_some_and(|((k, _), _)| k == key)
    }

    // Nulls never collide in a unique index.
    fn check_unique(&self, row: &Row, hkey: &HKey) -> Result<()> {
        if !self.def.unique {
            return Ok(());
        }
        let key = self.key_of(row);
        if key.is_null() {
            return Ok(());
        }
        let start = (key.clone(), HKey::new());
        let clash = self
            .entries
            .range(start..)
            .take_while(|((k, _), _)| *k == key)
            .any(|((_, h), _)| h != hkey);
        if clash {
            return Err(Error::unique_constraint(self.def.table.name(), key));
        }
        Ok(())
    }

    fn insert(&mut self, row: &Row, hkey: &HKey) {
        self.entries.insert((self.key_of(row), hkey.clone()), row.clone());
    }

    fn remove(&mut self, row: &Row, hkey: &HKey) {
        self.entries.remove(&(self.key_of(row), hkey.clone()));
    }

    /// Returns the entries whose key lies in `range`, in ascending order.
    pub fn range(&self, range: &ResolvedKeyRange) -> Vec<(Value, HKey, Row)> {
        if range.is_empty() {
            return Vec::new();
        }
        let start = match &range.lo {
            Bound::Included(v) | Bound::Excluded(v) => Bound::Included((v.clone(), HKey::new())),
            Bound::Unbounded => Bound::Unbounded,
        };
        self.entries
            .range((start, Bound::Unbounded))
            .skip_while(|((k, _), _)| !range.contains(k) && !past_hi(range, k))
            .take_while(|((k, _), _)| range.contains(k))
            .map(|((k, h), row)| (k.clone(), h.clone(), row.clone()))
            .collect()
    }
}

fn past_hi(range: &ResolvedKeyRange, key: &Value) -> bool {
    match &range.hi {
        Bound::Included(hi) => key > hi,
        Bound::Excluded(hi) => key >= hi,
        Bound::Unbounded => false,
    }
}

/// Rows and indexes of one table.
pub struct TableStore {
    row_type: RowTypeRef,
    parent: Option<ParentLink>,
    rows: BTreeMap<HKey, Row>,
    by_pk: HashMap<Vec<Value>, HKey>,
    indexes: Vec<SecondaryIndex>,
}

impl TableStore {
    /// Creates an empty store for `row_type`.
    pub fn new(row_type: RowTypeRef, parent: Option<ParentLink>) -> Self {
        Self {
            row_type,
            parent,
            rows: BTreeMap::new(),
            by_pk: HashMap::new(),
            indexes: Vec::new(),
        }
    }

    /// Returns the table's row type.
    pub fn row_type(&self) -> &RowTypeRef {
        &self.row_type
    }

    /// Returns the parent link for child tables.
    pub fn parent(&self) -> Option<&ParentLink> {
        self.parent.as_ref()
    }

    /// Returns the number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the table holds no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the rows in hierarchical key order.
    pub fn scan(&self) -> Vec<Row> {
        self.rows.values().cloned().collect()
    }

    /// Looks up the hierarchical key of the row with primary key `pk`.
    pub fn hkey_of(&self, pk: &[Value]) -> Option<&HKey> {
        self.by_pk.get(pk)
    }

    /// Gets a row by hierarchical key.
    pub fn get(&self, hkey: &HKey) -> Option<&Row> {
        self.rows.get(hkey)
    }

    /// Returns true if some row has primary key `pk`.
    pub fn contains_pk(&self, pk: &[Value]) -> bool {
        self.by_pk.contains_key(pk)
    }

    /// Finds an index by name.
    pub fn index(&self, name: &str) -> Option<&SecondaryIndex> {
        self.indexes.iter().find(|i| i.def.name == name)
    }

    /// Adds an index and fills it from the current rows.
    pub fn create_index(&mut self, def: IndexDef) -> Result<()> {
        if self.index(&def.name).is_some() {
            return Err(Error::invalid_operation(format!(
                "index {} already exists on {}",
                def.name,
                self.row_type.name()
            )));
        }
        let field = self.row_type.field(def.column).ok_or_else(|| {
            Error::invalid_operation(format!(
                "index {} column {} out of range",
                def.name, def.column
            ))
        })?;
        if !field.data_type.is_indexable() {
            return Err(Error::invalid_operation(format!(
                "index {} column {} has type {}, which cannot be indexed",
                def.name, field.name, field.data_type
            )));
        }
        let mut index = SecondaryIndex::new(def);
        for (hkey, row) in &self.rows {
            index.check_unique(row, hkey)?;
            index.insert(row, hkey);
        }
        self.indexes.push(index);
        Ok(())
    }

    /// Inserts `row` under `hkey`. The row is stored carrying its key.
    pub fn insert(&mut self, row: &Row, hkey: HKey) -> Result<Row> {
        let pk = row.key_values();
        if self.by_pk.contains_key(&pk) {
            return Err(Error::unique_constraint(self.row_type.name(), pk_text(&pk)));
        }
        for index in &self.indexes {
            index.check_unique(row, &hkey)?;
        }
        let stored = row.clone().with_hkey(hkey.clone());
        for index in &mut self.indexes {
            index.insert(&stored, &hkey);
        }
        self.by_pk.insert(pk, hkey.clone());
        self.rows.insert(hkey, stored.clone());
        Ok(stored)
    }

    /// Replaces the row stored under `hkey` with `new`, keeping its key.
    pub fn replace(&mut self, hkey: &HKey, new: &Row) -> Result<Row> {
        let Some(old) = self.rows.get(hkey).cloned() else {
            return Err(Error::not_found(self.row_type.name(), hkey));
        };
        for index in &self.indexes {
            index.check_unique(new, hkey)?;
        }
        let stored = new.clone().with_hkey(hkey.clone());
        for index in &mut self.indexes {
            index.remove(&old, hkey);
            index.insert(&stored, hkey);
        }
        self.rows.insert(hkey.clone(), stored.clone());
        Ok(stored)
    }

    /// Removes the row stored under `hkey`.
    pub fn remove(&mut self, hkey: &HKey) -> Option<Row> {
        let row = self.rows.remove(hkey)?;
        for index in &mut self.indexes {
            index.remove(&row, hkey);
        }
        self.by_pk.remove(&row.key_values());
        Some(row)
    }

    /// Removes every row whose key descends from `ancestor`. Returns the
    /// number removed.
    pub fn remove_descendants(&mut self, ancestor: &HKey) -> usize {
        let doomed: Vec<HKey> = self
            .rows
            .range(ancestor.clone()..)
            .map(|(k, _)| k)
            .skip_while(|k| *k == ancestor)
            .take_while(|k| ancestor.is_ancestor_of(k))
            .cloned()
            .collect();
        for hkey in &doomed {
            self.remove(hkey);
        }
        doomed.len()
    }

    /// Returns true if some row's key descends from `ancestor`.
    pub fn has_descendants(&self, ancestor: &HKey) -> bool {
        self.rows
            .range(ancestor.clone()..)
            .map(|(k, _)| k)
            .find(|k| *k != ancestor)
            .is_some_and(|k| ancestor.is_ancestor_of(k))
    }
}

pub(crate) fn pk_text(pk: &[Value]) -> String {
    pk.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::{DataType, FieldDef, TypeRegistry};

    fn people() -> RowTypeRef {
        TypeRegistry::new().table_type(
            "people",
            vec![
                FieldDef::not_null("id", DataType::Int64),
                FieldDef::new("email", DataType::String),
            ],
            vec![0],
        )
    }

    fn person(t: &RowTypeRef, id: i64, email: Option<&str>) -> (Row, HKey) {
        let row = Row::new(t.clone(), vec![Value::Int64(id), Value::from(email)]);
        let hkey = HKey::new().with_segment(1, vec![Value::Int64(id)]);
        (row, hkey)
    }

    #[test]
    fn test_insert_and_scan_in_key_order() {
        let t = people();
        let mut store = TableStore::new(t.clone(), None);
        for id in [3, 1, 2] {
            let (row, hkey) = person(&t, id, None);
            store.insert(&row, hkey).unwrap();
        }
        let ids: Vec<i64> = store
            .scan()
            .iter()
            .map(|r| r.field(0).and_then(Value::as_i64).unwrap())
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(store.scan().iter().all(|r| r.hkey().is_some()));
        assert!(store.contains_pk(&[Value::Int64(2)]));
    }

    #[test]
    fn test_duplicate_primary_key() {
        let t = people();
        let mut store = TableStore::new(t.clone(), None);
        let (row, hkey) = person(&t, 1, None);
        store.insert(&row, hkey.clone()).unwrap();
        let err = store.insert(&row, hkey).unwrap_err();
        assert!(err.is_constraint_violation());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_unique_index_allows_nulls() {
        let t = people();
        let mut store = TableStore::new(t.clone(), None);
        store
            .create_index(IndexDef::new("people_email", t.clone(), 1, true))
            .unwrap();

        let (a, ka) = person(&t, 1, Some("a@x"));
        let (b, kb) = person(&t, 2, Some("a@x"));
        let (c, kc) = person(&t, 3, None);
        let (d, kd) = person(&t, 4, None);
        store.insert(&a, ka).unwrap();
        assert!(store.insert(&b, kb).unwrap_err().is_constraint_violation());
        store.insert(&c, kc).unwrap();
        store.insert(&d, kd).unwrap();
        assert_eq!(store.index("people_email").unwrap().len(), 3);
    }

    #[test]
    fn test_create_index_rejects_bad_columns() {
        let t = TypeRegistry::new().table_type(
            "blobs",
            vec![
                FieldDef::not_null("id", DataType::Int64),
                FieldDef::new("data", DataType::Bytes),
            ],
            vec![0],
        );
        let mut store = TableStore::new(t.clone(), None);
        assert!(store
            .create_index(IndexDef::new("blobs_data", t.clone(), 1, false))
            .is_err());
        assert!(store
            .create_index(IndexDef::new("blobs_x", t.clone(), 5, false))
            .is_err());
        store
            .create_index(IndexDef::new("blobs_id", t.clone(), 0, false))
            .unwrap();
        assert!(store
            .create_index(IndexDef::new("blobs_id", t, 0, false))
            .is_err());
    }

    #[test]
    fn test_index_range() {
        let t = people();
        let mut store = TableStore::new(t.clone(), None);
        store
            .create_index(IndexDef::new("people_email", t.clone(), 1, false))
            .unwrap();
        for (id, email) in [(1, "b"), (2, "a"), (3, "c"), (4, "b")] {
            let (row, hkey) = person(&t, id, Some(email));
            store.insert(&row, hkey).unwrap();
        }
        let index = store.index("people_email").unwrap();
        let range = ResolvedKeyRange {
            lo: Bound::Excluded(Value::from("a")),
            hi: Bound::Included(Value::from("b")),
        };
        let ids: Vec<i64> = index
            .range(&range)
            .iter()
            .map(|(_, _, r)| r.field(0).and_then(Value::as_i64).unwrap())
            .collect();
        assert_eq!(ids, vec![1, 4]);

        let empty = ResolvedKeyRange {
            lo: Bound::Included(Value::from("c")),
            hi: Bound::Excluded(Value::from("a")),
        };
        assert!(index.range(&empty).is_empty());
    }

    #[test]
    fn test_replace_updates_indexes() {
        let t = people();
        let mut store = TableStore::new(t.clone(), None);
        store
            .create_index(IndexDef::new("people_email", t.clone(), 1, true))
            .unwrap();
        let (row, hkey) = person(&t, 1, Some("old"));
        store.insert(&row, hkey.clone()).unwrap();
        let (new, _) = person(&t, 1, Some("new"));
        store.replace(&hkey, &new).unwrap();

        let index = store.index("people_email").unwrap();
        assert!(!index.contains_key(&Value::from("old")));
        assert!(index.contains_key(&Value::from("new")));
        assert_eq!(store.get(&hkey).unwrap().field(1), Some(&Value::from("new")));
    }

    #[test]
    fn test_remove_descendants() {
        let t = people();
        let mut store = TableStore::new(t.clone(), None);
        let parent = HKey::new().with_segment(1, vec![Value::Int64(1)]);
        for child in 1..=3 {
            let row = Row::new(t.clone(), vec![Value::Int64(child), Value::Null]);
            store
                .insert(&row, parent.clone().with_segment(2, vec![Value::Int64(child)]))
                .unwrap();
        }
        let other = Row::new(t.clone(), vec![Value::Int64(9), Value::Null]);
        store
            .insert(&other, HKey::new().with_segment(1, vec![Value::Int64(2)]))
            .unwrap();

        assert!(store.has_descendants(&parent));
        assert_eq!(store.remove_descendants(&parent), 3);
        assert!(!store.has_descendants(&parent));
        assert_eq!(store.len(), 1);
    }
}
