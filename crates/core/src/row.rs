//! Row structure for keel.
//!
//! A `Row` is an immutable tuple of values tagged with its `RowType` and,
//! for stored rows, its hierarchical key. Rows are cheap to clone: clones
//! share one allocation, so holding a row past the call that produced it
//! is a matter of keeping a clone.

use crate::hkey::HKey;
use crate::row_type::RowTypeRef;
use crate::value::Value;
use core::fmt;
use std::sync::Arc;

#[derive(Clone)]
struct RowData {
    row_type: RowTypeRef,
    values: Vec<Value>,
    hkey: Option<HKey>,
}

/// An immutable, shareable row.
#[derive(Clone)]
pub struct Row {
    inner: Arc<RowData>,
}

impl Row {
    /// Creates a row of `row_type` holding `values`.
    pub fn new(row_type: RowTypeRef, values: Vec<Value>) -> Self {
        debug_assert_eq!(
            values.len(),
            row_type.n_fields(),
            "row value count does not match {}",
            row_type
        );
        Self {
            inner: Arc::new(RowData {
                row_type,
                values,
                hkey: None,
            }),
        }
    }

    /// Returns this row with its hierarchical key set.
    pub fn with_hkey(mut self, hkey: HKey) -> Self {
        Arc::make_mut(&mut self.inner).hkey = Some(hkey);
        self
    }

    /// Returns the row type.
    #[inline]
    pub fn row_type(&self) -> &RowTypeRef {
        &self.inner.row_type
    }

    /// Returns the values in field order.
    #[inline]
    pub fn values(&self) -> &[Value] {
        &self.inner.values
    }

    /// Gets the value of field `index`.
    pub fn field(&self, index: usize) -> Option<&Value> {
        self.inner.values.get(index)
    }

    /// Returns the hierarchical key for stored rows.
    pub fn hkey(&self) -> Option<&HKey> {
        self.inner.hkey.as_ref()
    }

    /// Returns the number of values in this row.
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.values.len()
    }

    /// Returns true if this row has no values.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.values.is_empty()
    }

    /// Returns the primary key values, in key order.
    pub fn key_values(&self) -> Vec<Value> {
        self.row_type()
            .primary_key()
            .iter()
            .filter_map(|&i| self.field(i).cloned())
            .collect()
    }

    /// Returns an independent copy that shares nothing with `self`.
    pub fn deep_copy(&self) -> Row {
        Row {
            inner: Arc::new((*self.inner).clone()),
        }
    }

    /// Returns true if another holder shares this row's allocation.
    pub fn is_shared(&self) -> bool {
        Arc::strong_count(&self.inner) > 1
    }

    /// Returns true if both handles refer to the same allocation.
    pub fn ptr_eq(a: &Row, b: &Row) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }
}

impl PartialEq for Row {
    fn eq(&self, other: &Self) -> bool {
        self.inner.row_type.id() == other.inner.row_type.id()
            && self.inner.values == other.inner.values
    }
}

impl Eq for Row {}

impl fmt::Debug for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:?}", self.inner.row_type.name(), self.inner.values)?;
        if let Some(hkey) = &self.inner.hkey {
            write!(f, "@{}", hkey)?;
        }
        Ok(())
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[", self.inner.row_type.name())?;
        for (i, value) in self.inner.values.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", value)?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row_type::{FieldDef, TypeRegistry};
    use crate::types::DataType;

    fn users() -> RowTypeRef {
        TypeRegistry::new().table_type(
            "users",
            vec![
                FieldDef::not_null("id", DataType::Int64),
                FieldDef::new("name", DataType::String),
            ],
            vec![0],
        )
    }

    #[test]
    fn test_row_fields() {
        let row = Row::new(users(), vec![Value::Int64(1), Value::String("Alice".into())]);
        assert_eq!(row.len(), 2);
        assert_eq!(row.field(0), Some(&Value::Int64(1)));
        assert_eq!(row.field(2), None);
        assert_eq!(row.key_values(), vec![Value::Int64(1)]);
        assert!(row.hkey().is_none());
    }

    #[test]
    fn test_clone_shares_deep_copy_does_not() {
        let row = Row::new(users(), vec![Value::Int64(1), Value::Null]);
        let held = row.clone();
        assert!(Row::ptr_eq(&row, &held));
        assert!(row.is_shared());

        let pinned = row.deep_copy();
        assert!(!Row::ptr_eq(&row, &pinned));
        assert_eq!(row, pinned);
    }

    #[test]
    fn test_with_hkey() {
        let row = Row::new(users(), vec![Value::Int64(7), Value::Null])
            .with_hkey(HKey::new().with_segment(1, vec![Value::Int64(7)]));
        assert_eq!(row.hkey().map(|k| k.depth()), Some(1));
        assert_eq!(row.to_string(), "users[7, NULL]");
    }
}
