//! Row type definitions.
//!
//! A `RowType` describes the ordered, typed fields of the rows an operator
//! produces. Types backed by stored tables are distinguished from derived
//! types synthesized by operators (values lists, counts, products).

use crate::types::DataType;
use core::fmt;
use core::hash::{Hash, Hasher};
use core::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Identifier of a row type, unique within one `TypeRegistry`.
pub type RowTypeId = u32;

/// A single field of a row type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDef {
    /// Field name.
    pub name: String,
    /// Field data type.
    pub data_type: DataType,
    /// Whether the field accepts Null.
    pub nullable: bool,
}

impl FieldDef {
    /// Creates a nullable field.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
        }
    }

    /// Creates a field that rejects Null.
    pub fn not_null(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: false,
        }
    }
}

/// Which operator synthesized a derived row type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DerivedKind {
    /// Literal rows from a values list.
    Values,
    /// Single-field count result.
    Count,
    /// Concatenation of two input types.
    Product,
}

/// Where the rows of a type come from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RowTypeKind {
    /// Rows stored in a table. `ordinal` positions the table in the
    /// hierarchical key space; `primary_key` lists the key field positions.
    Table { ordinal: u32, primary_key: Vec<usize> },
    /// Rows synthesized by an operator.
    Derived(DerivedKind),
}

/// Shape of a row. Identity is the id: two row types are equal iff their ids are.
#[derive(Clone, Debug)]
pub struct RowType {
    id: RowTypeId,
    name: String,
    fields: Vec<FieldDef>,
    kind: RowTypeKind,
}

impl RowType {
    /// Returns the type id.
    #[inline]
    pub fn id(&self) -> RowTypeId {
        self.id
    }

    /// Returns the type name (table name for table types).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the fields in order.
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Returns the number of fields.
    #[inline]
    pub fn n_fields(&self) -> usize {
        self.fields.len()
    }

    /// Returns the field at `index`.
    pub fn field(&self, index: usize) -> Option<&FieldDef> {
        self.fields.get(index)
    }

    /// Returns the kind of this type.
    pub fn kind(&self) -> &RowTypeKind {
        &self.kind
    }

    /// Returns true if this type is synthesized by an operator.
    pub fn is_derived(&self) -> bool {
        matches!(self.kind, RowTypeKind::Derived(_))
    }

    /// Returns the table ordinal for table types.
    pub fn table_ordinal(&self) -> Option<u32> {
        match &self.kind {
            RowTypeKind::Table { ordinal, .. } => Some(*ordinal),
            RowTypeKind::Derived(_) => None,
        }
    }

    /// Returns the primary key field positions; empty for derived types.
    pub fn primary_key(&self) -> &[usize] {
        match &self.kind {
            RowTypeKind::Table { primary_key, .. } => primary_key,
            RowTypeKind::Derived(_) => &[],
        }
    }
}

impl PartialEq for RowType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for RowType {}

impl Hash for RowType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for RowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.id)
    }
}

/// Shared handle to a row type.
pub type RowTypeRef = Arc<RowType>;

/// Allocates row types with fresh identifiers.
///
/// The planner owns one registry per schema; operators that synthesize rows
/// receive their derived types from it at plan-build time.
#[derive(Debug)]
pub struct TypeRegistry {
    next_id: AtomicU32,
    next_ordinal: AtomicU32,
}

impl TypeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU32::new(1),
            next_ordinal: AtomicU32::new(1),
        }
    }

    fn next_id(&self) -> RowTypeId {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Creates a table-backed type. Table ordinals are assigned in creation order.
    pub fn table_type(
        &self,
        name: impl Into<String>,
        fields: Vec<FieldDef>,
        primary_key: Vec<usize>,
    ) -> RowTypeRef {
        let ordinal = self.next_ordinal.fetch_add(1, Ordering::SeqCst);
        Arc::new(RowType {
            id: self.next_id(),
            name: name.into(),
            fields,
            kind: RowTypeKind::Table {
                ordinal,
                primary_key,
            },
        })
    }

    /// Creates a derived type for a literal values list.
    pub fn values_type(&self, fields: Vec<FieldDef>) -> RowTypeRef {
        let id = self.next_id();
        Arc::new(RowType {
            id,
            name: format!("values_{}", id),
            fields,
            kind: RowTypeKind::Derived(DerivedKind::Values),
        })
    }

    /// Creates the single-field Int64 type produced by count operators.
    pub fn count_type(&self) -> RowTypeRef {
        let id = self.next_id();
        Arc::new(RowType {
            id,
            name: format!("count_{}", id),
            fields: vec![FieldDef::not_null("count", DataType::Int64)],
            kind: RowTypeKind::Derived(DerivedKind::Count),
        })
    }

    /// Creates the concatenation of `left` and `right`.
    pub fn product_type(&self, left: &RowType, right: &RowType) -> RowTypeRef {
        let id = self.next_id();
        let fields = left.fields.iter().chain(right.fields.iter()).cloned().collect();
        Arc::new(RowType {
            id,
            name: format!("product_{}_{}", left.name, right.name),
            fields,
            kind: RowTypeKind::Derived(DerivedKind::Product),
        })
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
