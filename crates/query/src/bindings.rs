//! Binding slots for query parameters and intermediate values.
//!
//! Slots are small dense indices allocated by the planner. The execution
//! core never interprets a slot, it only stores and retrieves by index.
//! An unset slot is an error on read, never a default: a legitimate SQL
//! NULL is a slot holding `Value::Null`.
//!
//! `QueryBindings` is what real execution uses. A scope derived with
//! [`QueryBindings::create_bindings`] sees its parent's slots unless it
//! sets its own, so nested loops can bind per-row values without touching
//! the bindings other scans of the same plan are using.

use crate::bloom::BloomFilter;
use crate::error::{ExecutionError, Result};
use core::fmt;
use keel_core::{HKey, Row, Value};
use std::sync::Arc;

/// Growable array of optional slots addressed by dense index.
#[derive(Clone, Debug)]
pub struct SparseArray<T> {
    slots: Vec<Option<T>>,
    defined: usize,
}

impl<T> SparseArray<T> {
    /// Creates an empty array.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            defined: 0,
        }
    }

    /// Creates an empty array with room for `capacity` slots.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            defined: 0,
        }
    }

    /// Returns the slot at `index`, if set.
    pub fn get(&self, index: usize) -> Option<&T> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// Stores `item` at `index`, growing as needed. Returns the previous item.
    pub fn set(&mut self, index: usize, item: T) -> Option<T> {
        if index >= self.slots.len() {
            let new_len = (index + 1).max(self.slots.len() * 2);
            self.slots.resize_with(new_len, || None);
        }
        let previous = self.slots[index].replace(item);
        if previous.is_none() {
            self.defined += 1;
        }
        previous
    }

    /// Clears the slot at `index`. Returns the removed item.
    pub fn remove(&mut self, index: usize) -> Option<T> {
        let removed = self.slots.get_mut(index).and_then(Option::take);
        if removed.is_some() {
            self.defined -= 1;
        }
        removed
    }

    /// Returns true if `index` holds an item.
    pub fn is_defined(&self, index: usize) -> bool {
        self.get(index).is_some()
    }

    /// Returns the number of set slots.
    pub fn defined_count(&self) -> usize {
        self.defined
    }

    /// Clears every slot.
    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.defined = 0;
    }

    /// Iterates over set slots in index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|item| (i, item)))
    }
}

impl<T> Default for SparseArray<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Minimal index -> value binding storage.
pub trait Bindings {
    /// Returns the value at `index`, or `BindingNotSet`.
    fn get(&self, index: usize) -> Result<&Value>;

    /// Stores `value` at `index`.
    fn set(&mut self, index: usize, value: Value);
}

/// Raw view of a binding slot, distinguishing "never set" from a value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Slot<'a> {
    /// Nothing was ever stored here.
    Unset,
    /// The slot holds this value (which may be Null).
    Value(&'a Value),
}

/// Plain `Bindings` over a sparse array of values.
#[derive(Clone, Debug, Default)]
pub struct ArrayBindings {
    values: SparseArray<Value>,
}

impl ArrayBindings {
    /// Creates empty bindings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the slot at `index` without failing on an unset slot.
    pub fn slot(&self, index: usize) -> Slot<'_> {
        match self.values.get(index) {
            Some(value) => Slot::Value(value),
            None => Slot::Unset,
        }
    }

    /// Clears every slot.
    pub fn clear(&mut self) {
        self.values.clear();
    }
}

impl Bindings for ArrayBindings {
    fn get(&self, index: usize) -> Result<&Value> {
        self.values
            .get(index)
            .ok_or(ExecutionError::BindingNotSet { index })
    }

    fn set(&mut self, index: usize, value: Value) {
        self.values.set(index, value);
    }
}

/// What a `QueryBindings` slot can hold.
#[derive(Clone, Debug)]
pub enum BindingValue {
    /// A scalar parameter or computed value.
    Value(Value),
    /// An outer row, e.g. bound by a nested loop.
    Row(Row),
    /// A hierarchical key.
    HKey(HKey),
    /// A set-membership filter for semi-join pruning.
    BloomFilter(Arc<BloomFilter>),
}

impl BindingValue {
    /// Returns the kind name used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            BindingValue::Value(_) => "value",
            BindingValue::Row(_) => "row",
            BindingValue::HKey(_) => "hkey",
            BindingValue::BloomFilter(_) => "bloom filter",
        }
    }
}

/// Binding slots for one scan scope.
pub struct QueryBindings {
    parent: Option<Arc<QueryBindings>>,
    depth: u32,
    slots: SparseArray<BindingValue>,
}

impl QueryBindings {
    /// Creates top-level (depth 0) bindings.
    pub fn new() -> Self {
        Self {
            parent: None,
            depth: 0,
            slots: SparseArray::new(),
        }
    }

    /// Derives a nested scope one level deeper. Slots not set in the new
    /// scope read through to `self`; setting them never affects `self`.
    pub fn create_bindings(self: &Arc<Self>) -> QueryBindings {
        QueryBindings {
            parent: Some(Arc::clone(self)),
            depth: self.depth + 1,
            slots: SparseArray::new(),
        }
    }

    /// Returns the nesting depth; top-level bindings are at 0.
    #[inline]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Returns the enclosing scope.
    pub fn parent(&self) -> Option<&Arc<QueryBindings>> {
        self.parent.as_ref()
    }

    /// Returns true if `self` is `other` or one of the scopes `other` was derived from.
    pub fn is_ancestor(&self, other: &QueryBindings) -> bool {
        let mut current = Some(other);
        while let Some(bindings) = current {
            if core::ptr::eq(self, bindings) {
                return true;
            }
            current = bindings.parent.as_deref();
        }
        false
    }

    fn lookup(&self, index: usize) -> Option<&BindingValue> {
        match self.slots.get(index) {
            Some(binding) => Some(binding),
            None => self.parent.as_ref().and_then(|p| p.lookup(index)),
        }
    }

    fn binding(&self, index: usize) -> Result<&BindingValue> {
        self.lookup(index)
            .ok_or(ExecutionError::BindingNotSet { index })
    }

    /// Returns true if `index` is set in this scope or an enclosing one.
    pub fn is_defined(&self, index: usize) -> bool {
        self.lookup(index).is_some()
    }

    /// Returns the raw binding at `index`.
    pub fn get_binding(&self, index: usize) -> Result<&BindingValue> {
        self.binding(index)
    }

    /// Stores any kind of binding at `index`.
    pub fn set_binding(&mut self, index: usize, binding: BindingValue) {
        self.slots.set(index, binding);
    }

    /// Returns the scalar value at `index`.
    pub fn value(&self, index: usize) -> Result<&Value> {
        match self.binding(index)? {
            BindingValue::Value(value) => Ok(value),
            other => Err(mismatch(index, "value", other)),
        }
    }

    /// Stores a scalar value at `index`.
    pub fn set_value(&mut self, index: usize, value: Value) {
        self.set_binding(index, BindingValue::Value(value));
    }

    /// Returns the row at `index`.
    pub fn row(&self, index: usize) -> Result<&Row> {
        match self.binding(index)? {
            BindingValue::Row(row) => Ok(row),
            other => Err(mismatch(index, "row", other)),
        }
    }

    /// Stores a row at `index`. The bindings hold the row until the slot is
    /// rebound or cleared.
    pub fn set_row(&mut self, index: usize, row: Row) {
        self.set_binding(index, BindingValue::Row(row));
    }

    /// Returns the hierarchical key at `index`.
    pub fn hkey(&self, index: usize) -> Result<&HKey> {
        match self.binding(index)? {
            BindingValue::HKey(hkey) => Ok(hkey),
            other => Err(mismatch(index, "hkey", other)),
        }
    }

    /// Stores a hierarchical key at `index`.
    pub fn set_hkey(&mut self, index: usize, hkey: HKey) {
        self.set_binding(index, BindingValue::HKey(hkey));
    }

    /// Returns the bloom filter at `index`.
    pub fn bloom_filter(&self, index: usize) -> Result<&Arc<BloomFilter>> {
        match self.binding(index)? {
            BindingValue::BloomFilter(filter) => Ok(filter),
            other => Err(mismatch(index, "bloom filter", other)),
        }
    }

    /// Stores a bloom filter at `index`.
    pub fn set_bloom_filter(&mut self, index: usize, filter: Arc<BloomFilter>) {
        self.set_binding(index, BindingValue::BloomFilter(filter));
    }

    /// Clears every slot set in this scope.
    pub fn clear(&mut self) {
        self.slots.clear();
    }
}

impl Bindings for QueryBindings {
    fn get(&self, index: usize) -> Result<&Value> {
        self.value(index)
    }

    fn set(&mut self, index: usize, value: Value) {
        self.set_value(index, value);
    }
}

impl Default for QueryBindings {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for QueryBindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (index, binding) in self.slots.iter() {
            map.entry(&index, binding);
        }
        map.finish()?;
        write!(f, "@{}", self.depth)
    }
}

fn mismatch(index: usize, expected: &'static str, actual: &BindingValue) -> ExecutionError {
    ExecutionError::BindingKindMismatch {
        index,
        expected,
        actual: actual.kind(),
    }
}

/// A value that is either fixed in the plan or read from a binding slot
/// when a scan opens.
#[derive(Clone, Debug, PartialEq)]
pub enum BoundValue {
    /// A literal fixed at plan-build time.
    Literal(Value),
    /// The scalar in this binding slot.
    Binding(usize),
    /// A field of the row in this binding slot, as bound by an outer loop.
    RowField { binding: usize, field: usize },
}

impl BoundValue {
    /// Resolves against the bindings of the current scan.
    pub fn resolve(&self, bindings: &QueryBindings) -> Result<Value> {
        match self {
            BoundValue::Literal(value) => Ok(value.clone()),
            BoundValue::Binding(index) => bindings.value(*index).cloned(),
            BoundValue::RowField { binding, field } => {
                let row = bindings.row(*binding)?;
                row.field(*field).cloned().ok_or_else(|| {
                    ExecutionError::InvalidArgument(format!("{} has no field {}", row, field))
                })
            }
        }
    }

    /// Resolves to a non-negative count, for skip and limit arguments.
    pub fn resolve_count(&self, bindings: &QueryBindings) -> Result<usize> {
        let value = self.resolve(bindings)?;
        match value.to_i64() {
            Some(n) if n >= 0 => Ok(n as usize),
            _ => Err(ExecutionError::InvalidArgument(format!(
                "expected a non-negative integer, got {}",
                value
            ))),
        }
    }
}

impl From<Value> for BoundValue {
    fn from(value: Value) -> Self {
        BoundValue::Literal(value)
    }
}

impl fmt::Display for BoundValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundValue::Literal(value) => write!(f, "{}", value),
            BoundValue::Binding(index) => write!(f, "${}", index),
            BoundValue::RowField { binding, field } => write!(f, "${}.{}", binding, field),
        }
    }
}
