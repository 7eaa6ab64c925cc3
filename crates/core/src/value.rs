//! Runtime scalar values.
//!
//! `Value` is the single scalar representation used by rows, bindings and
//! index keys. Values have a total order: Null first, then values grouped by
//! type, then by value within a type. Equality and hashing agree with that
//! order, so values can key both ordered and hashed collections.

use crate::types::DataType;
use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};

/// A scalar value held by a row field or a binding slot.
#[derive(Clone, Debug)]
pub enum Value {
    Null,
    Boolean(bool),
    Int32(i32),
    Int64(i64),
    /// NaN sorts above every other float and equals itself.
    Float64(f64),
    String(String),
    Bytes(Vec<u8>),
}

impl Value {
    /// Returns the data type, or None for Null.
    pub fn data_type(&self) -> Option<DataType> {
        Some(match self {
            Value::Null => return None,
            Value::Boolean(_) => DataType::Boolean,
            Value::Int32(_) => DataType::Int32,
            Value::Int64(_) => DataType::Int64,
            Value::Float64(_) => DataType::Float64,
            Value::String(_) => DataType::String,
            Value::Bytes(_) => DataType::Bytes,
        })
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        if let Value::Int64(n) = self {
            Some(*n)
        } else {
            None
        }
    }

    /// Returns an integral value widened to i64, for Int32 and Int64.
    pub fn to_i64(&self) -> Option<i64> {
        match self {
            Value::Int32(n) => Some(i64::from(*n)),
            Value::Int64(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        if let Value::String(s) = self {
            Some(s)
        } else {
            None
        }
    }

    /// Returns true if this value may be stored in a field of type `dt`.
    ///
    /// Null is accepted by every type; nullability is checked separately.
    pub fn conforms_to(&self, dt: DataType) -> bool {
        self.data_type().map_or(true, |own| own == dt)
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Boolean(_) => 1,
            Value::Int32(_) => 2,
            Value::Int64(_) => 3,
            Value::Float64(_) => 4,
            Value::String(_) => 5,
            Value::Bytes(_) => 6,
        }
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Int32(a), Value::Int32(b)) => a.cmp(b),
            (Value::Int64(a), Value::Int64(b)) => a.cmp(b),
            (Value::Float64(a), Value::Float64(b)) => a.total_cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Bytes(a), Value::Bytes(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u8(self.rank());
        match self {
            Value::Null => {}
            Value::Boolean(b) => b.hash(state),
            Value::Int32(n) => n.hash(state),
            Value::Int64(n) => n.hash(state),
            Value::Float64(x) => x.to_bits().hash(state),
            Value::String(s) => s.hash(state),
            Value::Bytes(b) => b.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Boolean(b) => b.fmt(f),
            Value::Int32(n) => n.fmt(f),
            Value::Int64(n) => n.fmt(f),
            Value::Float64(x) => x.fmt(f),
            Value::String(s) => write!(f, "'{}'", s),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

macro_rules! value_from {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

value_from! {
    bool => Boolean,
    i32 => Int32,
    i64 => Int64,
    f64 => Float64,
    String => String,
    Vec<u8> => Bytes,
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}
