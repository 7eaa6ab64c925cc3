//! Data type definitions for keel.
//!
//! This module defines the scalar types a row field can hold.

use core::fmt;

/// Supported scalar data types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataType {
    /// Boolean type (true/false)
    Boolean,
    /// 32-bit signed integer
    Int32,
    /// 64-bit signed integer
    Int64,
    /// 64-bit floating point number
    Float64,
    /// UTF-8 string
    String,
    /// Binary data
    Bytes,
}

impl DataType {
    /// Returns the lowercase SQL-ish name of this type.
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Boolean => "boolean",
            DataType::Int32 => "int",
            DataType::Int64 => "bigint",
            DataType::Float64 => "double",
            DataType::String => "varchar",
            DataType::Bytes => "varbinary",
        }
    }

    /// Returns whether this type can be used as an index key.
    pub fn is_indexable(&self) -> bool {
        !matches!(self, DataType::Bytes)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_equality() {
        assert_eq!(DataType::Int32, DataType::Int32);
        assert_ne!(DataType::Int32, DataType::Int64);
    }

    #[test]
    fn test_indexable() {
        assert!(DataType::Int64.is_indexable());
        assert!(!DataType::Bytes.is_indexable());
    }

    #[test]
    fn test_display() {
        assert_eq!(DataType::Int64.to_string(), "bigint");
        assert_eq!(DataType::Bytes.to_string(), "varbinary");
    }
}
