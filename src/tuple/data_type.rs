use std::fmt;

use crate::common::{Result, StrataError};

/// Column types supported by tuples.
/// Every type has a fixed width, so tuple layouts are fully determined by the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// 32-bit signed integer: 4 bytes, little-endian
    Integer,

    /// Boolean type: 1 byte (0 = false, anything else = true)
    Boolean,

    /// Fixed-length character string: exactly n bytes, NUL-padded
    Char(u16),
}

impl DataType {
    /// Returns the width of a value of this type in bytes.
    pub fn size(&self) -> usize {
        match self {
            DataType::Integer => 4,
            DataType::Boolean => 1,
            DataType::Char(n) => *n as usize,
        }
    }

    /// Returns the persisted type tag.
    pub fn type_id(&self) -> u32 {
        match self {
            DataType::Integer => 1,
            DataType::Boolean => 2,
            DataType::Char(_) => 3,
        }
    }

    /// Rebuilds a type from its persisted tag and width.
    pub fn from_type_id(type_id: u32, size: usize) -> Result<Self> {
        match type_id {
            1 => Ok(DataType::Integer),
            2 => Ok(DataType::Boolean),
            3 => u16::try_from(size)
                .map(DataType::Char)
                .map_err(|_| StrataError::UnknownType(type_id)),
            other => Err(StrataError::UnknownType(other)),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Integer => write!(f, "INTEGER"),
            DataType::Boolean => write!(f, "BOOLEAN"),
            DataType::Char(n) => write!(f, "CHAR({})", n),
        }
    }
}
