use std::fmt;

use super::DataType;

/// A typed column value, as supplied to or read back from a tuple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Integer(i32),
    Boolean(bool),
    /// String value for Char columns; stored NUL-padded to the column width
    Char(String),
}

impl Value {
    /// Encodes the value into `out`, which is exactly the column's width.
    /// Returns false if the value does not fit the type.
    pub(crate) fn encode_into(&self, data_type: &DataType, out: &mut [u8]) -> bool {
        match (self, data_type) {
            (Value::Integer(v), DataType::Integer) => {
                out.copy_from_slice(&v.to_le_bytes());
                true
            }
            (Value::Boolean(b), DataType::Boolean) => {
                out[0] = u8::from(*b);
                true
            }
            (Value::Char(s), DataType::Char(_)) => {
                let bytes = s.as_bytes();
                if bytes.len() > out.len() {
                    return false;
                }
                out[..bytes.len()].copy_from_slice(bytes);
                out[bytes.len()..].fill(0);
                true
            }
            _ => false,
        }
    }

    /// Decodes a value of `data_type` from its column bytes.
    pub(crate) fn decode(data: &[u8], data_type: &DataType) -> Self {
        match data_type {
            DataType::Integer => Value::Integer(i32::from_le_bytes([data[0], data[1], data[2], data[3]])),
            DataType::Boolean => Value::Boolean(data[0] != 0),
            DataType::Char(_) => {
                let s = String::from_utf8_lossy(trim_nul(data)).into_owned();
                Value::Char(s)
            }
        }
    }
}

/// The bytes of a NUL-padded char column up to its first NUL.
pub(crate) fn trim_nul(data: &[u8]) -> &[u8] {
    match data.iter().position(|&b| b == 0) {
        Some(end) => &data[..end],
        None => data,
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Char(v.to_string())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{}", v),
            Value::Boolean(v) => write!(f, "{}", v),
            Value::Char(v) => write!(f, "'{}'", v),
        }
    }
}
