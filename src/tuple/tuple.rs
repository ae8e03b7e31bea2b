use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};

use crate::common::{RecordId, Result, StrataError};

use super::{Schema, Value};

/// A fixed-width record laid out according to its schema.
///
/// The payload is exactly `schema.width()` bytes: each column at its offset,
/// integers little-endian, chars NUL-padded. Tuples read out of an index leaf
/// also carry the record locator of the slot they came from.
#[derive(Clone)]
pub struct Tuple {
    schema: Arc<Schema>,
    data: Bytes,
    rid: Option<RecordId>,
}

impl Tuple {
    /// Encodes `values` (one per column, in order) into a new tuple.
    pub fn new(schema: Arc<Schema>, values: &[Value]) -> Result<Self> {
        if values.len() != schema.column_count() {
            return Err(StrataError::SchemaMismatch(format!(
                "expected {} values, got {}",
                schema.column_count(),
                values.len()
            )));
        }

        let mut data = BytesMut::zeroed(schema.width());
        for (col, value) in schema.columns().zip(values) {
            let slot = &mut data[col.offset()..col.offset() + col.size()];
            if !value.encode_into(col.data_type(), slot) {
                return Err(StrataError::TypeMismatch {
                    column: col.name().to_string(),
                    expected: col.data_type().to_string(),
                });
            }
        }

        Ok(Self {
            schema,
            data: data.freeze(),
            rid: None,
        })
    }

    /// Wraps an already encoded payload.
    pub fn from_bytes(schema: Arc<Schema>, data: &[u8]) -> Result<Self> {
        if data.len() != schema.width() {
            return Err(StrataError::TupleSize {
                expected: schema.width(),
                actual: data.len(),
            });
        }
        Ok(Self {
            schema,
            data: Bytes::copy_from_slice(data),
            rid: None,
        })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Returns the encoded payload.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns the payload width in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Decodes the value of column `index`.
    pub fn value(&self, index: usize) -> Option<Value> {
        let col = self.schema.column(index)?;
        Some(Value::decode(
            &self.data[col.offset()..col.offset() + col.size()],
            col.data_type(),
        ))
    }

    /// Decodes every column in order.
    pub fn values(&self) -> Vec<Value> {
        (0..self.schema.column_count())
            .filter_map(|i| self.value(i))
            .collect()
    }

    pub fn rid(&self) -> Option<RecordId> {
        self.rid
    }

    pub fn set_rid(&mut self, rid: RecordId) {
        self.rid = Some(rid);
    }

    /// Compares two tuples column by column.
    /// Fails if the tuples do not share a layout.
    pub fn compare(&self, other: &Tuple) -> Result<Ordering> {
        if !self.schema.is_compatible(&other.schema) {
            return Err(StrataError::SchemaMismatch(
                "cannot compare tuples of different schemas".to_string(),
            ));
        }
        Ok(self.schema.compare_bytes(&self.data, &other.data))
    }
}

impl PartialEq for Tuple {
    fn eq(&self, other: &Self) -> bool {
        matches!(self.compare(other), Ok(Ordering::Equal))
    }
}

impl PartialOrd for Tuple {
    /// Tuples of different layouts are unordered.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.compare(other).ok()
    }
}

impl fmt::Debug for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tuple")
            .field("values", &self.values())
            .field("rid", &self.rid)
            .finish()
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, value) in self.values().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", value)?;
        }
        write!(f, ")")
    }
}
