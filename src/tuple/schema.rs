use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use bytes::{Buf, BufMut};

use crate::common::{Result, StrataError};

use super::value::trim_nul;
use super::DataType;

/// Represents a single column in a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Column name
    name: String,

    /// Column data type
    data_type: DataType,

    /// Byte offset of the column within a tuple (set by Schema)
    offset: usize,
}

impl Column {
    /// Creates a new column definition.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            offset: 0,
        }
    }

    /// Returns the column name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the column data type.
    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    /// Returns the width of this column in bytes.
    pub fn size(&self) -> usize {
        self.data_type.size()
    }

    /// Returns the column's byte offset within a tuple.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Serializes the column definition.
    /// Format: type_id (u32) + size (u64) + name_len (u32) + name, little-endian
    pub fn serialize(&self, out: &mut impl BufMut) {
        out.put_u32_le(self.data_type.type_id());
        out.put_u64_le(self.size() as u64);
        out.put_u32_le(self.name.len() as u32);
        out.put_slice(self.name.as_bytes());
    }

    /// Deserializes a column definition, advancing `data` past it.
    pub fn deserialize(data: &mut impl Buf) -> Result<Self> {
        if data.remaining() < 16 {
            return Err(StrataError::TruncatedSchema);
        }
        let type_id = data.get_u32_le();
        let size = data.get_u64_le() as usize;
        let name_len = data.get_u32_le() as usize;
        if data.remaining() < name_len {
            return Err(StrataError::TruncatedSchema);
        }
        let mut name = vec![0u8; name_len];
        data.copy_to_slice(&mut name);

        Ok(Column::new(
            String::from_utf8_lossy(&name).into_owned(),
            DataType::from_type_id(type_id, size)?,
        ))
    }
}

/// Ordered list of fixed-width columns describing a tuple layout.
#[derive(Debug, Clone)]
pub struct Schema {
    /// Ordered list of columns
    columns: Vec<Column>,

    /// Map from column name to column index for fast lookup
    name_to_index: HashMap<String, usize>,

    /// Total width of a tuple in bytes
    width: usize,
}

impl Schema {
    /// Creates a new schema from a list of columns.
    pub fn new(columns: Vec<Column>) -> Self {
        let mut columns = columns;
        let mut name_to_index = HashMap::new();
        let mut width = 0;

        for (i, col) in columns.iter_mut().enumerate() {
            col.offset = width;
            width += col.size();
            name_to_index.insert(col.name.clone(), i);
        }

        Self {
            columns,
            name_to_index,
            width,
        }
    }

    /// Creates a schema builder for fluent construction.
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    /// Returns the number of columns in the schema.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Returns the column at the given index.
    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    /// Returns the index of the column with the given name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    /// Returns an iterator over all columns.
    pub fn columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter()
    }

    /// Returns the width of a tuple of this schema in bytes.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns true if tuples of `other` have the same layout (column types in order).
    pub fn is_compatible(&self, other: &Schema) -> bool {
        self.columns.len() == other.columns.len()
            && self
                .columns
                .iter()
                .zip(other.columns.iter())
                .all(|(a, b)| a.data_type == b.data_type)
    }

    /// Compares two encoded tuples of this schema column by column.
    /// The first column that differs decides.
    pub fn compare_bytes(&self, a: &[u8], b: &[u8]) -> Ordering {
        for col in &self.columns {
            let range = col.offset..col.offset + col.size();
            let (x, y) = (&a[range.clone()], &b[range]);
            let ord = match col.data_type {
                DataType::Integer => {
                    let x = i32::from_le_bytes([x[0], x[1], x[2], x[3]]);
                    let y = i32::from_le_bytes([y[0], y[1], y[2], y[3]]);
                    x.cmp(&y)
                }
                DataType::Boolean => (x[0] != 0).cmp(&(y[0] != 0)),
                DataType::Char(_) => trim_nul(x).cmp(trim_nul(y)),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// Serializes the schema for catalog storage.
    /// Format: column_count (u32) + [column...]
    pub fn serialize(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.put_u32_le(self.columns.len() as u32);
        for col in &self.columns {
            col.serialize(&mut bytes);
        }
        bytes
    }

    /// Deserializes a schema written by `serialize`.
    pub fn deserialize(mut data: &[u8]) -> Result<Self> {
        if data.remaining() < 4 {
            return Err(StrataError::TruncatedSchema);
        }
        let column_count = data.get_u32_le() as usize;
        let columns = (0..column_count)
            .map(|_| Column::deserialize(&mut data))
            .collect::<Result<Vec<_>>>()?;
        Ok(Schema::new(columns))
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.columns == other.columns
    }
}

impl Eq for Schema {}

/// Builder for constructing schemas fluently.
#[derive(Default)]
pub struct SchemaBuilder {
    columns: Vec<Column>,
}

impl SchemaBuilder {
    /// Creates a new schema builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a column.
    pub fn column(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.columns.push(Column::new(name, data_type));
        self
    }

    /// Builds the schema.
    pub fn build(self) -> Schema {
        Schema::new(self.columns)
    }

    /// Builds the schema wrapped in an Arc for sharing.
    pub fn build_arc(self) -> Arc<Schema> {
        Arc::new(self.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Schema {
        Schema::builder()
            .column("id", DataType::Integer)
            .column("name", DataType::Char(8))
            .column("active", DataType::Boolean)
            .build()
    }

    #[test]
    fn test_schema_layout() {
        let schema = sample();
        assert_eq!(schema.width(), 13);
        assert_eq!(schema.column(1).unwrap().offset(), 4);
        assert_eq!(schema.column(2).unwrap().offset(), 12);
        assert_eq!(schema.column_index("active"), Some(2));
        assert_eq!(schema.column_index("missing"), None);
    }

    #[test]
    fn test_schema_serialize_round_trip() {
        let schema = sample();
        let bytes = schema.serialize();
        // count + (type + size + name_len) per column + names
        assert_eq!(bytes.len(), 4 + 3 * 16 + "id".len() + "name".len() + "active".len());
        assert_eq!(Schema::deserialize(&bytes).unwrap(), schema);
    }

    #[test]
    fn test_schema_deserialize_truncated() {
        let bytes = sample().serialize();
        assert!(matches!(
            Schema::deserialize(&bytes[..bytes.len() - 1]),
            Err(StrataError::TruncatedSchema)
        ));
    }

    #[test]
    fn test_schema_compatibility_ignores_names() {
        let a = Schema::builder().column("k", DataType::Integer).build();
        let b = Schema::builder().column("other", DataType::Integer).build();
        let c = Schema::builder().column("k", DataType::Char(4)).build();
        assert!(a.is_compatible(&b));
        assert!(!a.is_compatible(&c));
    }

    #[test]
    fn test_schema_compare_bytes_signed() {
        let schema = Schema::builder().column("k", DataType::Integer).build();
        let neg = (-5i32).to_le_bytes();
        let pos = 3i32.to_le_bytes();
        assert_eq!(schema.compare_bytes(&neg, &pos), Ordering::Less);
    }
}
