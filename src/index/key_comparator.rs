use std::cmp::Ordering;

use crate::tuple::Schema;

/// Orders encoded keys stored in index pages.
pub trait KeyComparator: Send + Sync {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;
}

/// Keys are tuples of the schema, compared column by column.
impl KeyComparator for Schema {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        self.compare_bytes(a, b)
    }
}
