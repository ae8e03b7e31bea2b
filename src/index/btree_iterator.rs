use std::fmt;
use std::sync::Arc;

use crate::buffer::BufferPoolManager;
use crate::common::{PageId, RecordId, Result, SlotId, StrataError, INVALID_PAGE_ID};
use crate::tuple::{Schema, Tuple};

/// Forward cursor over the leaf chain of a `BPlusTree`.
///
/// The cursor holds a position, not a latch: each step pins and read-latches
/// the current leaf only while copying one entry out. Values carry their
/// (leaf page, slot) record id. The end position is `(INVALID_PAGE_ID, -1)`.
pub struct BPlusTreeIterator {
    bpm: Arc<BufferPoolManager>,
    key_schema: Arc<Schema>,
    value_schema: Arc<Schema>,
    page_id: PageId,
    index: i32,
}

impl BPlusTreeIterator {
    pub(crate) fn new(
        bpm: Arc<BufferPoolManager>,
        key_schema: Arc<Schema>,
        value_schema: Arc<Schema>,
        page_id: PageId,
        index: usize,
    ) -> Self {
        Self {
            bpm,
            key_schema,
            value_schema,
            page_id,
            index: index as i32,
        }
    }

    pub(crate) fn end(
        bpm: Arc<BufferPoolManager>,
        key_schema: Arc<Schema>,
        value_schema: Arc<Schema>,
    ) -> Self {
        Self {
            bpm,
            key_schema,
            value_schema,
            page_id: INVALID_PAGE_ID,
            index: -1,
        }
    }

    pub fn is_end(&self) -> bool {
        !self.page_id.is_valid()
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn index(&self) -> i32 {
        self.index
    }

    fn set_end(&mut self) {
        self.page_id = INVALID_PAGE_ID;
        self.index = -1;
    }

    /// Reads the entry under the cursor and advances past it.
    fn advance(&mut self) -> Result<Option<(Tuple, Tuple)>> {
        while !self.is_end() {
            let guard = self
                .bpm
                .checked_read_page(self.page_id)?
                .ok_or(StrataError::BufferPoolFull)?;
            let leaf = guard.as_btree_page()?.into_leaf()?;

            let slot = self.index as usize;
            if slot < leaf.size() {
                let key = Tuple::from_bytes(Arc::clone(&self.key_schema), leaf.key_at(slot))?;
                let mut value =
                    Tuple::from_bytes(Arc::clone(&self.value_schema), leaf.value_at(slot))?;
                value.set_rid(RecordId::new(self.page_id, SlotId::new(slot as u16)));
                self.index += 1;
                return Ok(Some((key, value)));
            }

            let next = leaf.next_page_id();
            if next.is_valid() {
                self.page_id = next;
                self.index = 0;
            } else {
                self.set_end();
            }
        }
        Ok(None)
    }
}

impl Iterator for BPlusTreeIterator {
    type Item = Result<(Tuple, Tuple)>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.advance() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => None,
            Err(e) => {
                self.set_end();
                Some(Err(e))
            }
        }
    }
}

impl PartialEq for BPlusTreeIterator {
    fn eq(&self, other: &Self) -> bool {
        self.page_id == other.page_id && self.index == other.index
    }
}

impl fmt::Debug for BPlusTreeIterator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BPlusTreeIterator")
            .field("page_id", &self.page_id)
            .field("index", &self.index)
            .finish()
    }
}
