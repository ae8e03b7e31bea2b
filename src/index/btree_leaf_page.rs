use std::cmp::Ordering;

use crate::common::{PageId, INVALID_PAGE_ID, LEAF_PAGE_HEADER_SIZE};

use super::btree_page::{
    init_header, read_i32, read_page_id, read_u64, write_i32, write_page_id, BTreePageType,
    KEY_SIZE_OFFSET, MAX_SIZE_OFFSET, NEXT_PAGE_ID_OFFSET, SIZE_OFFSET, VALUE_SIZE_OFFSET,
};
use super::KeyComparator;

/// View of a leaf page.
///
/// Layout: 32-byte header, then `size` packed (key, value) pairs in ascending
/// key order. Leaves are chained left to right through `next_page_id`.
pub struct LeafPage<B> {
    data: B,
}

impl<B: AsRef<[u8]>> LeafPage<B> {
    /// Wraps a buffer without checking its header; see `BTreePage::decode`.
    pub fn new(data: B) -> Self {
        Self { data }
    }

    fn bytes(&self) -> &[u8] {
        self.data.as_ref()
    }

    pub fn size(&self) -> usize {
        read_i32(self.bytes(), SIZE_OFFSET) as usize
    }

    pub fn max_size(&self) -> usize {
        read_i32(self.bytes(), MAX_SIZE_OFFSET) as usize
    }

    /// A non-root leaf holds at least `max_size / 2` entries.
    pub fn min_size(&self) -> usize {
        self.max_size() / 2
    }

    pub fn key_size(&self) -> usize {
        read_u64(self.bytes(), KEY_SIZE_OFFSET) as usize
    }

    pub fn value_size(&self) -> usize {
        read_u64(self.bytes(), VALUE_SIZE_OFFSET) as usize
    }

    pub fn next_page_id(&self) -> PageId {
        read_page_id(self.bytes(), NEXT_PAGE_ID_OFFSET)
    }

    pub fn is_full(&self) -> bool {
        self.size() >= self.max_size()
    }

    fn pair_size(&self) -> usize {
        self.key_size() + self.value_size()
    }

    fn entry_offset(&self, index: usize) -> usize {
        LEAF_PAGE_HEADER_SIZE + index * self.pair_size()
    }

    pub fn key_at(&self, index: usize) -> &[u8] {
        let offset = self.entry_offset(index);
        &self.bytes()[offset..offset + self.key_size()]
    }

    pub fn value_at(&self, index: usize) -> &[u8] {
        let offset = self.entry_offset(index) + self.key_size();
        &self.bytes()[offset..offset + self.value_size()]
    }

    /// Binary search for `key`: `Ok(slot)` if present, otherwise `Err(slot)`
    /// where it would be inserted.
    pub fn lookup(&self, key: &[u8], cmp: &impl KeyComparator) -> Result<usize, usize> {
        let (mut lo, mut hi) = (0, self.size());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match cmp.compare(self.key_at(mid), key) {
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
                Ordering::Equal => return Ok(mid),
            }
        }
        Err(lo)
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> LeafPage<B> {
    fn bytes_mut(&mut self) -> &mut [u8] {
        self.data.as_mut()
    }

    /// Formats the buffer as an empty leaf with no successor.
    pub fn init(&mut self, max_size: usize, key_size: usize, value_size: usize) {
        init_header(self.bytes_mut(), BTreePageType::Leaf, max_size, key_size, value_size);
        self.set_next_page_id(INVALID_PAGE_ID);
    }

    fn set_size(&mut self, size: usize) {
        write_i32(self.bytes_mut(), SIZE_OFFSET, size as i32);
    }

    pub fn set_next_page_id(&mut self, page_id: PageId) {
        write_page_id(self.bytes_mut(), NEXT_PAGE_ID_OFFSET, page_id);
    }

    /// Inserts an entry at `index`, shifting later entries right.
    /// The page must not be full.
    pub fn insert_at(&mut self, index: usize, key: &[u8], value: &[u8]) {
        let size = self.size();
        debug_assert!(size < self.max_size() && index <= size);

        let start = self.entry_offset(index);
        let end = self.entry_offset(size);
        let pair = self.pair_size();
        let key_size = self.key_size();
        let data = self.bytes_mut();
        data.copy_within(start..end, start + pair);
        data[start..start + key_size].copy_from_slice(key);
        data[start + key_size..start + pair].copy_from_slice(value);
        self.set_size(size + 1);
    }

    /// Inserts in key order. Returns false if the key is already present.
    pub fn insert(&mut self, key: &[u8], value: &[u8], cmp: &impl KeyComparator) -> bool {
        match self.lookup(key, cmp) {
            Ok(_) => false,
            Err(slot) => {
                self.insert_at(slot, key, value);
                true
            }
        }
    }

    /// Removes the entry at `index`, shifting later entries left.
    pub fn remove_at(&mut self, index: usize) {
        let size = self.size();
        debug_assert!(index < size);

        let start = self.entry_offset(index);
        let pair = self.pair_size();
        let end = self.entry_offset(size);
        self.bytes_mut().copy_within(start + pair..end, start);
        self.set_size(size - 1);
    }

    /// Copies entries `from..size` of `src` onto the end of this page.
    fn append_range<S: AsRef<[u8]>>(&mut self, src: &LeafPage<S>, from: usize) {
        let count = src.size() - from;
        let size = self.size();
        let dst = self.entry_offset(size);
        let block = &src.bytes()[src.entry_offset(from)..src.entry_offset(src.size())];
        self.bytes_mut()[dst..dst + block.len()].copy_from_slice(block);
        self.set_size(size + count);
    }

    /// Appends every entry of `src`, used when merging a right sibling into this page.
    pub fn append_all<S: AsRef<[u8]>>(&mut self, src: &LeafPage<S>) {
        self.append_range(src, 0);
    }

    /// Splits this full page around the insertion of (key, value).
    ///
    /// `recipient` must be a freshly initialized leaf that will sit right of
    /// this one. The left page keeps `(max_size + 1) / 2` entries; the new entry
    /// lands on whichever side its key falls. Sibling links are left to the caller.
    pub fn split_insert<R>(
        &mut self,
        recipient: &mut LeafPage<R>,
        key: &[u8],
        value: &[u8],
        cmp: &impl KeyComparator,
    ) where
        R: AsRef<[u8]> + AsMut<[u8]>,
    {
        let size = self.size();
        let left_count = (size + 1) / 2;

        if cmp.compare(key, self.key_at(left_count - 1)) == Ordering::Greater {
            recipient.append_range(self, left_count);
            self.set_size(left_count);
            recipient.insert(key, value, cmp);
        } else {
            recipient.append_range(self, left_count - 1);
            self.set_size(left_count - 1);
            self.insert(key, value, cmp);
        }
    }
}
