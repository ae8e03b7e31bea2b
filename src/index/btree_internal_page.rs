use std::cmp::Ordering;

use crate::common::{PageId, CHILD_POINTER_SIZE, INTERNAL_PAGE_HEADER_SIZE};

use super::btree_page::{
    init_header, read_i32, read_page_id, read_u64, write_i32, write_page_id, BTreePageType,
    KEY_SIZE_OFFSET, MAX_SIZE_OFFSET, SIZE_OFFSET,
};
use super::KeyComparator;

/// View of an internal page.
///
/// Layout: 28-byte header, then `size` packed (key, child page id) pairs.
/// The key of entry 0 is never compared; child `i` covers keys in
/// `[key[i], key[i + 1])`.
pub struct InternalPage<B> {
    data: B,
}

impl<B: AsRef<[u8]>> InternalPage<B> {
    /// Wraps a buffer without checking its header; see `BTreePage::decode`.
    pub fn new(data: B) -> Self {
        Self { data }
    }

    fn bytes(&self) -> &[u8] {
        self.data.as_ref()
    }

    /// Number of children.
    pub fn size(&self) -> usize {
        read_i32(self.bytes(), SIZE_OFFSET) as usize
    }

    pub fn max_size(&self) -> usize {
        read_i32(self.bytes(), MAX_SIZE_OFFSET) as usize
    }

    /// A non-root internal page holds at least `ceil(max_size / 2)` children.
    pub fn min_size(&self) -> usize {
        (self.max_size() + 1) / 2
    }

    pub fn key_size(&self) -> usize {
        read_u64(self.bytes(), KEY_SIZE_OFFSET) as usize
    }

    pub fn is_full(&self) -> bool {
        self.size() >= self.max_size()
    }

    fn pair_size(&self) -> usize {
        self.key_size() + CHILD_POINTER_SIZE
    }

    fn entry_offset(&self, index: usize) -> usize {
        INTERNAL_PAGE_HEADER_SIZE + index * self.pair_size()
    }

    pub fn key_at(&self, index: usize) -> &[u8] {
        let offset = self.entry_offset(index);
        &self.bytes()[offset..offset + self.key_size()]
    }

    pub fn value_at(&self, index: usize) -> PageId {
        read_page_id(self.bytes(), self.entry_offset(index) + self.key_size())
    }

    /// Index of the child whose range contains `key`: the last entry whose key
    /// is <= `key`, or entry 0.
    pub fn lookup(&self, key: &[u8], cmp: &impl KeyComparator) -> usize {
        // Invariant: key[lo] <= key (entry 0 counts as -inf), key[hi] > key.
        let (mut lo, mut hi) = (0, self.size());
        while hi - lo > 1 {
            let mid = lo + (hi - lo) / 2;
            if cmp.compare(self.key_at(mid), key) == Ordering::Greater {
                hi = mid;
            } else {
                lo = mid;
            }
        }
        lo
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> InternalPage<B> {
    fn bytes_mut(&mut self) -> &mut [u8] {
        self.data.as_mut()
    }

    /// Formats the buffer as an internal page with no children.
    pub fn init(&mut self, max_size: usize, key_size: usize) {
        init_header(
            self.bytes_mut(),
            BTreePageType::Internal,
            max_size,
            key_size,
            CHILD_POINTER_SIZE,
        );
    }

    fn set_size(&mut self, size: usize) {
        write_i32(self.bytes_mut(), SIZE_OFFSET, size as i32);
    }

    pub fn set_key_at(&mut self, index: usize, key: &[u8]) {
        let offset = self.entry_offset(index);
        let key_size = self.key_size();
        self.bytes_mut()[offset..offset + key_size].copy_from_slice(key);
    }

    pub fn set_value_at(&mut self, index: usize, child: PageId) {
        let offset = self.entry_offset(index) + self.key_size();
        write_page_id(self.bytes_mut(), offset, child);
    }

    /// Makes this page a root with two children separated by `key`.
    pub fn populate_new_root(&mut self, left: PageId, key: &[u8], right: PageId) {
        self.set_value_at(0, left);
        self.set_key_at(1, key);
        self.set_value_at(1, right);
        self.set_size(2);
    }

    /// Inserts (key, child) at `index`, shifting later entries right.
    /// The page must not be full.
    pub fn insert_at(&mut self, index: usize, key: &[u8], child: PageId) {
        let size = self.size();
        debug_assert!(size < self.max_size() && index <= size);

        let start = self.entry_offset(index);
        let end = self.entry_offset(size);
        let pair = self.pair_size();
        self.bytes_mut().copy_within(start..end, start + pair);
        self.set_size(size + 1);
        self.set_key_at(index, key);
        self.set_value_at(index, child);
    }

    /// Inserts a separator and its right child in key order.
    pub fn insert(&mut self, key: &[u8], child: PageId, cmp: &impl KeyComparator) {
        let index = self.lookup(key, cmp) + 1;
        self.insert_at(index, key, child);
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

    /// Appends every entry of `src`, whose entry-0 key is replaced by
    /// `separator` (the parent key that divided the two pages).
    pub fn append_all<S: AsRef<[u8]>>(&mut self, separator: &[u8], src: &InternalPage<S>) {
        let size = self.size();
        let dst = self.entry_offset(size);
        let block = &src.bytes()[src.entry_offset(0)..src.entry_offset(src.size())];
        self.bytes_mut()[dst..dst + block.len()].copy_from_slice(block);
        self.set_size(size + src.size());
        self.set_key_at(size, separator);
    }

    /// Splits this full page around the insertion of (key, child).
    ///
    /// `recipient` must be a freshly initialized internal page to the right of
    /// this one. The left page keeps `(max_size + 1) / 2` children and the
    /// rest move right; the key of the recipient's entry 0 is the separator
    /// the caller pushes up to the parent.
    pub fn split_insert<R>(
        &mut self,
        recipient: &mut InternalPage<R>,
        key: &[u8],
        child: PageId,
        cmp: &impl KeyComparator,
    ) where
        R: AsRef<[u8]> + AsMut<[u8]>,
    {
        let size = self.size();
        let pair = self.pair_size();
        let index = self.lookup(key, cmp) + 1;

        // Lay the size + 1 entries out in order, then cut.
        let mut scratch = Vec::with_capacity((size + 1) * pair);
        scratch.extend_from_slice(&self.bytes()[self.entry_offset(0)..self.entry_offset(index)]);
        scratch.extend_from_slice(key);
        scratch.extend_from_slice(&child.as_i32().to_le_bytes());
        scratch.extend_from_slice(&self.bytes()[self.entry_offset(index)..self.entry_offset(size)]);

        let left_count = (size + 1) / 2;
        let cut = left_count * pair;
        let dst = self.entry_offset(0);
        self.bytes_mut()[dst..dst + cut].copy_from_slice(&scratch[..cut]);
        self.set_size(left_count);

        let right = &scratch[cut..];
        let dst = recipient.entry_offset(0);
        recipient.bytes_mut()[dst..dst + right.len()].copy_from_slice(right);
        recipient.set_size(size + 1 - left_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::PAGE_SIZE;
    use crate::tuple::{DataType, Schema};

    fn int_schema() -> Schema {
        Schema::builder().column("k", DataType::Integer).build()
    }

    fn key(v: i32) -> [u8; 4] {
        v.to_le_bytes()
    }

    fn internal(buf: &mut [u8], max_size: usize) -> InternalPage<&mut [u8]> {
        let mut page = InternalPage::new(buf);
        page.init(max_size, 4);
        page
    }

    fn children<B: AsRef<[u8]>>(page: &InternalPage<B>) -> Vec<i32> {
        (0..page.size()).map(|i| page.value_at(i).as_i32()).collect()
    }

    #[test]
    fn test_internal_page_lookup_skips_sentinel() {
        let schema = int_schema();
        let mut buf = vec![0u8; PAGE_SIZE];
        let mut page = internal(&mut buf, 8);
        page.populate_new_root(PageId::new(1), &key(10), PageId::new(2));
        page.insert(&key(20), PageId::new(3), &schema);

        assert_eq!(page.lookup(&key(i32::MIN), &schema), 0);
        assert_eq!(page.lookup(&key(9), &schema), 0);
        assert_eq!(page.lookup(&key(10), &schema), 1);
        assert_eq!(page.lookup(&key(19), &schema), 1);
        assert_eq!(page.lookup(&key(25), &schema), 2);
        assert_eq!(children(&page), vec![1, 2, 3]);
    }

    #[test]
    fn test_internal_page_min_size_rounds_up() {
        let mut buf = vec![0u8; PAGE_SIZE];
        assert_eq!(internal(&mut buf, 3).min_size(), 2);
        assert_eq!(internal(&mut buf, 4).min_size(), 2);
    }

    #[test]
    fn test_internal_page_split() {
        let schema = int_schema();
        let mut left_buf = vec![0u8; PAGE_SIZE];
        let mut right_buf = vec![0u8; PAGE_SIZE];
        let mut left = internal(&mut left_buf, 3);
        let mut right = internal(&mut right_buf, 3);
        left.populate_new_root(PageId::new(1), &key(10), PageId::new(2));
        left.insert(&key(20), PageId::new(3), &schema);
        assert!(left.is_full());

        left.split_insert(&mut right, &key(15), PageId::new(4), &schema);
        assert_eq!(children(&left), vec![1, 2]);
        assert_eq!(children(&right), vec![4, 3]);
        assert_eq!(right.key_at(0), &key(15));
        assert_eq!(right.key_at(1), &key(20));
        assert_eq!(left.key_at(1), &key(10));
    }

    #[test]
    fn test_internal_page_remove_and_merge() {
        let schema = int_schema();
        let mut a_buf = vec![0u8; PAGE_SIZE];
        let mut b_buf = vec![0u8; PAGE_SIZE];
        let mut a = internal(&mut a_buf, 6);
        let mut b = internal(&mut b_buf, 6);
        a.populate_new_root(PageId::new(1), &key(10), PageId::new(2));
        b.populate_new_root(PageId::new(3), &key(40), PageId::new(4));

        a.append_all(&key(30), &b);
        assert_eq!(children(&a), vec![1, 2, 3, 4]);
        assert_eq!(a.key_at(2), &key(30));
        assert_eq!(a.lookup(&key(35), &schema), 2);

        a.remove_at(1);
        assert_eq!(children(&a), vec![1, 3, 4]);
        assert_eq!(a.key_at(1), &key(30));
    }
}
