use crate::buffer::{ReadPageGuard, WritePageGuard};
use crate::common::{
    PageId, Result, StrataError, CHILD_POINTER_SIZE, INTERNAL_PAGE_HEADER_SIZE,
    LEAF_PAGE_HEADER_SIZE, PAGE_SIZE,
};

use super::{InternalPage, LeafPage};

// Header fields shared by leaf and internal pages
pub(crate) const PAGE_TYPE_OFFSET: usize = 0;
pub(crate) const SIZE_OFFSET: usize = 4;
pub(crate) const MAX_SIZE_OFFSET: usize = 8;
pub(crate) const KEY_SIZE_OFFSET: usize = 12;
pub(crate) const VALUE_SIZE_OFFSET: usize = 20;
// Leaf only
pub(crate) const NEXT_PAGE_ID_OFFSET: usize = 28;

/// Type tag stored in the first four bytes of every B+ tree page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BTreePageType {
    Leaf,
    Internal,
}

impl BTreePageType {
    fn tag(self) -> u32 {
        match self {
            BTreePageType::Leaf => 0,
            BTreePageType::Internal => 1,
        }
    }

    /// Reads the type tag of an encoded page.
    pub fn of(data: &[u8]) -> Result<Self> {
        match read_u32(data, PAGE_TYPE_OFFSET) {
            0 => Ok(BTreePageType::Leaf),
            1 => Ok(BTreePageType::Internal),
            tag => Err(StrataError::IndexCorrupted(format!(
                "unknown page type tag {}",
                tag
            ))),
        }
    }

    fn header_size(self) -> usize {
        match self {
            BTreePageType::Leaf => LEAF_PAGE_HEADER_SIZE,
            BTreePageType::Internal => INTERNAL_PAGE_HEADER_SIZE,
        }
    }
}

/// A page buffer decoded through its type tag into the matching typed view.
pub enum BTreePage<B> {
    Leaf(LeafPage<B>),
    Internal(InternalPage<B>),
}

impl<B: AsRef<[u8]>> BTreePage<B> {
    /// Checks the header of `data` and wraps it in the view its tag names.
    pub fn decode(data: B) -> Result<Self> {
        let page_type = validate_header(data.as_ref())?;
        Ok(match page_type {
            BTreePageType::Leaf => BTreePage::Leaf(LeafPage::new(data)),
            BTreePageType::Internal => BTreePage::Internal(InternalPage::new(data)),
        })
    }

    pub fn page_type(&self) -> BTreePageType {
        match self {
            BTreePage::Leaf(_) => BTreePageType::Leaf,
            BTreePage::Internal(_) => BTreePageType::Internal,
        }
    }

    pub fn size(&self) -> usize {
        match self {
            BTreePage::Leaf(page) => page.size(),
            BTreePage::Internal(page) => page.size(),
        }
    }

    pub fn max_size(&self) -> usize {
        match self {
            BTreePage::Leaf(page) => page.max_size(),
            BTreePage::Internal(page) => page.max_size(),
        }
    }

    pub fn min_size(&self) -> usize {
        match self {
            BTreePage::Leaf(page) => page.min_size(),
            BTreePage::Internal(page) => page.min_size(),
        }
    }

    pub fn into_leaf(self) -> Result<LeafPage<B>> {
        match self {
            BTreePage::Leaf(page) => Ok(page),
            BTreePage::Internal(_) => Err(StrataError::IndexCorrupted(
                "expected a leaf page, found an internal page".to_string(),
            )),
        }
    }

    pub fn into_internal(self) -> Result<InternalPage<B>> {
        match self {
            BTreePage::Internal(page) => Ok(page),
            BTreePage::Leaf(_) => Err(StrataError::IndexCorrupted(
                "expected an internal page, found a leaf page".to_string(),
            )),
        }
    }
}

/// Rejects headers whose counts could not have been written by this index.
fn validate_header(data: &[u8]) -> Result<BTreePageType> {
    let page_type = BTreePageType::of(data)?;
    let size = read_i32(data, SIZE_OFFSET);
    let max_size = read_i32(data, MAX_SIZE_OFFSET);
    let key_size = read_u64(data, KEY_SIZE_OFFSET) as usize;
    let value_size = read_u64(data, VALUE_SIZE_OFFSET) as usize;

    let fits = max_size > 0
        && key_size > 0
        && value_size > 0
        && key_size
            .checked_add(value_size)
            .and_then(|pair| pair.checked_mul(max_size as usize))
            .is_some_and(|body| body + page_type.header_size() <= PAGE_SIZE);
    if size < 0 || size > max_size || !fits {
        return Err(StrataError::IndexCorrupted(format!(
            "bad {:?} header: size {} max {} key {} value {}",
            page_type, size, max_size, key_size, value_size
        )));
    }
    if page_type == BTreePageType::Internal && value_size != CHILD_POINTER_SIZE {
        return Err(StrataError::IndexCorrupted(format!(
            "internal page child width {}",
            value_size
        )));
    }
    Ok(page_type)
}

/// Writes the fields common to both page kinds.
pub(crate) fn init_header(
    data: &mut [u8],
    page_type: BTreePageType,
    max_size: usize,
    key_size: usize,
    value_size: usize,
) {
    data[..page_type.header_size()].fill(0);
    write_u32(data, PAGE_TYPE_OFFSET, page_type.tag());
    write_i32(data, SIZE_OFFSET, 0);
    write_i32(data, MAX_SIZE_OFFSET, max_size as i32);
    write_u64(data, KEY_SIZE_OFFSET, key_size as u64);
    write_u64(data, VALUE_SIZE_OFFSET, value_size as u64);
}

pub(crate) fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]])
}

pub(crate) fn read_i32(data: &[u8], offset: usize) -> i32 {
    read_u32(data, offset) as i32
}

pub(crate) fn read_u64(data: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}

pub(crate) fn read_page_id(data: &[u8], offset: usize) -> PageId {
    PageId::new(read_i32(data, offset))
}

pub(crate) fn write_u32(data: &mut [u8], offset: usize, value: u32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn write_i32(data: &mut [u8], offset: usize, value: i32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn write_u64(data: &mut [u8], offset: usize, value: u64) {
    data[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn write_page_id(data: &mut [u8], offset: usize, page_id: PageId) {
    write_i32(data, offset, page_id.as_i32());
}

/// Typed views over a latched page.
impl ReadPageGuard {
    pub fn as_btree_page(&self) -> Result<BTreePage<&[u8]>> {
        BTreePage::decode(self.data())
    }
}

impl WritePageGuard {
    pub fn as_btree_page(&self) -> Result<BTreePage<&[u8]>> {
        BTreePage::decode(self.data())
    }

    /// Mutable typed view; marks the page dirty.
    pub fn as_btree_page_mut(&mut self) -> Result<BTreePage<&mut [u8]>> {
        BTreePage::decode(self.data_mut())
    }

    /// Formats the page as an empty leaf and returns the view.
    pub fn init_leaf(&mut self, max_size: usize, key_size: usize, value_size: usize) -> LeafPage<&mut [u8]> {
        let mut leaf = LeafPage::new(self.data_mut());
        leaf.init(max_size, key_size, value_size);
        leaf
    }

    /// Formats the page as an empty internal page and returns the view.
    pub fn init_internal(&mut self, max_size: usize, key_size: usize) -> InternalPage<&mut [u8]> {
        let mut internal = InternalPage::new(self.data_mut());
        internal.init(max_size, key_size);
        internal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_btree_page_decode_dispatches_on_tag() {
        let mut data = vec![0u8; PAGE_SIZE];
        init_header(&mut data, BTreePageType::Internal, 10, 4, CHILD_POINTER_SIZE);
        assert!(matches!(
            BTreePage::decode(&data[..]).unwrap(),
            BTreePage::Internal(_)
        ));

        init_header(&mut data, BTreePageType::Leaf, 10, 4, 8);
        let page = BTreePage::decode(&data[..]).unwrap();
        assert_eq!(page.page_type(), BTreePageType::Leaf);
        assert_eq!(page.max_size(), 10);
        assert_eq!(page.min_size(), 5);
    }

    #[test]
    fn test_btree_page_rejects_garbage() {
        let mut data = vec![0u8; PAGE_SIZE];
        write_u32(&mut data, PAGE_TYPE_OFFSET, 7);
        assert!(matches!(
            BTreePage::decode(&data[..]),
            Err(StrataError::IndexCorrupted(_))
        ));

        // A zeroed page claims max_size 0.
        let data = vec![0u8; PAGE_SIZE];
        assert!(BTreePage::decode(&data[..]).is_err());
    }

    #[test]
    fn test_btree_page_rejects_oversized_layout() {
        let mut data = vec![0u8; PAGE_SIZE];
        init_header(&mut data, BTreePageType::Leaf, 1000, 4, 4);
        assert!(BTreePage::decode(&data[..]).is_err());
    }

    #[test]
    fn test_btree_page_header_offsets() {
        let mut data = vec![0u8; PAGE_SIZE];
        init_header(&mut data, BTreePageType::Leaf, 3, 12, 20);
        assert_eq!(read_u32(&data, 0), 0);
        assert_eq!(read_i32(&data, 8), 3);
        assert_eq!(read_u64(&data, 12), 12);
        assert_eq!(read_u64(&data, 20), 20);
    }
}
