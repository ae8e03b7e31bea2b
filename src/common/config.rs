use super::types::PageId;

/// Size of a page in bytes (4 KB)
pub const PAGE_SIZE: usize = 4096;

/// Invalid page ID constant
pub const INVALID_PAGE_ID: PageId = PageId(-1);

/// Default K value for LRU-K replacement policy
pub const DEFAULT_LRUK_K: usize = 5;

/// Default buffer pool size (number of frames)
pub const DEFAULT_BUFFER_POOL_SIZE: usize = 50;

/// Leaf page header: page_type(4) size(4) max_size(4) key_size(8) value_size(8) next_page_id(4)
pub const LEAF_PAGE_HEADER_SIZE: usize = 32;

/// Internal page header: page_type(4) size(4) max_size(4) key_size(8) value_size(8)
pub const INTERNAL_PAGE_HEADER_SIZE: usize = 28;

/// Width of a child pointer stored in an internal page
pub const CHILD_POINTER_SIZE: usize = 4;
