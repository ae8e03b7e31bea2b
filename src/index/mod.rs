mod b_plus_tree;
mod btree_internal_page;
mod btree_iterator;
mod btree_leaf_page;
mod btree_page;
mod key_comparator;

pub use b_plus_tree::BPlusTree;
pub use btree_internal_page::InternalPage;
pub use btree_iterator::BPlusTreeIterator;
pub use btree_leaf_page::LeafPage;
pub use btree_page::{BTreePage, BTreePageType};
pub use key_comparator::KeyComparator;
