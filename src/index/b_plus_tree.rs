use std::cmp::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::buffer::{BufferPoolManager, ReadPageGuard, WritePageGuard};
use crate::common::{
    PageId, RecordId, Result, SlotId, StrataError, CHILD_POINTER_SIZE, INTERNAL_PAGE_HEADER_SIZE,
    INVALID_PAGE_ID, LEAF_PAGE_HEADER_SIZE, PAGE_SIZE,
};
use crate::tuple::{Schema, Tuple};

use super::btree_page::{BTreePage, BTreePageType};
use super::BPlusTreeIterator;

/// Ancestors kept write-latched during a structural change, top-down, each
/// with the slot of the child the descent took.
type WriteSet = Vec<(WritePageGuard, usize)>;

/// How an underflowing page gets fixed, decided while the sibling involved is
/// already latched and before any page changes.
enum Repair {
    BorrowLeft(WritePageGuard),
    BorrowRight(WritePageGuard),
    MergeIntoLeft(WritePageGuard),
    MergeRight(WritePageGuard),
}

/// Progress of `check_integrity` across the leaves visited so far.
#[derive(Default)]
struct IntegrityWalk {
    leaf_depth: Option<usize>,
    next_leaf: Option<PageId>,
}

impl Repair {
    fn merges(&self) -> bool {
        matches!(self, Repair::MergeIntoLeft(_) | Repair::MergeRight(_))
    }
}

/// Concurrent B+ tree index mapping fixed-width key tuples to value tuples.
///
/// Pages live in the buffer pool and are reached only through page guards.
/// Mutations descend with write latches, releasing ancestors as soon as a
/// child is safe (not full for insert, above minimum for remove); lookups
/// descend with read latches one level at a time.
///
/// The root page id sits behind a mutex held for the whole of every insert,
/// remove, lookup and iterator positioning, so top-level operations are
/// serialized against each other.
pub struct BPlusTree {
    index_name: String,
    bpm: Arc<BufferPoolManager>,
    key_schema: Arc<Schema>,
    value_schema: Arc<Schema>,
    leaf_max_size: usize,
    internal_max_size: usize,
    root_page_id: Mutex<PageId>,
}

impl BPlusTree {
    /// Opens an index rooted at `root_page_id` (`INVALID_PAGE_ID` for a new,
    /// empty tree).
    ///
    /// Fails if the fan-outs do not fit a page, are too small to split, or if
    /// an existing root was written with a different key or value width.
    pub fn new(
        index_name: impl Into<String>,
        bpm: Arc<BufferPoolManager>,
        key_schema: Arc<Schema>,
        value_schema: Arc<Schema>,
        leaf_max_size: usize,
        internal_max_size: usize,
        root_page_id: PageId,
    ) -> Result<Self> {
        let key_size = key_schema.width();
        let value_size = value_schema.width();
        if key_size == 0 || value_size == 0 {
            return Err(StrataError::InvalidIndexConfig(
                "key and value schemas must have at least one column".to_string(),
            ));
        }
        if leaf_max_size < 2 || internal_max_size < 3 {
            return Err(StrataError::InvalidIndexConfig(format!(
                "leaf max size {} must be >= 2 and internal max size {} must be >= 3",
                leaf_max_size, internal_max_size
            )));
        }
        let (leaf_limit, internal_limit) = Self::max_sizes_for(&key_schema, &value_schema);
        if leaf_max_size > leaf_limit || internal_max_size > internal_limit {
            return Err(StrataError::InvalidIndexConfig(format!(
                "fan-out {}/{} does not fit a page (limits {}/{})",
                leaf_max_size, internal_max_size, leaf_limit, internal_limit
            )));
        }

        let tree = Self {
            index_name: index_name.into(),
            bpm,
            key_schema,
            value_schema,
            leaf_max_size,
            internal_max_size,
            root_page_id: Mutex::new(root_page_id),
        };
        if root_page_id.is_valid() {
            tree.check_root_layout(root_page_id)?;
        }
        Ok(tree)
    }

    /// Largest leaf and internal fan-outs whose pages fit in `PAGE_SIZE`.
    pub fn max_sizes_for(key_schema: &Schema, value_schema: &Schema) -> (usize, usize) {
        let key_size = key_schema.width().max(1);
        let leaf = (PAGE_SIZE - LEAF_PAGE_HEADER_SIZE) / (key_size + value_schema.width());
        let internal = (PAGE_SIZE - INTERNAL_PAGE_HEADER_SIZE) / (key_size + CHILD_POINTER_SIZE);
        (leaf, internal)
    }

    fn check_root_layout(&self, root_page_id: PageId) -> Result<()> {
        let guard = self.fetch_read(root_page_id)?;
        let key_size = match guard.as_btree_page()? {
            BTreePage::Leaf(leaf) => {
                if leaf.value_size() != self.value_schema.width() {
                    return Err(StrataError::SchemaMismatch(format!(
                        "root leaf stores {}-byte values, schema is {} bytes",
                        leaf.value_size(),
                        self.value_schema.width()
                    )));
                }
                leaf.key_size()
            }
            BTreePage::Internal(internal) => internal.key_size(),
        };
        if key_size != self.key_schema.width() {
            return Err(StrataError::SchemaMismatch(format!(
                "root page stores {}-byte keys, schema is {} bytes",
                key_size,
                self.key_schema.width()
            )));
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.index_name
    }

    pub fn key_schema(&self) -> &Arc<Schema> {
        &self.key_schema
    }

    pub fn value_schema(&self) -> &Arc<Schema> {
        &self.value_schema
    }

    pub fn leaf_max_size(&self) -> usize {
        self.leaf_max_size
    }

    pub fn internal_max_size(&self) -> usize {
        self.internal_max_size
    }

    /// Current root page id; may change as soon as the call returns.
    pub fn get_root_page_id(&self) -> PageId {
        *self.root_page_id.lock()
    }

    pub fn is_empty(&self) -> bool {
        !self.root_page_id.lock().is_valid()
    }

    /// Returns the value stored under `key`, with its record id set to the
    /// leaf slot it was read from.
    pub fn get_value(&self, key: &Tuple) -> Result<Option<Tuple>> {
        check_schema(key, &self.key_schema, "key")?;
        let root = self.root_page_id.lock();
        if !root.is_valid() {
            return Ok(None);
        }

        let mut guard = self.fetch_read(*root)?;
        loop {
            let child = match guard.as_btree_page()? {
                BTreePage::Internal(internal) => {
                    internal.value_at(internal.lookup(key.data(), &*self.key_schema))
                }
                BTreePage::Leaf(leaf) => {
                    return match leaf.lookup(key.data(), &*self.key_schema) {
                        Ok(slot) => {
                            let mut value =
                                Tuple::from_bytes(Arc::clone(&self.value_schema), leaf.value_at(slot))?;
                            value.set_rid(RecordId::new(guard.page_id(), SlotId::new(slot as u16)));
                            Ok(Some(value))
                        }
                        Err(_) => Ok(None),
                    };
                }
            };
            guard = self.fetch_read(child)?;
        }
    }

    /// Inserts a unique key. Returns false if the key is already present.
    pub fn insert(&self, key: &Tuple, value: &Tuple) -> Result<bool> {
        check_schema(key, &self.key_schema, "key")?;
        check_schema(value, &self.value_schema, "value")?;
        let mut root = self.root_page_id.lock();

        if !root.is_valid() {
            let mut guard = self.allocate_page()?;
            let mut leaf = guard.init_leaf(self.leaf_max_size, self.key_size(), self.value_size());
            leaf.insert_at(0, key.data(), value.data());
            *root = guard.page_id();
            debug!("Index {} started at root leaf {}", self.index_name, *root);
            return Ok(true);
        }

        let mut write_set = WriteSet::new();
        let mut guard = self.fetch_write(*root)?;
        loop {
            let (slot, child) = match guard.as_btree_page()? {
                BTreePage::Leaf(_) => break,
                BTreePage::Internal(internal) => {
                    let slot = internal.lookup(key.data(), &*self.key_schema);
                    (slot, internal.value_at(slot))
                }
            };
            write_set.push((guard, slot));
            guard = self.fetch_write(child)?;
            let page = guard.as_btree_page()?;
            if page.size() < page.max_size() {
                write_set.clear();
            }
        }

        let leaf_full = {
            let leaf = guard.as_btree_page()?.into_leaf()?;
            if leaf.lookup(key.data(), &*self.key_schema).is_ok() {
                return Ok(false);
            }
            leaf.is_full()
        };
        if !leaf_full {
            let mut leaf = guard.as_btree_page_mut()?.into_leaf()?;
            return Ok(leaf.insert(key.data(), value.data(), &*self.key_schema));
        }

        // Every page the split chain needs is allocated before anything is modified.
        let mut full_ancestors = 0;
        for (ancestor, _) in &write_set {
            if ancestor.as_btree_page()?.into_internal()?.is_full() {
                full_ancestors += 1;
            }
        }
        let root_splits = full_ancestors == write_set.len();
        let mut spare = self.allocate_pages(1 + full_ancestors + usize::from(root_splits))?;

        let mut left_page_id = guard.page_id();
        let mut sibling = take_spare(&mut spare)?;
        let mut right_page_id = sibling.page_id();
        let mut separator = {
            let mut leaf = guard.as_btree_page_mut()?.into_leaf()?;
            let mut new_leaf =
                sibling.init_leaf(self.leaf_max_size, self.key_size(), self.value_size());
            leaf.split_insert(&mut new_leaf, key.data(), value.data(), &*self.key_schema);
            new_leaf.set_next_page_id(leaf.next_page_id());
            leaf.set_next_page_id(right_page_id);
            new_leaf.key_at(0).to_vec()
        };
        debug!("Split leaf {} into {}", left_page_id, right_page_id);
        drop(sibling);
        drop(guard);

        while let Some((mut parent, _)) = write_set.pop() {
            let mut internal = parent.as_btree_page_mut()?.into_internal()?;
            if !internal.is_full() {
                internal.insert(&separator, right_page_id, &*self.key_schema);
                return Ok(true);
            }

            let mut sibling = take_spare(&mut spare)?;
            let sibling_page_id = sibling.page_id();
            let mut recipient = sibling.init_internal(self.internal_max_size, self.key_size());
            internal.split_insert(&mut recipient, &separator, right_page_id, &*self.key_schema);
            separator = recipient.key_at(0).to_vec();

            left_page_id = parent.page_id();
            right_page_id = sibling_page_id;
            debug!("Split internal {} into {}", left_page_id, right_page_id);
        }

        let mut new_root = take_spare(&mut spare)?;
        new_root
            .init_internal(self.internal_max_size, self.key_size())
            .populate_new_root(left_page_id, &separator, right_page_id);
        *root = new_root.page_id();
        debug!("Index {} grew a new root {}", self.index_name, *root);
        Ok(true)
    }

    /// Removes `key`. Returns false if it was not present.
    ///
    /// Every sibling the rebalance needs is latched before the leaf changes,
    /// so a failed fetch leaves the tree as it was.
    pub fn remove(&self, key: &Tuple) -> Result<bool> {
        check_schema(key, &self.key_schema, "key")?;
        let mut root = self.root_page_id.lock();
        if !root.is_valid() {
            return Ok(false);
        }

        let mut write_set = WriteSet::new();
        let mut guard = self.fetch_write(*root)?;
        loop {
            let (slot, child) = match guard.as_btree_page()? {
                BTreePage::Leaf(_) => break,
                BTreePage::Internal(internal) => {
                    let slot = internal.lookup(key.data(), &*self.key_schema);
                    (slot, internal.value_at(slot))
                }
            };
            write_set.push((guard, slot));
            guard = self.fetch_write(child)?;
            let page = guard.as_btree_page()?;
            if page.size() > page.min_size() {
                write_set.clear();
            }
        }

        let (slot, size, min_size) = {
            let leaf = guard.as_btree_page()?.into_leaf()?;
            match leaf.lookup(key.data(), &*self.key_schema) {
                Ok(slot) => (slot, leaf.size() - 1, leaf.min_size()),
                Err(_) => return Ok(false),
            }
        };
        let is_root = guard.page_id() == *root;
        let repairs = if !is_root && size < min_size {
            self.plan_repairs(&write_set, *root)?
        } else {
            Vec::new()
        };

        guard.as_btree_page_mut()?.into_leaf()?.remove_at(slot);

        let mut freed = Vec::new();
        if is_root {
            if size == 0 {
                freed.push(guard.page_id());
                *root = INVALID_PAGE_ID;
                debug!("Index {} is now empty", self.index_name);
            }
            drop(guard);
        } else if !repairs.is_empty() {
            self.rebalance(guard, &mut write_set, repairs, &mut root, &mut freed)?;
        } else {
            drop(guard);
        }

        drop(write_set);
        self.free_pages(freed)?;
        Ok(true)
    }

    /// Latches the siblings for every level that will underflow, bottom-up,
    /// deciding at each level between borrowing and merging.
    fn plan_repairs(&self, write_set: &WriteSet, root: PageId) -> Result<Vec<Repair>> {
        let mut repairs = Vec::new();
        for (parent, slot) in write_set.iter().rev() {
            let repair = self.plan_repair(parent, *slot)?;
            let merges = repair.merges();
            repairs.push(repair);
            if !merges || parent.page_id() == root {
                return Ok(repairs);
            }
            // A merge takes one entry out of the parent.
            let page = parent.as_btree_page()?;
            if page.size() - 1 >= page.min_size() {
                return Ok(repairs);
            }
        }
        Err(StrataError::IndexCorrupted(
            "underflow reached an unlatched ancestor".to_string(),
        ))
    }

    /// Picks how the child at `slot` of `parent` is fixed: borrow from the
    /// left, borrow from the right, merge into the left, or merge the right
    /// sibling in, in that order of preference.
    fn plan_repair(&self, parent: &WritePageGuard, slot: usize) -> Result<Repair> {
        let (left_page_id, right_page_id) = sibling_ids(parent, slot)?;

        if let Some(left_page_id) = left_page_id {
            let left = self.fetch_write(left_page_id)?;
            if can_lend(&left)? {
                return Ok(Repair::BorrowLeft(left));
            }
            if let Some(right_page_id) = right_page_id {
                let right = self.fetch_write(right_page_id)?;
                if can_lend(&right)? {
                    return Ok(Repair::BorrowRight(right));
                }
            }
            return Ok(Repair::MergeIntoLeft(left));
        }

        let right_page_id = right_page_id.ok_or_else(|| {
            StrataError::IndexCorrupted(format!(
                "child {} of page {} has no sibling to rebalance with",
                slot,
                parent.page_id()
            ))
        })?;
        let right = self.fetch_write(right_page_id)?;
        if can_lend(&right)? {
            Ok(Repair::BorrowRight(right))
        } else {
            Ok(Repair::MergeRight(right))
        }
    }

    /// Applies the planned repairs from the leaf upwards, removing the
    /// parent entry after each merge and collapsing a root left with one child.
    fn rebalance(
        &self,
        mut child: WritePageGuard,
        write_set: &mut WriteSet,
        repairs: Vec<Repair>,
        root: &mut PageId,
        freed: &mut Vec<PageId>,
    ) -> Result<()> {
        for repair in repairs {
            let (mut parent, slot) = write_set.pop().ok_or_else(|| {
                StrataError::IndexCorrupted(format!(
                    "page {} underflowed without a latched parent",
                    child.page_id()
                ))
            })?;

            let removed = match child.as_btree_page()?.page_type() {
                BTreePageType::Leaf => self.repair_leaf(&mut parent, slot, &mut child, repair, freed)?,
                BTreePageType::Internal => {
                    self.repair_internal(&mut parent, slot, &mut child, repair, freed)?
                }
            };
            drop(child);

            let removed_slot = match removed {
                Some(removed_slot) => removed_slot,
                None => return Ok(()),
            };

            let parent_page_id = parent.page_id();
            let mut internal = parent.as_btree_page_mut()?.into_internal()?;
            internal.remove_at(removed_slot);

            if parent_page_id == *root {
                if internal.size() == 1 {
                    *root = internal.value_at(0);
                    freed.push(parent_page_id);
                    debug!("Index {} shrank to root {}", self.index_name, *root);
                }
                return Ok(());
            }
            child = parent;
        }
        Ok(())
    }

    /// Fixes an underflowing leaf at `slot` of `parent`. Returns the parent
    /// slot to remove if two leaves were merged.
    fn repair_leaf(
        &self,
        parent: &mut WritePageGuard,
        slot: usize,
        child: &mut WritePageGuard,
        repair: Repair,
        freed: &mut Vec<PageId>,
    ) -> Result<Option<usize>> {
        match repair {
            Repair::BorrowLeft(mut left) => {
                let mut lender = left.as_btree_page_mut()?.into_leaf()?;
                let mut leaf = child.as_btree_page_mut()?.into_leaf()?;
                let last = lender.size() - 1;
                leaf.insert_at(0, lender.key_at(last), lender.value_at(last));
                lender.remove_at(last);
                parent
                    .as_btree_page_mut()?
                    .into_internal()?
                    .set_key_at(slot, leaf.key_at(0));
                debug!("Leaf {} borrowed from left sibling {}", child.page_id(), left.page_id());
                Ok(None)
            }
            Repair::BorrowRight(mut right) => {
                let mut lender = right.as_btree_page_mut()?.into_leaf()?;
                let mut leaf = child.as_btree_page_mut()?.into_leaf()?;
                leaf.insert_at(leaf.size(), lender.key_at(0), lender.value_at(0));
                lender.remove_at(0);
                parent
                    .as_btree_page_mut()?
                    .into_internal()?
                    .set_key_at(slot + 1, lender.key_at(0));
                debug!("Leaf {} borrowed from right sibling {}", child.page_id(), right.page_id());
                Ok(None)
            }
            Repair::MergeIntoLeft(mut left) => {
                let leaf = child.as_btree_page()?.into_leaf()?;
                let mut survivor = left.as_btree_page_mut()?.into_leaf()?;
                survivor.append_all(&leaf);
                survivor.set_next_page_id(leaf.next_page_id());
                freed.push(child.page_id());
                debug!("Merged leaf {} into {}", child.page_id(), left.page_id());
                Ok(Some(slot))
            }
            Repair::MergeRight(right) => {
                let donor = right.as_btree_page()?.into_leaf()?;
                let mut survivor = child.as_btree_page_mut()?.into_leaf()?;
                survivor.append_all(&donor);
                survivor.set_next_page_id(donor.next_page_id());
                freed.push(right.page_id());
                debug!("Merged leaf {} into {}", right.page_id(), child.page_id());
                Ok(Some(slot + 1))
            }
        }
    }

    /// Fixes an underflowing internal page at `slot` of `parent`. Returns the
    /// parent slot to remove if two pages were merged.
    fn repair_internal(
        &self,
        parent: &mut WritePageGuard,
        slot: usize,
        child: &mut WritePageGuard,
        repair: Repair,
        freed: &mut Vec<PageId>,
    ) -> Result<Option<usize>> {
        match repair {
            Repair::BorrowLeft(mut left) => {
                // The separator comes down in front of the child's old first
                // entry and the lender's last key goes up in its place.
                let separator = parent.as_btree_page()?.into_internal()?.key_at(slot).to_vec();
                let mut lender = left.as_btree_page_mut()?.into_internal()?;
                let mut page = child.as_btree_page_mut()?.into_internal()?;
                let last = lender.size() - 1;
                page.insert_at(0, lender.key_at(last), lender.value_at(last));
                page.set_key_at(1, &separator);
                parent
                    .as_btree_page_mut()?
                    .into_internal()?
                    .set_key_at(slot, lender.key_at(last));
                lender.remove_at(last);
                debug!("Internal {} borrowed from left sibling {}", child.page_id(), left.page_id());
                Ok(None)
            }
            Repair::BorrowRight(mut right) => {
                let separator = parent
                    .as_btree_page()?
                    .into_internal()?
                    .key_at(slot + 1)
                    .to_vec();
                let mut lender = right.as_btree_page_mut()?.into_internal()?;
                let mut page = child.as_btree_page_mut()?.into_internal()?;
                page.insert_at(page.size(), &separator, lender.value_at(0));
                parent
                    .as_btree_page_mut()?
                    .into_internal()?
                    .set_key_at(slot + 1, lender.key_at(1));
                lender.remove_at(0);
                debug!("Internal {} borrowed from right sibling {}", child.page_id(), right.page_id());
                Ok(None)
            }
            Repair::MergeIntoLeft(mut left) => {
                let separator = parent.as_btree_page()?.into_internal()?.key_at(slot).to_vec();
                let page = child.as_btree_page()?.into_internal()?;
                left.as_btree_page_mut()?
                    .into_internal()?
                    .append_all(&separator, &page);
                freed.push(child.page_id());
                debug!("Merged internal {} into {}", child.page_id(), left.page_id());
                Ok(Some(slot))
            }
            Repair::MergeRight(right) => {
                let separator = parent
                    .as_btree_page()?
                    .into_internal()?
                    .key_at(slot + 1)
                    .to_vec();
                let donor = right.as_btree_page()?.into_internal()?;
                child
                    .as_btree_page_mut()?
                    .into_internal()?
                    .append_all(&separator, &donor);
                freed.push(right.page_id());
                debug!("Merged internal {} into {}", right.page_id(), child.page_id());
                Ok(Some(slot + 1))
            }
        }
    }

    /// Iterator positioned at the smallest key.
    pub fn begin(&self) -> Result<BPlusTreeIterator> {
        let root = self.root_page_id.lock();
        if !root.is_valid() {
            return Ok(self.end());
        }

        let mut guard = self.fetch_read(*root)?;
        loop {
            let child = match guard.as_btree_page()? {
                BTreePage::Internal(internal) => internal.value_at(0),
                BTreePage::Leaf(leaf) => {
                    return Ok(if leaf.size() > 0 {
                        self.iterator_at(guard.page_id(), 0)
                    } else {
                        self.end()
                    });
                }
            };
            guard = self.fetch_read(child)?;
        }
    }

    /// Iterator positioned at the first key that is >= `key`.
    pub fn begin_at(&self, key: &Tuple) -> Result<BPlusTreeIterator> {
        check_schema(key, &self.key_schema, "key")?;
        let root = self.root_page_id.lock();
        if !root.is_valid() {
            return Ok(self.end());
        }

        let mut guard = self.fetch_read(*root)?;
        loop {
            let child = match guard.as_btree_page()? {
                BTreePage::Internal(internal) => {
                    internal.value_at(internal.lookup(key.data(), &*self.key_schema))
                }
                BTreePage::Leaf(leaf) => {
                    let slot = match leaf.lookup(key.data(), &*self.key_schema) {
                        Ok(slot) | Err(slot) => slot,
                    };
                    return Ok(if slot < leaf.size() {
                        self.iterator_at(guard.page_id(), slot)
                    } else if leaf.next_page_id().is_valid() {
                        self.iterator_at(leaf.next_page_id(), 0)
                    } else {
                        self.end()
                    });
                }
            };
            guard = self.fetch_read(child)?;
        }
    }

    /// The past-the-end iterator.
    pub fn end(&self) -> BPlusTreeIterator {
        BPlusTreeIterator::end(
            Arc::clone(&self.bpm),
            Arc::clone(&self.key_schema),
            Arc::clone(&self.value_schema),
        )
    }

    fn iterator_at(&self, page_id: PageId, slot: usize) -> BPlusTreeIterator {
        BPlusTreeIterator::new(
            Arc::clone(&self.bpm),
            Arc::clone(&self.key_schema),
            Arc::clone(&self.value_schema),
            page_id,
            slot,
        )
    }

    /// Walks every page and checks the structural invariants of the tree:
    /// non-root pages hold between their minimum and maximum number of
    /// entries, keys increase strictly within a page and stay inside the
    /// range their parent separators allow, every leaf sits at the same
    /// depth, and the leaf chain visits the leaves in key order.
    ///
    /// Only one page is latched at a time. Returns `IndexCorrupted` naming
    /// the first page that breaks an invariant.
    pub fn check_integrity(&self) -> Result<()> {
        let root = self.root_page_id.lock();
        if !root.is_valid() {
            return Ok(());
        }

        let mut walk = IntegrityWalk::default();
        self.check_subtree(*root, 0, None, None, &mut walk)?;
        match walk.next_leaf {
            Some(page_id) if page_id.is_valid() => Err(StrataError::IndexCorrupted(format!(
                "last leaf links to page {}",
                page_id
            ))),
            _ => Ok(()),
        }
    }

    fn check_subtree(
        &self,
        page_id: PageId,
        depth: usize,
        lower: Option<&[u8]>,
        upper: Option<&[u8]>,
        walk: &mut IntegrityWalk,
    ) -> Result<()> {
        let corrupted =
            |what: String| StrataError::IndexCorrupted(format!("page {}: {}", page_id, what));

        let (keys, children, next_page_id) = {
            let guard = self.fetch_read(page_id)?;
            let page = guard.as_btree_page()?;
            let (size, min_size, max_size) = (page.size(), page.min_size(), page.max_size());
            if size > max_size {
                return Err(corrupted(format!("size {} above max {}", size, max_size)));
            }
            match &page {
                BTreePage::Leaf(_) if depth == 0 && size == 0 => {
                    return Err(corrupted("root leaf is empty".to_string()));
                }
                BTreePage::Internal(_) if depth == 0 && size < 2 => {
                    return Err(corrupted(format!("root has {} children", size)));
                }
                _ if depth > 0 && size < min_size => {
                    return Err(corrupted(format!("size {} below min {}", size, min_size)));
                }
                _ => {}
            }
            match page {
                BTreePage::Leaf(leaf) => (
                    (0..size).map(|i| leaf.key_at(i).to_vec()).collect::<Vec<_>>(),
                    Vec::<PageId>::new(),
                    Some(leaf.next_page_id()),
                ),
                BTreePage::Internal(internal) => (
                    (1..size).map(|i| internal.key_at(i).to_vec()).collect::<Vec<_>>(),
                    (0..size).map(|i| internal.value_at(i)).collect::<Vec<_>>(),
                    None,
                ),
            }
        };

        for (i, key) in keys.iter().enumerate() {
            if i > 0 && self.key_schema.compare_bytes(&keys[i - 1], key) != Ordering::Less {
                return Err(corrupted(format!("key {} is not above key {}", i, i - 1)));
            }
            let below_lower =
                lower.is_some_and(|lower| self.key_schema.compare_bytes(key, lower) == Ordering::Less);
            let past_upper =
                upper.is_some_and(|upper| self.key_schema.compare_bytes(key, upper) != Ordering::Less);
            if below_lower || past_upper {
                return Err(corrupted(format!("key {} lies outside its parent separators", i)));
            }
        }

        if let Some(next_page_id) = next_page_id {
            match walk.leaf_depth {
                Some(leaf_depth) if leaf_depth != depth => {
                    return Err(corrupted(format!("leaf at depth {}, expected {}", depth, leaf_depth)));
                }
                _ => walk.leaf_depth = Some(depth),
            }
            if let Some(expected) = walk.next_leaf {
                if expected != page_id {
                    return Err(corrupted(format!("previous leaf links to page {}", expected)));
                }
            }
            walk.next_leaf = Some(next_page_id);
            return Ok(());
        }

        for (i, &child) in children.iter().enumerate() {
            let child_lower = if i == 0 { lower } else { Some(keys[i - 1].as_slice()) };
            let child_upper = keys.get(i).map(Vec::as_slice).or(upper);
            self.check_subtree(child, depth + 1, child_lower, child_upper, walk)?;
        }
        Ok(())
    }

    fn key_size(&self) -> usize {
        self.key_schema.width()
    }

    fn value_size(&self) -> usize {
        self.value_schema.width()
    }

    fn fetch_read(&self, page_id: PageId) -> Result<ReadPageGuard> {
        self.bpm
            .checked_read_page(page_id)?
            .ok_or(StrataError::BufferPoolFull)
    }

    fn fetch_write(&self, page_id: PageId) -> Result<WritePageGuard> {
        self.bpm
            .checked_write_page(page_id)?
            .ok_or(StrataError::BufferPoolFull)
    }

    fn allocate_page(&self) -> Result<WritePageGuard> {
        Ok(self
            .bpm
            .new_page_guarded()?
            .ok_or(StrataError::BufferPoolFull)?
            .upgrade_write())
    }

    /// Allocates `count` pages, or none of them.
    fn allocate_pages(&self, count: usize) -> Result<Vec<WritePageGuard>> {
        let mut pages = Vec::with_capacity(count);
        for _ in 0..count {
            match self.allocate_page() {
                Ok(page) => pages.push(page),
                Err(e) => {
                    let page_ids = pages.iter().map(WritePageGuard::page_id).collect();
                    drop(pages);
                    self.free_pages(page_ids)?;
                    return Err(e);
                }
            }
        }
        Ok(pages)
    }

    /// Returns pages the tree no longer references to the buffer pool.
    /// Every guard on them must already be dropped.
    fn free_pages(&self, page_ids: Vec<PageId>) -> Result<()> {
        for page_id in page_ids {
            if !self.bpm.delete_page(page_id)? {
                warn!("Freed index page {} is still pinned, leaving it allocated", page_id);
            }
        }
        Ok(())
    }
}

fn check_schema(tuple: &Tuple, expected: &Schema, role: &str) -> Result<()> {
    if tuple.schema().is_compatible(expected) {
        Ok(())
    } else {
        Err(StrataError::SchemaMismatch(format!(
            "{} tuple does not match the index {} schema",
            role, role
        )))
    }
}

fn take_spare(spare: &mut Vec<WritePageGuard>) -> Result<WritePageGuard> {
    spare
        .pop()
        .ok_or_else(|| StrataError::IndexCorrupted("split needed more pages than reserved".to_string()))
}

fn can_lend(sibling: &WritePageGuard) -> Result<bool> {
    let page = sibling.as_btree_page()?;
    Ok(page.size() > page.min_size())
}

/// Page ids of the children left and right of `slot` in `parent`.
fn sibling_ids(parent: &WritePageGuard, slot: usize) -> Result<(Option<PageId>, Option<PageId>)> {
    let internal = parent.as_btree_page()?.into_internal()?;
    let left = (slot > 0).then(|| internal.value_at(slot - 1));
    let right = (slot + 1 < internal.size()).then(|| internal.value_at(slot + 1));
    Ok((left, right))
}
