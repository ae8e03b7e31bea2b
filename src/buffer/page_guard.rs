use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{
    ArcRwLockReadGuard, ArcRwLockWriteGuard, RawRwLock, RwLockReadGuard, RwLockWriteGuard,
};
use tracing::{error, trace};

use crate::common::PageId;

use super::buffer_pool_manager::BufferPoolInner;
use super::{FrameHeader, PageData};

type ReadLatch = ArcRwLockReadGuard<RawRwLock, PageData>;
type WriteLatch = ArcRwLockWriteGuard<RawRwLock, PageData>;

/// Pin on a page plus the bookkeeping needed to release it.
///
/// Dropping the base writes the page back if it was dirtied through this
/// guard and then unpins it. Guards that also hold a latch declare it before
/// the base so the latch is released first.
struct PageGuardBase {
    pool: Arc<BufferPoolInner>,
    frame: Arc<FrameHeader>,
    page_id: PageId,
    /// Modified through this guard and not yet written back
    is_dirty: bool,
    /// A write-back failed; the pool must keep the page dirty
    flush_failed: bool,
}

impl PageGuardBase {
    fn new(pool: Arc<BufferPoolInner>, frame: Arc<FrameHeader>, page_id: PageId) -> Self {
        Self {
            pool,
            frame,
            page_id,
            is_dirty: false,
            flush_failed: false,
        }
    }

    /// Writes `data` back through the pool, remembering a failure for unpin.
    fn flush(&mut self, data: &[u8]) {
        if let Err(e) = self.pool.write_back(&self.frame, self.page_id, data) {
            error!("Failed to write back {} on guard release: {}", self.page_id, e);
            self.flush_failed = true;
        }
        self.is_dirty = false;
    }
}

impl Drop for PageGuardBase {
    fn drop(&mut self) {
        if self.is_dirty {
            let frame = Arc::clone(&self.frame);
            let latch = frame.read_data();
            self.flush(&latch[..]);
        }
        self.pool.unpin_page(self.page_id, self.flush_failed);
        trace!("Released guard on {}", self.page_id);
    }
}

/// RAII guard that keeps a page pinned without holding its latch.
///
/// The page bytes can be reached through short-lived latched borrows
/// (`read` / `write`), or the guard can be upgraded into a read or write guard.
pub struct BasicPageGuard {
    base: PageGuardBase,
}

impl BasicPageGuard {
    pub(crate) fn new(pool: Arc<BufferPoolInner>, frame: Arc<FrameHeader>, page_id: PageId) -> Self {
        Self {
            base: PageGuardBase::new(pool, frame, page_id),
        }
    }

    /// Returns the page ID.
    pub fn page_id(&self) -> PageId {
        self.base.page_id
    }

    /// Latches the page in shared mode for the duration of the borrow.
    pub fn read(&self) -> RwLockReadGuard<'_, PageData> {
        self.base.frame.read_data()
    }

    /// Latches the page in exclusive mode for the duration of the borrow and
    /// marks it dirty.
    pub fn write(&mut self) -> RwLockWriteGuard<'_, PageData> {
        self.base.is_dirty = true;
        self.base.frame.write_data()
    }

    /// Converts into a guard holding the shared latch. The pin carries over.
    pub fn upgrade_read(self) -> ReadPageGuard {
        let latch = self.base.frame.latch().read_arc();
        ReadPageGuard {
            latch,
            base: self.base,
        }
    }

    /// Converts into a guard holding the exclusive latch. The pin carries over.
    pub fn upgrade_write(self) -> WritePageGuard {
        let latch = self.base.frame.latch().write_arc();
        WritePageGuard {
            latch,
            base: self.base,
        }
    }

    /// Drops this guard, releasing the page.
    pub fn drop_guard(self) {
        drop(self);
    }
}

/// RAII guard for read-only access to a page.
/// Releases the shared latch and then unpins the page when dropped.
pub struct ReadPageGuard {
    latch: ReadLatch,
    base: PageGuardBase,
}

impl ReadPageGuard {
    /// Returns the page ID.
    pub fn page_id(&self) -> PageId {
        self.base.page_id
    }

    /// Returns a reference to the page data.
    pub fn data(&self) -> &[u8] {
        &self.latch[..]
    }

    /// Drops this guard, releasing the page.
    pub fn drop_guard(self) {
        drop(self);
    }
}

impl Deref for ReadPageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

/// RAII guard for read-write access to a page.
///
/// On drop, a page modified through the guard is written back while the latch
/// is still held; the latch is then released and the page unpinned.
pub struct WritePageGuard {
    latch: WriteLatch,
    base: PageGuardBase,
}

impl WritePageGuard {
    /// Returns the page ID.
    pub fn page_id(&self) -> PageId {
        self.base.page_id
    }

    /// Returns a reference to the page data.
    pub fn data(&self) -> &[u8] {
        &self.latch[..]
    }

    /// Returns a mutable reference to the page data.
    /// Automatically marks the page as dirty.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.base.is_dirty = true;
        &mut self.latch[..]
    }

    /// Returns true if the page was modified through this guard.
    pub fn is_dirty(&self) -> bool {
        self.base.is_dirty
    }

    /// Drops this guard, releasing the page.
    pub fn drop_guard(self) {
        drop(self);
    }
}

impl Deref for WritePageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl DerefMut for WritePageGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data_mut()
    }
}

impl Drop for WritePageGuard {
    fn drop(&mut self) {
        if self.base.is_dirty {
            self.base.flush(&self.latch[..]);
        }
        // Fields drop next: the latch, then the base which unpins.
    }
}
