use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, trace};

use crate::common::{FrameId, PageId, Result, StrataError};
use crate::storage::disk::DiskManager;

use super::{BasicPageGuard, FrameHeader, LruKReplacer, ReadPageGuard, WritePageGuard};

/// Bookkeeping protected by the pool-wide lock
struct PoolState {
    /// Page table: maps resident page IDs to frame IDs
    page_table: HashMap<PageId, FrameId>,
    /// Free list: frames that hold no page
    free_list: VecDeque<FrameId>,
    /// Page IDs released by `delete_page`, reused most-recent first
    free_page_ids: Vec<PageId>,
}

/// Shared pool internals, also referenced by every outstanding page guard
pub(crate) struct BufferPoolInner {
    /// The buffer pool frames
    frames: Vec<Arc<FrameHeader>>,
    state: Mutex<PoolState>,
    /// LRU-K replacer for eviction decisions (has its own lock)
    replacer: LruKReplacer,
    disk_manager: Arc<DiskManager>,
}

/// BufferPoolManager is responsible for fetching database pages from disk
/// and storing them in memory. It manages a fixed number of frames and uses
/// the LRU-K replacement policy to decide which pages to evict.
///
/// Every page handed out is pinned; a pinned page is never evicted. Callers
/// either unpin explicitly (`fetch_page` / `new_page` + `unpin_page`) or use
/// the guarded variants, which unpin when the guard is dropped.
///
/// The pool lock is held only for the duration of each call and never while
/// waiting on a page latch.
pub struct BufferPoolManager {
    /// Number of frames in the buffer pool
    pool_size: usize,
    inner: Arc<BufferPoolInner>,
}

impl BufferPoolManager {
    /// Creates a new BufferPoolManager with the given pool size, k value for LRU-K,
    /// and disk manager.
    pub fn new(pool_size: usize, k: usize, disk_manager: Arc<DiskManager>) -> Self {
        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);

        for i in 0..pool_size {
            let frame_id = FrameId::new(i as u32);
            frames.push(Arc::new(FrameHeader::new(frame_id)));
            free_list.push_back(frame_id);
        }

        let inner = Arc::new(BufferPoolInner {
            frames,
            state: Mutex::new(PoolState {
                page_table: HashMap::new(),
                free_list,
                free_page_ids: Vec::new(),
            }),
            replacer: LruKReplacer::new(k, pool_size),
            disk_manager,
        });

        Self { pool_size, inner }
    }

    /// Allocates a new zeroed page and pins it once.
    /// Returns `Ok(None)` if every frame is pinned.
    pub fn new_page(&self) -> Result<Option<PageId>> {
        Ok(self.inner.new_page()?.map(|(page_id, _)| page_id))
    }

    /// Pins `page_id`, loading it from disk if needed, and returns its frame.
    /// Returns `Ok(None)` if the page is not resident and every frame is pinned.
    pub fn fetch_page(&self, page_id: PageId) -> Result<Option<Arc<FrameHeader>>> {
        self.inner.fetch_page(page_id)
    }

    /// Drops one pin on `page_id`; `is_dirty` is OR-ed into the page's dirty flag.
    /// Returns false if the page is not resident or not pinned.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        self.inner.unpin_page(page_id, is_dirty)
    }

    /// Writes a resident page to disk regardless of its dirty flag.
    /// Returns false if the page is not resident.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        self.inner.flush_page(page_id)
    }

    /// Flushes every resident page to disk.
    pub fn flush_all_pages(&self) -> Result<()> {
        let resident: Vec<PageId> = self.inner.state.lock().page_table.keys().copied().collect();
        for page_id in resident {
            self.inner.flush_page(page_id)?;
        }
        Ok(())
    }

    /// Removes a page from the pool and recycles its page ID.
    /// Returns false if the page is pinned; a page that is not resident is a no-op success.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        self.inner.delete_page(page_id)
    }

    /// Allocates a new page and wraps its pin in a guard.
    pub fn new_page_guarded(&self) -> Result<Option<BasicPageGuard>> {
        Ok(self
            .inner
            .new_page()?
            .map(|(page_id, frame)| BasicPageGuard::new(Arc::clone(&self.inner), frame, page_id)))
    }

    /// Fetches a page and wraps its pin in a guard without latching it.
    pub fn checked_basic_page(&self, page_id: PageId) -> Result<Option<BasicPageGuard>> {
        Ok(self
            .inner
            .fetch_page(page_id)?
            .map(|frame| BasicPageGuard::new(Arc::clone(&self.inner), frame, page_id)))
    }

    /// Fetches a page for read access.
    /// Returns `Ok(None)` if the page is not resident and every frame is pinned.
    pub fn checked_read_page(&self, page_id: PageId) -> Result<Option<ReadPageGuard>> {
        Ok(self
            .checked_basic_page(page_id)?
            .map(BasicPageGuard::upgrade_read))
    }

    /// Fetches a page for write access.
    /// Returns `Ok(None)` if the page is not resident and every frame is pinned.
    pub fn checked_write_page(&self, page_id: PageId) -> Result<Option<WritePageGuard>> {
        Ok(self
            .checked_basic_page(page_id)?
            .map(BasicPageGuard::upgrade_write))
    }

    /// Returns the pin count of a resident page.
    pub fn get_pin_count(&self, page_id: PageId) -> Option<u32> {
        let state = self.inner.state.lock();
        state
            .page_table
            .get(&page_id)
            .map(|frame_id| self.inner.frames[frame_id.as_usize()].pin_count())
    }

    /// Returns true if the page currently occupies a frame.
    pub fn is_resident(&self, page_id: PageId) -> bool {
        self.inner.state.lock().page_table.contains_key(&page_id)
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Returns the number of frames holding no page.
    pub fn free_frame_count(&self) -> usize {
        self.inner.state.lock().free_list.len()
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.inner.disk_manager
    }
}

impl BufferPoolInner {
    fn frame(&self, frame_id: FrameId) -> &Arc<FrameHeader> {
        &self.frames[frame_id.as_usize()]
    }

    /// Pins a resident frame on behalf of a new user.
    fn pin_frame(&self, frame_id: FrameId) -> Result<()> {
        self.frame(frame_id).pin();
        self.replacer.record_access(frame_id)?;
        self.replacer.set_evictable(frame_id, false)
    }

    fn new_page(&self) -> Result<Option<(PageId, Arc<FrameHeader>)>> {
        let mut state = self.state.lock();
        let frame_id = match self.acquire_frame(&mut state)? {
            Some(frame_id) => frame_id,
            None => {
                debug!("No frame available for a new page");
                return Ok(None);
            }
        };

        // A recycled id still holds its old bytes on disk, so the zeroed frame
        // must be written over it. Fresh ids are backed by a zeroed page already.
        let (page_id, recycled) = match state.free_page_ids.pop() {
            Some(page_id) => (page_id, true),
            None => match self.disk_manager.allocate_page() {
                Ok(page_id) => (page_id, false),
                Err(e) => {
                    state.free_list.push_back(frame_id);
                    return Err(e);
                }
            },
        };

        let frame = self.frame(frame_id);
        frame.set_page_id(page_id);
        frame.set_dirty(recycled);
        state.page_table.insert(page_id, frame_id);
        self.pin_frame(frame_id)?;

        debug!("Allocated {} in {}", page_id, frame_id);
        Ok(Some((page_id, Arc::clone(frame))))
    }

    fn fetch_page(&self, page_id: PageId) -> Result<Option<Arc<FrameHeader>>> {
        if !page_id.is_valid() {
            return Err(StrataError::InvalidPageId(page_id));
        }

        let mut state = self.state.lock();
        if let Some(&frame_id) = state.page_table.get(&page_id) {
            self.pin_frame(frame_id)?;
            return Ok(Some(Arc::clone(self.frame(frame_id))));
        }

        debug!("Buffer pool miss for {}, loading from disk", page_id);
        let frame_id = match self.acquire_frame(&mut state)? {
            Some(frame_id) => frame_id,
            None => {
                debug!("No frame available to load {}", page_id);
                return Ok(None);
            }
        };

        let frame = self.frame(frame_id);
        {
            let mut data = frame.write_data();
            if let Err(e) = self.disk_manager.read_page(page_id, &mut data[..]) {
                data.fill(0);
                state.free_list.push_back(frame_id);
                return Err(e);
            }
        }

        frame.set_page_id(page_id);
        frame.set_dirty(false);
        state.page_table.insert(page_id, frame_id);
        self.pin_frame(frame_id)?;
        Ok(Some(Arc::clone(frame)))
    }

    pub(crate) fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let state = self.state.lock();
        let frame_id = match state.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => return false,
        };

        let frame = self.frame(frame_id);
        if frame.pin_count() == 0 {
            return false;
        }
        if is_dirty {
            frame.set_dirty(true);
        }
        if frame.unpin() == Some(0) {
            if let Err(e) = self.replacer.set_evictable(frame_id, true) {
                error!("Replacer lost track of {} holding {}: {}", frame_id, page_id, e);
            }
        }
        true
    }

    fn flush_page(&self, page_id: PageId) -> Result<bool> {
        // Pin under the pool lock, then latch and write with the lock released.
        let frame = {
            let state = self.state.lock();
            let frame_id = match state.page_table.get(&page_id) {
                Some(&frame_id) => frame_id,
                None => return Ok(false),
            };
            let frame = self.frame(frame_id);
            frame.pin();
            self.replacer.set_evictable(frame_id, false)?;
            Arc::clone(frame)
        };

        let result = {
            let data = frame.read_data();
            self.write_back(&frame, page_id, &data[..])
        };
        self.unpin_page(page_id, false);
        result.map(|_| true)
    }

    /// Writes `data` as the current image of `page_id` and clears the dirty flag.
    /// The caller holds a pin and a latch on the frame.
    pub(crate) fn write_back(&self, frame: &FrameHeader, page_id: PageId, data: &[u8]) -> Result<()> {
        self.disk_manager.write_page(page_id, data)?;
        frame.set_dirty(false);
        trace!("Wrote back {}", page_id);
        Ok(())
    }

    fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut state = self.state.lock();
        let frame_id = match state.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => return Ok(true),
        };

        let frame = self.frame(frame_id);
        if frame.pin_count() > 0 {
            return Ok(false);
        }
        if frame.is_dirty() {
            let data = frame.read_data();
            self.disk_manager.write_page(page_id, &data[..])?;
        }

        self.replacer.remove(frame_id)?;
        state.page_table.remove(&page_id);
        state.free_page_ids.push(page_id);
        state.free_list.push_back(frame_id);
        frame.reset();

        debug!("Deleted {} from {}", page_id, frame_id);
        Ok(true)
    }

    /// Finds a frame for a new occupant: a free frame if there is one, otherwise
    /// an evicted one (written back first if dirty). The frame comes back zeroed.
    fn acquire_frame(&self, state: &mut PoolState) -> Result<Option<FrameId>> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Ok(Some(frame_id));
        }

        let frame_id = match self.replacer.evict() {
            Some(frame_id) => frame_id,
            None => return Ok(None),
        };

        let frame = self.frame(frame_id);
        let victim = frame.page_id();
        if frame.is_dirty() {
            let written = {
                let data = frame.read_data();
                self.disk_manager.write_page(victim, &data[..])
            };
            if let Err(e) = written {
                // Keep the victim resident and evictable.
                self.replacer.record_access(frame_id)?;
                self.replacer.set_evictable(frame_id, true)?;
                return Err(e);
            }
        }

        state.page_table.remove(&victim);
        frame.reset();
        trace!("Evicted {} from {}", victim, frame_id);
        Ok(Some(frame_id))
    }
}
