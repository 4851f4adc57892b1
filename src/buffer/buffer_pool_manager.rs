use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use log::{debug, warn};
use parking_lot::RwLock;

use crate::common::{
    FrameId, PageDbError, PageId, ReplacementPolicy, Result, StorageConfig, PAGE_SIZE,
};
use crate::storage::disk::{DiskManager, DiskScheduler, PageBuf};
use crate::storage::page::Page;

use super::{make_replacer, CacheStats, ReadPageGuard, Replacer, WritePageGuard};

/// Mutable pool bookkeeping, guarded as one unit
struct PoolState {
    /// Page table: maps resident page IDs to frame IDs
    page_table: HashMap<PageId, FrameId>,
    /// Frames that hold no page
    free_list: VecDeque<FrameId>,
    /// Recency/arrival bookkeeping for eviction decisions
    replacer: Box<dyn Replacer>,
    stats: CacheStats,
}

/// BufferPoolManager caches a fixed number of pages in memory frames and is
/// the only component that talks to the disk.
///
/// Every operation that touches the page table, free list or replacer takes
/// the state lock exclusively (hits included), so the pool serializes its
/// callers. Pages handed out are pinned; callers must release them with
/// [`BufferPoolManager::unpin_page`] or use the RAII page guards.
pub struct BufferPoolManager {
    pool_size: usize,
    frames: Vec<Arc<Page>>,
    state: RwLock<PoolState>,
    disk_scheduler: DiskScheduler,
}

impl BufferPoolManager {
    /// Creates a pool of `pool_size` frames evicting with `policy`.
    pub fn new(pool_size: usize, policy: ReplacementPolicy, disk_manager: Arc<DiskManager>) -> Self {
        let frames = (0..pool_size).map(|_| Arc::new(Page::new())).collect();
        let free_list = (0..pool_size).map(|i| FrameId::new(i as u32)).collect();

        let state = PoolState {
            page_table: HashMap::with_capacity(pool_size),
            free_list,
            replacer: make_replacer(policy, pool_size),
            stats: CacheStats::default(),
        };

        debug!("buffer pool: {} frames, {:?} eviction", pool_size, policy);

        Self {
            pool_size,
            frames,
            state: RwLock::new(state),
            disk_scheduler: DiskScheduler::new(disk_manager),
        }
    }

    pub fn with_config(config: &StorageConfig, disk_manager: Arc<DiskManager>) -> Self {
        Self::new(config.pool_size, config.policy, disk_manager)
    }

    /// Fetches a page, loading it from disk on a miss, and pins it.
    ///
    /// Fails with [`PageDbError::BufferPoolFull`] when the page is not
    /// resident and every frame is pinned. A rejected invalid id still
    /// counts as a miss.
    pub fn get_page(&self, page_id: PageId) -> Result<Arc<Page>> {
        let mut state = self.state.write();

        if !page_id.is_valid() {
            state.stats.misses += 1;
            return Err(PageDbError::InvalidPageId(page_id));
        }

        if let Some(&frame_id) = state.page_table.get(&page_id) {
            state.stats.hits += 1;
            let page = &self.frames[frame_id.as_usize()];
            page.pin();
            state.replacer.record_access(frame_id);
            state.replacer.set_evictable(frame_id, false);
            return Ok(Arc::clone(page));
        }

        state.stats.misses += 1;
        let frame_id = self.acquire_frame(&mut state)?;

        let data = match self.disk_scheduler.schedule_read_sync(page_id) {
            Ok(data) => data,
            Err(e) => {
                state.free_list.push_back(frame_id);
                return Err(e);
            }
        };

        let page = &self.frames[frame_id.as_usize()];
        page.copy_from(&data);
        page.set_page_id(page_id);
        page.set_dirty(false);
        page.pin();

        self.publish(&mut state, page_id, frame_id);
        Ok(Arc::clone(page))
    }

    /// Drops one pin on a resident page, OR-ing in the dirty flag.
    ///
    /// Returns false if the page is not resident or was not pinned.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let mut state = self.state.write();

        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return false;
        };

        let page = &self.frames[frame_id.as_usize()];
        let Some(remaining) = page.unpin() else {
            return false;
        };

        if is_dirty {
            page.set_dirty(true);
        }
        if remaining == 0 {
            state.replacer.set_evictable(frame_id, true);
        }
        true
    }

    /// Allocates a fresh page on disk and pins it in a frame.
    pub fn new_page(&self) -> Result<Arc<Page>> {
        let mut state = self.state.write();
        let frame_id = self.acquire_frame(&mut state)?;

        let page_id = match self.disk_scheduler.disk_manager().allocate_page() {
            Ok(page_id) => page_id,
            Err(e) => {
                state.free_list.push_back(frame_id);
                return Err(e);
            }
        };

        // Freshly allocated pages are zero on disk; the reset frame matches.
        let page = &self.frames[frame_id.as_usize()];
        page.set_page_id(page_id);
        page.pin();

        self.publish(&mut state, page_id, frame_id);
        Ok(Arc::clone(page))
    }

    /// Writes a resident page back if it is dirty.
    ///
    /// Returns `Ok(false)` when the page is not resident (nothing to do).
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        let state = self.state.write();

        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return Ok(false);
        };

        self.write_back(page_id, &self.frames[frame_id.as_usize()])?;
        Ok(true)
    }

    /// Writes every dirty resident page back to disk.
    pub fn flush_all_pages(&self) -> Result<()> {
        let state = self.state.write();

        for (&page_id, &frame_id) in state.page_table.iter() {
            self.write_back(page_id, &self.frames[frame_id.as_usize()])?;
        }
        Ok(())
    }

    /// Drops a page from the pool and deallocates it on disk.
    ///
    /// Returns false, leaving the page in place, if it is pinned. Unflushed
    /// changes are discarded.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut state = self.state.write();

        if let Some(&frame_id) = state.page_table.get(&page_id) {
            let page = &self.frames[frame_id.as_usize()];
            if page.is_pinned() {
                debug!("not deleting {}: pinned", page_id);
                return Ok(false);
            }

            state.page_table.remove(&page_id);
            state.replacer.remove(frame_id);
            page.reset();
            state.free_list.push_back(frame_id);
        }

        self.disk_scheduler
            .disk_manager()
            .deallocate_page(page_id)?;
        Ok(true)
    }

    /// Fetches and pins a page, releasing it when the guard drops.
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<ReadPageGuard<'_>> {
        let page = self.get_page(page_id)?;
        Ok(ReadPageGuard::new(self, page))
    }

    /// Fetches and pins a page for writing, releasing it (dirty if written)
    /// when the guard drops.
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<WritePageGuard<'_>> {
        let page = self.get_page(page_id)?;
        Ok(WritePageGuard::new(self, page))
    }

    /// Allocates a new page and returns it behind a write guard.
    pub fn new_page_guarded(&self) -> Result<WritePageGuard<'_>> {
        let page = self.new_page()?;
        Ok(WritePageGuard::new(self, page))
    }

    /// Returns the pin count of a resident page.
    pub fn get_pin_count(&self, page_id: PageId) -> Option<u32> {
        let state = self.state.read();
        state
            .page_table
            .get(&page_id)
            .map(|&frame_id| self.frames[frame_id.as_usize()].pin_count())
    }

    /// Returns true if the page currently occupies a frame.
    pub fn is_resident(&self, page_id: PageId) -> bool {
        self.state.read().page_table.contains_key(&page_id)
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn free_frame_count(&self) -> usize {
        self.state.read().free_list.len()
    }

    pub fn stats(&self) -> CacheStats {
        self.state.read().stats
    }

    pub fn reset_stats(&self) {
        self.state.write().stats = CacheStats::default();
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        self.disk_scheduler.disk_manager()
    }

    fn publish(&self, state: &mut PoolState, page_id: PageId, frame_id: FrameId) {
        state.page_table.insert(page_id, frame_id);
        state.replacer.record_access(frame_id);
        state.replacer.set_evictable(frame_id, false);
    }

    fn write_back(&self, page_id: PageId, page: &Page) -> Result<()> {
        if !page.is_dirty() {
            return Ok(());
        }

        let data: PageBuf = page.get_data();
        self.disk_scheduler.schedule_write_sync(page_id, data)?;
        page.set_dirty(false);
        Ok(())
    }

    /// Takes a free frame, or evicts the policy's victim (writing it back if
    /// dirty). The returned frame is reset and unmapped.
    fn acquire_frame(&self, state: &mut PoolState) -> Result<FrameId> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Ok(frame_id);
        }

        let Some(frame_id) = state.replacer.evict() else {
            warn!(
                "no evictable frame: all {} frames are pinned",
                self.pool_size
            );
            return Err(PageDbError::BufferPoolFull);
        };

        let page = &self.frames[frame_id.as_usize()];
        let victim_id = page.page_id();

        if let Err(e) = self.write_back(victim_id, page) {
            // Keep the victim resident and evictable; nothing was lost.
            state.replacer.record_access(frame_id);
            state.replacer.set_evictable(frame_id, true);
            return Err(e);
        }

        debug!("evicting {} from {}", victim_id, frame_id);
        state.page_table.remove(&victim_id);
        page.reset();
        Ok(frame_id)
    }
}
