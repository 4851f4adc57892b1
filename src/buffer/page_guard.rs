use std::sync::Arc;

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::{PageId, PAGE_SIZE};
use crate::storage::page::Page;

use super::BufferPoolManager;

/// RAII guard for read-only access to a pinned page.
/// Unpins the page when dropped.
pub struct ReadPageGuard<'a> {
    bpm: &'a BufferPoolManager,
    page: Arc<Page>,
}

impl<'a> ReadPageGuard<'a> {
    pub(crate) fn new(bpm: &'a BufferPoolManager, page: Arc<Page>) -> Self {
        Self { bpm, page }
    }

    pub fn page_id(&self) -> PageId {
        self.page.page_id()
    }

    /// Locks the page bytes for reading. Keep the returned guard short-lived;
    /// the pin, not the latch, is what keeps the page resident.
    pub fn data(&self) -> RwLockReadGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.page.read_data()
    }
}

impl Drop for ReadPageGuard<'_> {
    fn drop(&mut self) {
        self.bpm.unpin_page(self.page.page_id(), false);
    }
}

/// RAII guard for read-write access to a pinned page.
/// Unpins the page when dropped, marking it dirty if it was written.
pub struct WritePageGuard<'a> {
    bpm: &'a BufferPoolManager,
    page: Arc<Page>,
    is_dirty: bool,
}

impl<'a> WritePageGuard<'a> {
    pub(crate) fn new(bpm: &'a BufferPoolManager, page: Arc<Page>) -> Self {
        Self {
            bpm,
            page,
            is_dirty: false,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page.page_id()
    }

    pub fn data(&self) -> RwLockReadGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.page.read_data()
    }

    /// Locks the page bytes for writing and marks the page dirty.
    pub fn data_mut(&mut self) -> RwLockWriteGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.is_dirty = true;
        self.page.write_data()
    }
}

impl Drop for WritePageGuard<'_> {
    fn drop(&mut self) {
        self.bpm.unpin_page(self.page.page_id(), self.is_dirty);
    }
}
