use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::common::{PageDbError, PageId, Result, INVALID_PAGE_ID, PAGE_SIZE};

/// Page is the in-memory copy of one on-disk page plus its buffer-pool
/// metadata. The buffer is always exactly PAGE_SIZE bytes.
pub struct Page {
    /// The page ID stored in this frame (INVALID_PAGE_ID if empty)
    page_id: RwLock<PageId>,
    /// Number of outstanding users; a pinned page is never evicted
    pin_count: AtomicU32,
    /// Whether the page has been modified since being read from disk
    is_dirty: AtomicBool,
    data: RwLock<Box<[u8; PAGE_SIZE]>>,
}

impl Page {
    /// Creates an empty, zero-filled page with no identity.
    pub fn new() -> Self {
        Self {
            page_id: RwLock::new(INVALID_PAGE_ID),
            pin_count: AtomicU32::new(0),
            is_dirty: AtomicBool::new(false),
            data: RwLock::new(Box::new([0u8; PAGE_SIZE])),
        }
    }

    /// Returns the page ID stored in this frame.
    pub fn page_id(&self) -> PageId {
        *self.page_id.read()
    }

    pub(crate) fn set_page_id(&self, page_id: PageId) {
        *self.page_id.write() = page_id;
    }

    /// Returns the current pin count.
    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    pub fn is_pinned(&self) -> bool {
        self.pin_count() > 0
    }

    /// Increments the pin count and returns the new value.
    pub fn pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrements the pin count and returns the new value.
    /// Returns None if the pin count was already 0.
    pub fn unpin(&self) -> Option<u32> {
        self.pin_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current.checked_sub(1)
            })
            .ok()
            .map(|previous| previous - 1)
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty.load(Ordering::Acquire)
    }

    pub fn set_dirty(&self, dirty: bool) {
        self.is_dirty.store(dirty, Ordering::Release);
    }

    /// Returns a read guard over the raw page bytes.
    pub fn read_data(&self) -> RwLockReadGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.data.read()
    }

    /// Returns a write guard over the raw page bytes. Callers are responsible
    /// for marking the page dirty.
    pub fn write_data(&self) -> RwLockWriteGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.data.write()
    }

    /// Returns a copy of the whole page buffer.
    pub fn get_data(&self) -> Box<[u8; PAGE_SIZE]> {
        self.data.read().clone()
    }

    /// Replaces the page contents. Shorter input is zero-padded; input longer
    /// than a page is rejected. Marks the page dirty.
    pub fn set_data(&self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > PAGE_SIZE {
            return Err(PageDbError::PageOverflow { size: bytes.len() });
        }

        let mut data = self.data.write();
        data[..bytes.len()].copy_from_slice(bytes);
        data[bytes.len()..].fill(0);
        drop(data);

        self.set_dirty(true);
        Ok(())
    }

    /// Stores `text` as a NUL-terminated blob at the start of the page.
    pub fn write_string(&self, text: &str) -> Result<()> {
        self.set_data(text.as_bytes())
    }

    /// Reads the NUL-terminated blob written by [`Page::write_string`].
    pub fn read_string(&self) -> String {
        let data = self.data.read();
        let end = data.iter().position(|&b| b == 0).unwrap_or(PAGE_SIZE);
        String::from_utf8_lossy(&data[..end]).into_owned()
    }

    pub(crate) fn copy_from(&self, data: &[u8; PAGE_SIZE]) {
        self.data.write().copy_from_slice(data);
    }

    /// Resets the frame to its initial state.
    pub(crate) fn reset(&self) {
        *self.page_id.write() = INVALID_PAGE_ID;
        self.pin_count.store(0, Ordering::Release);
        self.is_dirty.store(false, Ordering::Release);
        self.data.write().fill(0);
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}
