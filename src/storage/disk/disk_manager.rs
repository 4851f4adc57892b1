use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use log::debug;
use parking_lot::RwLock;

use crate::common::{PageDbError, PageId, Result, HEADER_PAGE_ID, PAGE_SIZE};

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(unix)]
fn write_all_at(file: &File, buf: &[u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(buf, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset)? {
            0 => return Err(std::io::ErrorKind::UnexpectedEof.into()),
            n => {
                buf = &mut buf[n..];
                offset += n as u64;
            }
        }
    }
    Ok(())
}

#[cfg(windows)]
fn write_all_at(file: &File, mut buf: &[u8], mut offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_write(buf, offset)? {
            0 => return Err(std::io::ErrorKind::WriteZero.into()),
            n => {
                buf = &buf[n..];
                offset += n as u64;
            }
        }
    }
    Ok(())
}

fn page_offset(page_id: PageId) -> Result<u64> {
    if !page_id.is_valid() {
        return Err(PageDbError::InvalidPageId(page_id));
    }
    Ok(page_id.as_i32() as u64 * PAGE_SIZE as u64)
}

/// DiskManager is responsible for reading and writing pages to/from disk.
///
/// It owns a single database file laid out as contiguous pages at
/// `page_id * PAGE_SIZE`. Reads share the file lock and writes take it
/// exclusively. Page 0 is reserved for the index root directory and is
/// allocated when the file is first created.
pub struct DiskManager {
    /// The database file
    db_file: RwLock<File>,
    /// Path to the database file
    db_path: String,
    /// Number of whole pages the file currently covers
    num_pages: AtomicU32,
    /// Number of disk reads performed
    num_reads: AtomicU32,
    /// Number of disk writes performed
    num_writes: AtomicU32,
}

impl DiskManager {
    /// Opens the database file at the given path, creating it if needed.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path_str = db_path.as_ref().to_string_lossy().to_string();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&db_path)?;

        let file_size = file.metadata()?.len();
        let dm = Self {
            db_file: RwLock::new(file),
            db_path: path_str,
            num_pages: AtomicU32::new((file_size / PAGE_SIZE as u64) as u32),
            num_reads: AtomicU32::new(0),
            num_writes: AtomicU32::new(0),
        };

        if file_size == 0 {
            let header = dm.allocate_page()?;
            debug_assert_eq!(header, HEADER_PAGE_ID);
            debug!("created {} with header page {}", dm.db_path, header);
        }

        Ok(dm)
    }

    /// Reads a page from disk into the provided buffer.
    ///
    /// Reading a page the file does not cover yet grows the file with zeros
    /// and returns a zeroed page.
    pub fn read_page(&self, page_id: PageId, data: &mut [u8; PAGE_SIZE]) -> Result<()> {
        let offset = page_offset(page_id)?;
        self.ensure_len(offset + PAGE_SIZE as u64)?;

        let file = self.db_file.read();
        read_exact_at(&file, data, offset)?;

        self.num_reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Writes a page to disk and forces it to stable storage before returning.
    pub fn write_page(&self, page_id: PageId, data: &[u8; PAGE_SIZE]) -> Result<()> {
        let offset = page_offset(page_id)?;

        let file = self.db_file.write();
        write_all_at(&file, data, offset)?;
        file.sync_data()?;
        self.note_len(offset + PAGE_SIZE as u64);

        self.num_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Allocates a new page at the end of the file and returns its id.
    ///
    /// Ids are dense and derived from the file length; they are never reused.
    pub fn allocate_page(&self) -> Result<PageId> {
        let file = self.db_file.write();
        let file_size = file.metadata()?.len();
        let page_num = file_size / PAGE_SIZE as u64;
        let new_len = (page_num + 1) * PAGE_SIZE as u64;

        let page_id = i32::try_from(page_num)
            .map(PageId::new)
            .map_err(|_| PageDbError::InvalidPageId(PageId::new(i32::MAX)))?;

        file.set_len(new_len)?;
        self.note_len(new_len);

        debug!("allocated {}", page_id);
        Ok(page_id)
    }

    /// Deallocates a page. Space is never reclaimed and the id is never handed
    /// out again.
    pub fn deallocate_page(&self, page_id: PageId) -> Result<()> {
        debug!("deallocate {} (space not reclaimed)", page_id);
        Ok(())
    }

    /// Returns the number of pages currently covered by the file.
    pub fn get_num_pages(&self) -> u32 {
        self.num_pages.load(Ordering::Relaxed)
    }

    /// Returns the number of disk reads performed.
    pub fn get_num_reads(&self) -> u32 {
        self.num_reads.load(Ordering::Relaxed)
    }

    /// Returns the number of disk writes performed.
    pub fn get_num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::Relaxed)
    }

    /// Returns the path to the database file.
    pub fn get_db_path(&self) -> &str {
        &self.db_path
    }

    /// Flushes file data and metadata to disk.
    pub fn sync(&self) -> Result<()> {
        let file = self.db_file.read();
        file.sync_all()?;
        Ok(())
    }

    fn ensure_len(&self, required: u64) -> Result<()> {
        {
            let file = self.db_file.read();
            if file.metadata()?.len() >= required {
                return Ok(());
            }
        }

        let file = self.db_file.write();
        // Another thread may have grown the file between the two locks.
        if file.metadata()?.len() < required {
            file.set_len(required)?;
            self.note_len(required);
        }
        Ok(())
    }

    fn note_len(&self, len: u64) {
        let pages = (len / PAGE_SIZE as u64) as u32;
        self.num_pages.fetch_max(pages, Ordering::Relaxed);
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        let file = self.db_file.get_mut();
        let _ = file.sync_all();
    }
}
