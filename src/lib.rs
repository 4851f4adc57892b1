//! pagedb - a page-oriented storage engine
//!
//! Fixed-size pages live in a single database file and are cached in memory by
//! a buffer pool. A disk-resident B+ tree index is built on top of the pool.
//!
//! # Architecture
//!
//! - **Storage** (`storage`): the on-disk side
//!   - `DiskManager`: positional page reads and writes against the database file
//!   - `DiskScheduler`: background worker that serializes disk requests
//!   - `Page`: one in-memory frame with its pin count and dirty flag
//!
//! - **Buffer Pool** (`buffer`): caching of pages in a fixed set of frames
//!   - `BufferPoolManager`: fetch, pin, unpin, flush, delete and evict pages
//!   - `LruReplacer`, `FifoReplacer`, `LruKReplacer`: victim selection
//!   - `ReadPageGuard`/`WritePageGuard`: RAII pins that unpin on drop
//!
//! - **Index** (`index`): B+ tree over the buffer pool
//!   - `BPlusTree`: point lookups, range scans, inserts with splits and deletes
//!   - `RootDirectory`: per-index root slots stored in page 0
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pagedb::{BPlusTree, BufferPoolManager, DiskManager, PageId, ReplacementPolicy};
//!
//! let disk_manager = Arc::new(DiskManager::new("test.db").unwrap());
//! let bpm = Arc::new(BufferPoolManager::new(64, ReplacementPolicy::Lru, disk_manager));
//!
//! let mut index = BPlusTree::<i32>::new("orders", Arc::clone(&bpm), 10).unwrap();
//! index.insert(42, PageId::new(7)).unwrap();
//! assert_eq!(index.search(&42).unwrap(), Some(PageId::new(7)));
//!
//! bpm.flush_all_pages().unwrap();
//! ```

pub mod buffer;
pub mod common;
pub mod index;
pub mod storage;

// Re-export commonly used types at the crate root
pub use buffer::BufferPoolManager;
pub use common::{PageDbError, PageId, ReplacementPolicy, Result, StorageConfig};
pub use index::BPlusTree;
pub use storage::disk::DiskManager;
