use thiserror::Error;

use super::types::PageId;

/// Storage engine error types
#[derive(Error, Debug)]
pub enum PageDbError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid page ID: {0}")]
    InvalidPageId(PageId),

    #[error("Buffer pool is full, no evictable frames available")]
    BufferPoolFull,

    #[error("Data of {size} bytes does not fit in a page")]
    PageOverflow { size: usize },

    #[error("Disk scheduler error: {0}")]
    DiskScheduler(String),

    #[error("Corrupt node on {page_id}: {reason}")]
    CorruptNode { page_id: PageId, reason: String },

    #[error("Key of {len} bytes exceeds the {max} byte limit")]
    KeyTooLong { len: usize, max: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Root directory is full")]
    DirectoryFull,
}

pub type Result<T> = std::result::Result<T, PageDbError>;
