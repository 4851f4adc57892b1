use super::types::PageId;

/// Size of a page in bytes (4 KB)
pub const PAGE_SIZE: usize = 4096;

/// Sentinel for "no page"
pub const INVALID_PAGE_ID: PageId = PageId(-1);

/// Page reserved for the index root directory
pub const HEADER_PAGE_ID: PageId = PageId(0);

/// Default buffer pool size (number of frames)
pub const DEFAULT_BUFFER_POOL_SIZE: usize = 64;

/// Default B+ tree fan-out bound (max keys per node)
pub const DEFAULT_MAX_KEYS: usize = 10;

/// Smallest fan-out bound that still splits into two non-empty halves
pub const MIN_MAX_KEYS: usize = 3;

/// Default K value for LRU-K replacement policy
pub const DEFAULT_LRUK_K: usize = 2;

/// Depth of the disk scheduler request queue
pub const DISK_SCHEDULER_QUEUE_DEPTH: usize = 128;

/// Eviction policy used by the buffer pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplacementPolicy {
    /// Evict the least recently touched unpinned page.
    #[default]
    Lru,
    /// Evict the earliest loaded unpinned page.
    Fifo,
    /// Evict the unpinned page with the largest backward k-distance.
    LruK { k: usize },
}

/// Tunables for a store: buffer pool sizing, eviction policy and index fan-out.
///
/// ```
/// use pagedb::common::{ReplacementPolicy, StorageConfig};
///
/// let config = StorageConfig::default()
///     .with_pool_size(16)
///     .with_policy(ReplacementPolicy::Fifo)
///     .with_max_keys(4);
/// assert_eq!(config.pool_size, 16);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub pool_size: usize,
    pub policy: ReplacementPolicy,
    pub max_keys: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_BUFFER_POOL_SIZE,
            policy: ReplacementPolicy::default(),
            max_keys: DEFAULT_MAX_KEYS,
        }
    }
}

impl StorageConfig {
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn with_policy(mut self, policy: ReplacementPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_max_keys(mut self, max_keys: usize) -> Self {
        self.max_keys = max_keys;
        self
    }
}
