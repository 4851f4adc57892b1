mod buffer_pool_manager;
mod cache_stats;
mod lru_k_replacer;
mod page_guard;
mod replacer;

pub use buffer_pool_manager::*;
pub use cache_stats::*;
pub use lru_k_replacer::*;
pub use page_guard::*;
pub use replacer::*;
