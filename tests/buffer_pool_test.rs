//! Integration tests for the buffer pool manager

use std::sync::Arc;
use std::thread;

use pagedb::buffer::BufferPoolManager;
use pagedb::common::{
    PageDbError, PageId, ReplacementPolicy, StorageConfig, DEFAULT_LRUK_K, PAGE_SIZE,
};
use pagedb::storage::disk::DiskManager;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tempfile::NamedTempFile;

fn create_bpm(pool_size: usize, policy: ReplacementPolicy) -> (BufferPoolManager, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    let bpm = BufferPoolManager::new(pool_size, policy, dm);
    (bpm, temp_file)
}

/// Allocates `n` pages and unpins them clean.
fn fill_pool(bpm: &BufferPoolManager, n: usize) -> Vec<PageId> {
    (0..n)
        .map(|_| {
            let page_id = bpm.new_page().unwrap().page_id();
            assert!(bpm.unpin_page(page_id, false));
            page_id
        })
        .collect()
}

#[test]
fn test_buffer_pool_basic_operations() {
    let (bpm, _temp) = create_bpm(10, ReplacementPolicy::Lru);

    // Page 0 holds the root directory, so the first data page is 1
    let page_id = {
        let mut guard = bpm.new_page_guarded().unwrap();
        assert_eq!(guard.page_id(), PageId::new(1));
        guard.data_mut()[..4].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        guard.page_id()
    };

    {
        let guard = bpm.fetch_page_read(page_id).unwrap();
        assert_eq!(&guard.data()[..4], &[0xDE, 0xAD, 0xBE, 0xEF]);
    }

    assert_eq!(bpm.get_pin_count(page_id), Some(0));
}

#[test]
fn test_buffer_pool_page_api() {
    let (bpm, _temp) = create_bpm(4, ReplacementPolicy::Lru);

    let page = bpm.new_page().unwrap();
    let page_id = page.page_id();
    page.write_string("Hello, World!").unwrap();
    assert!(page.is_dirty());
    drop(page);
    assert!(bpm.unpin_page(page_id, true));

    assert!(bpm.flush_page(page_id).unwrap());
    let page = bpm.get_page(page_id).unwrap();
    assert!(!page.is_dirty());
    assert_eq!(page.read_string(), "Hello, World!");
    assert!(bpm.unpin_page(page_id, false));
}

#[test]
fn test_buffer_pool_lru_eviction() {
    let (bpm, _temp) = create_bpm(3, ReplacementPolicy::Lru);
    let pages = fill_pool(&bpm, 3);

    // Touch the oldest page so the second one becomes least recent
    bpm.get_page(pages[0]).unwrap();
    bpm.unpin_page(pages[0], false);

    let fresh = bpm.new_page().unwrap().page_id();
    bpm.unpin_page(fresh, false);

    assert!(bpm.is_resident(pages[0]));
    assert!(!bpm.is_resident(pages[1]));
    assert!(bpm.is_resident(pages[2]));
    assert!(bpm.is_resident(fresh));
}

#[test]
fn test_buffer_pool_fifo_eviction() {
    let (bpm, _temp) = create_bpm(3, ReplacementPolicy::Fifo);
    let pages = fill_pool(&bpm, 3);

    // A hit does not change arrival order
    bpm.get_page(pages[0]).unwrap();
    bpm.unpin_page(pages[0], false);

    let fresh = bpm.new_page().unwrap().page_id();
    bpm.unpin_page(fresh, false);

    assert!(!bpm.is_resident(pages[0]));
    assert!(bpm.is_resident(pages[1]));
    assert!(bpm.is_resident(pages[2]));
}

#[test]
fn test_buffer_pool_lru_k_eviction() {
    let (bpm, _temp) = create_bpm(3, ReplacementPolicy::LruK { k: DEFAULT_LRUK_K });
    let pages = fill_pool(&bpm, 3);

    // Pages 0 and 2 reach k accesses; page 1 keeps an infinite distance
    for &page_id in &[pages[0], pages[2]] {
        bpm.get_page(page_id).unwrap();
        bpm.unpin_page(page_id, false);
    }

    let fresh = bpm.new_page().unwrap().page_id();
    bpm.unpin_page(fresh, false);

    assert!(!bpm.is_resident(pages[1]));
    assert!(bpm.is_resident(pages[0]));
    assert!(bpm.is_resident(pages[2]));
}

#[test]
fn test_buffer_pool_pinned_pages_not_evicted() {
    let (bpm, _temp) = create_bpm(3, ReplacementPolicy::Lru);

    let pinned: Vec<_> = (0..2).map(|_| bpm.new_page().unwrap()).collect();
    let loose = fill_pool(&bpm, 1)[0];

    // Only the unpinned page can make room
    let fresh = bpm.new_page().unwrap().page_id();
    assert!(!bpm.is_resident(loose));
    for page in &pinned {
        assert!(bpm.is_resident(page.page_id()));
    }

    assert!(matches!(bpm.new_page(), Err(PageDbError::BufferPoolFull)));
    assert!(matches!(bpm.get_page(loose), Err(PageDbError::BufferPoolFull)));

    bpm.unpin_page(fresh, false);
    assert!(bpm.get_page(loose).is_ok());
}

#[test]
fn test_buffer_pool_dirty_victim_written_back() {
    let (bpm, _temp) = create_bpm(1, ReplacementPolicy::Lru);

    let first = {
        let mut guard = bpm.new_page_guarded().unwrap();
        guard.data_mut()[0] = 0x5A;
        guard.page_id()
    };
    let writes_before = bpm.disk_manager().get_num_writes();

    // Allocating a second page evicts the dirty first page
    let second = bpm.new_page().unwrap().page_id();
    bpm.unpin_page(second, false);
    assert!(!bpm.is_resident(first));
    assert_eq!(bpm.disk_manager().get_num_writes(), writes_before + 1);

    let guard = bpm.fetch_page_read(first).unwrap();
    assert_eq!(guard.data()[0], 0x5A);
}

#[test]
fn test_buffer_pool_clean_victim_not_written() {
    let (bpm, _temp) = create_bpm(2, ReplacementPolicy::Lru);
    fill_pool(&bpm, 4);

    assert_eq!(bpm.disk_manager().get_num_writes(), 0);
}

#[test]
fn test_buffer_pool_cache_accounting() {
    let (bpm, _temp) = create_bpm(4, ReplacementPolicy::Lru);
    let pages = fill_pool(&bpm, 8);
    bpm.reset_stats();

    let mut rng = StdRng::seed_from_u64(7);
    let calls = 200;
    for _ in 0..calls {
        let page_id = pages[rng.gen_range(0..pages.len())];
        bpm.get_page(page_id).unwrap();
        bpm.unpin_page(page_id, false);
    }
    assert!(matches!(
        bpm.get_page(PageId::new(-1)),
        Err(PageDbError::InvalidPageId(_))
    ));

    let stats = bpm.stats();
    assert_eq!(stats.total(), calls + 1);
    assert!(stats.hits > 0);
    assert!(stats.misses > 0);
}

#[test]
fn test_buffer_pool_repeated_hits() {
    let (bpm, _temp) = create_bpm(4, ReplacementPolicy::Lru);
    let page_id = fill_pool(&bpm, 1)[0];
    bpm.reset_stats();

    for _ in 0..5 {
        drop(bpm.fetch_page_read(page_id).unwrap());
    }

    let stats = bpm.stats();
    assert_eq!(stats.hits, 5);
    assert_eq!(stats.misses, 0);
    assert!((stats.hit_rate() - 1.0).abs() < f64::EPSILON);
}

#[test]
fn test_buffer_pool_unpin_errors() {
    let (bpm, _temp) = create_bpm(4, ReplacementPolicy::Lru);

    assert!(!bpm.unpin_page(PageId::new(42), false));

    let page_id = fill_pool(&bpm, 1)[0];
    assert!(!bpm.unpin_page(page_id, false));
}

#[test]
fn test_buffer_pool_delete_page() {
    let (bpm, _temp) = create_bpm(4, ReplacementPolicy::Lru);

    let page = bpm.new_page().unwrap();
    let page_id = page.page_id();
    assert!(!bpm.delete_page(page_id).unwrap());
    assert!(bpm.is_resident(page_id));

    drop(page);
    bpm.unpin_page(page_id, false);
    let free_before = bpm.free_frame_count();
    assert!(bpm.delete_page(page_id).unwrap());
    assert!(!bpm.is_resident(page_id));
    assert_eq!(bpm.free_frame_count(), free_before + 1);

    // Deleting a page that is not resident succeeds too
    assert!(bpm.delete_page(page_id).unwrap());
}

#[test]
fn test_buffer_pool_persistence() {
    let temp_file = NamedTempFile::new().unwrap();
    let path = temp_file.path().to_path_buf();
    let config = StorageConfig::default().with_pool_size(4);

    let page_ids: Vec<_> = {
        let dm = Arc::new(DiskManager::new(&path).unwrap());
        let bpm = BufferPoolManager::with_config(&config, dm);

        let ids = (0..10u8)
            .map(|i| {
                let mut guard = bpm.new_page_guarded().unwrap();
                guard.data_mut().fill(i);
                guard.page_id()
            })
            .collect();
        bpm.flush_all_pages().unwrap();
        ids
    };

    let dm = Arc::new(DiskManager::new(&path).unwrap());
    let bpm = BufferPoolManager::with_config(&config, dm);
    for (i, &page_id) in page_ids.iter().enumerate() {
        let guard = bpm.fetch_page_read(page_id).unwrap();
        let data = guard.data();
        assert_eq!(data[0], i as u8);
        assert_eq!(data[PAGE_SIZE - 1], i as u8);
    }
}

#[test]
fn test_buffer_pool_concurrent_access() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    let bpm = Arc::new(BufferPoolManager::new(8, ReplacementPolicy::Lru, dm));

    let handles: Vec<_> = (0..4u8)
        .map(|t| {
            let bpm = Arc::clone(&bpm);
            thread::spawn(move || {
                let mut mine = Vec::new();
                for i in 0..10u8 {
                    let mut guard = bpm.new_page_guarded().unwrap();
                    guard.data_mut()[0] = t;
                    guard.data_mut()[1] = i;
                    mine.push(guard.page_id());
                }
                for (i, &page_id) in mine.iter().enumerate() {
                    let guard = bpm.fetch_page_read(page_id).unwrap();
                    assert_eq!(guard.data()[0], t);
                    assert_eq!(guard.data()[1], i as u8);
                }
                mine
            })
        })
        .collect();

    let mut all: Vec<PageId> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    all.sort();
    all.dedup();
    assert_eq!(all.len(), 40);

    for &page_id in &all {
        assert_eq!(bpm.get_pin_count(page_id).unwrap_or(0), 0);
    }
}
