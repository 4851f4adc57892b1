//! Integration tests for the disk manager and scheduler

use std::sync::Arc;
use std::thread;

use pagedb::common::{PageDbError, PageId, HEADER_PAGE_ID, PAGE_SIZE};
use pagedb::storage::disk::{DiskManager, DiskScheduler, PageBuf};
use tempfile::NamedTempFile;

fn page_with(byte: u8) -> PageBuf {
    Box::new([byte; PAGE_SIZE])
}

#[test]
fn test_disk_manager_create_file() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = DiskManager::new(temp_file.path()).unwrap();

    assert_eq!(dm.get_num_pages(), 1); // Root directory at page 0
    assert_eq!(dm.get_num_reads(), 0);
    assert_eq!(dm.get_num_writes(), 0);

    let mut data = [0xFFu8; PAGE_SIZE];
    dm.read_page(HEADER_PAGE_ID, &mut data).unwrap();
    assert!(data.iter().all(|&b| b == 0));
}

#[test]
fn test_disk_manager_allocate_pages() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = DiskManager::new(temp_file.path()).unwrap();

    for i in 0..10 {
        let page_id = dm.allocate_page().unwrap();
        assert_eq!(page_id, PageId::new(i + 1));
    }

    assert_eq!(dm.get_num_pages(), 11);
}

#[test]
fn test_disk_manager_random_access() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = DiskManager::new(temp_file.path()).unwrap();

    let page_ids: Vec<_> = (0..10).map(|_| dm.allocate_page().unwrap()).collect();

    let write_order = [5, 2, 8, 0, 7, 3, 9, 1, 6, 4];
    for &i in &write_order {
        let mut data = [0u8; PAGE_SIZE];
        data[0] = i as u8;
        dm.write_page(page_ids[i], &data).unwrap();
    }

    for (i, &page_id) in page_ids.iter().enumerate() {
        let mut data = [0u8; PAGE_SIZE];
        dm.read_page(page_id, &mut data).unwrap();
        assert_eq!(data[0], i as u8);
    }
    assert_eq!(dm.get_num_writes(), 10);
    assert_eq!(dm.get_num_reads(), 10);
}

#[test]
fn test_disk_manager_read_past_end_is_zeroed() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = DiskManager::new(temp_file.path()).unwrap();

    let mut data = [0xABu8; PAGE_SIZE];
    dm.read_page(PageId::new(7), &mut data).unwrap();

    assert!(data.iter().all(|&b| b == 0));
    assert!(dm.get_num_pages() >= 8);
}

#[test]
fn test_disk_manager_invalid_page_id() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = DiskManager::new(temp_file.path()).unwrap();

    let mut data = [0u8; PAGE_SIZE];
    assert!(matches!(
        dm.read_page(PageId::new(-1), &mut data),
        Err(PageDbError::InvalidPageId(_))
    ));
}

#[test]
fn test_disk_manager_persistence() {
    let temp_file = NamedTempFile::new().unwrap();
    let path = temp_file.path().to_path_buf();

    let test_data = b"Persistence test";

    {
        let dm = DiskManager::new(&path).unwrap();
        let page_id = dm.allocate_page().unwrap();

        let mut data = [0u8; PAGE_SIZE];
        data[..test_data.len()].copy_from_slice(test_data);
        dm.write_page(page_id, &data).unwrap();
        dm.sync().unwrap();
    }

    {
        let dm = DiskManager::new(&path).unwrap();
        assert_eq!(dm.get_num_pages(), 2);

        let mut data = [0u8; PAGE_SIZE];
        dm.read_page(PageId::new(1), &mut data).unwrap();
        assert_eq!(&data[..test_data.len()], test_data);

        // Allocation continues after the existing pages
        assert_eq!(dm.allocate_page().unwrap(), PageId::new(2));
    }
}

#[test]
fn test_disk_scheduler_basic() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    let scheduler = DiskScheduler::new(dm);

    let page_id = scheduler.disk_manager().allocate_page().unwrap();

    scheduler.schedule_write_sync(page_id, page_with(42)).unwrap();
    let read_data = scheduler.schedule_read_sync(page_id).unwrap();

    assert_eq!(read_data[0], 42);
    assert_eq!(read_data[PAGE_SIZE - 1], 42);
}

#[test]
fn test_disk_scheduler_concurrent_requests() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    let scheduler = Arc::new(DiskScheduler::new(dm));

    let page_ids: Vec<_> = (0..10)
        .map(|_| scheduler.disk_manager().allocate_page().unwrap())
        .collect();

    let handles: Vec<_> = page_ids
        .iter()
        .map(|&pid| {
            let scheduler = Arc::clone(&scheduler);
            thread::spawn(move || {
                scheduler
                    .schedule_write_sync(pid, page_with(pid.as_i32() as u8))
                    .unwrap();
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    for &pid in &page_ids {
        let data = scheduler.schedule_read_sync(pid).unwrap();
        assert_eq!(data[0], pid.as_i32() as u8);
    }
}

#[test]
fn test_disk_manager_large_file() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = DiskManager::new(temp_file.path()).unwrap();

    let page_ids: Vec<_> = (0..100).map(|_| dm.allocate_page().unwrap()).collect();

    for &pid in &page_ids {
        let mut data = [0u8; PAGE_SIZE];
        data[..4].copy_from_slice(&pid.as_i32().to_be_bytes());
        dm.write_page(pid, &data).unwrap();
    }

    for &pid in &page_ids {
        let mut data = [0u8; PAGE_SIZE];
        dm.read_page(pid, &mut data).unwrap();
        let id_bytes: [u8; 4] = data[..4].try_into().unwrap();
        assert_eq!(i32::from_be_bytes(id_bytes), pid.as_i32());
    }
}
