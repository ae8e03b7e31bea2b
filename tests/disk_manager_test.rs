//! Integration tests for the disk manager

use std::sync::Arc;
use std::thread;

use strata::common::{PageId, StrataError, PAGE_SIZE};
use strata::storage::disk::DiskManager;
use tempfile::NamedTempFile;

fn page_filled_with(byte: u8) -> Vec<u8> {
    vec![byte; PAGE_SIZE]
}

#[test]
fn test_disk_manager_create_file() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = DiskManager::new(temp_file.path()).unwrap();

    assert_eq!(dm.num_pages().unwrap(), 0);
    assert_eq!(dm.num_reads(), 0);
    assert_eq!(dm.num_writes(), 0);
    assert_eq!(dm.db_path(), temp_file.path());
}

#[test]
fn test_disk_manager_allocate_pages() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = DiskManager::new(temp_file.path()).unwrap();

    for i in 0..10 {
        assert_eq!(dm.allocate_page().unwrap(), PageId::new(i));
    }
    assert_eq!(dm.num_pages().unwrap(), 10);
    assert_eq!(dm.file_size().unwrap(), 10 * PAGE_SIZE as u64);
}

#[test]
fn test_disk_manager_out_of_order_reads() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = DiskManager::new(temp_file.path()).unwrap();

    for i in 0..5 {
        dm.write_page(PageId::new(i), &page_filled_with(i as u8 + 1)).unwrap();
    }

    let mut buf = vec![0u8; PAGE_SIZE];
    for i in [0, 4, 1, 3, 2] {
        dm.read_page(PageId::new(i), &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == i as u8 + 1), "page {} content", i);
    }
    assert_eq!(dm.num_reads(), 5);
    assert_eq!(dm.num_writes(), 5);
}

#[test]
fn test_disk_manager_overwrite() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = DiskManager::new(temp_file.path()).unwrap();

    dm.write_page(PageId::new(0), &page_filled_with(1)).unwrap();
    dm.write_page(PageId::new(0), &page_filled_with(2)).unwrap();

    let mut buf = vec![0u8; PAGE_SIZE];
    dm.read_page(PageId::new(0), &mut buf).unwrap();
    assert!(buf.iter().all(|&b| b == 2));
    assert_eq!(dm.num_pages().unwrap(), 1);
}

#[test]
fn test_disk_manager_rejects_gaps_and_missing_pages() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = DiskManager::new(temp_file.path()).unwrap();
    let mut buf = vec![0u8; PAGE_SIZE];

    assert!(matches!(
        dm.read_page(PageId::new(0), &mut buf),
        Err(StrataError::PageOutOfRange(_, 0))
    ));
    assert!(matches!(
        dm.write_page(PageId::new(3), &buf),
        Err(StrataError::NonContiguousWrite(_, 0))
    ));
    assert!(matches!(
        dm.read_page(PageId::new(-1), &mut buf),
        Err(StrataError::InvalidPageId(_))
    ));
}

#[test]
fn test_disk_manager_persistence() {
    let temp_file = NamedTempFile::new().unwrap();
    let path = temp_file.path().to_path_buf();

    {
        let dm = DiskManager::new(&path).unwrap();
        dm.write_page(PageId::new(0), &page_filled_with(0xAB)).unwrap();
        dm.write_page(PageId::new(1), &page_filled_with(0xCD)).unwrap();
        dm.sync().unwrap();
    }

    let dm = DiskManager::new(&path).unwrap();
    assert_eq!(dm.num_pages().unwrap(), 2);
    let mut buf = vec![0u8; PAGE_SIZE];
    dm.read_page(PageId::new(1), &mut buf).unwrap();
    assert!(buf.iter().all(|&b| b == 0xCD));
}

#[test]
fn test_disk_manager_concurrent_allocation() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let dm = Arc::clone(&dm);
            thread::spawn(move || {
                (0..25)
                    .map(|_| dm.allocate_page().unwrap().as_i32())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut ids: Vec<i32> = handles
        .into_iter()
        .flat_map(|handle| handle.join().unwrap())
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, (0..100).collect::<Vec<_>>());
    assert_eq!(dm.num_pages().unwrap(), 100);
}
