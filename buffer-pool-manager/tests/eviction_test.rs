use buffer_pool_manager::LruBufferPoolManager;
use common::api::{BufferPoolManager, BpmError, PageGuard, PAGE_SIZE};
use common::disk_manager::MemDiskManager;
use std::sync::Arc;
use test_case::test_case;

fn new_pool(pool_size: usize) -> (Arc<MemDiskManager>, LruBufferPoolManager) {
    let disk_manager = Arc::new(MemDiskManager::new());
    let pool = LruBufferPoolManager::new(pool_size, disk_manager.clone());
    (disk_manager, pool)
}

/// The byte pattern used to recognize a page's contents in these tests.
fn pattern(page_id: usize) -> u8 {
    0xA0 | page_id as u8
}

#[test]
fn test_fill_and_evict_clean_page() {
    let (disk_manager, pool) = new_pool(3);

    let g0 = pool.fetch_page(0).unwrap();
    let _g1 = pool.fetch_page(1).unwrap();
    let _g2 = pool.fetch_page(2).unwrap();

    assert!(matches!(pool.fetch_page(3), Err(BpmError::NoFreeFrames)));

    drop(g0);
    let g3 = pool.fetch_page(3).unwrap();
    assert_eq!(g3.page_id(), 3);
    assert!(!pool.is_resident(0));

    // Page 0 was clean, so reusing its frame wrote nothing back.
    assert!(disk_manager.write_log().is_empty());
}

#[test]
fn test_dirty_page_is_written_back_exactly_once() {
    let (disk_manager, pool) = new_pool(3);

    let mut g0 = pool.fetch_page(0).unwrap();
    g0.fill(pattern(0));
    drop(g0);

    for page_id in 1..=3 {
        drop(pool.fetch_page(page_id).unwrap());
    }

    // The fourth distinct page forced page 0 out.
    assert!(!pool.is_resident(0));
    assert_eq!(disk_manager.write_log(), vec![0]);
    let image = disk_manager.page_image(0).unwrap();
    assert_eq!(image[..], [pattern(0); PAGE_SIZE][..]);
}

#[test_case(3 ; "three frames")]
#[test_case(5 ; "five frames")]
fn test_victim_is_least_recently_unpinned(pool_size: usize) {
    let (_, pool) = new_pool(pool_size);

    for page_id in 0..pool_size {
        drop(pool.fetch_page(page_id).unwrap());
    }

    drop(pool.fetch_page(pool_size).unwrap());

    assert!(!pool.is_resident(0));
    for page_id in 1..=pool_size {
        assert!(pool.is_resident(page_id), "page {} should be resident", page_id);
    }
}

#[test]
fn test_refetch_refreshes_lru_position() {
    let (_, pool) = new_pool(3);

    for page_id in 0..3 {
        drop(pool.fetch_page(page_id).unwrap());
    }

    // Pin and release page 0 again: page 1 becomes the oldest unpinned.
    drop(pool.fetch_page(0).unwrap());

    drop(pool.fetch_page(3).unwrap());
    assert!(pool.is_resident(0));
    assert!(!pool.is_resident(1));
}

#[test]
fn test_flush_preserves_contents_across_eviction() {
    let (_, pool) = new_pool(3);

    let mut page = pool.new_page().unwrap();
    let page_id = page.page_id();
    page.fill(pattern(page_id));
    drop(page);

    assert!(pool.flush_page(page_id).unwrap());

    // Push the page out of the pool, then read it back fresh from disk.
    for other in 100..103 {
        drop(pool.fetch_page(other).unwrap());
    }
    assert!(!pool.is_resident(page_id));

    let fetched = pool.fetch_page(page_id).unwrap();
    assert_eq!(fetched[..], [pattern(page_id); PAGE_SIZE][..]);
}

#[test]
fn test_deleted_frame_is_reused_without_eviction() {
    let (disk_manager, pool) = new_pool(3);

    let mut guards = Vec::new();
    for page_id in 0..3 {
        guards.push(pool.fetch_page(page_id).unwrap());
    }
    drop(guards.remove(0));
    assert!(pool.delete_page(0));
    assert_eq!(pool.free_frame_count(), 1);

    // The freed frame serves the next miss; the two pinned pages stay put.
    let g3 = pool.fetch_page(3).unwrap();
    assert_eq!(g3.page_id(), 3);
    assert!(pool.is_resident(1));
    assert!(pool.is_resident(2));
    assert!(disk_manager.write_log().is_empty());
}
