//! The single-mutex LRU implementation of the buffer pool manager.

use std::collections::{HashMap, HashSet, VecDeque};
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use std::sync::{Arc, Mutex};

use common::api::{
    BpmError, BufferPoolManager, FrameId, LogManager, PageGuard, PageId, INVALID_PAGE_ID,
    PAGE_SIZE,
};
use common::disk_manager::DiskManager;

use crate::replacer::{LruReplacer, Replacer};

/// A single slot of the frame table.
///
/// The byte buffer is boxed so its address survives for the lifetime of the
/// pool; guards hand that address out to callers while the frame is pinned.
#[derive(Debug)]
struct Frame {
    page_id: PageId,
    pin_count: u32,
    is_dirty: bool,
    data: Box<[u8; PAGE_SIZE]>,
}

impl Frame {
    fn reset(&mut self) {
        self.page_id = INVALID_PAGE_ID;
        self.pin_count = 0;
        self.is_dirty = false;
        self.data.fill(0);
    }
}

/// All mutable pool state, guarded by one mutex.
struct PoolCore {
    frames: Vec<Frame>,
    page_table: HashMap<PageId, FrameId>,
    free_list: VecDeque<FrameId>,
    replacer: LruReplacer,
}

impl PoolCore {
    /// Picks the frame to load a page into: the free list first, else an
    /// LRU victim. `None` means every resident frame is pinned.
    fn take_candidate_frame(&mut self) -> Option<FrameId> {
        if let Some(frame_id) = self.free_list.pop_front() {
            return Some(frame_id);
        }
        self.replacer.victim()
    }
}

/// The buffer pool manager with an LRU replacement policy.
///
/// One mutex guards the page table, free list, frame metadata, and the
/// replacer, and is held across every operation including the synchronous
/// disk reads and writes. Pinned frames are never evicted, so the page
/// buffer address a guard holds stays valid until the guard drops.
pub struct LruBufferPoolManager {
    core: Mutex<PoolCore>,
    disk_manager: Arc<dyn DiskManager>,
    log_manager: Option<Arc<dyn LogManager>>,
    pool_size: usize,
}

impl LruBufferPoolManager {
    /// Creates a pool of `pool_size` frames with no write-ahead log wired
    /// in. Initially every frame is in the free list.
    pub fn new(pool_size: usize, disk_manager: Arc<dyn DiskManager>) -> Self {
        Self::with_log_manager(pool_size, disk_manager, None)
    }

    /// Creates a pool that flushes `log_manager` before every page write it
    /// issues.
    pub fn with_log_manager(
        pool_size: usize,
        disk_manager: Arc<dyn DiskManager>,
        log_manager: Option<Arc<dyn LogManager>>,
    ) -> Self {
        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);
        for frame_id in 0..pool_size {
            frames.push(Frame {
                page_id: INVALID_PAGE_ID,
                pin_count: 0,
                is_dirty: false,
                data: Box::new([0; PAGE_SIZE]),
            });
            free_list.push_back(frame_id);
        }

        Self {
            core: Mutex::new(PoolCore {
                frames,
                page_table: HashMap::new(),
                free_list,
                replacer: LruReplacer::new(pool_size),
            }),
            disk_manager,
            log_manager,
            pool_size,
        }
    }

    /// Flushes the log, when present, then writes the page image to disk.
    fn write_frame(&self, page_id: PageId, data: &[u8]) -> Result<(), BpmError> {
        if let Some(log_manager) = &self.log_manager {
            log_manager.flush_log()?;
        }
        self.disk_manager.write_page(page_id, data)?;
        Ok(())
    }

    /// Writes back and unmaps whatever page currently occupies `frame_id`.
    ///
    /// A failed write-back propagates without unmapping the occupant, so
    /// the page-table entry for the victim stays in place.
    fn evict_occupant(&self, core: &mut PoolCore, frame_id: FrameId) -> Result<(), BpmError> {
        let frame = &mut core.frames[frame_id];
        if frame.page_id == INVALID_PAGE_ID {
            return Ok(());
        }
        if frame.is_dirty {
            self.write_frame(frame.page_id, &frame.data[..])?;
        }
        let old_page_id = frame.page_id;
        frame.reset();
        core.page_table.remove(&old_page_id);
        Ok(())
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// The pin count of `page_id`, or `None` when it is not resident.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let core = self.core.lock().unwrap();
        core.page_table
            .get(&page_id)
            .map(|&frame_id| core.frames[frame_id].pin_count)
    }

    /// The dirty flag of `page_id`, or `None` when it is not resident.
    pub fn is_dirty(&self, page_id: PageId) -> Option<bool> {
        let core = self.core.lock().unwrap();
        core.page_table
            .get(&page_id)
            .map(|&frame_id| core.frames[frame_id].is_dirty)
    }

    pub fn is_resident(&self, page_id: PageId) -> bool {
        self.core.lock().unwrap().page_table.contains_key(&page_id)
    }

    pub fn free_frame_count(&self) -> usize {
        self.core.lock().unwrap().free_list.len()
    }

    pub fn replacer_len(&self) -> usize {
        self.core.lock().unwrap().replacer.len()
    }

    /// Panics if any structural invariant of the pool is violated. Intended
    /// for tests that interleave random operations.
    pub fn check_integrity(&self) {
        let core = self.core.lock().unwrap();

        assert_eq!(
            core.page_table.len() + core.free_list.len(),
            self.pool_size,
            "page table and free list must partition the frames"
        );
        assert!(core.replacer.len() <= self.pool_size);

        let free: HashSet<FrameId> = core.free_list.iter().copied().collect();
        assert_eq!(free.len(), core.free_list.len(), "duplicate frame in free list");

        for frame_id in 0..self.pool_size {
            let frame = &core.frames[frame_id];
            let in_free = free.contains(&frame_id);
            let in_replacer = core.replacer.contains(frame_id);

            assert!(
                !(in_free && in_replacer),
                "frame {} is both free and evictable",
                frame_id
            );
            if in_free {
                assert_eq!(frame.page_id, INVALID_PAGE_ID);
                assert_eq!(frame.pin_count, 0);
                assert!(!frame.is_dirty);
            }
            if in_replacer {
                assert_ne!(frame.page_id, INVALID_PAGE_ID);
                assert_eq!(frame.pin_count, 0);
            }
            if frame.pin_count > 0 {
                assert!(!in_free && !in_replacer, "pinned frame {} is evictable", frame_id);
            }
            if frame.page_id != INVALID_PAGE_ID && frame.pin_count == 0 {
                assert!(
                    in_replacer,
                    "resident unpinned frame {} missing from replacer",
                    frame_id
                );
            }
            if frame.page_id != INVALID_PAGE_ID {
                assert_eq!(
                    core.page_table.get(&frame.page_id),
                    Some(&frame_id),
                    "frame {} and the page table disagree",
                    frame_id
                );
            }
        }

        for (&page_id, &frame_id) in &core.page_table {
            assert_eq!(core.frames[frame_id].page_id, page_id);
        }

        let tracked = (0..self.pool_size)
            .filter(|&frame_id| core.replacer.contains(frame_id))
            .count();
        assert_eq!(tracked, core.replacer.len(), "duplicate frame in replacer");
    }

    fn make_guard(&self, core: &mut PoolCore, page_id: PageId, frame_id: FrameId) -> LruPageGuard<'_> {
        LruPageGuard {
            pool: self,
            page_id,
            data: NonNull::from(&mut *core.frames[frame_id].data),
            is_dirty: false,
        }
    }
}

impl BufferPoolManager for LruBufferPoolManager {
    fn fetch_page(&self, page_id: PageId) -> Result<Box<dyn PageGuard + '_>, BpmError> {
        let mut core = self.core.lock().unwrap();

        // Hit: the page is resident, bump the pin and shield it from eviction.
        if let Some(&frame_id) = core.page_table.get(&page_id) {
            core.replacer.pin(frame_id);
            core.frames[frame_id].pin_count += 1;
            let guard = self.make_guard(&mut core, page_id, frame_id);
            return Ok(Box::new(guard));
        }

        // Miss: find a frame, write back its occupant, read the page in.
        let frame_id = core.take_candidate_frame().ok_or(BpmError::NoFreeFrames)?;
        self.evict_occupant(&mut core, frame_id)?;

        let frame = &mut core.frames[frame_id];
        self.disk_manager.read_page(page_id, &mut frame.data[..])?;
        frame.page_id = page_id;
        frame.pin_count = frame.pin_count.max(1);
        frame.is_dirty = false;

        core.page_table.insert(page_id, frame_id);
        core.replacer.pin(frame_id);

        let guard = self.make_guard(&mut core, page_id, frame_id);
        Ok(Box::new(guard))
    }

    fn new_page(&self) -> Result<Box<dyn PageGuard + '_>, BpmError> {
        let mut core = self.core.lock().unwrap();

        // Select the frame before allocating, so a full pool cannot leak a
        // freshly allocated page id.
        let frame_id = core.take_candidate_frame().ok_or(BpmError::NoFreeFrames)?;
        self.evict_occupant(&mut core, frame_id)?;

        let page_id = self.disk_manager.allocate_page();

        // The frame's buffer is already zeroed: free-list frames stay zeroed
        // by construction and reset, victims were reset during eviction.
        let frame = &mut core.frames[frame_id];
        frame.page_id = page_id;
        frame.pin_count = 1;
        frame.is_dirty = false;

        core.page_table.insert(page_id, frame_id);
        core.replacer.pin(frame_id);

        let guard = self.make_guard(&mut core, page_id, frame_id);
        Ok(Box::new(guard))
    }

    fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let mut core = self.core.lock().unwrap();

        let frame_id = match core.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => return false,
        };
        let frame = &mut core.frames[frame_id];
        if frame.pin_count == 0 {
            return false;
        }

        frame.pin_count -= 1;
        frame.is_dirty |= is_dirty;
        if frame.pin_count == 0 {
            core.replacer.unpin(frame_id);
        }
        true
    }

    fn delete_page(&self, page_id: PageId) -> bool {
        let mut core = self.core.lock().unwrap();

        self.disk_manager.deallocate_page(page_id);

        let frame_id = match core.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => return true,
        };
        if core.frames[frame_id].pin_count > 0 {
            return false;
        }

        core.page_table.remove(&page_id);
        core.frames[frame_id].reset();
        core.replacer.pin(frame_id);
        core.free_list.push_back(frame_id);
        true
    }

    fn flush_page(&self, page_id: PageId) -> Result<bool, BpmError> {
        let mut core = self.core.lock().unwrap();

        let frame_id = match core.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => return Ok(false),
        };
        let frame = &mut core.frames[frame_id];
        self.write_frame(page_id, &frame.data[..])?;
        frame.is_dirty = false;
        Ok(true)
    }

    fn flush_all_pages(&self) -> Result<(), BpmError> {
        let mut core = self.core.lock().unwrap();

        let resident: Vec<(PageId, FrameId)> =
            core.page_table.iter().map(|(&p, &f)| (p, f)).collect();
        for (page_id, frame_id) in resident {
            let frame = &mut core.frames[frame_id];
            self.write_frame(page_id, &frame.data[..])?;
            frame.is_dirty = false;
        }
        Ok(())
    }
}

/// A pinned page handle.
///
/// Holds a pointer straight into the frame's buffer. The pin taken at
/// construction keeps the frame resident and its buffer address stable, so
/// no lock is needed to dereference; synchronization of the page bytes
/// themselves is the caller's responsibility, typically via a page latch
/// layered above the pool.
pub struct LruPageGuard<'a> {
    pool: &'a LruBufferPoolManager,
    page_id: PageId,
    data: NonNull<[u8; PAGE_SIZE]>,
    is_dirty: bool,
}

impl PageGuard for LruPageGuard<'_> {
    fn page_id(&self) -> PageId {
        self.page_id
    }
}

impl Deref for LruPageGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        // Safety: the frame stays pinned while this guard is alive, and the
        // boxed buffer is never reallocated for the lifetime of the pool.
        unsafe { &self.data.as_ref()[..] }
    }
}

impl DerefMut for LruPageGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.is_dirty = true;
        // Safety: as for `deref`.
        unsafe { &mut self.data.as_mut()[..] }
    }
}

impl Drop for LruPageGuard<'_> {
    fn drop(&mut self) {
        self.pool.unpin_page(self.page_id, self.is_dirty);
    }
}
