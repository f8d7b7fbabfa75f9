//! Defines the common API for the buffer pool manager.

use std::error::Error;
use std::fmt;
use std::ops::{Deref, DerefMut};

/// A unique identifier for a page in the database.
pub type PageId = usize;

/// An index into the buffer pool's frame table. Never persisted.
pub type FrameId = usize;

/// A sentinel denoting "no page". Page ids are allocated from zero upwards,
/// so the all-ones value can never collide with a real page.
pub const INVALID_PAGE_ID: PageId = usize::MAX;

/// The size of a single page in bytes. The disk manager and the buffer pool
/// must agree on this value.
pub const PAGE_SIZE: usize = 4096;

/// A specialized error type for buffer pool manager operations.
///
/// Soft failures (unpinning a non-resident page, deleting a pinned page)
/// are reported as boolean results, not as errors.
#[derive(Debug)]
pub enum BpmError {
    /// Returned when every frame is pinned and the free list is empty.
    NoFreeFrames,
    /// Represents an I/O error from the disk manager.
    IoError(std::io::Error),
}

impl fmt::Display for BpmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BpmError::NoFreeFrames => write!(f, "all frames are pinned"),
            BpmError::IoError(e) => write!(f, "disk i/o failed: {}", e),
        }
    }
}

impl Error for BpmError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BpmError::NoFreeFrames => None,
            BpmError::IoError(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for BpmError {
    fn from(e: std::io::Error) -> Self {
        BpmError::IoError(e)
    }
}

/// Hook for a write-ahead log.
///
/// When one is wired into the pool, `flush_log` runs before every page
/// write the pool issues; no further ordering is imposed. Recovery itself
/// lives above the pool.
pub trait LogManager: Send + Sync {
    fn flush_log(&self) -> std::io::Result<()>;
}

/// A smart pointer representing a pinned page.
///
/// The guard dereferences to the page's byte data, whose address is stable
/// for as long as the guard lives. Mutating through `deref_mut` marks the
/// page dirty; dropping the guard unpins it, making the frame a candidate
/// for eviction once no other pins remain.
pub trait PageGuard: Deref<Target = [u8]> + DerefMut {
    /// Returns the ID of the page being held.
    fn page_id(&self) -> PageId;
}

/// The main trait defining the behavior of a Buffer Pool Manager.
///
/// This trait is object-safe, so callers can work against
/// `Arc<dyn BufferPoolManager>` without naming the implementation.
pub trait BufferPoolManager: Send + Sync {
    /// Fetches a page from the buffer pool, reading from disk if necessary.
    ///
    /// The page is pinned until the returned `PageGuard` is dropped.
    /// Fails with [`BpmError::NoFreeFrames`] only when every resident frame
    /// is pinned and the free list is empty.
    fn fetch_page(&self, page_id: PageId) -> Result<Box<dyn PageGuard + '_>, BpmError>;

    /// Allocates a fresh page and pins it in an available frame.
    ///
    /// The frame's buffer is zeroed. The new page's id is available through
    /// the returned guard.
    fn new_page(&self) -> Result<Box<dyn PageGuard + '_>, BpmError>;

    /// Releases one pin on a resident page, ORing `is_dirty` into the
    /// frame's dirty flag.
    ///
    /// Returns `false` when the page is not resident, or when its pin count
    /// is already zero (in which case nothing is mutated). Guards call this
    /// on drop; it only needs to be called directly by code managing pins
    /// by hand.
    fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool;

    /// Deallocates a page on disk and, if it is resident and unpinned,
    /// releases its frame back to the free list.
    ///
    /// Returns `false` iff the page is resident and currently pinned;
    /// deleting a non-resident page succeeds trivially.
    fn delete_page(&self, page_id: PageId) -> bool;

    /// Writes a resident page's frame to disk, regardless of its dirty
    /// flag, and clears the flag on success.
    ///
    /// Returns `Ok(false)` when the page is not resident.
    fn flush_page(&self, page_id: PageId) -> Result<bool, BpmError>;

    /// Flushes every resident page.
    fn flush_all_pages(&self) -> Result<(), BpmError>;
}
