//! An LRU buffer pool manager over a paged disk file.
//!
//! The pool mediates between the disk manager and everything above it:
//! callers fetch pages through pin-holding guards, and the pool keeps at
//! most `pool_size` pages in memory, writing dirty frames back before
//! reusing them.

pub mod lru;
pub mod replacer;

pub use lru::LruBufferPoolManager;
pub use replacer::{LruReplacer, Replacer};
