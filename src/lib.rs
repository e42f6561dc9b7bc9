//! Region-based memory pool.
//!
//! A [`Pool`] serves many small, short-lived allocations out of large
//! preallocated blocks by bumping a pointer, hands requests above its threshold
//! straight to the system allocator while keeping track of them, and releases
//! everything it holds at once when it is reset or destroyed.
//!
//! ```
//! use mempool::Pool;
//!
//! let mut pool = Pool::new(4096).unwrap();
//!
//! let small = pool.alloc(100).unwrap();
//! assert_eq!(small.as_ptr() as usize % mempool::ALIGNMENT, 0);
//!
//! // Above the threshold: served by the system allocator and tracked.
//! let large = pool.alloc(5000).unwrap();
//! assert!(pool.free_large(large));
//! assert!(!pool.free_large(large));
//!
//! pool.destroy();
//! ```
//!
//! The pool is meant for a single owner. It is neither `Send` nor `Sync`, use
//! one pool per thread or serialize access to it externally.

mod block;
mod cleanup;
mod large;
mod pool;
mod utils;

pub mod error;
pub mod options;
pub mod sys;

#[cfg(test)]
mod test_utils;

pub use block::{BLOCK_HEADER_SIZE, POOL_HEADER_SIZE};
pub use cleanup::{CLEANUP_LINK_SIZE, Cleanup, Release};
pub use error::{Error, Result};
pub use large::LARGE_LINK_SIZE;
pub use options::PoolOptions;
pub use pool::Pool;
pub use sys::{System, SystemAllocator};
pub use utils::ALIGNMENT;

/// Cap of the small-allocation threshold.
pub const MAX_ALLOC_FROM_POOL: usize = 4095;

/// Registry entries a large allocation inspects for a released slot.
pub const DEFAULT_LARGE_REUSE_SCAN: usize = 4;

pub const DEFAULT_POOL_SIZE: usize = 16 * 1024;
