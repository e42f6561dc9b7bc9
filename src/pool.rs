use std::{fmt, ptr::NonNull};

use tracing::{debug, trace, warn};

use crate::{
    block::{BLOCK_HEADER_SIZE, Block, POOL_HEADER_SIZE},
    cleanup::{CLEANUP_LINK_SIZE, Cleanup, CleanupChain},
    error::{Error, Result},
    large::{LARGE_LINK_SIZE, LargeRegistry},
    options::PoolOptions,
    sys::{System, SystemAllocator},
};

/// A block whose failure counter is already above this when an append walks
/// past it is skipped by every later append.
const FAILED_LIMIT: u32 = 4;

/// Region-based allocator.
///
/// Requests up to [`Pool::max`] bytes are bumped off a chain of equally sized
/// blocks; bigger ones go straight to the system allocator and are tracked in
/// a registry so they can be released one by one or all at once.
///
/// ```text
///          current
///             |
///             v
/// +-------+   +-------+   +-------+
/// | Block |-->| Block |-->| Block |          small requests (<= max)
/// +-------+   +-------+   +-------+
///
/// large:   [slot] -> [slot] -> [free] -> ...  big requests (> max)
/// cleanup: [entry] -> [entry] -> ...          run once, on destroy
/// ```
///
/// Small allocations can't be freed individually, only [`Pool::reset`] and
/// [`Pool::destroy`] reclaim them. Every pointer the pool hands out is
/// invalidated when the pool is destroyed (or dropped).
///
/// The pool is single-owner: it is neither `Send` nor `Sync`, so concurrent
/// use needs one pool per thread.
pub struct Pool<A: SystemAllocator = System> {
    /// Block chain, head first. Appends always go to the tail.
    blocks: Vec<Block>,
    /// First block a tail walk starts from.
    current: usize,
    /// Small-allocation threshold.
    max: usize,
    large: LargeRegistry,
    cleanups: CleanupChain,
    large_reuse_scan: usize,
    alloc: A,
}

impl Pool<System> {
    /// Creates a pool whose blocks are `size` bytes, header included.
    pub fn new(size: usize) -> Result<Self> {
        Self::new_in(size, System)
    }

    pub fn with_options(opts: &PoolOptions) -> Result<Self> {
        Self::with_options_in(opts, System)
    }
}

impl<A: SystemAllocator> Pool<A> {
    pub fn new_in(size: usize, alloc: A) -> Result<Self> {
        let mut opts = PoolOptions::new();
        opts.size(size);
        Self::with_options_in(&opts, alloc)
    }

    pub fn with_options_in(opts: &PoolOptions, alloc: A) -> Result<Self> {
        let size = opts.size;
        if size <= POOL_HEADER_SIZE {
            return Err(Error::PoolTooSmall {
                size,
                min: POOL_HEADER_SIZE,
            });
        }

        let start = request(&alloc, size)?;
        let max = (size - POOL_HEADER_SIZE).min(opts.max_alloc_from_pool);

        debug!(size, max, "pool created");

        Ok(Self {
            blocks: vec![Block::new(start, size, POOL_HEADER_SIZE)],
            current: 0,
            max,
            large: LargeRegistry::new(),
            cleanups: CleanupChain::new(),
            large_reuse_scan: opts.large_reuse_scan,
            alloc,
        })
    }

    /// Allocates `size` bytes aligned to [`crate::ALIGNMENT`].
    pub fn alloc(&mut self, size: usize) -> Result<NonNull<u8>> {
        if size <= self.max {
            return self.alloc_small(size, true);
        }

        self.alloc_large(size)
    }

    /// Allocates `size` bytes right at the bump pointer, without aligning it.
    /// Requests above the threshold are served like [`Pool::alloc`].
    pub fn alloc_unaligned(&mut self, size: usize) -> Result<NonNull<u8>> {
        if size <= self.max {
            return self.alloc_small(size, false);
        }

        self.alloc_large(size)
    }

    /// Same as [`Pool::alloc`], with the returned bytes set to zero.
    pub fn alloc_zeroed(&mut self, size: usize) -> Result<NonNull<u8>> {
        let ptr = self.alloc(size)?;
        unsafe { ptr.as_ptr().write_bytes(0, size) };
        Ok(ptr)
    }

    /// Releases a large allocation. Returns `false` if `ptr` isn't a live
    /// large allocation of this pool, which includes every small allocation.
    pub fn free_large(&mut self, ptr: NonNull<u8>) -> bool {
        match self.large.release(ptr) {
            Some(len) => {
                unsafe { self.alloc.return_memory(ptr, len) };
                trace!(?ptr, len, "large allocation released");
                true
            }
            None => false,
        }
    }

    /// Rewinds the pool to its freshly created state while keeping its blocks.
    ///
    /// Every large allocation is released and the registry emptied. Every
    /// block's bump pointer goes back to right after the pool header, appended
    /// blocks included even though their own header is smaller.
    ///
    /// Cleanup handlers are **not** run and stay registered until the pool is
    /// destroyed.
    pub fn reset(&mut self) {
        let mut released = 0;
        for (addr, len) in self.large.drain() {
            unsafe { self.alloc.return_memory(addr, len) };
            released += 1;
        }

        for block in &mut self.blocks {
            block.rewind(POOL_HEADER_SIZE);
        }
        self.current = 0;

        debug!(blocks = self.blocks.len(), released, "pool reset");
    }

    /// Registers a cleanup entry and returns it so a handler can be set.
    ///
    /// With a non-zero `extra`, that many zeroed bytes are reserved for the
    /// entry and handed to its handler. They come from the pool when they fit
    /// under the threshold, otherwise from a buffer the entry owns.
    pub fn register_cleanup(&mut self, extra: usize) -> Result<&mut Cleanup> {
        self.alloc_small(CLEANUP_LINK_SIZE, true)?;

        let entry = if extra == 0 {
            Cleanup::new(None)
        } else if extra <= self.max {
            let ptr = self.alloc_zeroed(extra)?;
            Cleanup::new(Some((ptr, extra)))
        } else {
            let ptr = request(&self.alloc, extra)?;
            unsafe { ptr.as_ptr().write_bytes(0, extra) };
            Cleanup::owning(ptr, extra)
        };

        trace!(extra, cleanups = self.cleanups.len() + 1, "cleanup registered");

        Ok(self.cleanups.prepend(entry))
    }

    /// Runs every cleanup handler, newest first, then gives every large
    /// allocation and every block back to the system allocator.
    ///
    /// Dropping the pool does the same.
    pub fn destroy(self) {
        drop(self)
    }

    /// Small-allocation threshold: requests above it take the large path.
    pub fn max(&self) -> usize {
        self.max
    }

    /// Size of every block, header included.
    pub fn capacity(&self) -> usize {
        self.blocks[0].len()
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Position in the chain where the search for the tail starts when a
    /// block is appended.
    pub fn current_block(&self) -> usize {
        self.current
    }

    /// Number of live large allocations.
    pub fn large_count(&self) -> usize {
        self.large.live()
    }

    pub fn cleanup_count(&self) -> usize {
        self.cleanups.len()
    }

    pub fn allocator(&self) -> &A {
        &self.alloc
    }

    /// First-fit over the whole chain, starting at the head block.
    fn alloc_small(&mut self, size: usize, aligned: bool) -> Result<NonNull<u8>> {
        for block in &mut self.blocks {
            if let Some(ptr) = block.bump(size, aligned) {
                return Ok(ptr);
            }
        }

        self.alloc_block(size)
    }

    /// Appends a block as big as the head one and serves `size` bytes from it.
    fn alloc_block(&mut self, size: usize) -> Result<NonNull<u8>> {
        let len = self.capacity();
        let start = request(&self.alloc, len)?;

        let mut block = Block::new(start, len, BLOCK_HEADER_SIZE);
        let Some(ptr) = block.bump(size, true) else {
            unsafe { self.alloc.return_memory(start, len) };
            return Err(Error::OutOfMemory { size });
        };

        let tail = self.blocks.len() - 1;
        for (idx, passed) in self
            .blocks
            .iter_mut()
            .enumerate()
            .take(tail)
            .skip(self.current)
        {
            if passed.failed > FAILED_LIMIT {
                self.current = idx + 1;
            }
            passed.failed += 1;
        }

        self.blocks.push(block);

        trace!(blocks = self.blocks.len(), current = self.current, "pool block appended");

        Ok(ptr)
    }

    fn alloc_large(&mut self, size: usize) -> Result<NonNull<u8>> {
        let ptr = request(&self.alloc, size)?;

        if self.large.reuse(ptr, size, self.large_reuse_scan) {
            trace!(?ptr, size, "large allocation reused a slot");
            return Ok(ptr);
        }

        if let Err(err) = self.alloc_small(LARGE_LINK_SIZE, true) {
            unsafe { self.alloc.return_memory(ptr, size) };
            return Err(err);
        }
        self.large.prepend(ptr, size);

        trace!(?ptr, size, slots = self.large.len(), "large allocation tracked");

        Ok(ptr)
    }
}

impl<A: SystemAllocator> Drop for Pool<A> {
    fn drop(&mut self) {
        let cleanups = self.cleanups.len();
        self.cleanups.run(&self.alloc);

        for (addr, len) in self.large.drain() {
            unsafe { self.alloc.return_memory(addr, len) };
        }

        let blocks = self.blocks.len();
        for block in self.blocks.drain(..) {
            unsafe { self.alloc.return_memory(block.start(), block.len()) };
        }

        debug!(blocks, cleanups, "pool destroyed");
    }
}

impl<A: SystemAllocator> fmt::Debug for Pool<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("capacity", &self.capacity())
            .field("max", &self.max)
            .field("blocks", &self.blocks.len())
            .field("current", &self.current)
            .field("large", &self.large.live())
            .field("cleanups", &self.cleanups.len())
            .finish()
    }
}

fn request<A: SystemAllocator>(alloc: &A, len: usize) -> Result<NonNull<u8>> {
    unsafe { alloc.request_memory(len) }.ok_or_else(|| {
        warn!(len, "system allocator refused request");
        Error::OutOfMemory { size: len }
    })
}
