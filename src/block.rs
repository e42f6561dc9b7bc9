use std::{mem, ptr::NonNull};

use crate::utils::{ALIGNMENT, align};

/// Bytes reserved at the start of every block appended to the chain.
pub const BLOCK_HEADER_SIZE: usize = mem::size_of::<Block>();

/// Bytes reserved at the start of the head block: the block header plus the
/// pool metadata (threshold, `current`, registry head and cleanup head).
pub const POOL_HEADER_SIZE: usize = BLOCK_HEADER_SIZE + 4 * mem::size_of::<usize>();

/// Metadata of one contiguous slab of pool memory. The record is kept alongside
/// the raw buffer it describes instead of being written into it, and every
/// address it hands out is computed from an offset checked against `end`.
///
/// ```text
///  start                last                     end
///    |                    |                        |
///    v                    v                        v
///    +--------+-----------+------------------------+
///    | header |   used    |       remaining        |
///    +--------+-----------+------------------------+
/// ```
///
/// The header region is reserved only, nothing is stored there.
pub(crate) struct Block {
    /// First byte of the buffer obtained from the system allocator.
    start: NonNull<u8>,
    /// Bump offset: next free byte.
    last: usize,
    /// Capacity of the buffer. `last <= end` always holds.
    end: usize,
    /// Times this block was passed over while appending a new block.
    pub failed: u32,
}

impl Block {
    /// Wraps a buffer of `len` bytes starting at `start`, with its bump offset
    /// placed right after a reserved `header` region.
    pub fn new(start: NonNull<u8>, len: usize, header: usize) -> Self {
        debug_assert!(header <= len);
        Self {
            start,
            last: header,
            end: len,
            failed: 0,
        }
    }

    #[inline]
    pub fn start(&self) -> NonNull<u8> {
        self.start
    }

    /// Total size of the underlying buffer.
    #[inline]
    pub fn len(&self) -> usize {
        self.end
    }

    #[cfg(test)]
    pub fn remaining(&self) -> usize {
        self.end - self.last
    }

    /// Bumps `size` bytes off the block, optionally rounding the candidate
    /// address up to [`ALIGNMENT`] first. Returns `None` and leaves the block
    /// untouched if the request doesn't fit.
    pub fn bump(&mut self, size: usize, aligned: bool) -> Option<NonNull<u8>> {
        let offset = if aligned {
            let base = self.start.as_ptr() as usize;
            align(base.checked_add(self.last)?, ALIGNMENT)? - base
        } else {
            self.last
        };

        if self.end.checked_sub(offset)? < size {
            return None;
        }

        self.last = offset + size;

        // SAFETY: `offset <= end`, so the pointer stays inside (or one past) the buffer.
        unsafe { Some(NonNull::new_unchecked(self.start.as_ptr().add(offset))) }
    }

    /// Moves the bump offset back to `header`, discarding everything handed out.
    pub fn rewind(&mut self, header: usize) {
        self.last = header.min(self.end);
        self.failed = 0;
    }

    #[cfg(test)]
    pub fn last(&self) -> usize {
        self.last
    }
}
