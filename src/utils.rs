//! Helper functions shared by the pool modules.

use std::mem;

/// Boundary used by aligned allocations. It is the computer's word size since
/// processors fetch data in word-sized chunks rather than byte by byte.
pub const ALIGNMENT: usize = mem::size_of::<usize>();

/// Rounds `to_be_aligned` up to the next multiple of `alignment`.
///
/// `alignment` must be a power of two. Returns `None` if rounding up would
/// overflow `usize`.
#[inline]
pub(crate) fn align(to_be_aligned: usize, alignment: usize) -> Option<usize> {
    debug_assert!(alignment.is_power_of_two());
    to_be_aligned
        .checked_add(alignment - 1)
        .map(|n| n & !(alignment - 1))
}
