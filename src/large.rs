use std::{mem, ptr::NonNull};

/// Pool memory charged for every link added to the registry: a buffer
/// pointer and a next link.
pub const LARGE_LINK_SIZE: usize = 2 * mem::size_of::<usize>();

/// One registry entry. `None` marks a released slot that a later large
/// allocation may take over.
#[derive(Debug)]
pub(crate) struct LargeSlot {
    pub alloc: Option<(NonNull<u8>, usize)>,
}

/// Registry of the buffers served straight from the system allocator.
///
/// Entries are kept newest-first: the head of the chain is the entry prepended
/// last, which is where the reuse scan starts. The registry only tracks the
/// buffers, giving them back is the pool's job since it owns the allocator.
#[derive(Debug, Default)]
pub(crate) struct LargeRegistry {
    // Stored tail-first so that prepending is a push.
    slots: Vec<LargeSlot>,
}

impl LargeRegistry {
    pub const fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Iterates the chain from its head.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut LargeSlot> {
        self.slots.iter_mut().rev()
    }

    /// Looks at the first `scan` entries for a released slot and stores the
    /// buffer there. Returns `false` if every inspected slot is in use.
    pub fn reuse(&mut self, addr: NonNull<u8>, len: usize, scan: usize) -> bool {
        match self.iter_mut().take(scan).find(|slot| slot.alloc.is_none()) {
            Some(slot) => {
                slot.alloc = Some((addr, len));
                true
            }
            None => false,
        }
    }

    /// Makes a new entry the head of the chain.
    pub fn prepend(&mut self, addr: NonNull<u8>, len: usize) {
        self.slots.push(LargeSlot {
            alloc: Some((addr, len)),
        });
    }

    /// Detaches the buffer starting at `addr`, leaving its slot free for reuse.
    pub fn release(&mut self, addr: NonNull<u8>) -> Option<usize> {
        self.iter_mut().find_map(|slot| match slot.alloc {
            Some((ptr, len)) if ptr == addr => {
                slot.alloc = None;
                Some(len)
            }
            _ => None,
        })
    }

    /// Empties the registry, yielding every live buffer.
    pub fn drain(&mut self) -> impl Iterator<Item = (NonNull<u8>, usize)> + '_ {
        self.slots.drain(..).rev().filter_map(|slot| slot.alloc)
    }

    /// Number of entries, released slots included.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Number of entries holding a live buffer.
    pub fn live(&self) -> usize {
        self.slots.iter().filter(|slot| slot.alloc.is_some()).count()
    }
}
