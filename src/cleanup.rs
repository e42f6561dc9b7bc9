use std::{fmt, mem, ptr::NonNull, slice};

use tracing::trace;

use crate::sys::SystemAllocator;

/// Pool memory charged for every cleanup link: a handler, a data pointer and
/// a next link.
pub const CLEANUP_LINK_SIZE: usize = 3 * mem::size_of::<usize>();

/// Release logic attached to a pool's lifetime.
///
/// The handler is handed the extra bytes that were reserved for it at
/// registration (an empty slice when none were requested). Any closure taking
/// `&mut [u8]` is a handler, so typed resources are simply captured:
///
/// ```
/// # use mempool::Pool;
/// let file = std::fs::File::open("Cargo.toml").unwrap();
/// let mut pool = Pool::new(1024).unwrap();
/// pool.register_cleanup(0).unwrap().set_handler(move |_: &mut [u8]| drop(file));
/// pool.destroy();
/// ```
pub trait Release {
    fn release(self: Box<Self>, data: &mut [u8]);
}

impl<F> Release for F
where
    F: FnOnce(&mut [u8]),
{
    fn release(self: Box<Self>, data: &mut [u8]) {
        (*self)(data)
    }
}

/// A registered cleanup entry. It's created without a handler, which has to be
/// set before the pool is destroyed to have any effect.
pub struct Cleanup {
    handler: Option<Box<dyn Release>>,
    /// Extra bytes reserved at registration.
    data: Option<(NonNull<u8>, usize)>,
    /// Whether `data` is a buffer of its own rather than pool memory.
    owned: bool,
}

impl Cleanup {
    pub(crate) fn new(data: Option<(NonNull<u8>, usize)>) -> Self {
        Self {
            handler: None,
            data,
            owned: false,
        }
    }

    /// An entry whose extra bytes were too large for the pool and came straight
    /// from the system allocator. The buffer is given back after the handler ran.
    pub(crate) fn owning(addr: NonNull<u8>, len: usize) -> Self {
        Self {
            handler: None,
            data: Some((addr, len)),
            owned: true,
        }
    }

    /// Sets the handler to run when the pool is destroyed, replacing any
    /// previous one.
    pub fn set_handler<R: Release + 'static>(&mut self, handler: R) -> &mut Self {
        self.handler = Some(Box::new(handler));
        self
    }

    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    /// The extra bytes reserved for this entry. After a pool reset, bytes that
    /// came from the pool's blocks are back in the pool and may be shared with
    /// later allocations. Bytes above the pool threshold live in a buffer of
    /// the entry's own: the large-allocation registry doesn't track it, so
    /// neither a reset nor [`crate::Pool::free_large`] releases it before the
    /// handler runs.
    pub fn data(&self) -> &[u8] {
        match self.data {
            // SAFETY: the bytes were zeroed at registration and live until the pool is freed.
            Some((ptr, len)) => unsafe { slice::from_raw_parts(ptr.as_ptr(), len) },
            None => &[],
        }
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        match self.data {
            Some((ptr, len)) => unsafe { slice::from_raw_parts_mut(ptr.as_ptr(), len) },
            None => &mut [],
        }
    }

    /// Runs the handler, if any, and yields the buffer the entry owned.
    fn run(mut self) -> Option<(NonNull<u8>, usize)> {
        if let Some(handler) = self.handler.take() {
            handler.release(self.data_mut());
        }
        self.data.filter(|_| self.owned)
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cleanup")
            .field("has_handler", &self.has_handler())
            .field("data_len", &self.data().len())
            .finish()
    }
}

/// Chain of cleanup entries, run most recently registered first.
#[derive(Debug, Default)]
pub(crate) struct CleanupChain {
    // Stored oldest-first: the head of the chain is the last element.
    entries: Vec<Cleanup>,
}

impl CleanupChain {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Makes `entry` the new head of the chain and hands it back.
    pub fn prepend(&mut self, entry: Cleanup) -> &mut Cleanup {
        self.entries.push(entry);
        let idx = self.entries.len() - 1;
        &mut self.entries[idx]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Invokes every handler once, head first, emptying the chain. Buffers owned
    /// by the entries go back to `alloc`.
    pub fn run<A: SystemAllocator>(&mut self, alloc: &A) {
        while let Some(entry) = self.entries.pop() {
            trace!(has_handler = entry.has_handler(), "running pool cleanup");
            if let Some((addr, len)) = entry.run() {
                unsafe { alloc.return_memory(addr, len) };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;
    use crate::{
        sys::{System, SystemAllocator},
        test_utils::TrackingAllocator,
    };

    #[test]
    fn runs_in_reverse_registration_order() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let mut chain = CleanupChain::new();

        for name in ["a", "b", "c"] {
            let order = order.clone();
            chain
                .prepend(Cleanup::new(None))
                .set_handler(move |_: &mut [u8]| order.borrow_mut().push(name));
        }

        chain.run(&System);

        assert_eq!(*order.borrow(), vec!["c", "b", "a"]);
        assert_eq!(chain.len(), 0);
    }

    #[test]
    fn entries_without_handler_are_skipped() {
        let hits = Rc::new(RefCell::new(0));
        let mut chain = CleanupChain::new();

        chain.prepend(Cleanup::new(None));
        let counter = hits.clone();
        chain
            .prepend(Cleanup::new(None))
            .set_handler(move |_: &mut [u8]| *counter.borrow_mut() += 1);

        chain.run(&System);
        chain.run(&System);

        assert_eq!(*hits.borrow(), 1);
    }

    #[test]
    fn handler_sees_its_data() {
        let mut buf = [0u8; 4];
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut chain = CleanupChain::new();

        let data = NonNull::new(buf.as_mut_ptr()).map(|ptr| (ptr, buf.len()));
        let sink = seen.clone();
        let entry = chain.prepend(Cleanup::new(data));
        entry.data_mut().copy_from_slice(b"pool");
        entry.set_handler(move |data: &mut [u8]| sink.borrow_mut().extend_from_slice(data));

        chain.run(&System);

        assert_eq!(seen.borrow().as_slice(), b"pool");
    }

    struct Flag(Rc<RefCell<bool>>);

    impl Release for Flag {
        fn release(self: Box<Self>, _data: &mut [u8]) {
            *self.0.borrow_mut() = true;
        }
    }

    #[test]
    fn custom_release_impl() {
        let released = Rc::new(RefCell::new(false));
        let mut chain = CleanupChain::new();
        chain
            .prepend(Cleanup::new(None))
            .set_handler(Flag(released.clone()));

        chain.run(&System);

        assert!(*released.borrow());
    }

    #[test]
    fn owned_data_is_returned_after_handler() {
        let alloc = TrackingAllocator::new();
        let seen = Rc::new(RefCell::new(0));
        let mut chain = CleanupChain::new();

        let addr = unsafe { alloc.request_memory(32) }.unwrap();
        unsafe { addr.as_ptr().write_bytes(7, 32) };
        let sink = seen.clone();
        chain
            .prepend(Cleanup::owning(addr, 32))
            .set_handler(move |data: &mut [u8]| {
                *sink.borrow_mut() = data.iter().map(|b| *b as usize).sum();
            });

        chain.run(&alloc);

        assert_eq!(*seen.borrow(), 7 * 32);
        assert_eq!(alloc.live(), 0);
    }
}
