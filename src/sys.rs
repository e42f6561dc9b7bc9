use std::ptr::NonNull;

/// This trait provides an abstraction over the allocator the pool draws its
/// memory from. The pool itself has nothing to do with the concrete APIs offered
/// by each platform, it only needs raw byte buffers it can later give back.
///
/// Every [`crate::Pool`] block and every large allocation is obtained through
/// this trait, which is also what lets tests observe or fail those requests.
pub trait SystemAllocator {
    /// Request a buffer of `len` bytes. It returns a pointer to the start of the
    /// buffer or `None` if the underlying allocator fails.
    ///
    /// # Safety
    ///
    /// `len` must be non-zero. The returned buffer is uninitialized.
    unsafe fn request_memory(&self, len: usize) -> Option<NonNull<u8>>;

    /// Gives the buffer of size `len` starting at `addr` back to the allocator.
    ///
    /// # Safety
    ///
    /// `addr` and `len` must describe a buffer previously returned by
    /// [`SystemAllocator::request_memory`] on this allocator that has not been
    /// returned yet.
    unsafe fn return_memory(&self, addr: NonNull<u8>, len: usize);
}

impl<A: SystemAllocator + ?Sized> SystemAllocator for &A {
    unsafe fn request_memory(&self, len: usize) -> Option<NonNull<u8>> {
        unsafe { (**self).request_memory(len) }
    }

    unsafe fn return_memory(&self, addr: NonNull<u8>, len: usize) {
        unsafe { (**self).return_memory(addr, len) }
    }
}

/// The platform allocator: `malloc`/`free` on unix, `VirtualAlloc`/`VirtualFree`
/// on windows.
#[derive(Debug, Default, Clone, Copy)]
pub struct System;

#[cfg(unix)]
mod unix {
    use super::{System, SystemAllocator};

    use std::{os::raw::c_void, ptr::NonNull};

    impl SystemAllocator for System {
        unsafe fn request_memory(&self, len: usize) -> Option<NonNull<u8>> {
            unsafe { NonNull::new(libc::malloc(len).cast::<u8>()) }
        }

        unsafe fn return_memory(&self, addr: NonNull<u8>, _len: usize) {
            unsafe { libc::free(addr.as_ptr() as *mut c_void) }
        }
    }
}

#[cfg(windows)]
mod windows {
    use super::{System, SystemAllocator};

    use std::{os::raw::c_void, ptr::NonNull};

    use windows::Win32::System::Memory;

    impl SystemAllocator for System {
        unsafe fn request_memory(&self, len: usize) -> Option<NonNull<u8>> {
            // Read-Write only.
            let protection = Memory::PAGE_READWRITE;

            let flags = Memory::MEM_RESERVE | Memory::MEM_COMMIT;

            unsafe {
                let addr = Memory::VirtualAlloc(None, len, flags, protection);

                NonNull::new(addr.cast())
            }
        }

        unsafe fn return_memory(&self, addr: NonNull<u8>, _len: usize) {
            unsafe {
                let _ = Memory::VirtualFree(addr.as_ptr() as *mut c_void, 0, Memory::MEM_RELEASE);
            }
        }
    }
}
