use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    ptr::NonNull,
    rc::Rc,
};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::sys::{System, SystemAllocator};

pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

#[derive(Default)]
struct Ledger {
    live: RefCell<HashMap<usize, usize>>,
    requests: Cell<usize>,
    /// Requests still allowed to succeed. `None` means no limit.
    budget: Cell<Option<usize>>,
}

/// Wraps [`System`], remembering every live buffer and optionally failing
/// requests once a budget runs out. Clones share the same ledger so a test can
/// keep one while the pool owns the other.
#[derive(Clone, Default)]
pub struct TrackingAllocator {
    ledger: Rc<Ledger>,
}

impl TrackingAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lets the next `n` requests through and fails every one after that.
    pub fn fail_after(&self, n: usize) {
        self.ledger.budget.set(Some(n));
    }

    /// Number of buffers requested and not returned yet.
    pub fn live(&self) -> usize {
        self.ledger.live.borrow().len()
    }

    pub fn is_live(&self, addr: NonNull<u8>) -> bool {
        self.ledger.live.borrow().contains_key(&(addr.as_ptr() as usize))
    }

    /// Length recorded for the live buffer at `addr`.
    pub fn len_of(&self, addr: NonNull<u8>) -> Option<usize> {
        self.ledger.live.borrow().get(&(addr.as_ptr() as usize)).copied()
    }

    /// Number of successful requests so far.
    pub fn requests(&self) -> usize {
        self.ledger.requests.get()
    }
}

impl SystemAllocator for TrackingAllocator {
    unsafe fn request_memory(&self, len: usize) -> Option<NonNull<u8>> {
        if let Some(budget) = self.ledger.budget.get() {
            if budget == 0 {
                return None;
            }
            self.ledger.budget.set(Some(budget - 1));
        }

        let addr = unsafe { System.request_memory(len)? };
        self.ledger.requests.set(self.ledger.requests.get() + 1);
        self.ledger
            .live
            .borrow_mut()
            .insert(addr.as_ptr() as usize, len);
        Some(addr)
    }

    unsafe fn return_memory(&self, addr: NonNull<u8>, len: usize) {
        let recorded = self.ledger.live.borrow_mut().remove(&(addr.as_ptr() as usize));
        assert_eq!(recorded, Some(len), "returned a buffer that is not live");
        unsafe { System.return_memory(addr, len) }
    }
}
