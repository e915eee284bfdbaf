//! Core-owned state.
//!
//! Scheduler state is touched only by the core that owns it, so it needs no
//! lock. `CoreLocal` records the owner and hands out exclusive access on that
//! core only.

use core::cell::UnsafeCell;

pub(crate) struct CoreLocal<T> {
    owner: usize,
    value: UnsafeCell<T>,
}

// SAFETY: access goes through `with`, whose contract confines it to the
// owning core with interrupts masked.
unsafe impl<T: Send> Sync for CoreLocal<T> {}

impl<T> CoreLocal<T> {
    pub(crate) const fn new(owner: usize, value: T) -> Self {
        Self {
            owner,
            value: UnsafeCell::new(value),
        }
    }

    pub(crate) fn owner(&self) -> usize {
        self.owner
    }

    /// Raw pointer to the value; dereferencing it carries the contract of
    /// [`with`](Self::with).
    pub(crate) fn as_ptr(&self) -> *mut T {
        self.value.get()
    }

    /// # Safety
    /// Must run on the owning core with interrupts masked, and must not be
    /// re-entered from `f`.
    pub(crate) unsafe fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        // SAFETY: exclusive per the contract above.
        f(unsafe { &mut *self.value.get() })
    }
}
