//! Locks shared with interrupt context.

use alloc::sync::Arc;
use core::fmt;
use isokern_hal::cpu::{without_interrupts, Cpu};

/// Spin lock that masks interrupts on the calling core while held.
///
/// A holder can then never be preempted on its own core, so a timer tick
/// taking the same lock only ever waits for another core.
pub(crate) struct IrqMutex<T> {
    cpu: Arc<dyn Cpu>,
    inner: spin::Mutex<T>,
}

impl<T> IrqMutex<T> {
    pub(crate) fn new(cpu: Arc<dyn Cpu>, value: T) -> Self {
        Self {
            cpu,
            inner: spin::Mutex::new(value),
        }
    }

    /// Run `f` on the locked value with interrupts masked
    pub(crate) fn lock<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        without_interrupts(&*self.cpu, || f(&mut self.inner.lock()))
    }

    #[cfg(test)]
    pub(crate) fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }
}

impl<T> fmt::Debug for IrqMutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IrqMutex")
            .field("locked", &self.inner.is_locked())
            .finish_non_exhaustive()
    }
}
