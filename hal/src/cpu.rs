//! # CPU Abstraction
//!
//! The per-core operations the scheduler needs, independent of architecture.

use crate::{HalError, HalResult};
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// CPU abstraction trait
///
/// Every method acts on the core that calls it. The trait is object safe so a
/// single `Arc<dyn Cpu>` can be handed to every engine.
pub trait Cpu: Send + Sync {
    /// Get the index of the calling core
    fn current_cpu_id(&self) -> usize;

    /// Get the number of cores available
    fn cpu_count(&self) -> usize;

    /// Enable interrupts
    ///
    /// # Safety
    /// Enabling interrupts when the system is not ready can cause undefined behavior.
    unsafe fn enable_interrupts(&self);

    /// Disable interrupts
    ///
    /// # Safety
    /// Disabling interrupts for too long can cause system hangs.
    unsafe fn disable_interrupts(&self);

    /// Check if interrupts are enabled
    fn interrupts_enabled(&self) -> bool;

    /// Low-power wait for spin loops (does not yield to the scheduler)
    fn pause(&self);

    /// Halt the core until an interrupt occurs
    fn halt(&self);
}

/// Guard that masks interrupts on the calling core and restores the previous
/// state when dropped.
pub struct InterruptGuard<'a> {
    cpu: &'a dyn Cpu,
    were_enabled: bool,
}

impl<'a> InterruptGuard<'a> {
    /// Mask interrupts on the calling core
    pub fn new(cpu: &'a dyn Cpu) -> Self {
        let were_enabled = cpu.interrupts_enabled();
        if were_enabled {
            // SAFETY: the previous state is restored on drop.
            unsafe { cpu.disable_interrupts() };
        }
        Self { cpu, were_enabled }
    }
}

impl Drop for InterruptGuard<'_> {
    fn drop(&mut self) {
        if self.were_enabled {
            // SAFETY: interrupts were enabled when the guard was taken.
            unsafe { self.cpu.enable_interrupts() };
        }
    }
}

/// Execute a closure with interrupts masked on the calling core
pub fn without_interrupts<R>(cpu: &dyn Cpu, f: impl FnOnce() -> R) -> R {
    let _guard = InterruptGuard::new(cpu);
    f()
}

/// Portable CPU used on hosts and in tests
///
/// The "current core" is a settable value rather than a hardware register,
/// and the interrupt flag is a plain atomic.
#[derive(Debug)]
pub struct SimulatedCpu {
    count: usize,
    current: AtomicUsize,
    interrupts: AtomicBool,
}

impl SimulatedCpu {
    /// Create a simulated machine with `count` cores, running on core 0
    pub const fn new(count: usize) -> Self {
        Self {
            count,
            current: AtomicUsize::new(0),
            interrupts: AtomicBool::new(false),
        }
    }

    /// Make `cpu` the calling core
    pub fn switch_to(&self, cpu: usize) -> HalResult<()> {
        if cpu >= self.count {
            return Err(HalError::InvalidCpu);
        }
        self.current.store(cpu, Ordering::SeqCst);
        Ok(())
    }
}

impl Cpu for SimulatedCpu {
    fn current_cpu_id(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    fn cpu_count(&self) -> usize {
        self.count
    }

    unsafe fn enable_interrupts(&self) {
        self.interrupts.store(true, Ordering::SeqCst);
    }

    unsafe fn disable_interrupts(&self) {
        self.interrupts.store(false, Ordering::SeqCst);
    }

    fn interrupts_enabled(&self) -> bool {
        self.interrupts.load(Ordering::SeqCst)
    }

    fn pause(&self) {
        core::hint::spin_loop();
    }

    fn halt(&self) {
        core::hint::spin_loop();
    }
}
