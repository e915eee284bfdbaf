//! # Context Switching
//!
//! The saved-state block of a thread and the two primitives that operate on
//! it. Nothing outside this crate sees the layout of [`ExecutionContext`].

use crate::{HalError, HalResult, VirtAddr};
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use static_assertions::{assert_eq_size, const_assert_eq};

/// Function a fresh thread starts in, receiving the argument given to
/// [`ContextSwitch::init_thread_context`]
pub type ThreadEntry = extern "C" fn(arg: usize) -> !;

/// Number of 64-bit slots in a saved-state block
const CONTEXT_SLOTS: usize = 10;

/// Slot indices. Layout: r15, r14, r13, r12, rbx, rbp, rip, rsp, rflags, pad.
/// The assembly in `arch` hard-codes the matching byte offsets.
pub(crate) mod slot {
    pub const R13: usize = 2;
    pub const R12: usize = 3;
    pub const RIP: usize = 6;
    pub const RSP: usize = 7;
    pub const RFLAGS: usize = 8;
}

/// Initial flags of a fresh thread: reserved bit 1 set, interrupts masked.
/// The entry trampoline enables interrupts itself.
const INITIAL_FLAGS: u64 = 0x2;

/// Opaque saved execution state of one thread
#[derive(Clone, Default)]
#[repr(C, align(16))]
pub struct ExecutionContext {
    slots: [u64; CONTEXT_SLOTS],
}

assert_eq_size!(ExecutionContext, [u64; CONTEXT_SLOTS]);
const_assert_eq!(core::mem::align_of::<ExecutionContext>(), 16);

impl ExecutionContext {
    /// Create an empty block (never resumable until initialized)
    pub const fn new() -> Self {
        Self { slots: [0; CONTEXT_SLOTS] }
    }

    /// Has this block been initialized or saved into?
    pub fn is_primed(&self) -> bool {
        self.slots[slot::RIP] != 0
    }

    #[cfg(test)]
    fn get(&self, index: usize) -> u64 {
        self.slots[index]
    }

    /// Write the initial frame: resume at `resume_at` on `stack_top`, with the
    /// entry function and its argument parked in callee-saved registers.
    pub(crate) fn prime(
        &mut self,
        resume_at: u64,
        entry: ThreadEntry,
        stack_top: VirtAddr,
        arg: usize,
    ) -> HalResult<()> {
        if stack_top.as_u64() == 0 || !stack_top.is_aligned(16) {
            return Err(HalError::InvalidStack);
        }

        *self = Self::new();
        self.slots[slot::RIP] = resume_at;
        self.slots[slot::RSP] = stack_top.as_u64();
        self.slots[slot::R12] = arg as u64;
        self.slots[slot::R13] = entry as usize as u64;
        self.slots[slot::RFLAGS] = INITIAL_FLAGS;
        Ok(())
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("primed", &self.is_primed())
            .finish_non_exhaustive()
    }
}

/// The context-switch primitive
pub trait ContextSwitch: Send + Sync {
    /// Prepare `ctx` so that resuming it runs `entry(arg)` on `stack_top`.
    ///
    /// Only writes the block; never transfers control.
    fn init_thread_context(
        &self,
        ctx: &mut ExecutionContext,
        entry: ThreadEntry,
        stack_top: VirtAddr,
        arg: usize,
    ) -> HalResult<()>;

    /// Save the calling core's state into `from` and resume `to`.
    ///
    /// Returns only once something switches back to `from`.
    ///
    /// # Safety
    /// Both blocks must stay valid until `from` is resumed, `to` must have
    /// been initialized or saved into, and interrupts must be masked.
    unsafe fn switch_context(&self, from: *mut ExecutionContext, to: *const ExecutionContext);
}

/// Portable context switch for hosts and tests
///
/// Initializes blocks exactly like the hardware implementation but does not
/// move the stack: a transfer is only counted, and control returns to the
/// caller. The scheduler's run loop then runs whichever thread is current.
#[derive(Debug, Default)]
pub struct SoftContextSwitch {
    transfers: AtomicU64,
}

impl SoftContextSwitch {
    /// Create a new soft switch
    pub const fn new() -> Self {
        Self { transfers: AtomicU64::new(0) }
    }

    /// Number of transfers performed so far
    pub fn transfers(&self) -> u64 {
        self.transfers.load(Ordering::SeqCst)
    }
}

impl ContextSwitch for SoftContextSwitch {
    fn init_thread_context(
        &self,
        ctx: &mut ExecutionContext,
        entry: ThreadEntry,
        stack_top: VirtAddr,
        arg: usize,
    ) -> HalResult<()> {
        ctx.prime(entry as usize as u64, entry, stack_top, arg)
    }

    unsafe fn switch_context(&self, from: *mut ExecutionContext, to: *const ExecutionContext) {
        debug_assert!(!from.is_null() && !to.is_null());
        self.transfers.fetch_add(1, Ordering::SeqCst);
    }
}
