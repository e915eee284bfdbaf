//! # Thread Structure
//!
//! Core thread data structure.

use super::{MessageType, ThreadMessage, ThreadState};
use crate::engine::Engine;
use crate::runtime::ScriptRuntime;
use crate::{ExecError, ExecResult, ThreadId};
use alloc::collections::VecDeque;
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::cell::UnsafeCell;
use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};
use isokern_hal::context::ExecutionContext;
use isokern_hal::{HalError, VirtAddr};
use static_assertions::assert_impl_all;

/// Thread flags
pub mod flags {
    use bitflags::bitflags;

    bitflags! {
        /// Thread flags
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct ThreadFlags: u32 {
            /// Thread is its engine's idle thread
            const IDLE = 1 << 0;
        }
    }
}

pub use flags::ThreadFlags;

/// Shared handle to a thread
pub type ThreadHandle = Arc<Thread>;

/// Thread structure
pub struct Thread {
    /// Identifier, unique within the engine
    id: ThreadId,
    /// Core the thread is pinned to
    engine_id: usize,
    /// Owning engine
    engine: Weak<Engine>,
    /// Flags
    flags: ThreadFlags,
    /// Current state
    state: AtomicU32,
    /// Saved execution state, touched only by the context-switch primitive
    context: UnsafeCell<ExecutionContext>,
    /// Stack
    stack: KernelStack,
    /// Inbound messages, FIFO
    mailbox: spin::Mutex<VecDeque<ThreadMessage>>,
}

// SAFETY: `context` is only written by the owning core, with interrupts
// masked, while the thread is not running elsewhere (threads never migrate).
unsafe impl Sync for Thread {}

assert_impl_all!(Thread: Send, Sync);

impl Thread {
    /// Create a new thread with a fresh stack of `stack_size` bytes
    pub(crate) fn new(
        id: ThreadId,
        engine_id: usize,
        engine: Weak<Engine>,
        flags: ThreadFlags,
        stack_size: usize,
    ) -> ExecResult<Self> {
        let stack = KernelStack::allocate(stack_size)?;

        Ok(Self {
            id,
            engine_id,
            engine,
            flags,
            state: AtomicU32::new(ThreadState::Created.as_u32()),
            context: UnsafeCell::new(ExecutionContext::new()),
            stack,
            mailbox: spin::Mutex::new(VecDeque::new()),
        })
    }

    /// Get thread ID
    pub fn id(&self) -> ThreadId {
        self.id
    }

    /// Core the thread runs on
    pub fn engine_id(&self) -> usize {
        self.engine_id
    }

    /// Get flags
    pub fn flags(&self) -> ThreadFlags {
        self.flags
    }

    /// Check if idle thread
    pub fn is_idle(&self) -> bool {
        self.flags.contains(ThreadFlags::IDLE)
    }

    /// Get current state
    pub fn state(&self) -> ThreadState {
        let val = self.state.load(Ordering::SeqCst);
        ThreadState::from_u32(val).unwrap_or_default()
    }

    /// Set thread state
    pub(crate) fn set_state(&self, state: ThreadState) {
        let old = self.state();
        debug_assert!(
            old.can_transition_to(state),
            "thread {}: {:?} -> {:?}",
            self.id,
            old,
            state
        );
        self.state.store(state.as_u32(), Ordering::SeqCst);
    }

    /// Owning engine
    pub fn engine(&self) -> ExecResult<Arc<Engine>> {
        self.engine.upgrade().ok_or(ExecError::OrphanThread(self.id))
    }

    /// Append a message to the mailbox
    pub fn push_message(&self, msg: ThreadMessage) {
        self.mailbox.lock().push_back(msg);
    }

    /// Remove the oldest message
    pub fn take_message(&self) -> Option<ThreadMessage> {
        self.mailbox.lock().pop_front()
    }

    /// Number of queued messages
    pub fn pending_messages(&self) -> usize {
        self.mailbox.lock().len()
    }

    /// Get stack top (highest address)
    pub fn stack_top(&self) -> VirtAddr {
        self.stack.top()
    }

    pub(crate) fn context_ptr(&self) -> *mut ExecutionContext {
        self.context.get()
    }

    /// Run one work unit: hand every queued message to the runtime, oldest
    /// first. Returns the number of messages handled.
    pub fn run(&self, runtime: &dyn ScriptRuntime) -> usize {
        let mut handled = 0;
        while let Some(msg) = self.take_message() {
            match msg.kind() {
                MessageType::Evaluate => {
                    let (sender, data) = msg.into_parts();
                    runtime.evaluate(self, data.as_bytes(), sender.as_ref());
                }
            }
            handled += 1;
        }
        handled
    }
}

impl fmt::Debug for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread")
            .field("id", &self.id)
            .field("engine", &self.engine_id)
            .field("flags", &self.flags)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// One 16-byte stack unit, so the buffer is 16-byte aligned
#[derive(Clone, Copy, Default)]
#[repr(C, align(16))]
struct StackSlot([u8; 16]);

/// Kernel stack
pub struct KernelStack {
    memory: Vec<StackSlot>,
}

impl KernelStack {
    /// Allocate a zeroed stack of `size` bytes (a multiple of 16)
    pub fn allocate(size: usize) -> ExecResult<Self> {
        if size == 0 || size % 16 != 0 {
            return Err(ExecError::StackAllocation(HalError::InvalidStack));
        }

        let slots = size / 16;
        let mut memory = Vec::new();
        memory
            .try_reserve_exact(slots)
            .map_err(|_| ExecError::StackAllocation(HalError::InvalidStack))?;
        memory.resize(slots, StackSlot::default());
        Ok(Self { memory })
    }

    /// Get stack base (lowest address)
    pub fn base(&self) -> VirtAddr {
        VirtAddr::from_ptr(self.memory.as_ptr())
    }

    /// Get stack top (highest address)
    pub fn top(&self) -> VirtAddr {
        VirtAddr::new(self.base().as_u64() + self.size() as u64)
    }

    /// Get stack size
    pub fn size(&self) -> usize {
        self.memory.len() * 16
    }
}
