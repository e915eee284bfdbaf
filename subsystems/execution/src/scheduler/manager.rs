//! # Thread Manager
//!
//! Owns the thread set of one isolate and picks who runs next.

use crate::thread::{thread_entry, ThreadHandle};
use crate::{ExecError, ExecResult};
use alloc::sync::Arc;
use alloc::vec::Vec;
use isokern_hal::context::ContextSwitch;

/// Round-robin thread set
#[derive(Debug)]
pub struct ThreadManager {
    threads: Vec<ThreadHandle>,
    current_index: usize,
}

impl ThreadManager {
    /// Create an empty manager with room for `capacity` threads
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            threads: Vec::with_capacity(capacity),
            current_index: 0,
        }
    }

    /// Number of threads in the rotation
    pub fn len(&self) -> usize {
        self.threads.len()
    }

    /// Is the rotation empty?
    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    /// Thread that owns the core
    pub fn current_thread(&self) -> Option<&ThreadHandle> {
        self.threads.get(self.current_index)
    }

    /// Index of the current thread
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    /// Every thread, in rotation order
    pub fn threads(&self) -> &[ThreadHandle] {
        &self.threads
    }

    /// Advance to the next thread in the set, wrapping around, and return
    /// it. The idle thread takes its turn like any other.
    pub fn switch_to_next_thread(&mut self) -> Option<ThreadHandle> {
        if self.threads.is_empty() {
            return None;
        }
        self.current_index = (self.current_index + 1) % self.threads.len();
        Some(Arc::clone(&self.threads[self.current_index]))
    }

    /// Append a thread to the end of the rotation
    pub(crate) fn adopt(&mut self, thread: ThreadHandle) {
        self.threads.push(thread);
    }

    /// Wire a thread's saved state to the shared trampoline and its own
    /// stack. Runs once, at creation.
    pub fn thread_init(switch: &dyn ContextSwitch, thread: &ThreadHandle) -> ExecResult<()> {
        let arg = Arc::as_ptr(thread) as usize;
        // SAFETY: the thread was just created and is not in any rotation, so
        // nothing else can reach its saved state.
        let ctx = unsafe { &mut *thread.context_ptr() };
        switch
            .init_thread_context(ctx, thread_entry, thread.stack_top(), arg)
            .map_err(ExecError::StackAllocation)
    }
}
