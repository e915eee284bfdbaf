//! # Script Runtime Interface
//!
//! The script-execution engine is an external collaborator. The kernel only
//! initializes it once, attaches it to each thread, and hands it EVALUATE
//! payloads.

use crate::thread::{Thread, ThreadHandle};
use alloc::alloc::{alloc, alloc_zeroed, dealloc, Layout};
use core::ptr;

/// Allocator for the runtime's backing stores
pub trait BufferAllocator: Send + Sync {
    /// Allocate `len` zeroed bytes; null on failure
    fn allocate(&self, len: usize) -> *mut u8;

    /// Allocate `len` bytes without zeroing; null on failure
    fn allocate_uninitialized(&self, len: usize) -> *mut u8;

    /// Release a buffer
    ///
    /// # Safety
    /// `data` must come from this allocator with the same `len`.
    unsafe fn free(&self, data: *mut u8, len: usize);
}

/// Kernel-heap buffer allocator
#[derive(Debug, Default)]
pub struct SystemBufferAllocator;

/// Allocator handed to the runtime at initialization
pub static SYSTEM_BUFFER_ALLOCATOR: SystemBufferAllocator = SystemBufferAllocator;

impl SystemBufferAllocator {
    const ALIGN: usize = 16;

    fn layout(len: usize) -> Option<Layout> {
        if len == 0 {
            return None;
        }
        Layout::from_size_align(len, Self::ALIGN).ok()
    }
}

impl BufferAllocator for SystemBufferAllocator {
    fn allocate(&self, len: usize) -> *mut u8 {
        match Self::layout(len) {
            // SAFETY: non-zero size.
            Some(layout) => unsafe { alloc_zeroed(layout) },
            None => ptr::null_mut(),
        }
    }

    fn allocate_uninitialized(&self, len: usize) -> *mut u8 {
        match Self::layout(len) {
            // SAFETY: non-zero size.
            Some(layout) => unsafe { alloc(layout) },
            None => ptr::null_mut(),
        }
    }

    unsafe fn free(&self, data: *mut u8, len: usize) {
        if data.is_null() {
            return;
        }
        if let Some(layout) = Self::layout(len) {
            // SAFETY: caller guarantees `data` was allocated with this layout.
            unsafe { dealloc(data, layout) };
        }
    }
}

/// Script-execution engine
pub trait ScriptRuntime: Send + Sync {
    /// Global initialization, once, before any thread runs
    fn initialize(&self, flags: &str, allocator: &'static dyn BufferAllocator);

    /// Per-thread initialization, on the thread's own stack before its first
    /// work unit
    fn attach_thread(&self, _thread: &Thread) {}

    /// Run `source` in the context of `thread`
    fn evaluate(&self, thread: &Thread, source: &[u8], reply_to: Option<&ThreadHandle>);
}
