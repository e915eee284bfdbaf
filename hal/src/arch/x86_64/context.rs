//! # Context Switch
//!
//! Assembly routines for switching between threads.
//!
//! Block layout (byte offsets): r15 0x00, r14 0x08, r13 0x10, r12 0x18,
//! rbx 0x20, rbp 0x28, rip 0x30, rsp 0x38, rflags 0x40.

use crate::context::{ContextSwitch, ExecutionContext, ThreadEntry};
use crate::{HalResult, VirtAddr};

core::arch::global_asm!(
    ".global isokern_switch_context",
    "isokern_switch_context:",
    // Save callee-saved registers to `from` (rdi)
    "mov [rdi + 0x00], r15",
    "mov [rdi + 0x08], r14",
    "mov [rdi + 0x10], r13",
    "mov [rdi + 0x18], r12",
    "mov [rdi + 0x20], rbx",
    "mov [rdi + 0x28], rbp",
    // Resume point for `from`
    "lea rax, [rip + 2f]",
    "mov [rdi + 0x30], rax",
    "mov [rdi + 0x38], rsp",
    "pushfq",
    "pop rax",
    "mov [rdi + 0x40], rax",
    // Restore from `to` (rsi)
    "mov r15, [rsi + 0x00]",
    "mov r14, [rsi + 0x08]",
    "mov r13, [rsi + 0x10]",
    "mov r12, [rsi + 0x18]",
    "mov rbx, [rsi + 0x20]",
    "mov rbp, [rsi + 0x28]",
    "mov rsp, [rsi + 0x38]",
    "mov rax, [rsi + 0x40]",
    "push rax",
    "popfq",
    "mov rax, [rsi + 0x30]",
    "jmp rax",
    "2:",
    "ret",
    "",
    // First resume of a fresh thread: entry in r13, argument in r12
    ".global isokern_thread_start",
    "isokern_thread_start:",
    "mov rdi, r12",
    "call r13",
    "ud2",
);

extern "C" {
    fn isokern_switch_context(from: *mut ExecutionContext, to: *const ExecutionContext);
    fn isokern_thread_start();
}

/// Hardware context switch
#[derive(Debug, Default, Clone, Copy)]
pub struct X86_64ContextSwitch;

impl ContextSwitch for X86_64ContextSwitch {
    fn init_thread_context(
        &self,
        ctx: &mut ExecutionContext,
        entry: ThreadEntry,
        stack_top: VirtAddr,
        arg: usize,
    ) -> HalResult<()> {
        ctx.prime(isokern_thread_start as usize as u64, entry, stack_top, arg)
    }

    unsafe fn switch_context(&self, from: *mut ExecutionContext, to: *const ExecutionContext) {
        // SAFETY: upheld by the caller; both blocks follow the layout above.
        unsafe { isokern_switch_context(from, to) }
    }
}
