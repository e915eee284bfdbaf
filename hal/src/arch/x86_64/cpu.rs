//! # CPU Control
//!
//! Low-level CPU control functions for x86_64.

use crate::cpu::Cpu;
use core::arch::asm;

/// x86_64 core control
#[derive(Debug, Clone, Copy)]
pub struct X86_64Cpu {
    count: usize,
}

impl X86_64Cpu {
    /// Create for a machine with `count` cores (as reported by firmware)
    pub const fn new(count: usize) -> Self {
        Self { count }
    }
}

impl Cpu for X86_64Cpu {
    fn current_cpu_id(&self) -> usize {
        // Initial local APIC id, bits 31..24 of cpuid(1).ebx
        let ebx = unsafe { core::arch::x86_64::__cpuid(1).ebx };
        (ebx >> 24) as usize
    }

    fn cpu_count(&self) -> usize {
        self.count
    }

    #[inline]
    unsafe fn enable_interrupts(&self) {
        unsafe { asm!("sti", options(nomem, nostack)) };
    }

    #[inline]
    unsafe fn disable_interrupts(&self) {
        unsafe { asm!("cli", options(nomem, nostack)) };
    }

    #[inline]
    fn interrupts_enabled(&self) -> bool {
        let flags: u64;
        unsafe {
            asm!("pushfq; pop {}", out(reg) flags, options(nomem, preserves_flags));
        }
        (flags & (1 << 9)) != 0 // IF flag is bit 9
    }

    #[inline]
    fn pause(&self) {
        unsafe { asm!("pause", options(nomem, nostack, preserves_flags)) };
    }

    #[inline]
    fn halt(&self) {
        unsafe { asm!("hlt", options(nomem, nostack, preserves_flags)) };
    }
}
