//! # Isokern HAL - Hardware Abstraction Layer
//!
//! This crate defines the hardware-facing pieces the scheduler depends on:
//! - CPU control (core identity, interrupt masking, low-power waits)
//! - Interrupt frames handed to timer handlers
//! - The context-switch primitive and its opaque saved-state block
//!
//! Bare-metal x86_64 builds get real implementations in [`arch`]. Every other
//! target (including the host running unit tests) uses the portable
//! [`cpu::SimulatedCpu`] and [`context::SoftContextSwitch`].

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

pub mod cpu;
pub mod context;
pub mod interrupts;

// Architecture-specific implementations
pub mod arch;

/// Result type for HAL operations
pub type HalResult<T> = Result<T, HalError>;

/// Errors that can occur in HAL operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalError {
    /// Stack top is null or not 16-byte aligned
    InvalidStack,
    /// Core index is outside the configured core count
    InvalidCpu,
}

/// Physical address type (architecture-independent)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct PhysAddr(u64);

impl PhysAddr {
    /// Create a new physical address
    #[inline]
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// Get the raw address value
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Add an offset to the address
    #[inline]
    pub const fn add(self, offset: u64) -> Self {
        Self(self.0 + offset)
    }
}

/// Virtual address type (architecture-independent)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct VirtAddr(u64);

impl VirtAddr {
    /// Create a new virtual address
    #[inline]
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// Create from a pointer
    #[inline]
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self(ptr as usize as u64)
    }

    /// Get the raw address value
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Check if the address is aligned to the given alignment
    #[inline]
    pub const fn is_aligned(self, align: u64) -> bool {
        self.0 % align == 0
    }

    /// Align the address down to the given alignment
    #[inline]
    pub const fn align_down(self, align: u64) -> Self {
        Self(self.0 & !(align - 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_virt_addr_alignment() {
        let addr = VirtAddr::new(0x1_0017);
        assert!(!addr.is_aligned(16));
        assert_eq!(addr.align_down(16), VirtAddr::new(0x1_0010));
        assert!(addr.align_down(16).is_aligned(16));
    }

    #[test]
    fn test_phys_addr_add() {
        assert_eq!(PhysAddr::new(0x1000).add(0x200).as_u64(), 0x1200);
    }
}
