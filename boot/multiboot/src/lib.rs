//! # Isokern Multiboot - Firmware Memory Map
//!
//! Enumerates the usable physical memory zones reported by a Multiboot
//! (v1) bootloader. The physical allocator consumes the zones once, before
//! the engine registry is constructed.
//!
//! ```rust,no_run
//! use isokern_multiboot::MemoryMap;
//!
//! fn early_boot(info_ptr: *const u8) {
//!     let map = unsafe { MemoryMap::from_info(info_ptr) }.expect("invalid memory map");
//!     for zone in map.zones() {
//!         // hand zone.base() / zone.length() to the physical allocator
//!         let _ = zone;
//!     }
//! }
//! ```

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

pub mod memory;

pub use memory::{map_location, AvailableZones, MemoryMap, MemoryRegionKind, MemoryZone};

/// Errors raised while locating the memory map
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryMapError {
    /// The bootloader reported a zero map address or length
    Invalid,
}

impl core::fmt::Display for MemoryMapError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Invalid => write!(f, "Invalid memory map provided."),
        }
    }
}
