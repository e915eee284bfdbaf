//! # Memory Map Abstractions
//!
//! Zero-copy view of the Multiboot memory map and a lazy enumerator over
//! its usable zones.
//!
//! Each raw entry is `size: u32` followed by `size` bytes holding
//! `base_addr: u64`, `length: u64` and `type: u32`. The next entry starts
//! `size + 4` bytes after the current one.

use crate::MemoryMapError;
use core::fmt;
use isokern_hal::PhysAddr;

/// Offset of `mmap_length` in the Multiboot information structure
const INFO_MMAP_LENGTH: usize = 44;
/// Offset of `mmap_addr` in the Multiboot information structure
const INFO_MMAP_ADDR: usize = 48;
/// Bytes of the information structure needed to locate the map
const INFO_MMAP_END: usize = INFO_MMAP_ADDR + 4;

/// Bytes of an entry after its `size` field that we actually read
const ENTRY_PAYLOAD: usize = 20;

// =============================================================================
// Memory Region Kind
// =============================================================================

/// Kind of memory region as reported by the bootloader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryRegionKind {
    /// Available RAM that can be freely used
    Available,
    /// Reserved memory (do not use)
    Reserved,
    /// ACPI reclaimable memory
    AcpiReclaimable,
    /// ACPI NVS memory, must be preserved
    AcpiNvs,
    /// Defective memory
    BadMemory,
    /// A type code we don't recognize
    Unknown(u32),
}

impl MemoryRegionKind {
    /// Create from raw type value
    #[must_use]
    pub const fn from_raw(value: u32) -> Self {
        match value {
            1 => Self::Available,
            2 => Self::Reserved,
            3 => Self::AcpiReclaimable,
            4 => Self::AcpiNvs,
            5 => Self::BadMemory,
            other => Self::Unknown(other),
        }
    }

    /// Check if this region is usable for general allocation
    #[must_use]
    pub const fn is_usable(&self) -> bool {
        matches!(self, Self::Available)
    }
}

impl fmt::Display for MemoryRegionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Available => write!(f, "Available"),
            Self::Reserved => write!(f, "Reserved"),
            Self::AcpiReclaimable => write!(f, "ACPI Reclaimable"),
            Self::AcpiNvs => write!(f, "ACPI NVS"),
            Self::BadMemory => write!(f, "Bad Memory"),
            Self::Unknown(v) => write!(f, "Unknown({})", v),
        }
    }
}

// =============================================================================
// Memory Zone
// =============================================================================

/// A contiguous range of usable physical memory
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct MemoryZone {
    base: PhysAddr,
    length: u64,
}

impl MemoryZone {
    /// Create a new zone
    #[must_use]
    pub const fn new(base: PhysAddr, length: u64) -> Self {
        Self { base, length }
    }

    /// Starting physical address
    #[must_use]
    pub const fn base(&self) -> PhysAddr {
        self.base
    }

    /// Length in bytes
    #[must_use]
    pub const fn length(&self) -> u64 {
        self.length
    }

    /// Ending physical address (exclusive)
    #[must_use]
    pub const fn end(&self) -> PhysAddr {
        self.base.add(self.length)
    }
}

impl fmt::Debug for MemoryZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryZone")
            .field("start", &format_args!("{:#x}", self.base.as_u64()))
            .field("end", &format_args!("{:#x}", self.end().as_u64()))
            .field("size", &format_args!("{} KB", self.length / 1024))
            .finish()
    }
}

// =============================================================================
// Memory Map
// =============================================================================

/// Raw memory map handed over by the bootloader
#[derive(Clone, Copy)]
pub struct MemoryMap<'boot> {
    entries: &'boot [u8],
}

impl<'boot> MemoryMap<'boot> {
    /// View an already-located block of raw map entries
    #[must_use]
    pub const fn from_bytes(entries: &'boot [u8]) -> Self {
        Self { entries }
    }

    /// Locate the memory map through the Multiboot information structure
    ///
    /// # Safety
    ///
    /// `info` must point to a valid Multiboot information structure, and the
    /// map it references must stay mapped and unmodified for `'boot`.
    pub unsafe fn from_info(info: *const u8) -> Result<Self, MemoryMapError> {
        // SAFETY: the structure is at least `INFO_MMAP_END` bytes long.
        let header = unsafe { core::slice::from_raw_parts(info, INFO_MMAP_END) };
        let (mmap_addr, mmap_len) = map_location(header)?;

        // SAFETY: the bootloader guarantees `mmap_len` bytes at `mmap_addr`.
        let entries = unsafe {
            core::slice::from_raw_parts(mmap_addr as usize as *const u8, mmap_len as usize)
        };
        Ok(Self::from_bytes(entries))
    }

    /// Size of the raw map in bytes
    #[must_use]
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the map holds no entries
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Start a fresh enumeration of the available zones
    #[must_use]
    pub fn zones(&self) -> AvailableZones<'boot> {
        AvailableZones {
            data: self.entries,
            offset: 0,
        }
    }
}

impl fmt::Debug for MemoryMap<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryMap")
            .field("bytes", &self.entries.len())
            .finish()
    }
}

/// Read `(mmap_addr, mmap_length)` from the head of a Multiboot information
/// structure
pub fn map_location(info: &[u8]) -> Result<(u32, u32), MemoryMapError> {
    let field = |at: usize| -> Option<u32> {
        let bytes = info.get(at..at + 4)?;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    };
    let (addr, len) = match (field(INFO_MMAP_ADDR), field(INFO_MMAP_LENGTH)) {
        (Some(addr), Some(len)) => (addr, len),
        _ => return Err(MemoryMapError::Invalid),
    };

    log::debug!("Memory map addr {:#x}, len {}", addr, len);

    if addr == 0 || len == 0 {
        return Err(MemoryMapError::Invalid);
    }
    Ok((addr, len))
}

// =============================================================================
// Available Zone Enumerator
// =============================================================================

/// Lazy producer of the map's available zones
///
/// Non-available entries are skipped. Once exhausted it stays exhausted; call
/// [`MemoryMap::zones`] again to restart.
pub struct AvailableZones<'boot> {
    data: &'boot [u8],
    offset: usize,
}

impl AvailableZones<'_> {
    fn read_u32(bytes: &[u8], at: usize) -> u32 {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&bytes[at..at + 4]);
        u32::from_le_bytes(raw)
    }

    fn read_u64(bytes: &[u8], at: usize) -> u64 {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&bytes[at..at + 8]);
        u64::from_le_bytes(raw)
    }

    fn finish(&mut self) -> Option<MemoryZone> {
        self.offset = self.data.len();
        None
    }
}

impl Iterator for AvailableZones<'_> {
    type Item = MemoryZone;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let rest = self.data.get(self.offset..)?;
            if rest.len() < 4 + ENTRY_PAYLOAD {
                return self.finish();
            }

            let size = Self::read_u32(rest, 0) as usize;
            if size == 0 {
                log::warn!("Zero-sized memory map entry at offset {}", self.offset);
                return self.finish();
            }

            let base = Self::read_u64(rest, 4);
            let length = Self::read_u64(rest, 12);
            let kind = MemoryRegionKind::from_raw(Self::read_u32(rest, 20));

            self.offset = self.offset.saturating_add(size + 4);

            if kind.is_usable() {
                let zone = MemoryZone::new(PhysAddr::new(base), length);
                log::debug!("Available memory {:?}", zone);
                return Some(zone);
            }
            log::trace!("Skipping {} memory at {:#x}", kind, base);
        }
    }
}
