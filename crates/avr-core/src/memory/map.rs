//! Data-space region map and address decoding.
//!
//! The data space is `[register file | I/O registers | RAM]`; only the I/O
//! and RAM sizes vary between parts, so the layout is a value rather than
//! a fixed table.

use crate::symbol::REGISTER_COUNT;

/// Size in bytes of the register file at the bottom of data space.
pub const REGISTER_FILE_BYTES: u32 = REGISTER_COUNT as u32;
/// Data address of I/O register 0.
pub const IO_START: u32 = REGISTER_FILE_BYTES;

/// Status register (I/O index).
pub const SREG_IO: u16 = 0x3F;
/// Stack pointer high byte (I/O index).
pub const SPH_IO: u16 = 0x3E;
/// Stack pointer low byte (I/O index).
pub const SPL_IO: u16 = 0x3D;
/// Extended indirect jump page (I/O index).
pub const EIND_IO: u16 = 0x3C;
/// Extended program-memory page (I/O index).
pub const RAMPZ_IO: u16 = 0x3B;

/// I/O registers owned by the core; peripherals cannot be installed over them.
pub const CORE_IO_REGISTERS: [u16; 5] = [RAMPZ_IO, EIND_IO, SPL_IO, SPH_IO, SREG_IO];

const _: () = assert_core_register_order();

const fn assert_core_register_order() {
    let mut index = 1;
    while index < CORE_IO_REGISTERS.len() {
        assert!(
            CORE_IO_REGISTERS[index - 1] + 1 == CORE_IO_REGISTERS[index],
            "core i/o registers must be contiguous"
        );
        index += 1;
    }
}

/// Returns `true` for an I/O index owned by the core.
#[must_use]
pub const fn is_core_io(io: u16) -> bool {
    io >= CORE_IO_REGISTERS[0] && io <= CORE_IO_REGISTERS[CORE_IO_REGISTERS.len() - 1]
}

/// Region classification for data addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum MemoryRegion {
    /// General-purpose registers (`0..32`).
    RegisterFile,
    /// Memory-mapped I/O registers.
    Io,
    /// Linear RAM.
    Ram,
}

/// Inclusive bounds of one region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionDescriptor {
    /// Region classification.
    pub region: MemoryRegion,
    /// Inclusive start address.
    pub start: u32,
    /// Inclusive end address.
    pub end: u32,
}

impl RegionDescriptor {
    /// Returns `true` when `addr` belongs to this region.
    #[must_use]
    pub const fn contains(self, addr: u32) -> bool {
        addr >= self.start && addr <= self.end
    }
}

/// Sizes of the variable regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct RegionLayout {
    /// Number of I/O registers.
    pub io_registers: u32,
    /// RAM size in bytes.
    pub ram_bytes: u32,
}

/// Address resolved to its region and the offset inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolved {
    /// Region the address falls in.
    pub region: MemoryRegion,
    /// Offset from the start of the region.
    pub offset: usize,
}

impl RegionLayout {
    /// Data address of RAM byte 0.
    #[must_use]
    pub const fn ram_start(self) -> u32 {
        IO_START + self.io_registers
    }

    /// Total data-space size in bytes.
    #[must_use]
    pub const fn len(self) -> u32 {
        self.ram_start() + self.ram_bytes
    }

    /// Returns `true` if the data space holds no bytes at all (never for a real layout).
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.len() == 0
    }

    /// Highest valid data address (`RAMEND`).
    #[must_use]
    pub const fn last_address(self) -> u32 {
        self.len() - 1
    }

    /// Region descriptors in ascending address order; empty regions are skipped.
    #[must_use]
    pub fn regions(self) -> Vec<RegionDescriptor> {
        [
            (MemoryRegion::RegisterFile, 0, REGISTER_FILE_BYTES),
            (MemoryRegion::Io, IO_START, self.io_registers),
            (MemoryRegion::Ram, self.ram_start(), self.ram_bytes),
        ]
        .into_iter()
        .filter(|&(_, _, len)| len > 0)
        .map(|(region, start, len)| RegionDescriptor {
            region,
            start,
            end: start + len - 1,
        })
        .collect()
    }

    /// Decodes a data address into its region, or `None` past the end of data space.
    #[must_use]
    pub const fn decode_memory_region(self, addr: u32) -> Option<Resolved> {
        let (region, start) = if addr < IO_START {
            (MemoryRegion::RegisterFile, 0)
        } else if addr < self.ram_start() {
            (MemoryRegion::Io, IO_START)
        } else if addr < self.len() {
            (MemoryRegion::Ram, self.ram_start())
        } else {
            return None;
        };
        Some(Resolved {
            region,
            offset: (addr - start) as usize,
        })
    }
}
