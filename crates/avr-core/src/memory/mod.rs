//! Data-space memory segment.
//!
//! [`MemorySegment`] routes one contiguous byte address space to the
//! register file, the I/O registers and RAM. Instrumented accesses
//! ([`MemorySegment::read`], [`MemorySegment::write`], the I/O bit
//! operations and core-register writes) fire watches; only the
//! interpreter's register-file path bypasses them.

/// Access legality checks.
pub mod access;
/// Pluggable I/O register handlers.
pub mod io;
/// Region layout and address decoding.
pub mod map;

use std::collections::BTreeMap;

pub use access::{validate_data_access, validate_io_install, validate_program_access};
pub use io::IoRegister;
pub use map::{
    is_core_io, MemoryRegion, RegionDescriptor, RegionLayout, Resolved, CORE_IO_REGISTERS,
    EIND_IO, IO_START, RAMPZ_IO, REGISTER_FILE_BYTES, SPH_IO, SPL_IO, SREG_IO,
};

use io::IoSlot;

use crate::api::{Watch, WatchContext};
use crate::fault::Fault;
use crate::symbol::REGISTER_COUNT;

/// Register file, I/O registers and RAM behind one address space.
pub struct MemorySegment {
    layout: RegionLayout,
    registers: [u8; REGISTER_COUNT],
    io: Vec<IoSlot>,
    ram: Vec<u8>,
    watches: BTreeMap<u32, Vec<Box<dyn Watch>>>,
}

impl std::fmt::Debug for MemorySegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySegment")
            .field("layout", &self.layout)
            .field("registers", &self.registers)
            .field("io", &self.io)
            .field("ram_bytes", &self.ram.len())
            .field("watched_addresses", &self.watches.len())
            .finish()
    }
}

impl MemorySegment {
    /// Allocates a zeroed segment with plain storage behind every I/O address.
    #[must_use]
    pub fn new(layout: RegionLayout) -> Self {
        Self {
            layout,
            registers: [0; REGISTER_COUNT],
            io: (0..layout.io_registers).map(|_| IoSlot::Storage(0)).collect(),
            ram: vec![0; layout.ram_bytes as usize],
            watches: BTreeMap::new(),
        }
    }

    /// Region layout.
    #[must_use]
    pub const fn layout(&self) -> RegionLayout {
        self.layout
    }

    /// Total size in bytes.
    #[must_use]
    pub const fn len(&self) -> u32 {
        self.layout.len()
    }

    /// Returns `true` if the segment holds no bytes.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.layout.is_empty()
    }

    /// Zeroes the register file and RAM and resets every storage I/O byte.
    ///
    /// Installed handlers and watches are kept.
    pub fn clear(&mut self) {
        self.registers = [0; REGISTER_COUNT];
        self.ram.fill(0);
        for slot in &mut self.io {
            if let IoSlot::Storage(value) = slot {
                *value = 0;
            }
        }
    }

    /// Checks that `addr` is inside data space without touching it.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::DataAddressOutOfRange`] past the end.
    pub const fn check(&self, addr: u32) -> Result<(), Fault> {
        match validate_data_access(self.layout, addr) {
            Ok(_) => Ok(()),
            Err(fault) => Err(fault),
        }
    }

    /// Instrumented read: fires watches and I/O side effects.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::DataAddressOutOfRange`] past the end.
    pub fn read(&mut self, addr: u32, ctx: &WatchContext) -> Result<u8, Fault> {
        let resolved = validate_data_access(self.layout, addr)?;
        self.fire(addr, |watch| watch.fire_before_read(ctx, addr));
        let value = match resolved.region {
            MemoryRegion::RegisterFile => self.registers[resolved.offset],
            MemoryRegion::Io => self.io[resolved.offset].read(),
            MemoryRegion::Ram => self.ram[resolved.offset],
        };
        self.fire(addr, |watch| watch.fire_after_read(ctx, addr, value));
        Ok(value)
    }

    /// Instrumented write: fires watches and I/O side effects.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::DataAddressOutOfRange`] past the end.
    pub fn write(&mut self, addr: u32, value: u8, ctx: &WatchContext) -> Result<(), Fault> {
        let resolved = validate_data_access(self.layout, addr)?;
        self.fire(addr, |watch| watch.fire_before_write(ctx, addr, value));
        match resolved.region {
            MemoryRegion::RegisterFile => self.registers[resolved.offset] = value,
            MemoryRegion::Io => self.io[resolved.offset].write(value),
            MemoryRegion::Ram => self.ram[resolved.offset] = value,
        }
        self.fire(addr, |watch| watch.fire_after_write(ctx, addr, value));
        Ok(())
    }

    /// Side-effect-free read; `None` past the end.
    #[must_use]
    pub fn peek(&self, addr: u32) -> Option<u8> {
        let resolved = self.layout.decode_memory_region(addr)?;
        Some(match resolved.region {
            MemoryRegion::RegisterFile => self.registers[resolved.offset],
            MemoryRegion::Io => self.io[resolved.offset].peek(),
            MemoryRegion::Ram => self.ram[resolved.offset],
        })
    }

    /// Register file, bypassing instrumentation.
    #[must_use]
    pub const fn registers(&self) -> &[u8; REGISTER_COUNT] {
        &self.registers
    }

    /// Mutable register file, bypassing instrumentation.
    pub fn registers_mut(&mut self) -> &mut [u8; REGISTER_COUNT] {
        &mut self.registers
    }

    /// Reads I/O register `io` through its handler, firing watches.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::DataAddressOutOfRange`] outside the I/O block.
    pub fn read_io(&mut self, io: u16, ctx: &WatchContext) -> Result<u8, Fault> {
        self.read(self.io_address(io)?, ctx)
    }

    /// Writes I/O register `io` through its handler, firing watches.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::DataAddressOutOfRange`] outside the I/O block.
    pub fn write_io(&mut self, io: u16, value: u8, ctx: &WatchContext) -> Result<(), Fault> {
        self.write(self.io_address(io)?, value, ctx)
    }

    /// Reads one bit of I/O register `io` through its handler, firing read
    /// watches with the whole register value.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::DataAddressOutOfRange`] outside the I/O block.
    pub fn read_io_bit(&mut self, io: u16, bit: u8, ctx: &WatchContext) -> Result<bool, Fault> {
        let index = self.io_index(io)?;
        let addr = IO_START + u32::from(io);
        self.fire(addr, |watch| watch.fire_before_read(ctx, addr));
        let set = self.io[index].read_bit(bit);
        let value = self.io[index].peek();
        self.fire(addr, |watch| watch.fire_after_read(ctx, addr, value));
        Ok(set)
    }

    /// Read-modify-write of one bit of I/O register `io` through its
    /// handler, firing write watches with the resulting register value.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::DataAddressOutOfRange`] outside the I/O block.
    pub fn write_io_bit(
        &mut self,
        io: u16,
        bit: u8,
        value: bool,
        ctx: &WatchContext,
    ) -> Result<(), Fault> {
        let index = self.io_index(io)?;
        let addr = IO_START + u32::from(io);
        let mask = 1 << (bit & 7);
        let current = self.io[index].peek();
        let written = if value { current | mask } else { current & !mask };
        self.fire(addr, |watch| watch.fire_before_write(ctx, addr, written));
        self.io[index].write_bit(bit, value);
        self.fire(addr, |watch| watch.fire_after_write(ctx, addr, written));
        Ok(())
    }

    /// Side-effect-free read of I/O register `io`.
    #[must_use]
    pub fn peek_io(&self, io: u16) -> Option<u8> {
        self.io.get(usize::from(io)).map(IoSlot::peek)
    }

    /// Core register storage (`SREG`, `SP`, `RAMPZ`, `EIND`), bypassing instrumentation.
    ///
    /// Returns 0 for registers missing from a small layout.
    #[must_use]
    pub fn core_io(&self, io: u16) -> u8 {
        self.peek_io(io).unwrap_or(0)
    }

    /// Sets core register storage and fires the write watches on its
    /// data address.
    ///
    /// Writes to registers missing from a small layout are dropped.
    pub fn set_core_io(&mut self, io: u16, value: u8, ctx: &WatchContext) {
        let Some(slot) = self.io.get_mut(usize::from(io)) else {
            return;
        };
        let addr = IO_START + u32::from(io);
        *slot = IoSlot::Storage(value);
        self.fire(addr, |watch| {
            watch.fire_before_write(ctx, addr, value);
            watch.fire_after_write(ctx, addr, value);
        });
    }

    /// Installs a peripheral handler at I/O index `io`.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::ReservedIoRegister`] for core-owned registers and
    /// [`Fault::DataAddressOutOfRange`] outside the I/O block.
    pub fn install_io(&mut self, io: u16, handler: Box<dyn IoRegister>) -> Result<(), Fault> {
        let index = validate_io_install(self.layout, io)?;
        self.io[index] = IoSlot::Device(handler);
        Ok(())
    }

    /// Registers a watch on data address `addr`; watches fire in registration order.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::DataAddressOutOfRange`] past the end.
    pub fn add_watch(&mut self, addr: u32, watch: Box<dyn Watch>) -> Result<(), Fault> {
        self.check(addr)?;
        self.watches.entry(addr).or_default().push(watch);
        Ok(())
    }

    /// Removes every watch on `addr`, returning how many there were.
    pub fn remove_watches(&mut self, addr: u32) -> usize {
        self.watches.remove(&addr).map_or(0, |watches| watches.len())
    }

    /// Copies `bytes` into data space starting at `addr` without instrumentation.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::DataAddressOutOfRange`] if any byte falls past the end;
    /// nothing is written in that case.
    pub fn load(&mut self, addr: u32, bytes: &[u8]) -> Result<(), Fault> {
        let len = u32::try_from(bytes.len()).map_err(|_| Fault::DataAddressOutOfRange {
            addr: u32::MAX,
        })?;
        if len == 0 {
            return Ok(());
        }
        self.check(addr.saturating_add(len - 1))?;
        for (offset, byte) in (addr..).zip(bytes) {
            if let Some(resolved) = self.layout.decode_memory_region(offset) {
                match resolved.region {
                    MemoryRegion::RegisterFile => self.registers[resolved.offset] = *byte,
                    MemoryRegion::Io => self.io[resolved.offset].write(*byte),
                    MemoryRegion::Ram => self.ram[resolved.offset] = *byte,
                }
            }
        }
        Ok(())
    }

    fn fire(&mut self, addr: u32, mut event: impl FnMut(&mut Box<dyn Watch>)) {
        if let Some(watches) = self.watches.get_mut(&addr) {
            for watch in watches.iter_mut() {
                event(watch);
            }
        }
    }

    fn io_index(&self, io: u16) -> Result<usize, Fault> {
        let index = usize::from(io);
        if index < self.io.len() {
            Ok(index)
        } else {
            Err(Fault::DataAddressOutOfRange {
                addr: IO_START + u32::from(io),
            })
        }
    }

    fn io_address(&self, io: u16) -> Result<u32, Fault> {
        self.io_index(io).map(|_| IO_START + u32::from(io))
    }
}
