//! Host-facing API: machine configuration, step outcomes and the
//! extension points (probes, watches, interrupt probes) that monitors use
//! to observe a running machine.
//!
//! Observers never take part in decode or execution semantics; they see
//! the machine through [`StateView`] or a [`WatchContext`] only.

use crate::fault::Fault;
use crate::memory::{RegionLayout, EIND_IO, RAMPZ_IO};
use crate::state::Sreg;
use crate::symbol::Register;

/// Default number of I/O registers (64 standard + 160 extended).
pub const DEFAULT_IO_REGISTERS: u32 = 224;
/// Default internal SRAM size in bytes.
pub const DEFAULT_RAM_BYTES: u32 = 4096;
/// Default program memory size in bytes.
pub const DEFAULT_FLASH_BYTES: u32 = 128 * 1024;
/// Number of interrupt vectors the interrupt table tracks.
pub const MAX_INTERRUPTS: u8 = 64;
/// Byte distance between consecutive interrupt vectors.
pub const INTERRUPT_VECTOR_BYTES: u32 = 4;

/// Top-level immutable configuration for a machine instance.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct MachineConfig {
    /// Number of memory-mapped I/O registers.
    pub io_registers: u32,
    /// Internal SRAM size in bytes.
    pub ram_bytes: u32,
    /// Program memory size in bytes.
    pub flash_bytes: u32,
    /// Enables `RAMPZ` as the high byte of `ELPM` addresses.
    pub has_rampz: bool,
    /// Enables `EIND` as the high byte of `EIJMP`/`EICALL` targets.
    pub has_eind: bool,
    /// Stack pointer at reset; `None` selects the last data address.
    pub initial_sp: Option<u16>,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            io_registers: DEFAULT_IO_REGISTERS,
            ram_bytes: DEFAULT_RAM_BYTES,
            flash_bytes: DEFAULT_FLASH_BYTES,
            has_rampz: true,
            has_eind: false,
            initial_sp: None,
        }
    }
}

impl MachineConfig {
    /// Data-space layout described by this configuration.
    #[must_use]
    pub const fn layout(&self) -> RegionLayout {
        RegionLayout {
            io_registers: self.io_registers,
            ram_bytes: self.ram_bytes,
        }
    }

    /// Stack pointer value applied at reset.
    ///
    /// Without an explicit value this is the last data address, clamped to
    /// `0xFFFF` for data spaces the 16-bit stack pointer cannot span.
    #[must_use]
    pub fn reset_sp(&self) -> u16 {
        self.initial_sp
            .unwrap_or_else(|| u16::try_from(self.layout().last_address()).unwrap_or(u16::MAX))
    }

    /// Returns `true` when the I/O register at `io` exists in this layout and is enabled.
    #[must_use]
    pub const fn has_io(&self, io: u16) -> bool {
        if io as u32 >= self.io_registers {
            return false;
        }
        match io {
            RAMPZ_IO => self.has_rampz,
            EIND_IO => self.has_eind,
            _ => true,
        }
    }
}

/// Output status from one `step` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum StepOutcome {
    /// Instruction retired.
    Retired {
        /// Cycles charged, including branch and skip penalties.
        cycles: u32,
    },
    /// An interrupt was taken instead of executing an instruction.
    Interrupt {
        /// Interrupt number invoked.
        number: u8,
        /// Cycles charged for the invocation.
        cycles: u32,
    },
    /// The core is sleeping; one idle cycle elapsed.
    Sleeping,
    /// The core is stopped by `BREAK`.
    Stopped,
    /// A fault was raised or is latched.
    Fault {
        /// The fault.
        cause: Fault,
    },
}

/// Run loop boundary modes for batched execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunBoundary {
    /// Stop once the cycle counter reaches the budget.
    Cycles(u64),
    /// Stop after this many steps.
    Steps(u32),
}

/// Aggregated outcome from running multiple steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunOutcome {
    /// Number of steps taken during this run call.
    pub steps: u32,
    /// Last step-level status observed; `None` when the boundary was
    /// already reached before the first step.
    pub final_step: Option<StepOutcome>,
}

/// Read-only machine accessors for observers.
///
/// Reads through this view never trigger I/O side effects or watches.
pub trait StateView {
    /// Byte address of the instruction about to execute (or just executed).
    fn pc(&self) -> u32;
    /// Cycles elapsed since reset.
    fn cycles(&self) -> u64;
    /// One general-purpose register.
    fn register(&self, register: Register) -> u8;
    /// Packed status register (`I T H S V N Z C`, most significant first).
    fn sreg(&self) -> Sreg;
    /// Stack pointer.
    fn sp(&self) -> u16;
    /// Data-space byte, `None` past the end of data space.
    fn sram(&self, addr: u32) -> Option<u8>;
    /// I/O register by I/O index, `None` past the I/O block.
    fn io(&self, io: u16) -> Option<u8>;
    /// Program-memory byte, `None` past the end of flash.
    fn flash(&self, addr: u32) -> Option<u8>;
}

/// Instruction probe fired around the instruction at one program address.
pub trait Probe {
    /// Called before the instruction at `pc` executes.
    fn fire_before(&mut self, state: &dyn StateView, pc: u32);
    /// Called after the instruction at `pc` executed.
    fn fire_after(&mut self, state: &dyn StateView, pc: u32);
}

/// Machine context handed to watches; data memory is mid-access and not viewable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct WatchContext {
    /// Byte address of the executing instruction.
    pub pc: u32,
    /// Cycle counter when the access started.
    pub cycles: u64,
}

/// Data-space watch fired around instrumented reads and writes.
///
/// All methods default to no-ops so a watch implements only what it needs.
pub trait Watch {
    /// Called before `addr` is read.
    fn fire_before_read(&mut self, ctx: &WatchContext, addr: u32) {
        let _ = (ctx, addr);
    }
    /// Called after `addr` was read and produced `value`.
    fn fire_after_read(&mut self, ctx: &WatchContext, addr: u32, value: u8) {
        let _ = (ctx, addr, value);
    }
    /// Called before `value` is written to `addr`.
    fn fire_before_write(&mut self, ctx: &WatchContext, addr: u32, value: u8) {
        let _ = (ctx, addr, value);
    }
    /// Called after `value` was written to `addr`.
    fn fire_after_write(&mut self, ctx: &WatchContext, addr: u32, value: u8) {
        let _ = (ctx, addr, value);
    }
}

/// Observer of interrupt-table events.
///
/// All methods default to no-ops.
pub trait InterruptProbe {
    /// Called before interrupt `number` is invoked.
    fn fire_before_invoke(&mut self, state: &dyn StateView, number: u8) {
        let _ = (state, number);
    }
    /// Called after interrupt `number` was invoked.
    fn fire_after_invoke(&mut self, state: &dyn StateView, number: u8) {
        let _ = (state, number);
    }
    /// Called when interrupt `number` is posted.
    fn fire_when_posted(&mut self, state: &dyn StateView, number: u8) {
        let _ = (state, number);
    }
    /// Called when interrupt `number` is withdrawn.
    fn fire_when_unposted(&mut self, state: &dyn StateView, number: u8) {
        let _ = (state, number);
    }
    /// Called when interrupt `number` is enabled.
    fn fire_when_enabled(&mut self, state: &dyn StateView, number: u8) {
        let _ = (state, number);
    }
    /// Called when interrupt `number` is disabled.
    fn fire_when_disabled(&mut self, state: &dyn StateView, number: u8) {
        let _ = (state, number);
    }
}

/// Posted and enabled bit masks for interrupts `0..64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct InterruptTable {
    posted: u64,
    enabled: u64,
}

impl InterruptTable {
    const fn bit(number: u8) -> u64 {
        1 << (number % MAX_INTERRUPTS)
    }

    /// Marks `number` as posted; returns `false` if it already was.
    pub fn post(&mut self, number: u8) -> bool {
        let before = self.posted;
        self.posted |= Self::bit(number);
        before != self.posted
    }

    /// Withdraws `number`; returns `false` if it was not posted.
    pub fn unpost(&mut self, number: u8) -> bool {
        let before = self.posted;
        self.posted &= !Self::bit(number);
        before != self.posted
    }

    /// Enables `number`; returns `false` if it already was.
    pub fn enable(&mut self, number: u8) -> bool {
        let before = self.enabled;
        self.enabled |= Self::bit(number);
        before != self.enabled
    }

    /// Disables `number`; returns `false` if it already was.
    pub fn disable(&mut self, number: u8) -> bool {
        let before = self.enabled;
        self.enabled &= !Self::bit(number);
        before != self.enabled
    }

    /// Returns `true` when `number` is posted.
    #[must_use]
    pub const fn is_posted(self, number: u8) -> bool {
        self.posted & Self::bit(number) != 0
    }

    /// Returns `true` when `number` is enabled.
    #[must_use]
    pub const fn is_enabled(self, number: u8) -> bool {
        self.enabled & Self::bit(number) != 0
    }

    /// Lowest-numbered interrupt that is both posted and enabled.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn pending(self) -> Option<u8> {
        let ready = self.posted & self.enabled;
        if ready == 0 {
            None
        } else {
            Some(ready.trailing_zeros() as u8)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{InterruptTable, MachineConfig, DEFAULT_FLASH_BYTES, DEFAULT_IO_REGISTERS};
    use crate::memory::{EIND_IO, RAMPZ_IO, SREG_IO};

    #[test]
    fn default_config_matches_a_large_part() {
        let config = MachineConfig::default();
        assert_eq!(config.io_registers, DEFAULT_IO_REGISTERS);
        assert_eq!(config.flash_bytes, DEFAULT_FLASH_BYTES);
        assert_eq!(config.layout().ram_start(), 0x100);
        assert_eq!(config.reset_sp(), 0x10FF);
        assert!(config.has_io(RAMPZ_IO));
        assert!(!config.has_io(EIND_IO));
        assert!(config.has_io(SREG_IO));
        assert!(!config.has_io(224));
    }

    #[test]
    fn explicit_stack_pointer_overrides_ramend() {
        let config = MachineConfig {
            initial_sp: Some(0x0800),
            ..MachineConfig::default()
        };
        assert_eq!(config.reset_sp(), 0x0800);
    }

    #[test]
    fn stack_pointer_clamps_past_sixty_four_kib() {
        let config = MachineConfig {
            ram_bytes: 0x2_0000,
            ..MachineConfig::default()
        };
        assert_eq!(config.reset_sp(), 0xFFFF);
    }

    #[test]
    fn pending_interrupt_is_lowest_posted_and_enabled() {
        let mut table = InterruptTable::default();
        assert!(table.post(5));
        assert!(!table.post(5));
        assert!(table.post(3));
        assert_eq!(table.pending(), None);
        assert!(table.enable(5));
        assert_eq!(table.pending(), Some(5));
        assert!(table.enable(3));
        assert_eq!(table.pending(), Some(3));
        assert!(table.unpost(3));
        assert_eq!(table.pending(), Some(5));
        assert!(table.disable(5));
        assert_eq!(table.pending(), None);
        assert!(table.is_posted(5));
        assert!(!table.is_enabled(5));
    }
}
