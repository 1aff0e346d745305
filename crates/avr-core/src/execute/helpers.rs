//! Helper routines for instruction execution: register pairs, pointer
//! addressing, data and program memory access, the stack and skips.
//!
//! Each helper that can fault validates before its first write so the
//! calling instruction stays all-or-nothing.

use super::Interpreter;
use crate::api::WatchContext;
use crate::fault::Fault;
use crate::memory::RAMPZ_IO;
use crate::operand::PointerMode;
use crate::symbol::{PointerRegister, Register};
use crate::timing::{skip_penalty, BRANCH_TAKEN_PENALTY};

/// Effective address and updated pointer value of one pointer read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerAccess {
    /// Address the access uses.
    pub address: u16,
    /// Pointer value after the access.
    pub updated: u16,
}

/// Applies the side effect of `mode` to pointer `value`.
#[must_use]
pub const fn pointer_access(value: u16, mode: PointerMode) -> PointerAccess {
    match mode {
        PointerMode::Plain => PointerAccess {
            address: value,
            updated: value,
        },
        PointerMode::PostIncrement => PointerAccess {
            address: value,
            updated: value.wrapping_add(1),
        },
        PointerMode::PreDecrement => {
            let decremented = value.wrapping_sub(1);
            PointerAccess {
                address: decremented,
                updated: decremented,
            }
        }
    }
}

impl Interpreter {
    pub(super) fn reg(&self, register: Register) -> u8 {
        self.segment.registers()[register.index()]
    }

    pub(super) fn set_reg(&mut self, register: Register, value: u8) {
        self.segment.registers_mut()[register.index()] = value;
    }

    /// Little-endian pair starting at `low` (`low`, `low + 1`).
    pub(super) fn pair(&self, low: Register) -> u16 {
        let registers = self.segment.registers();
        let index = low.index();
        u16::from_le_bytes([registers[index], registers[(index + 1) % registers.len()]])
    }

    pub(super) fn set_pair(&mut self, low: Register, value: u16) {
        let [lo, hi] = value.to_le_bytes();
        let registers = self.segment.registers_mut();
        let index = low.index();
        registers[index] = lo;
        registers[(index + 1) % registers.len()] = hi;
    }

    pub(super) fn watch_context(&self) -> WatchContext {
        WatchContext {
            pc: self.pc,
            cycles: self.cycles,
        }
    }

    pub(super) fn load_data(&mut self, addr: u32) -> Result<u8, Fault> {
        let ctx = self.watch_context();
        self.segment.read(addr, &ctx)
    }

    pub(super) fn store_data(&mut self, addr: u32, value: u8) -> Result<(), Fault> {
        let ctx = self.watch_context();
        self.segment.write(addr, value, &ctx)
    }

    /// Flash address for `LPM`/`ELPM`; `RAMPZ` supplies bits 16.. when extended.
    pub(super) fn program_pointer(&self, extended: bool) -> u32 {
        let z = u32::from(self.pointer(PointerRegister::Z));
        if extended && self.config.has_rampz {
            (u32::from(self.segment.core_io(RAMPZ_IO)) << 16) | z
        } else {
            z
        }
    }

    /// Stores the post-incremented `Z` (and `RAMPZ` for the extended form).
    #[allow(clippy::cast_possible_truncation)]
    pub(super) fn advance_program_pointer(&mut self, current: u32, extended: bool) {
        let next = current.wrapping_add(1);
        self.set_pointer(PointerRegister::Z, next as u16);
        if extended && self.config.has_rampz {
            let ctx = self.watch_context();
            self.segment.set_core_io(RAMPZ_IO, (next >> 16) as u8, &ctx);
        }
    }

    /// Writes `value` at `SP`, then decrements `SP`.
    pub(super) fn push(&mut self, value: u8) -> Result<(), Fault> {
        let sp = self.stack_pointer();
        self.store_data(u32::from(sp), value)?;
        self.set_stack_pointer(sp.wrapping_sub(1));
        Ok(())
    }

    /// Increments `SP`, then reads the byte there.
    pub(super) fn pop(&mut self) -> Result<u8, Fault> {
        let sp = self.stack_pointer().wrapping_add(1);
        let value = self.load_data(u32::from(sp))?;
        self.set_stack_pointer(sp);
        Ok(value)
    }

    /// Pushes the word address of byte address `return_to`, low byte first.
    #[allow(clippy::cast_possible_truncation)]
    pub(super) fn push_pc(&mut self, return_to: u32) -> Result<(), Fault> {
        let sp = self.stack_pointer();
        self.segment.check(u32::from(sp))?;
        self.segment.check(u32::from(sp.wrapping_sub(1)))?;
        let [lo, hi] = ((return_to / 2) as u16).to_le_bytes();
        self.push(lo)?;
        self.push(hi)
    }

    /// Pops a word address pushed by [`Interpreter::push_pc`], returning the byte address.
    pub(super) fn pop_pc(&mut self) -> Result<u32, Fault> {
        let sp = self.stack_pointer();
        self.segment.check(u32::from(sp.wrapping_add(1)))?;
        self.segment.check(u32::from(sp.wrapping_add(2)))?;
        let hi = self.pop()?;
        let lo = self.pop()?;
        Ok(u32::from(u16::from_le_bytes([lo, hi])) * 2)
    }

    /// Moves `next_pc` past the following instruction, returning the extra cycles.
    pub(super) fn skip(&mut self) -> Result<u32, Fault> {
        let size = self.flash.size_at(self.next_pc)?;
        self.next_pc = self.next_pc.wrapping_add(u32::from(size));
        Ok(skip_penalty(size))
    }

    /// Conditional relative branch from the live `next_pc`.
    pub(super) fn branch(&mut self, taken: bool, displacement: i32) -> u32 {
        if taken {
            self.jump_relative(displacement);
            BRANCH_TAKEN_PENALTY
        } else {
            0
        }
    }

    pub(super) fn jump_relative(&mut self, displacement: i32) {
        self.next_pc = self.next_pc.wrapping_add_signed(displacement * 2);
    }
}

#[cfg(test)]
mod tests {
    use super::{pointer_access, PointerAccess};
    use crate::operand::PointerMode;

    #[test]
    fn post_increment_reads_before_updating() {
        assert_eq!(
            pointer_access(0x0100, PointerMode::PostIncrement),
            PointerAccess {
                address: 0x0100,
                updated: 0x0101
            }
        );
    }

    #[test]
    fn pre_decrement_updates_before_reading() {
        assert_eq!(
            pointer_access(0x0050, PointerMode::PreDecrement),
            PointerAccess {
                address: 0x004F,
                updated: 0x004F
            }
        );
        assert_eq!(pointer_access(0, PointerMode::PreDecrement).address, 0xFFFF);
    }

    #[test]
    fn plain_pointer_is_unchanged() {
        let access = pointer_access(0x1234, PointerMode::Plain);
        assert_eq!(access.address, access.updated);
    }
}
