use thiserror::Error;

use crate::addr_mode::AddrModeKind;
use crate::instr::Mnemonic;
use crate::symbol::{PointerRegister, Register, RegisterGroup};

/// Fault classes used for policy decisions by the surrounding simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum FaultClass {
    /// The bytes at the program counter are not an instruction.
    Decode,
    /// Data or program memory access outside the configured spaces.
    Memory,
    /// The instruction is decoded but has no execution semantics.
    Unimplemented,
    /// The machine was wired up incorrectly by its host.
    Configuration,
}

/// Runtime fault raised while fetching or executing an instruction.
///
/// Every fault is fatal for the current `step`: the interpreter latches it
/// and refuses to make further progress until reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Fault {
    /// The word at `pc` does not decode to any instruction.
    #[error("illegal instruction word {word:#06x} at {pc:#06x}")]
    IllegalInstruction {
        /// Byte address of the fetch.
        pc: u32,
        /// First instruction word found there.
        word: u16,
    },
    /// A data-space access fell outside register file, I/O and RAM.
    #[error("data address {addr:#06x} is outside the data space")]
    DataAddressOutOfRange {
        /// Offending data address.
        addr: u32,
    },
    /// A fetch or program-memory read fell outside flash.
    #[error("program address {addr:#08x} is outside flash")]
    ProgramAddressOutOfRange {
        /// Offending byte address.
        addr: u32,
    },
    /// The mnemonic decodes but the interpreter has no semantics for it.
    #[error("`{mnemonic}` at {pc:#06x} is not implemented")]
    Unimplemented {
        /// Mnemonic that was reached.
        mnemonic: Mnemonic,
        /// Byte address of the instruction.
        pc: u32,
    },
    /// A host tried to replace one of the core-owned I/O registers.
    #[error("i/o register {io:#04x} is owned by the core")]
    ReservedIoRegister {
        /// I/O-space index (not data address).
        io: u16,
    },
}

impl Fault {
    /// Returns the class of this fault.
    #[must_use]
    pub const fn class(self) -> FaultClass {
        match self {
            Self::IllegalInstruction { .. } => FaultClass::Decode,
            Self::DataAddressOutOfRange { .. } | Self::ProgramAddressOutOfRange { .. } => {
                FaultClass::Memory
            }
            Self::Unimplemented { .. } => FaultClass::Unimplemented,
            Self::ReservedIoRegister { .. } => FaultClass::Configuration,
        }
    }

    /// Faults that stop the machine rather than being reported back to a host call.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::ReservedIoRegister { .. })
    }
}

/// Rejected operand construction.
///
/// The decoder never produces these: it builds operands from masked bit
/// fields. They surface only through the checked constructors used by tooling.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
pub enum OperandError {
    /// Immediate outside its declared inclusive range.
    #[error("immediate {value} outside [{low}, {high}]")]
    ImmediateOutOfRange {
        /// Rejected value.
        value: i64,
        /// Inclusive lower bound.
        low: i64,
        /// Inclusive upper bound.
        high: i64,
    },
    /// Register not legal in the restricted encoding slot.
    #[error("register {register} is not in group {group}")]
    RegisterNotInGroup {
        /// Rejected register.
        register: Register,
        /// Group that was required.
        group: RegisterGroup,
    },
    /// Pointer register not legal in the slot (`X` in displacement forms).
    #[error("pointer register {pointer} is not allowed here")]
    PointerNotAllowed {
        /// Rejected pointer register.
        pointer: PointerRegister,
    },
    /// Name lookup in the symbol tables failed.
    #[error("unknown symbol `{0}`")]
    UnknownSymbol(String),
}

/// Rejected request on the name-based builder surface.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
pub enum BuildError {
    /// The builder requires a different addressing-mode shape.
    #[error("`{mnemonic}` takes {expected:?} operands, got {found:?}")]
    ShapeMismatch {
        /// Mnemonic being built.
        mnemonic: Mnemonic,
        /// Shape the mnemonic binds to.
        expected: AddrModeKind,
        /// Shape that was supplied.
        found: AddrModeKind,
    },
    /// No builder is registered under the name.
    #[error("no instruction named `{0}`")]
    UnknownMnemonic(String),
}

#[cfg(test)]
mod tests {
    use super::{Fault, FaultClass};
    use crate::instr::Mnemonic;

    #[test]
    fn class_mapping_matches_fault_taxonomy() {
        assert_eq!(
            Fault::IllegalInstruction { pc: 0, word: 0xFFFF }.class(),
            FaultClass::Decode
        );
        assert_eq!(
            Fault::DataAddressOutOfRange { addr: 0x1_0000 }.class(),
            FaultClass::Memory
        );
        assert_eq!(
            Fault::ProgramAddressOutOfRange { addr: 0x4_0000 }.class(),
            FaultClass::Memory
        );
        assert_eq!(
            Fault::Unimplemented {
                mnemonic: Mnemonic::Spm,
                pc: 0
            }
            .class(),
            FaultClass::Unimplemented
        );
        assert_eq!(
            Fault::ReservedIoRegister { io: 0x3F }.class(),
            FaultClass::Configuration
        );
    }

    #[test]
    fn configuration_faults_are_not_terminal() {
        assert!(!Fault::ReservedIoRegister { io: 0x3D }.is_terminal());
        assert!(Fault::DataAddressOutOfRange { addr: 0xFFFF }.is_terminal());
    }

    #[test]
    fn messages_name_the_offending_location() {
        let fault = Fault::IllegalInstruction {
            pc: 0x0010,
            word: 0xFFFF,
        };
        assert_eq!(
            fault.to_string(),
            "illegal instruction word 0xffff at 0x0010"
        );
        let fault = Fault::Unimplemented {
            mnemonic: Mnemonic::Spm,
            pc: 0x0100,
        };
        assert_eq!(fault.to_string(), "`spm` at 0x0100 is not implemented");
    }
}
