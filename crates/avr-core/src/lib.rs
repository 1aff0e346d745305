//! Instruction-level simulator core for 8-bit AVR microcontrollers.

/// Register symbols and name lookup.
pub mod symbol;
pub use symbol::{
    lookup, lookup_pointer, lookup_register, PointerRegister, Register, RegisterGroup, Symbol,
    REGISTER_COUNT,
};

/// Typed operand kinds.
pub mod operand;
pub use operand::{
    DataAddr, Displacement, EvenGpr, Gpr, HighGpr, Imm, Imm3, Imm5, Imm6, Imm8, Indirect, LongRel,
    MidGpr, Operand, PointerMode, PostIncrement, PreDecrement, ProgramAddr, Relative, ShortRel,
    WordGpr, YzPointer, ZIndirect, ZPostIncrement,
};

/// Addressing-mode shapes.
pub mod addr_mode;
pub use addr_mode::{AddrMode, AddrModeKind};

/// Instruction variants, mnemonics and the name-based builder.
pub mod instr;
pub use instr::{builder, Builder, Instr, Mnemonic};

/// Instruction-to-word encoding.
pub mod encoding;
pub use encoding::EncodedInstr;

/// Decision-tree instruction decoder.
pub mod decoder;
pub use decoder::{decode, sign_extend, Decoded, Decoder};

/// Data-space segment: register file, I/O registers and RAM.
pub mod memory;
pub use memory::{
    IoRegister, MemoryRegion, MemorySegment, RegionDescriptor, RegionLayout, EIND_IO, IO_START,
    RAMPZ_IO, SPH_IO, SPL_IO, SREG_IO,
};

/// Program memory with decode cache.
pub mod flash;
pub use flash::Flash;

/// Status register and run state.
pub mod state;
pub use state::{RunState, Sreg, SREG_BITS};

/// Fault taxonomy and construction errors.
pub mod fault;
pub use fault::{BuildError, Fault, FaultClass, OperandError};

/// Cycle-cost table and lookup helpers.
pub mod timing;
pub use timing::{base_cycles, cycle_cost, CycleCostKind, CYCLE_COST_TABLE};

/// Host-facing configuration, outcomes and observer traits.
pub mod api;
pub use api::{
    InterruptProbe, InterruptTable, MachineConfig, Probe, RunBoundary, RunOutcome, StateView,
    StepOutcome, Watch, WatchContext,
};

/// The interpreter.
pub mod execute;
pub use execute::Interpreter;

/// Disassembly rows and instruction text.
pub mod disasm;
pub use disasm::{disassemble, disassemble_window, DisassemblyRow};

#[cfg(test)]
use proptest as _;
#[cfg(test)]
use rstest as _;
