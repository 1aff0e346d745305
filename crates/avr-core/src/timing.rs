//! Instruction cycle costs.
//!
//! Every mnemonic maps to a [`CycleCostKind`]; the kind's cost is charged
//! when the instruction retires. Conditional control flow adds the taken
//! and skip penalties on top.

use crate::instr::Mnemonic;

/// Cost classes with fixed base cycle counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CycleCostKind {
    /// ALU, move, flag, `IN`/`OUT`, branch-not-taken, skip-not-taken, MCU control.
    Single,
    /// Hardware multiply.
    Multiply,
    /// `ADIW`/`SBIW`.
    WordArithmetic,
    /// Indirect, displaced and direct data loads.
    Load,
    /// Pre-decrement data loads.
    PreDecrementLoad,
    /// Indirect, displaced and direct data stores.
    Store,
    /// `PUSH`/`POP`.
    Stack,
    /// `CBI`/`SBI` read-modify-write.
    IoBitWrite,
    /// `RJMP`, `IJMP`, `EIJMP`.
    Jump,
    /// `JMP`.
    AbsoluteJump,
    /// `RCALL`, `ICALL`.
    Call,
    /// `CALL`, `EICALL`.
    LongCall,
    /// `LPM`/`ELPM` in every form.
    ProgramLoad,
    /// `RET`/`RETI`.
    Return,
    /// Interrupt entry sequence.
    InterruptEntry,
}

/// Single source-of-truth cycle-cost table.
pub const CYCLE_COST_TABLE: &[(CycleCostKind, u32)] = &[
    (CycleCostKind::Single, 1),
    (CycleCostKind::Multiply, 2),
    (CycleCostKind::WordArithmetic, 2),
    (CycleCostKind::Load, 2),
    (CycleCostKind::PreDecrementLoad, 3),
    (CycleCostKind::Store, 2),
    (CycleCostKind::Stack, 2),
    (CycleCostKind::IoBitWrite, 2),
    (CycleCostKind::Jump, 2),
    (CycleCostKind::AbsoluteJump, 3),
    (CycleCostKind::Call, 3),
    (CycleCostKind::LongCall, 4),
    (CycleCostKind::ProgramLoad, 3),
    (CycleCostKind::Return, 4),
    (CycleCostKind::InterruptEntry, 4),
];

/// Extra cycles when a conditional branch is taken.
pub const BRANCH_TAKEN_PENALTY: u32 = 1;

/// Extra cycles for skipping an instruction of `size` bytes.
#[must_use]
pub const fn skip_penalty(size: u8) -> u32 {
    if size == 4 {
        2
    } else {
        1
    }
}

/// Looks up the cycle cost for a cycle-cost kind.
#[must_use]
pub fn cycle_cost(kind: CycleCostKind) -> Option<u32> {
    CYCLE_COST_TABLE
        .iter()
        .find_map(|(entry_kind, cycles)| (*entry_kind == kind).then_some(*cycles))
}

/// Cost class of a mnemonic.
#[must_use]
pub const fn cost_kind(mnemonic: Mnemonic) -> CycleCostKind {
    use Mnemonic as M;

    match mnemonic {
        M::Mul | M::Muls | M::Mulsu | M::Fmul | M::Fmuls | M::Fmulsu => CycleCostKind::Multiply,
        M::Adiw | M::Sbiw => CycleCostKind::WordArithmetic,
        M::Ld | M::LdPi | M::Ldd | M::Lds => CycleCostKind::Load,
        M::LdPd => CycleCostKind::PreDecrementLoad,
        M::St | M::StPi | M::StPd | M::Std | M::Sts => CycleCostKind::Store,
        M::Push | M::Pop => CycleCostKind::Stack,
        M::Cbi | M::Sbi => CycleCostKind::IoBitWrite,
        M::Rjmp | M::Ijmp | M::Eijmp => CycleCostKind::Jump,
        M::Jmp => CycleCostKind::AbsoluteJump,
        M::Rcall | M::Icall => CycleCostKind::Call,
        M::Call | M::Eicall => CycleCostKind::LongCall,
        M::Lpm | M::LpmD | M::LpmPi | M::Elpm | M::ElpmD | M::ElpmPi => CycleCostKind::ProgramLoad,
        M::Ret | M::Reti => CycleCostKind::Return,
        _ => CycleCostKind::Single,
    }
}

/// Base cycles charged for `mnemonic`, before penalties.
#[must_use]
pub fn base_cycles(mnemonic: Mnemonic) -> u32 {
    cycle_cost(cost_kind(mnemonic)).unwrap_or(1)
}
