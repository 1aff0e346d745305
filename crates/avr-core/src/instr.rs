//! Instruction model: one [`Instr`] variant per mnemonic, each bound to
//! exactly one addressing-mode shape.
//!
//! Execution matches on [`Instr`]; tooling matches on [`Instr::addr_mode`].
//! The name-based [`Builder`] surface exists for assemblers and tests; the
//! decoder constructs variants directly.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use strum::{EnumCount, EnumIter, IntoStaticStr};

use crate::addr_mode::{
    AbsJump, AddrMode, AddrModeKind, BitBranch, Branch, FlagBit, High, HighHigh, HighImm,
    Implied, IoBit, IoReg, LdDirect, LdDisp, LdInd, LdPostInc, LdPreDec, LoadZ, LoadZPostInc,
    MidMid, PairPair, Reg, RegBit, RegIo, RegReg, RelJump, StDirect, StDisp, StInd, StPostInc,
    StPreDec, WordImm,
};
use crate::fault::BuildError;

macro_rules! instructions {
    ( $( $(#[$doc:meta])* $name:ident ( $shape:ident ) = $asm:literal, )* ) => {
        /// Instruction mnemonic, one per [`Instr`] variant.
        ///
        /// `Display` and the builder registry use the lower-case variant
        /// name (`"ldpi"`); [`Mnemonic::assembly_name`] is the text an
        /// assembler writes (`"ld"`).
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
            EnumIter, EnumCount, IntoStaticStr, strum::Display,
        )]
        #[strum(serialize_all = "lowercase")]
        #[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
        pub enum Mnemonic {
            $( $(#[$doc])* $name, )*
        }

        /// Fully typed instruction.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
        pub enum Instr {
            $( $(#[$doc])* $name($shape), )*
        }

        impl Mnemonic {
            /// Addressing-mode shape this mnemonic binds to.
            #[must_use]
            pub const fn shape(self) -> AddrModeKind {
                match self {
                    $( Self::$name => AddrModeKind::$shape, )*
                }
            }

            /// Assembly text of the mnemonic.
            #[must_use]
            pub const fn assembly_name(self) -> &'static str {
                match self {
                    $( Self::$name => $asm, )*
                }
            }

            fn bind(self, mode: AddrMode) -> Result<Instr, BuildError> {
                match (self, mode) {
                    $( (Self::$name, AddrMode::$shape(mode)) => Ok(Instr::$name(mode)), )*
                    (mnemonic, mode) => Err(BuildError::ShapeMismatch {
                        mnemonic,
                        expected: mnemonic.shape(),
                        found: mode.kind(),
                    }),
                }
            }
        }

        impl Instr {
            /// Mnemonic of this instruction.
            #[must_use]
            pub const fn mnemonic(&self) -> Mnemonic {
                match self {
                    $( Self::$name(_) => Mnemonic::$name, )*
                }
            }

            /// Operands as the generic addressing-mode sum.
            #[must_use]
            pub fn addr_mode(&self) -> AddrMode {
                match *self {
                    $( Self::$name(mode) => AddrMode::$shape(mode), )*
                }
            }
        }
    };
}

instructions! {
    /// Add without carry.
    Add(RegReg) = "add",
    /// Add with carry.
    Adc(RegReg) = "adc",
    /// Subtract without carry.
    Sub(RegReg) = "sub",
    /// Subtract with carry.
    Sbc(RegReg) = "sbc",
    /// Logical AND.
    And(RegReg) = "and",
    /// Logical OR.
    Or(RegReg) = "or",
    /// Exclusive OR.
    Eor(RegReg) = "eor",
    /// Copy register.
    Mov(RegReg) = "mov",
    /// Compare.
    Cp(RegReg) = "cp",
    /// Compare with carry.
    Cpc(RegReg) = "cpc",
    /// Compare, skip if equal.
    Cpse(RegReg) = "cpse",
    /// Unsigned multiply.
    Mul(RegReg) = "mul",
    /// Copy register pair.
    Movw(PairPair) = "movw",
    /// Signed multiply.
    Muls(HighHigh) = "muls",
    /// Signed by unsigned multiply.
    Mulsu(MidMid) = "mulsu",
    /// Fractional unsigned multiply.
    Fmul(MidMid) = "fmul",
    /// Fractional signed multiply.
    Fmuls(MidMid) = "fmuls",
    /// Fractional signed by unsigned multiply.
    Fmulsu(MidMid) = "fmulsu",
    /// One's complement.
    Com(Reg) = "com",
    /// Two's complement.
    Neg(Reg) = "neg",
    /// Swap nibbles.
    Swap(Reg) = "swap",
    /// Increment.
    Inc(Reg) = "inc",
    /// Decrement.
    Dec(Reg) = "dec",
    /// Arithmetic shift right.
    Asr(Reg) = "asr",
    /// Logical shift right.
    Lsr(Reg) = "lsr",
    /// Rotate right through carry.
    Ror(Reg) = "ror",
    /// Push register on the stack.
    Push(Reg) = "push",
    /// Pop register from the stack.
    Pop(Reg) = "pop",
    /// Clear register (`EOR rd, rd`).
    Clr(Reg) = "clr",
    /// Logical shift left (`ADD rd, rd`).
    Lsl(Reg) = "lsl",
    /// Rotate left through carry (`ADC rd, rd`).
    Rol(Reg) = "rol",
    /// Test for zero or minus (`AND rd, rd`).
    Tst(Reg) = "tst",
    /// Compare with immediate.
    Cpi(HighImm) = "cpi",
    /// Subtract immediate with carry.
    Sbci(HighImm) = "sbci",
    /// Subtract immediate.
    Subi(HighImm) = "subi",
    /// OR with immediate.
    Ori(HighImm) = "ori",
    /// AND with immediate.
    Andi(HighImm) = "andi",
    /// Load immediate.
    Ldi(HighImm) = "ldi",
    /// Set bits in register (`ORI`).
    Sbr(HighImm) = "sbr",
    /// Clear bits in register (`ANDI` with the complement).
    Cbr(HighImm) = "cbr",
    /// Set all bits in register (`LDI rd, 0xff`).
    Ser(High) = "ser",
    /// Add immediate to word.
    Adiw(WordImm) = "adiw",
    /// Subtract immediate from word.
    Sbiw(WordImm) = "sbiw",
    /// Load T flag into register bit.
    Bld(RegBit) = "bld",
    /// Store register bit into T flag.
    Bst(RegBit) = "bst",
    /// Skip if register bit cleared.
    Sbrc(RegBit) = "sbrc",
    /// Skip if register bit set.
    Sbrs(RegBit) = "sbrs",
    /// Clear I/O bit.
    Cbi(IoBit) = "cbi",
    /// Set I/O bit.
    Sbi(IoBit) = "sbi",
    /// Skip if I/O bit cleared.
    Sbic(IoBit) = "sbic",
    /// Skip if I/O bit set.
    Sbis(IoBit) = "sbis",
    /// Set status flag.
    Bset(FlagBit) = "bset",
    /// Clear status flag.
    Bclr(FlagBit) = "bclr",
    /// Branch if status flag set.
    Brbs(BitBranch) = "brbs",
    /// Branch if status flag cleared.
    Brbc(BitBranch) = "brbc",
    /// Branch if equal.
    Breq(Branch) = "breq",
    /// Branch if not equal.
    Brne(Branch) = "brne",
    /// Branch if carry set.
    Brcs(Branch) = "brcs",
    /// Branch if carry cleared.
    Brcc(Branch) = "brcc",
    /// Branch if same or higher.
    Brsh(Branch) = "brsh",
    /// Branch if lower.
    Brlo(Branch) = "brlo",
    /// Branch if minus.
    Brmi(Branch) = "brmi",
    /// Branch if plus.
    Brpl(Branch) = "brpl",
    /// Branch if greater or equal, signed.
    Brge(Branch) = "brge",
    /// Branch if less than, signed.
    Brlt(Branch) = "brlt",
    /// Branch if half carry set.
    Brhs(Branch) = "brhs",
    /// Branch if half carry cleared.
    Brhc(Branch) = "brhc",
    /// Branch if T flag set.
    Brts(Branch) = "brts",
    /// Branch if T flag cleared.
    Brtc(Branch) = "brtc",
    /// Branch if overflow set.
    Brvs(Branch) = "brvs",
    /// Branch if overflow cleared.
    Brvc(Branch) = "brvc",
    /// Branch if interrupts enabled.
    Brie(Branch) = "brie",
    /// Branch if interrupts disabled.
    Brid(Branch) = "brid",
    /// Relative jump.
    Rjmp(RelJump) = "rjmp",
    /// Relative call.
    Rcall(RelJump) = "rcall",
    /// Absolute jump.
    Jmp(AbsJump) = "jmp",
    /// Absolute call.
    Call(AbsJump) = "call",
    /// Read I/O register.
    In(RegIo) = "in",
    /// Write I/O register.
    Out(IoReg) = "out",
    /// Load indirect.
    Ld(LdInd) = "ld",
    /// Load indirect with post-increment.
    LdPi(LdPostInc) = "ld",
    /// Load indirect with pre-decrement.
    LdPd(LdPreDec) = "ld",
    /// Store indirect.
    St(StInd) = "st",
    /// Store indirect with post-increment.
    StPi(StPostInc) = "st",
    /// Store indirect with pre-decrement.
    StPd(StPreDec) = "st",
    /// Load indirect with displacement.
    Ldd(LdDisp) = "ldd",
    /// Store indirect with displacement.
    Std(StDisp) = "std",
    /// Load direct from data space.
    Lds(LdDirect) = "lds",
    /// Store direct to data space.
    Sts(StDirect) = "sts",
    /// Load program memory into `r0`.
    Lpm(Implied) = "lpm",
    /// Load program memory through `Z`.
    LpmD(LoadZ) = "lpm",
    /// Load program memory through `Z+`.
    LpmPi(LoadZPostInc) = "lpm",
    /// Extended load program memory into `r0`.
    Elpm(Implied) = "elpm",
    /// Extended load program memory through `Z`.
    ElpmD(LoadZ) = "elpm",
    /// Extended load program memory through `Z+`.
    ElpmPi(LoadZPostInc) = "elpm",
    /// No operation.
    Nop(Implied) = "nop",
    /// Return from subroutine.
    Ret(Implied) = "ret",
    /// Return from interrupt.
    Reti(Implied) = "reti",
    /// Enter sleep mode.
    Sleep(Implied) = "sleep",
    /// Break into the debugger.
    Break(Implied) = "break",
    /// Watchdog reset.
    Wdr(Implied) = "wdr",
    /// Indirect jump through `Z`.
    Ijmp(Implied) = "ijmp",
    /// Indirect call through `Z`.
    Icall(Implied) = "icall",
    /// Extended indirect jump through `EIND:Z`.
    Eijmp(Implied) = "eijmp",
    /// Extended indirect call through `EIND:Z`.
    Eicall(Implied) = "eicall",
    /// Store program memory.
    Spm(Implied) = "spm",
    /// Set carry.
    Sec(Implied) = "sec",
    /// Clear carry.
    Clc(Implied) = "clc",
    /// Set zero.
    Sez(Implied) = "sez",
    /// Clear zero.
    Clz(Implied) = "clz",
    /// Set negative.
    Sen(Implied) = "sen",
    /// Clear negative.
    Cln(Implied) = "cln",
    /// Set overflow.
    Sev(Implied) = "sev",
    /// Clear overflow.
    Clv(Implied) = "clv",
    /// Set sign.
    Ses(Implied) = "ses",
    /// Clear sign.
    Cls(Implied) = "cls",
    /// Set half carry.
    Seh(Implied) = "seh",
    /// Clear half carry.
    Clh(Implied) = "clh",
    /// Set T flag.
    Set(Implied) = "set",
    /// Clear T flag.
    Clt(Implied) = "clt",
    /// Enable interrupts.
    Sei(Implied) = "sei",
    /// Disable interrupts.
    Cli(Implied) = "cli",
}

impl Mnemonic {
    /// Number of mnemonics.
    pub const COUNT: usize = <Self as EnumCount>::COUNT;

    /// Status-register bit and polarity fixed by a branch or flag alias.
    ///
    /// `Some((bit, true))` for "branch if set" / "set flag" forms,
    /// `Some((bit, false))` for the clear forms.
    #[must_use]
    pub const fn status_alias(self) -> Option<(u8, bool)> {
        Some(match self {
            Self::Brcs | Self::Brlo | Self::Sec => (0, true),
            Self::Brcc | Self::Brsh | Self::Clc => (0, false),
            Self::Breq | Self::Sez => (1, true),
            Self::Brne | Self::Clz => (1, false),
            Self::Brmi | Self::Sen => (2, true),
            Self::Brpl | Self::Cln => (2, false),
            Self::Brvs | Self::Sev => (3, true),
            Self::Brvc | Self::Clv => (3, false),
            Self::Brlt | Self::Ses => (4, true),
            Self::Brge | Self::Cls => (4, false),
            Self::Brhs | Self::Seh => (5, true),
            Self::Brhc | Self::Clh => (5, false),
            Self::Brts | Self::Set => (6, true),
            Self::Brtc | Self::Clt => (6, false),
            Self::Brie | Self::Sei => (7, true),
            Self::Brid | Self::Cli => (7, false),
            _ => return None,
        })
    }

    /// Registry key of this mnemonic (lower-case variant name).
    #[must_use]
    pub fn key(self) -> &'static str {
        self.into()
    }
}

impl Instr {
    /// Encoded size in bytes (2 or 4).
    #[must_use]
    pub fn size(&self) -> u8 {
        self.mnemonic().shape().size()
    }

    /// Assembly text of the mnemonic (`"ld"` for every `LD` form).
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.mnemonic().assembly_name()
    }
}

/// Stateless builder for one mnemonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Builder {
    mnemonic: Mnemonic,
}

impl Builder {
    /// Builder for `mnemonic`.
    #[must_use]
    pub const fn new(mnemonic: Mnemonic) -> Self {
        Self { mnemonic }
    }

    /// Mnemonic this builder produces.
    #[must_use]
    pub const fn mnemonic(self) -> Mnemonic {
        self.mnemonic
    }

    /// Wraps `mode` into the instruction.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::ShapeMismatch`] when `mode` is not the shape the
    /// mnemonic binds to.
    pub fn build(self, mode: impl Into<AddrMode>) -> Result<Instr, BuildError> {
        self.mnemonic.bind(mode.into())
    }
}

static BUILDERS: Lazy<HashMap<&'static str, Builder>> = Lazy::new(|| {
    use strum::IntoEnumIterator;

    Mnemonic::iter()
        .map(|mnemonic| (mnemonic.key(), Builder::new(mnemonic)))
        .collect()
});

/// Looks up the builder registered under `name` (case-insensitive).
///
/// # Errors
///
/// Returns [`BuildError::UnknownMnemonic`] for unregistered names.
pub fn builder(name: &str) -> Result<Builder, BuildError> {
    BUILDERS
        .get(name.to_ascii_lowercase().as_str())
        .copied()
        .ok_or_else(|| BuildError::UnknownMnemonic(name.to_owned()))
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::{builder, Builder, Instr, Mnemonic};
    use crate::addr_mode::{AddrModeKind, Implied, Reg, RegReg};
    use crate::fault::BuildError;
    use crate::operand::Gpr;

    #[test]
    fn catalogue_is_complete() {
        assert_eq!(Mnemonic::COUNT, 122);
        assert_eq!(Mnemonic::iter().count(), 122);
    }

    #[test]
    fn every_mnemonic_is_registered_under_its_key() {
        for mnemonic in Mnemonic::iter() {
            let found = builder(mnemonic.key()).expect("registered");
            assert_eq!(found.mnemonic(), mnemonic);
        }
        assert_eq!(builder("LdPi").map(Builder::mnemonic), Ok(Mnemonic::LdPi));
        assert_eq!(
            builder("frobnicate"),
            Err(BuildError::UnknownMnemonic("frobnicate".to_owned()))
        );
    }

    #[test]
    fn builder_accepts_only_its_shape() {
        let add = builder("add").expect("registered");
        let operands = RegReg {
            rd: Gpr::from_encoding(5),
            rr: Gpr::from_encoding(6),
        };
        let instr = add.build(operands).expect("shape matches");
        assert_eq!(instr, Instr::Add(operands));
        assert_eq!(instr.size(), 2);

        assert_eq!(
            add.build(Reg {
                rd: Gpr::from_encoding(1)
            }),
            Err(BuildError::ShapeMismatch {
                mnemonic: Mnemonic::Add,
                expected: AddrModeKind::RegReg,
                found: AddrModeKind::Reg,
            })
        );
        assert!(Builder::new(Mnemonic::Nop).build(Implied {}).is_ok());
    }

    #[test]
    fn names_collapse_addressing_variants() {
        assert_eq!(Mnemonic::LdPd.to_string(), "ldpd");
        assert_eq!(Mnemonic::LdPd.assembly_name(), "ld");
        assert_eq!(Mnemonic::ElpmPi.assembly_name(), "elpm");
        assert_eq!(Mnemonic::Jmp.shape().size(), 4);
    }

    #[test]
    fn aliases_name_their_status_bit() {
        assert_eq!(Mnemonic::Brlo.status_alias(), Mnemonic::Brcs.status_alias());
        assert_eq!(Mnemonic::Brge.status_alias(), Some((4, false)));
        assert_eq!(Mnemonic::Sei.status_alias(), Some((7, true)));
        assert_eq!(Mnemonic::Add.status_alias(), None);
    }
}
