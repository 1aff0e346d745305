//! Addressing-mode shapes.
//!
//! Each shape is a plain struct of typed operands, listed in assembly
//! order. [`AddrMode`] is the closed sum over all shapes; tooling matches on
//! it (or calls [`AddrMode::operands`]) without knowing any mnemonic.

use crate::operand::{
    DataAddr, Displacement, EvenGpr, Gpr, HighGpr, Imm3, Imm5, Imm6, Imm8, Indirect, LongRel,
    MidGpr, Operand, PostIncrement, PreDecrement, ProgramAddr, ShortRel, WordGpr, ZIndirect,
    ZPostIncrement,
};

macro_rules! addr_modes {
    (
        $(
            $(#[$doc:meta])*
            $name:ident [$size:literal] {
                $( $(#[$fdoc:meta])* $field:ident : $ty:ty ),* $(,)?
            }
        )*
    ) => {
        $(
            $(#[$doc])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
            #[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
            pub struct $name {
                $( $(#[$fdoc])* pub $field: $ty, )*
            }

            impl $name {
                /// Encoded size in bytes of every instruction with this shape.
                pub const SIZE: u8 = $size;

                /// Operands in assembly order.
                #[must_use]
                pub fn operands(&self) -> Vec<Operand> {
                    vec![$( Operand::from(self.$field) ),*]
                }
            }

            impl From<$name> for AddrMode {
                fn from(mode: $name) -> Self {
                    Self::$name(mode)
                }
            }
        )*

        /// Any addressing-mode shape.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
        pub enum AddrMode {
            $(
                $(#[$doc])*
                $name($name),
            )*
        }

        /// Shape discriminant without operands.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
        pub enum AddrModeKind {
            $(
                $(#[$doc])*
                $name,
            )*
        }

        impl AddrModeKind {
            /// Encoded size in bytes of instructions with this shape.
            #[must_use]
            pub const fn size(self) -> u8 {
                match self {
                    $( Self::$name => $size, )*
                }
            }
        }

        impl AddrMode {
            /// Shape discriminant.
            #[must_use]
            pub const fn kind(&self) -> AddrModeKind {
                match self {
                    $( Self::$name(_) => AddrModeKind::$name, )*
                }
            }

            /// Operands in assembly order.
            #[must_use]
            pub fn operands(&self) -> Vec<Operand> {
                match self {
                    $( Self::$name(mode) => mode.operands(), )*
                }
            }
        }
    };
}

addr_modes! {
    /// No explicit operands.
    Implied [2] {}
    /// Two general-purpose registers.
    RegReg [2] {
        /// Destination (and left source).
        rd: Gpr,
        /// Right source.
        rr: Gpr,
    }
    /// Two even registers naming register pairs (`MOVW`).
    PairPair [2] {
        /// Destination pair.
        rd: EvenGpr,
        /// Source pair.
        rr: EvenGpr,
    }
    /// Two registers of `r16`..`r31` (`MULS`).
    HighHigh [2] {
        /// Left factor.
        rd: HighGpr,
        /// Right factor.
        rr: HighGpr,
    }
    /// Two registers of `r16`..`r23` (`MULSU`, `FMUL*`).
    MidMid [2] {
        /// Left factor.
        rd: MidGpr,
        /// Right factor.
        rr: MidGpr,
    }
    /// One general-purpose register.
    Reg [2] {
        /// Operand register.
        rd: Gpr,
    }
    /// High register and byte constant.
    HighImm [2] {
        /// Destination register.
        rd: HighGpr,
        /// Constant.
        k: Imm8,
    }
    /// High register alone (`SER`).
    High [2] {
        /// Destination register.
        rd: HighGpr,
    }
    /// Upper register pair and 6-bit constant (`ADIW`, `SBIW`).
    WordImm [2] {
        /// Low register of the pair.
        rd: WordGpr,
        /// Constant.
        k: Imm6,
    }
    /// Register and bit number.
    RegBit [2] {
        /// Register.
        rd: Gpr,
        /// Bit number.
        bit: Imm3,
    }
    /// Low I/O register and bit number.
    IoBit [2] {
        /// I/O address (`0..=31`).
        io: Imm5,
        /// Bit number.
        bit: Imm3,
    }
    /// Status-register bit number (`BSET`, `BCLR`).
    FlagBit [2] {
        /// Bit number.
        bit: Imm3,
    }
    /// Status bit number and conditional branch target (`BRBS`, `BRBC`).
    BitBranch [2] {
        /// Bit number.
        bit: Imm3,
        /// Branch target.
        target: ShortRel,
    }
    /// Conditional branch with a fixed condition.
    Branch [2] {
        /// Branch target.
        target: ShortRel,
    }
    /// 12-bit relative jump or call.
    RelJump [2] {
        /// Jump target.
        target: LongRel,
    }
    /// 22-bit absolute jump or call.
    AbsJump [4] {
        /// Jump target (word address).
        target: ProgramAddr,
    }
    /// Register and I/O address (`IN`).
    RegIo [2] {
        /// Destination register.
        rd: Gpr,
        /// I/O address.
        io: Imm6,
    }
    /// I/O address and register (`OUT`).
    IoReg [2] {
        /// I/O address.
        io: Imm6,
        /// Source register.
        rr: Gpr,
    }
    /// Load through an unchanged pointer.
    LdInd [2] {
        /// Destination register.
        rd: Gpr,
        /// Pointer.
        src: Indirect,
    }
    /// Load through a post-incremented pointer.
    LdPostInc [2] {
        /// Destination register.
        rd: Gpr,
        /// Pointer.
        src: PostIncrement,
    }
    /// Load through a pre-decremented pointer.
    LdPreDec [2] {
        /// Destination register.
        rd: Gpr,
        /// Pointer.
        src: PreDecrement,
    }
    /// Store through an unchanged pointer.
    StInd [2] {
        /// Pointer.
        dst: Indirect,
        /// Source register.
        rr: Gpr,
    }
    /// Store through a post-incremented pointer.
    StPostInc [2] {
        /// Pointer.
        dst: PostIncrement,
        /// Source register.
        rr: Gpr,
    }
    /// Store through a pre-decremented pointer.
    StPreDec [2] {
        /// Pointer.
        dst: PreDecrement,
        /// Source register.
        rr: Gpr,
    }
    /// Load from `Y+q` or `Z+q`.
    LdDisp [2] {
        /// Destination register.
        rd: Gpr,
        /// Base pointer and offset.
        src: Displacement,
    }
    /// Store to `Y+q` or `Z+q`.
    StDisp [2] {
        /// Base pointer and offset.
        dst: Displacement,
        /// Source register.
        rr: Gpr,
    }
    /// Load from an absolute data address.
    LdDirect [4] {
        /// Destination register.
        rd: Gpr,
        /// Data address.
        addr: DataAddr,
    }
    /// Store to an absolute data address.
    StDirect [4] {
        /// Data address.
        addr: DataAddr,
        /// Source register.
        rr: Gpr,
    }
    /// Program-memory load through `Z`.
    LoadZ [2] {
        /// Destination register.
        rd: Gpr,
        /// Fixed `Z` pointer.
        src: ZIndirect,
    }
    /// Program-memory load through `Z+`.
    LoadZPostInc [2] {
        /// Destination register.
        rd: Gpr,
        /// Fixed `Z+` pointer.
        src: ZPostIncrement,
    }
}

impl AddrMode {
    /// Encoded size in bytes; 4 only for the absolute jump and direct data shapes.
    #[must_use]
    pub const fn size(&self) -> u8 {
        self.kind().size()
    }
}

#[cfg(test)]
mod tests {
    use super::{AbsJump, AddrMode, AddrModeKind, Implied, LdPostInc, RegReg, StDisp};
    use crate::operand::{
        Displacement, Gpr, Imm6, Operand, PointerMode, PostIncrement, ProgramAddr, YzPointer,
    };
    use crate::symbol::{PointerRegister, Register};

    #[test]
    fn only_absolute_shapes_take_two_words() {
        let jump = AddrMode::from(AbsJump {
            target: ProgramAddr::from_bits(0),
        });
        assert_eq!(jump.size(), 4);
        assert_eq!(AddrModeKind::LdDirect.size(), 4);
        assert_eq!(AddrModeKind::StDirect.size(), 4);
        assert_eq!(AddrMode::from(Implied {}).size(), 2);
        assert_eq!(AddrModeKind::LdDisp.size(), 2);
    }

    #[test]
    fn operands_follow_assembly_order() {
        let mode = AddrMode::from(RegReg {
            rd: Gpr::from_encoding(5),
            rr: Gpr::from_encoding(6),
        });
        assert_eq!(mode.kind(), AddrModeKind::RegReg);
        assert_eq!(
            mode.operands(),
            vec![Operand::Register(Register::R5), Operand::Register(Register::R6)]
        );

        let load = LdPostInc {
            rd: Gpr::from_encoding(0),
            src: PostIncrement::new(PointerRegister::X),
        };
        assert_eq!(
            load.operands()[1],
            Operand::Pointer {
                pointer: PointerRegister::X,
                mode: PointerMode::PostIncrement
            }
        );

        let store = StDisp {
            dst: Displacement::new(YzPointer::from_encoding(1), Imm6::from_bits(9)),
            rr: Gpr::from_encoding(1),
        };
        assert_eq!(
            store.operands(),
            vec![
                Operand::Displaced {
                    pointer: PointerRegister::Y,
                    displacement: 9
                },
                Operand::Register(Register::R1)
            ]
        );
        assert!(Implied {}.operands().is_empty());
    }
}
