//! Machine-word encoding of instructions.
//!
//! `encode` is the inverse of the decoder on canonical mnemonics. Alias
//! mnemonics encode to the words of the instruction they abbreviate, so
//! decoding them yields the canonical form (`CLR r3` comes back as
//! `EOR r3, r3`).

use crate::addr_mode::{
    BitBranch, Branch, FlagBit, HighImm, Implied, IoBit, LdInd, RegBit, RegReg, StInd, WordImm,
};
use crate::instr::Instr;
use crate::operand::Gpr;
use crate::symbol::PointerRegister;

/// One or two little-endian machine words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct EncodedInstr {
    /// First (opcode) word.
    pub word0: u16,
    /// Second word of the 4-byte forms.
    pub word1: Option<u16>,
}

impl EncodedInstr {
    const fn one(word0: u16) -> Self {
        Self { word0, word1: None }
    }

    const fn two(word0: u16, word1: u16) -> Self {
        Self {
            word0,
            word1: Some(word1),
        }
    }

    /// Encoded size in bytes.
    #[must_use]
    pub const fn size(self) -> u8 {
        if self.word1.is_some() {
            4
        } else {
            2
        }
    }

    /// Program-memory byte image (little-endian words).
    #[must_use]
    pub fn to_bytes(self) -> Vec<u8> {
        let mut bytes = self.word0.to_le_bytes().to_vec();
        if let Some(word1) = self.word1 {
            bytes.extend_from_slice(&word1.to_le_bytes());
        }
        bytes
    }
}

const fn reg_reg(opcode: u16, rd: Gpr, rr: Gpr) -> u16 {
    let rr = rr.encoding();
    opcode | ((rr & 0x10) << 5) | (rd.encoding() << 4) | (rr & 0x0F)
}

const fn reg(opcode: u16, rd: Gpr) -> u16 {
    opcode | (rd.encoding() << 4)
}

const fn high_imm(opcode: u16, mode: HighImm) -> u16 {
    let k = mode.k.bits();
    opcode | ((k & 0xF0) << 4) | (mode.rd.encoding() << 4) | (k & 0x0F)
}

const fn word_imm(opcode: u16, mode: WordImm) -> u16 {
    let k = mode.k.bits();
    opcode | ((k & 0x30) << 2) | (mode.rd.encoding() << 4) | (k & 0x0F)
}

const fn reg_bit(opcode: u16, mode: RegBit) -> u16 {
    opcode | (mode.rd.encoding() << 4) | mode.bit.bits()
}

const fn io_bit(opcode: u16, mode: IoBit) -> u16 {
    opcode | (mode.io.bits() << 3) | mode.bit.bits()
}

#[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
const fn short_branch(opcode: u16, bit: u16, displacement: i32) -> u16 {
    opcode | (((displacement as u16) & 0x7F) << 3) | bit
}

#[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
const fn long_branch(opcode: u16, displacement: i32) -> u16 {
    opcode | ((displacement as u16) & 0x0FFF)
}

const fn io_field(io: u16) -> u16 {
    ((io & 0x30) << 5) | (io & 0x0F)
}

/// Opcodes of the plain, post-increment and pre-decrement pointer forms.
///
/// Plain `Y` and `Z` accesses use the zero-displacement `LDD`/`STD` words.
const fn pointer_opcodes(load: bool, pointer: PointerRegister) -> [u16; 3] {
    let store = if load { 0 } else { 0x0200 };
    let [plain, post, pre] = match pointer {
        PointerRegister::X => [0x900C, 0x900D, 0x900E],
        PointerRegister::Y => [0x8008, 0x9009, 0x900A],
        PointerRegister::Z => [0x8000, 0x9001, 0x9002],
    };
    [plain | store, post | store, pre | store]
}

const fn alias_bit(instr: &Instr) -> u16 {
    match instr.mnemonic().status_alias() {
        Some((bit, _)) => bit as u16,
        None => 0,
    }
}

impl Instr {
    /// Encodes the instruction into its machine words.
    #[must_use]
    #[allow(clippy::too_many_lines)]
    pub fn encode(&self) -> EncodedInstr {
        let word = match *self {
            Self::Add(RegReg { rd, rr }) => reg_reg(0x0C00, rd, rr),
            Self::Adc(RegReg { rd, rr }) => reg_reg(0x1C00, rd, rr),
            Self::Sub(RegReg { rd, rr }) => reg_reg(0x1800, rd, rr),
            Self::Sbc(RegReg { rd, rr }) => reg_reg(0x0800, rd, rr),
            Self::And(RegReg { rd, rr }) => reg_reg(0x2000, rd, rr),
            Self::Or(RegReg { rd, rr }) => reg_reg(0x2800, rd, rr),
            Self::Eor(RegReg { rd, rr }) => reg_reg(0x2400, rd, rr),
            Self::Mov(RegReg { rd, rr }) => reg_reg(0x2C00, rd, rr),
            Self::Cp(RegReg { rd, rr }) => reg_reg(0x1400, rd, rr),
            Self::Cpc(RegReg { rd, rr }) => reg_reg(0x0400, rd, rr),
            Self::Cpse(RegReg { rd, rr }) => reg_reg(0x1000, rd, rr),
            Self::Mul(RegReg { rd, rr }) => reg_reg(0x9C00, rd, rr),
            Self::Movw(mode) => 0x0100 | (mode.rd.encoding() << 4) | mode.rr.encoding(),
            Self::Muls(mode) => 0x0200 | (mode.rd.encoding() << 4) | mode.rr.encoding(),
            Self::Mulsu(mode) => 0x0300 | (mode.rd.encoding() << 4) | mode.rr.encoding(),
            Self::Fmul(mode) => 0x0308 | (mode.rd.encoding() << 4) | mode.rr.encoding(),
            Self::Fmuls(mode) => 0x0380 | (mode.rd.encoding() << 4) | mode.rr.encoding(),
            Self::Fmulsu(mode) => 0x0388 | (mode.rd.encoding() << 4) | mode.rr.encoding(),
            Self::Com(mode) => reg(0x9400, mode.rd),
            Self::Neg(mode) => reg(0x9401, mode.rd),
            Self::Swap(mode) => reg(0x9402, mode.rd),
            Self::Inc(mode) => reg(0x9403, mode.rd),
            Self::Asr(mode) => reg(0x9405, mode.rd),
            Self::Lsr(mode) => reg(0x9406, mode.rd),
            Self::Ror(mode) => reg(0x9407, mode.rd),
            Self::Dec(mode) => reg(0x940A, mode.rd),
            Self::Push(mode) => reg(0x920F, mode.rd),
            Self::Pop(mode) => reg(0x900F, mode.rd),
            Self::Clr(mode) => reg_reg(0x2400, mode.rd, mode.rd),
            Self::Lsl(mode) => reg_reg(0x0C00, mode.rd, mode.rd),
            Self::Rol(mode) => reg_reg(0x1C00, mode.rd, mode.rd),
            Self::Tst(mode) => reg_reg(0x2000, mode.rd, mode.rd),
            Self::Cpi(mode) => high_imm(0x3000, mode),
            Self::Sbci(mode) => high_imm(0x4000, mode),
            Self::Subi(mode) => high_imm(0x5000, mode),
            Self::Ori(mode) | Self::Sbr(mode) => high_imm(0x6000, mode),
            Self::Andi(mode) => high_imm(0x7000, mode),
            Self::Cbr(mode) => {
                let k = !mode.k.bits() & 0xFF;
                0x7000 | ((k & 0xF0) << 4) | (mode.rd.encoding() << 4) | (k & 0x0F)
            }
            Self::Ldi(mode) => high_imm(0xE000, mode),
            Self::Ser(mode) => 0xEF0F | (mode.rd.encoding() << 4),
            Self::Adiw(mode) => word_imm(0x9600, mode),
            Self::Sbiw(mode) => word_imm(0x9700, mode),
            Self::Bld(mode) => reg_bit(0xF800, mode),
            Self::Bst(mode) => reg_bit(0xFA00, mode),
            Self::Sbrc(mode) => reg_bit(0xFC00, mode),
            Self::Sbrs(mode) => reg_bit(0xFE00, mode),
            Self::Cbi(mode) => io_bit(0x9800, mode),
            Self::Sbic(mode) => io_bit(0x9900, mode),
            Self::Sbi(mode) => io_bit(0x9A00, mode),
            Self::Sbis(mode) => io_bit(0x9B00, mode),
            Self::Bset(FlagBit { bit }) => 0x9408 | (bit.bits() << 4),
            Self::Bclr(FlagBit { bit }) => 0x9488 | (bit.bits() << 4),
            Self::Brbs(BitBranch { bit, target }) => {
                short_branch(0xF000, bit.bits(), target.displacement())
            }
            Self::Brbc(BitBranch { bit, target }) => {
                short_branch(0xF400, bit.bits(), target.displacement())
            }
            Self::Breq(Branch { target })
            | Self::Brcs(Branch { target })
            | Self::Brlo(Branch { target })
            | Self::Brmi(Branch { target })
            | Self::Brlt(Branch { target })
            | Self::Brhs(Branch { target })
            | Self::Brts(Branch { target })
            | Self::Brvs(Branch { target })
            | Self::Brie(Branch { target }) => {
                short_branch(0xF000, alias_bit(self), target.displacement())
            }
            Self::Brne(Branch { target })
            | Self::Brcc(Branch { target })
            | Self::Brsh(Branch { target })
            | Self::Brpl(Branch { target })
            | Self::Brge(Branch { target })
            | Self::Brhc(Branch { target })
            | Self::Brtc(Branch { target })
            | Self::Brvc(Branch { target })
            | Self::Brid(Branch { target }) => {
                short_branch(0xF400, alias_bit(self), target.displacement())
            }
            Self::Rjmp(mode) => long_branch(0xC000, mode.target.displacement()),
            Self::Rcall(mode) => long_branch(0xD000, mode.target.displacement()),
            Self::Jmp(mode) | Self::Call(mode) => {
                let opcode = if matches!(self, Self::Jmp(_)) { 0x940C } else { 0x940E };
                return absolute_jump(opcode, mode.target.word_address());
            }
            Self::In(mode) => 0xB000 | io_field(mode.io.bits()) | (mode.rd.encoding() << 4),
            Self::Out(mode) => 0xB800 | io_field(mode.io.bits()) | (mode.rr.encoding() << 4),
            Self::Ld(LdInd { rd, src }) => reg(pointer_opcodes(true, src.pointer())[0], rd),
            Self::LdPi(mode) => reg(pointer_opcodes(true, mode.src.pointer())[1], mode.rd),
            Self::LdPd(mode) => reg(pointer_opcodes(true, mode.src.pointer())[2], mode.rd),
            Self::St(StInd { dst, rr }) => reg(pointer_opcodes(false, dst.pointer())[0], rr),
            Self::StPi(mode) => reg(pointer_opcodes(false, mode.dst.pointer())[1], mode.rr),
            Self::StPd(mode) => reg(pointer_opcodes(false, mode.dst.pointer())[2], mode.rr),
            Self::Ldd(mode) => {
                0x8000
                    | mode.src.q_field()
                    | (mode.src.pointer.encoding() << 3)
                    | (mode.rd.encoding() << 4)
            }
            Self::Std(mode) => {
                0x8200
                    | mode.dst.q_field()
                    | (mode.dst.pointer.encoding() << 3)
                    | (mode.rr.encoding() << 4)
            }
            Self::Lds(mode) => return EncodedInstr::two(reg(0x9000, mode.rd), mode.addr.value()),
            Self::Sts(mode) => return EncodedInstr::two(reg(0x9200, mode.rr), mode.addr.value()),
            Self::LpmD(mode) => reg(0x9004, mode.rd),
            Self::LpmPi(mode) => reg(0x9005, mode.rd),
            Self::ElpmD(mode) => reg(0x9006, mode.rd),
            Self::ElpmPi(mode) => reg(0x9007, mode.rd),
            Self::Lpm(Implied {}) => 0x95C8,
            Self::Elpm(Implied {}) => 0x95D8,
            Self::Nop(Implied {}) => 0x0000,
            Self::Ret(Implied {}) => 0x9508,
            Self::Reti(Implied {}) => 0x9518,
            Self::Sleep(Implied {}) => 0x9588,
            Self::Break(Implied {}) => 0x9598,
            Self::Wdr(Implied {}) => 0x95A8,
            Self::Spm(Implied {}) => 0x95E8,
            Self::Ijmp(Implied {}) => 0x9409,
            Self::Eijmp(Implied {}) => 0x9419,
            Self::Icall(Implied {}) => 0x9509,
            Self::Eicall(Implied {}) => 0x9519,
            Self::Sec(Implied {})
            | Self::Sez(Implied {})
            | Self::Sen(Implied {})
            | Self::Sev(Implied {})
            | Self::Ses(Implied {})
            | Self::Seh(Implied {})
            | Self::Set(Implied {})
            | Self::Sei(Implied {}) => 0x9408 | (alias_bit(self) << 4),
            Self::Clc(Implied {})
            | Self::Clz(Implied {})
            | Self::Cln(Implied {})
            | Self::Clv(Implied {})
            | Self::Cls(Implied {})
            | Self::Clh(Implied {})
            | Self::Clt(Implied {})
            | Self::Cli(Implied {}) => 0x9488 | (alias_bit(self) << 4),
        };
        EncodedInstr::one(word)
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn absolute_jump(opcode: u16, target: u32) -> EncodedInstr {
    let high = (target >> 16) as u16;
    EncodedInstr::two(
        opcode | ((high & 0x3E) << 3) | (high & 0x01),
        (target & 0xFFFF) as u16,
    )
}
