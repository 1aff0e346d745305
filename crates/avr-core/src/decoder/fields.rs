//! Bit-field readers over the instruction window.
//!
//! Multi-part fields are assembled by OR-ing independently shifted and
//! masked sub-fields; shift amounts follow the architecture manual.

use crate::operand::{
    DataAddr, Displacement, EvenGpr, Gpr, HighGpr, Imm3, Imm5, Imm6, Imm8, LongRel, MidGpr,
    ProgramAddr, ShortRel, WordGpr, YzPointer,
};

/// The words a single decode reads, plus the address they were fetched from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    /// Opcode word.
    pub word0: u16,
    /// Following word; zero when absent (only read by 4-byte binders).
    pub word1: u16,
    /// Byte address of `word0`.
    pub pc: u32,
}

/// Sign-extends the low `bits` bits of `value`; `bits` is `1..=32`.
#[must_use]
#[allow(clippy::cast_possible_wrap)]
pub const fn sign_extend(value: u32, bits: u32) -> i32 {
    debug_assert!(bits >= 1 && bits <= 32);
    ((value << (32 - bits)) as i32) >> (32 - bits)
}

/// `.... ...d dddd ....`
pub const fn rd5(w: &Window) -> Gpr {
    Gpr::from_encoding(w.word0 >> 4)
}

/// `.... ..r. .... rrrr`
pub const fn rr5(w: &Window) -> Gpr {
    Gpr::from_encoding(((w.word0 >> 5) & 0x10) | (w.word0 & 0x0F))
}

/// `.... .... dddd ....` for `r16`..`r31`.
pub const fn rd4(w: &Window) -> HighGpr {
    HighGpr::from_encoding(w.word0 >> 4)
}

/// `.... .... .... rrrr` for `r16`..`r31`.
pub const fn rr4(w: &Window) -> HighGpr {
    HighGpr::from_encoding(w.word0)
}

/// `.... .... .ddd ....` for `r16`..`r23`.
pub const fn rd3(w: &Window) -> MidGpr {
    MidGpr::from_encoding(w.word0 >> 4)
}

/// `.... .... .... .rrr` for `r16`..`r23`.
pub const fn rr3(w: &Window) -> MidGpr {
    MidGpr::from_encoding(w.word0)
}

/// `.... .... dddd ....` as a register pair.
pub const fn pair_d(w: &Window) -> EvenGpr {
    EvenGpr::from_encoding(w.word0 >> 4)
}

/// `.... .... .... rrrr` as a register pair.
pub const fn pair_r(w: &Window) -> EvenGpr {
    EvenGpr::from_encoding(w.word0)
}

/// `.... .... ..dd ....` of `ADIW`/`SBIW`.
pub const fn word_reg(w: &Window) -> WordGpr {
    WordGpr::from_encoding(w.word0 >> 4)
}

/// `.... .... KK.. KKKK` of `ADIW`/`SBIW`.
pub const fn k6(w: &Window) -> Imm6 {
    Imm6::from_bits((((w.word0 >> 2) & 0x30) | (w.word0 & 0x0F)) as i32)
}

/// `.... KKKK .... KKKK`
pub const fn k8(w: &Window) -> Imm8 {
    Imm8::from_bits((((w.word0 >> 4) & 0xF0) | (w.word0 & 0x0F)) as i32)
}

/// `.... .... .... .bbb`
pub const fn bit(w: &Window) -> Imm3 {
    Imm3::from_bits((w.word0 & 0x07) as i32)
}

/// `.... .... AAAA A...` of the bit-addressable I/O instructions.
pub const fn io5(w: &Window) -> Imm5 {
    Imm5::from_bits(((w.word0 >> 3) & 0x1F) as i32)
}

/// `.... .AA. .... AAAA` of `IN`/`OUT`.
pub const fn io6(w: &Window) -> Imm6 {
    Imm6::from_bits((((w.word0 >> 5) & 0x30) | (w.word0 & 0x0F)) as i32)
}

/// `..q. qq.. .... .qqq` of `LDD`/`STD`.
pub const fn q6(w: &Window) -> Imm6 {
    let word = w.word0;
    Imm6::from_bits((((word >> 8) & 0x20) | ((word >> 7) & 0x18) | (word & 0x07)) as i32)
}

/// `.... .... .... y...` selecting `Y` (1) or `Z` (0).
pub const fn yz(w: &Window) -> YzPointer {
    YzPointer::from_encoding(w.word0 >> 3)
}

/// Base pointer and offset of `LDD`/`STD`.
pub const fn displacement(w: &Window) -> Displacement {
    Displacement::new(yz(w), q6(w))
}

/// `.... ..kk kkkk k...` signed branch displacement.
pub fn k7(w: &Window) -> ShortRel {
    ShortRel::from_bits(sign_extend(u32::from((w.word0 >> 3) & 0x7F), 7), w.pc)
}

/// `.... kkkk kkkk kkkk` signed jump displacement.
pub fn k12(w: &Window) -> LongRel {
    LongRel::from_bits(sign_extend(u32::from(w.word0 & 0x0FFF), 12), w.pc)
}

/// `.... ...k kkkk ...k` + second word: 22-bit absolute word address.
pub const fn k22(w: &Window) -> ProgramAddr {
    let high = (((w.word0 >> 3) & 0x3E) | (w.word0 & 0x01)) as u32;
    ProgramAddr::from_bits((high << 16) | w.word1 as u32)
}

/// Second word as a data address.
pub const fn k16(w: &Window) -> DataAddr {
    DataAddr::new(w.word1)
}
