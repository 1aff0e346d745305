//! Arithmetic and flag primitives shared by the ALU mnemonics.
//!
//! Every primitive returns the 8-bit result together with the flags it
//! computed and the mask of flags it owns; the caller merges them into
//! `SREG` with [`Sreg::with`]. `S` is always derived as `N ^ V`.

#![allow(clippy::cast_lossless)]

use crate::state::Sreg;

/// Result byte plus the status flags an operation replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AluResult {
    /// 8-bit result.
    pub value: u8,
    /// Computed flag values (only bits inside `mask` are meaningful).
    pub flags: Sreg,
    /// Flags replaced by this operation.
    pub mask: Sreg,
}

impl AluResult {
    /// Merges the computed flags into `sreg`.
    #[must_use]
    pub const fn apply(self, sreg: Sreg) -> Sreg {
        sreg.with(self.mask, self.flags)
    }
}

const fn bit(value: u8, n: u8) -> bool {
    (value >> n) & 1 == 1
}

const fn nzs(flags: Sreg, value: u8, overflow: bool) -> Sreg {
    let negative = bit(value, 7);
    flags
        .assign(Sreg::N, negative)
        .assign(Sreg::Z, value == 0)
        .assign(Sreg::V, overflow)
        .assign(Sreg::S, negative ^ overflow)
}

/// `a + b + carry` with `H S V N Z C`.
#[must_use]
pub const fn perform_addition(a: u8, b: u8, carry: bool) -> AluResult {
    let value = a.wrapping_add(b).wrapping_add(carry as u8);
    let (a3, b3, r3) = (bit(a, 3), bit(b, 3), bit(value, 3));
    let (a7, b7, r7) = (bit(a, 7), bit(b, 7), bit(value, 7));
    let half = (a3 && b3) || (b3 && !r3) || (!r3 && a3);
    let carry = (a7 && b7) || (b7 && !r7) || (!r7 && a7);
    let overflow = (a7 && b7 && !r7) || (!a7 && !b7 && r7);
    AluResult {
        value,
        flags: nzs(Sreg::empty(), value, overflow)
            .assign(Sreg::H, half)
            .assign(Sreg::C, carry),
        mask: Sreg::ARITHMETIC,
    }
}

/// `a - b - carry` with `H S V N Z C`.
#[must_use]
pub const fn perform_subtraction(a: u8, b: u8, carry: bool) -> AluResult {
    let value = a.wrapping_sub(b).wrapping_sub(carry as u8);
    let (a3, b3, r3) = (bit(a, 3), bit(b, 3), bit(value, 3));
    let (a7, b7, r7) = (bit(a, 7), bit(b, 7), bit(value, 7));
    let half = (!a3 && b3) || (b3 && r3) || (r3 && !a3);
    let borrow = (!a7 && b7) || (b7 && r7) || (r7 && !a7);
    let overflow = (a7 && !b7 && !r7) || (!a7 && b7 && r7);
    AluResult {
        value,
        flags: nzs(Sreg::empty(), value, overflow)
            .assign(Sreg::H, half)
            .assign(Sreg::C, borrow),
        mask: Sreg::ARITHMETIC,
    }
}

/// Subtraction for the multi-byte forms (`CPC`, `SBC`, `SBCI`): `Z` stays
/// set only if it was already set and this byte is zero too.
#[must_use]
pub const fn perform_subtraction_pz(a: u8, b: u8, carry: bool, previous_zero: bool) -> AluResult {
    let result = perform_subtraction(a, b, carry);
    let zero = previous_zero && result.value == 0;
    AluResult {
        flags: result.flags.assign(Sreg::Z, zero),
        ..result
    }
}

/// Shift left, `injected` entering bit 0 (`LSL` injects 0, `ROL` the carry).
#[must_use]
pub const fn perform_left_shift(value: u8, injected: bool) -> AluResult {
    let result = (value << 1) | injected as u8;
    let carry = bit(value, 7);
    let negative = bit(result, 7);
    AluResult {
        value: result,
        flags: nzs(Sreg::empty(), result, negative ^ carry)
            .assign(Sreg::H, bit(value, 3))
            .assign(Sreg::C, carry),
        mask: Sreg::ARITHMETIC,
    }
}

/// Shift right, `injected` entering bit 7 (`LSR` injects 0, `ROR` the
/// carry, `ASR` the old sign bit). `H` is untouched.
#[must_use]
pub const fn perform_right_shift(value: u8, injected: bool) -> AluResult {
    let result = (value >> 1) | ((injected as u8) << 7);
    let carry = bit(value, 0);
    let negative = bit(result, 7);
    AluResult {
        value: result,
        flags: nzs(Sreg::empty(), result, negative ^ carry).assign(Sreg::C, carry),
        mask: Sreg::S
            .union(Sreg::V)
            .union(Sreg::N)
            .union(Sreg::Z)
            .union(Sreg::C),
    }
}

/// Logic result flags: `S V N Z` with `V` cleared.
#[must_use]
pub const fn logic_flags(value: u8) -> AluResult {
    AluResult {
        value,
        flags: nzs(Sreg::empty(), value, false),
        mask: Sreg::S.union(Sreg::V).union(Sreg::N).union(Sreg::Z),
    }
}

/// Increment (`V` set on `0x7f -> 0x80`); `C` and `H` untouched.
#[must_use]
pub const fn perform_increment(value: u8) -> AluResult {
    let result = value.wrapping_add(1);
    AluResult {
        value: result,
        flags: nzs(Sreg::empty(), result, result == 0x80),
        ..logic_flags(result)
    }
}

/// Decrement (`V` set on `0x80 -> 0x7f`); `C` and `H` untouched.
#[must_use]
pub const fn perform_decrement(value: u8) -> AluResult {
    let result = value.wrapping_sub(1);
    AluResult {
        value: result,
        flags: nzs(Sreg::empty(), result, result == 0x7F),
        ..logic_flags(result)
    }
}

/// One's complement: `C` set, `V` cleared.
#[must_use]
pub const fn perform_complement(value: u8) -> AluResult {
    let result = !value;
    AluResult {
        value: result,
        flags: nzs(Sreg::C, result, false),
        mask: logic_flags(result).mask.union(Sreg::C),
    }
}

/// 16-bit result of `ADIW`/`SBIW` with its `S V N Z C` flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WordResult {
    /// 16-bit result.
    pub value: u16,
    /// Computed flags.
    pub flags: Sreg,
}

/// Flags replaced by the word arithmetic forms.
pub const WORD_FLAGS: Sreg = Sreg::S
    .union(Sreg::V)
    .union(Sreg::N)
    .union(Sreg::Z)
    .union(Sreg::C);

/// `word + k` (`ADIW`).
#[must_use]
pub const fn perform_word_addition(word: u16, k: u16) -> WordResult {
    let value = word.wrapping_add(k);
    let high7 = word & 0x8000 != 0;
    let r15 = value & 0x8000 != 0;
    let overflow = !high7 && r15;
    WordResult {
        value,
        flags: Sreg::empty()
            .assign(Sreg::N, r15)
            .assign(Sreg::V, overflow)
            .assign(Sreg::S, r15 ^ overflow)
            .assign(Sreg::Z, value == 0)
            .assign(Sreg::C, !r15 && high7),
    }
}

/// `word - k` (`SBIW`).
#[must_use]
pub const fn perform_word_subtraction(word: u16, k: u16) -> WordResult {
    let value = word.wrapping_sub(k);
    let high7 = word & 0x8000 != 0;
    let r15 = value & 0x8000 != 0;
    let overflow = high7 && !r15;
    WordResult {
        value,
        flags: Sreg::empty()
            .assign(Sreg::N, r15)
            .assign(Sreg::V, overflow)
            .assign(Sreg::S, r15 ^ overflow)
            .assign(Sreg::Z, value == 0)
            .assign(Sreg::C, r15 && !high7),
    }
}

/// Operand signedness of the multiply family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signedness {
    /// Both factors unsigned.
    Unsigned,
    /// Both factors signed.
    Signed,
    /// Signed left factor, unsigned right factor.
    SignedUnsigned,
}

/// 16-bit product destined for `r1:r0`, with `Z` and `C`.
///
/// `fractional` shifts the product left once (`FMUL*`); `C` is bit 15 of
/// the product before that shift.
#[must_use]
#[allow(
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::cast_possible_truncation
)]
pub const fn perform_multiply(a: u8, b: u8, signedness: Signedness, fractional: bool) -> WordResult {
    let product = match signedness {
        Signedness::Unsigned => (a as i32) * (b as i32),
        Signedness::Signed => (a as i8 as i32) * (b as i8 as i32),
        Signedness::SignedUnsigned => (a as i8 as i32) * (b as i32),
    } as u16;
    let carry = product & 0x8000 != 0;
    let value = if fractional { product << 1 } else { product };
    WordResult {
        value,
        flags: Sreg::empty()
            .assign(Sreg::Z, value == 0)
            .assign(Sreg::C, carry),
    }
}

/// Flags replaced by the multiply family.
pub const MULTIPLY_FLAGS: Sreg = Sreg::Z.union(Sreg::C);

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::{
        perform_addition, perform_complement, perform_decrement, perform_increment,
        perform_left_shift, perform_multiply, perform_right_shift, perform_subtraction,
        perform_subtraction_pz, perform_word_addition, perform_word_subtraction, Signedness,
    };
    use crate::state::Sreg;

    #[test]
    fn addition_sets_half_carry_and_overflow() {
        let r = perform_addition(0x0F, 0x01, false);
        assert_eq!(r.value, 0x10);
        assert!(r.flags.contains(Sreg::H));
        assert!(!r.flags.contains(Sreg::C));

        let r = perform_addition(0x7F, 0x01, false);
        assert_eq!(r.value, 0x80);
        assert!(r.flags.contains(Sreg::V | Sreg::N));
        assert!(!r.flags.contains(Sreg::S));

        let r = perform_addition(0xFF, 0x00, true);
        assert_eq!(r.value, 0);
        assert!(r.flags.contains(Sreg::Z | Sreg::C | Sreg::H));
    }

    #[test]
    fn addition_flag_law_holds_for_every_input() {
        for carry in [false, true] {
            for a in 0..=u8::MAX {
                for b in 0..=u8::MAX {
                    let r = perform_addition(a, b, carry);
                    let sum = u16::from(a) + u16::from(b) + u16::from(carry);
                    assert_eq!(u16::from(r.value), sum % 256);
                    assert_eq!(r.flags.contains(Sreg::Z), sum % 256 == 0, "{a}+{b}+{carry}");
                    assert_eq!(r.flags.contains(Sreg::C), sum >= 256, "{a}+{b}+{carry}");
                    assert_eq!(
                        r.flags.contains(Sreg::S),
                        r.flags.contains(Sreg::N) ^ r.flags.contains(Sreg::V)
                    );
                }
            }
        }
    }

    proptest! {
        #[test]
        fn left_shift_matches_adding_a_byte_to_itself(value: u8, carry: bool) {
            prop_assert_eq!(
                perform_left_shift(value, carry),
                perform_addition(value, value, carry)
            );
        }
    }

    #[test]
    fn subtraction_borrows() {
        let r = perform_subtraction(0x00, 0x01, false);
        assert_eq!(r.value, 0xFF);
        assert!(r.flags.contains(Sreg::C | Sreg::H | Sreg::N | Sreg::S));
        assert!(!r.flags.contains(Sreg::V));

        let r = perform_subtraction(0x80, 0x01, false);
        assert_eq!(r.value, 0x7F);
        assert!(r.flags.contains(Sreg::V | Sreg::S));
    }

    #[test]
    fn carried_subtraction_keeps_zero_only_if_already_zero() {
        assert!(!perform_subtraction_pz(5, 5, false, false).flags.contains(Sreg::Z));
        assert!(perform_subtraction_pz(5, 5, false, true).flags.contains(Sreg::Z));
        assert!(!perform_subtraction_pz(6, 5, false, true).flags.contains(Sreg::Z));
    }

    #[test]
    fn shifts_inject_the_requested_bit() {
        let r = perform_left_shift(0x81, true);
        assert_eq!(r.value, 0x03);
        assert!(r.flags.contains(Sreg::C | Sreg::V));

        let r = perform_right_shift(0x01, false);
        assert_eq!(r.value, 0);
        assert!(r.flags.contains(Sreg::Z | Sreg::C | Sreg::V | Sreg::S));
        assert!(!r.mask.contains(Sreg::H));

        assert_eq!(perform_right_shift(0x80, true).value, 0xC0);
    }

    #[test]
    fn increment_and_decrement_leave_carry_alone() {
        let r = perform_increment(0x7F);
        assert!(r.flags.contains(Sreg::V));
        assert!(!r.mask.contains(Sreg::C));
        assert!(perform_decrement(0x80).flags.contains(Sreg::V));
        assert!(perform_decrement(0x01).flags.contains(Sreg::Z));
    }

    #[test]
    fn complement_always_sets_carry() {
        let r = perform_complement(0xFF);
        assert_eq!(r.value, 0);
        assert!(r.flags.contains(Sreg::C | Sreg::Z));
    }

    #[test]
    fn word_arithmetic_carries_out_of_bit_fifteen() {
        let r = perform_word_addition(0xFFFF, 1);
        assert_eq!(r.value, 0);
        assert!(r.flags.contains(Sreg::Z | Sreg::C));
        let r = perform_word_subtraction(0x0000, 1);
        assert_eq!(r.value, 0xFFFF);
        assert!(r.flags.contains(Sreg::C | Sreg::N));
        assert!(perform_word_addition(0x7FFF, 1).flags.contains(Sreg::V));
    }

    #[test]
    fn multiply_variants() {
        assert_eq!(perform_multiply(0xFF, 0xFF, Signedness::Unsigned, false).value, 0xFE01);
        let signed = perform_multiply(0xFF, 0x02, Signedness::Signed, false);
        assert_eq!(signed.value, 0xFFFE);
        assert!(signed.flags.contains(Sreg::C));
        assert_eq!(
            perform_multiply(0xFF, 0x02, Signedness::SignedUnsigned, false).value,
            0xFFFE
        );
        let fractional = perform_multiply(0x80, 0x80, Signedness::Unsigned, true);
        assert_eq!(fractional.value, 0x8000);
        assert!(!fractional.flags.contains(Sreg::C));
    }
}
