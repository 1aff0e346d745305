//! Status register (`SREG`) flags.
//!
//! The flags live in the `SREG` I/O storage byte of the memory segment;
//! [`Sreg`] is the typed view the interpreter works with.

use bitflags::bitflags;

bitflags! {
    /// Status register bits, most significant first: `I T H S V N Z C`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Sreg: u8 {
        /// Global interrupt enable.
        const I = 1 << 7;
        /// Bit copy storage.
        const T = 1 << 6;
        /// Half carry (carry out of bit 3).
        const H = 1 << 5;
        /// Sign, always `N ^ V`.
        const S = 1 << 4;
        /// Two's complement overflow.
        const V = 1 << 3;
        /// Negative.
        const N = 1 << 2;
        /// Zero.
        const Z = 1 << 1;
        /// Carry.
        const C = 1 << 0;
    }
}

/// Flags in status-bit order (`BSET`/`BCLR`/`BRBS`/`BRBC` bit number is the index).
pub const SREG_BITS: [Sreg; 8] = [
    Sreg::C,
    Sreg::Z,
    Sreg::N,
    Sreg::V,
    Sreg::S,
    Sreg::H,
    Sreg::T,
    Sreg::I,
];

impl Sreg {
    /// Flag for a status bit number (`0` = `C` … `7` = `I`).
    #[must_use]
    pub const fn from_bit(bit: u8) -> Self {
        SREG_BITS[(bit & 7) as usize]
    }

    /// Arithmetic flags replaced by an ALU result.
    pub const ARITHMETIC: Self = Self::H
        .union(Self::S)
        .union(Self::V)
        .union(Self::N)
        .union(Self::Z)
        .union(Self::C);

    /// Replaces the flags in `mask` with those set in `values`.
    #[must_use]
    pub const fn with(self, mask: Self, values: Self) -> Self {
        self.difference(mask).union(values.intersection(mask))
    }

    /// Sets or clears `flag` according to `value`.
    #[must_use]
    pub const fn assign(self, flag: Self, value: bool) -> Self {
        if value {
            self.union(flag)
        } else {
            self.difference(flag)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Sreg, SREG_BITS};

    #[test]
    fn bit_numbers_match_packed_positions() {
        for (bit, flag) in SREG_BITS.iter().enumerate() {
            assert_eq!(flag.bits(), 1 << bit);
            assert_eq!(Sreg::from_bit(u8::try_from(bit).expect("< 8")), *flag);
        }
    }

    #[test]
    fn masked_update_leaves_other_flags() {
        let sreg = Sreg::I | Sreg::T | Sreg::C;
        let updated = sreg.with(Sreg::ARITHMETIC, Sreg::Z | Sreg::I);
        assert_eq!(updated, Sreg::I | Sreg::T | Sreg::Z);
        assert_eq!(updated.assign(Sreg::T, false), Sreg::I | Sreg::Z);
    }
}
