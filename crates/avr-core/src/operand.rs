//! Operand variants.
//!
//! Every operand kind is its own type because instructions constrain which
//! subset is legal: `LDI` takes a [`HighGpr`] and an [`Imm8`], `MOVW` two
//! [`EvenGpr`]s. Checked constructors (`new`) return [`OperandError`];
//! the decoder uses the `from_bits`/`from_encoding` constructors on masked
//! fields, which panic on a violated range because that can only be a
//! table bug.

use std::fmt;

use crate::fault::OperandError;
use crate::symbol::{PointerRegister, Register, RegisterGroup};

macro_rules! register_operand {
    (
        $(#[$doc:meta])*
        $name:ident, $group:ident, mask = $mask:expr,
        encode = |$n:ident| $encode:expr,
        decode = |$e:ident| $decode:expr
    ) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
        pub struct $name(Register);

        impl $name {
            /// Wraps `register` if it belongs to this operand's register group.
            ///
            /// # Errors
            ///
            /// Returns [`OperandError::RegisterNotInGroup`] otherwise.
            pub const fn new(register: Register) -> Result<Self, OperandError> {
                if register.is_in(RegisterGroup::$group) {
                    Ok(Self(register))
                } else {
                    Err(OperandError::RegisterNotInGroup {
                        register,
                        group: RegisterGroup::$group,
                    })
                }
            }

            /// Decodes the register from its encoding field; bits outside the field are ignored.
            #[must_use]
            pub const fn from_encoding(bits: u16) -> Self {
                let $e = (bits & $mask) as u8;
                Self(Register::ALL[($decode) as usize])
            }

            /// Value placed in the instruction's encoding field.
            #[must_use]
            pub const fn encoding(self) -> u16 {
                let $n = self.0.number();
                ($encode) as u16
            }

            /// The wrapped register symbol.
            #[must_use]
            pub const fn register(self) -> Register {
                self.0
            }
        }

        impl From<$name> for Operand {
            fn from(value: $name) -> Self {
                Self::Register(value.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

register_operand! {
    /// Any general-purpose register (5-bit field).
    Gpr, General, mask = 0x1F,
    encode = |n| n,
    decode = |e| e
}

register_operand! {
    /// `r16`..`r31`, encoded as `n - 16` in a 4-bit field.
    HighGpr, High, mask = 0x0F,
    encode = |n| n - 16,
    decode = |e| e + 16
}

register_operand! {
    /// `r16`..`r23`, encoded as `n - 16` in a 3-bit field.
    MidGpr, Mid, mask = 0x07,
    encode = |n| n - 16,
    decode = |e| e + 16
}

register_operand! {
    /// Even register naming a pair, encoded as `n / 2` in a 4-bit field.
    EvenGpr, Even, mask = 0x0F,
    encode = |n| n / 2,
    decode = |e| e * 2
}

register_operand! {
    /// `r24`, `r26`, `r28` or `r30`, encoded as `(n - 24) / 2` in a 2-bit field.
    WordGpr, Word, mask = 0x03,
    encode = |n| (n - 24) / 2,
    decode = |e| 24 + e * 2
}

/// Integer immediate constrained to `[LOW, HIGH]` for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Imm<const LOW: i32, const HIGH: i32>(i32);

impl<const LOW: i32, const HIGH: i32> Imm<LOW, HIGH> {
    /// Inclusive lower bound.
    pub const MIN: i32 = LOW;
    /// Inclusive upper bound.
    pub const MAX: i32 = HIGH;

    /// Range-checked construction.
    ///
    /// # Errors
    ///
    /// Returns [`OperandError::ImmediateOutOfRange`] when `value` is outside the range.
    pub const fn new(value: i32) -> Result<Self, OperandError> {
        if value >= LOW && value <= HIGH {
            Ok(Self(value))
        } else {
            Err(OperandError::ImmediateOutOfRange {
                value: value as i64,
                low: LOW as i64,
                high: HIGH as i64,
            })
        }
    }

    /// Construction from an already-masked bit field.
    ///
    /// # Panics
    ///
    /// Panics when `value` is outside the range, which means the field mask is wrong.
    #[must_use]
    pub const fn from_bits(value: i32) -> Self {
        assert!(value >= LOW && value <= HIGH, "immediate field out of range");
        Self(value)
    }

    /// The immediate value.
    #[must_use]
    pub const fn value(self) -> i32 {
        self.0
    }

    /// The value as an unsigned bit field of the encoding.
    #[must_use]
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    pub const fn bits(self) -> u16 {
        self.0 as u16
    }
}

impl<const LOW: i32, const HIGH: i32> From<Imm<LOW, HIGH>> for Operand {
    fn from(value: Imm<LOW, HIGH>) -> Self {
        Self::Immediate(value.0)
    }
}

impl<const LOW: i32, const HIGH: i32> fmt::Display for Imm<LOW, HIGH> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Bit number (`0..=7`).
pub type Imm3 = Imm<0, 7>;
/// Low I/O address reachable by the bit instructions (`0..=31`).
pub type Imm5 = Imm<0, 31>;
/// I/O address, displacement or word constant (`0..=63`).
pub type Imm6 = Imm<0, 63>;
/// Byte constant (`0..=255`).
pub type Imm8 = Imm<0, 255>;

/// Largest word address a 22-bit `JMP`/`CALL` field can hold.
pub const PROGRAM_ADDR_MAX: u32 = 0x3F_FFFF;

/// Absolute program address as carried by `JMP`/`CALL` (a word address).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ProgramAddr(u32);

impl ProgramAddr {
    /// Range-checked construction from a word address.
    ///
    /// # Errors
    ///
    /// Returns [`OperandError::ImmediateOutOfRange`] above 22 bits.
    pub const fn new(word_address: u32) -> Result<Self, OperandError> {
        if word_address <= PROGRAM_ADDR_MAX {
            Ok(Self(word_address))
        } else {
            Err(OperandError::ImmediateOutOfRange {
                value: word_address as i64,
                low: 0,
                high: PROGRAM_ADDR_MAX as i64,
            })
        }
    }

    /// Construction from the decoded 22-bit field.
    ///
    /// # Panics
    ///
    /// Panics when the field is wider than 22 bits.
    #[must_use]
    pub const fn from_bits(word_address: u32) -> Self {
        assert!(word_address <= PROGRAM_ADDR_MAX, "program address field out of range");
        Self(word_address)
    }

    /// Word address as encoded.
    #[must_use]
    pub const fn word_address(self) -> u32 {
        self.0
    }

    /// Byte address the program counter takes.
    #[must_use]
    pub const fn byte_address(self) -> u32 {
        self.0 * 2
    }
}

impl From<ProgramAddr> for Operand {
    fn from(value: ProgramAddr) -> Self {
        Self::ProgramAddress(value.byte_address())
    }
}

/// Absolute data-space address carried by `LDS`/`STS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct DataAddr(u16);

impl DataAddr {
    /// Wraps a 16-bit data address; every value is legal.
    #[must_use]
    pub const fn new(addr: u16) -> Self {
        Self(addr)
    }

    /// The data address.
    #[must_use]
    pub const fn value(self) -> u16 {
        self.0
    }
}

impl From<DataAddr> for Operand {
    fn from(value: DataAddr) -> Self {
        Self::DataAddress(value.0)
    }
}

/// PC-relative displacement (in words) together with the byte address it resolves to.
///
/// The target is computed for display from the address the instruction was
/// decoded at; execution recomputes it from the live next-PC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Relative<const LOW: i32, const HIGH: i32> {
    displacement: Imm<LOW, HIGH>,
    target: u32,
}

impl<const LOW: i32, const HIGH: i32> Relative<LOW, HIGH> {
    /// Range-checked construction for an instruction located at byte address `pc`.
    ///
    /// # Errors
    ///
    /// Returns [`OperandError::ImmediateOutOfRange`] when the displacement does not fit.
    pub fn new(displacement: i32, pc: u32) -> Result<Self, OperandError> {
        let displacement = Imm::new(displacement)?;
        Ok(Self {
            displacement,
            target: resolve_relative(pc, displacement.value()),
        })
    }

    /// Construction from an already sign-extended field.
    ///
    /// # Panics
    ///
    /// Panics when the displacement is outside the field range.
    #[must_use]
    pub fn from_bits(displacement: i32, pc: u32) -> Self {
        Self {
            displacement: Imm::from_bits(displacement),
            target: resolve_relative(pc, displacement),
        }
    }

    /// Signed displacement in words.
    #[must_use]
    pub const fn displacement(self) -> i32 {
        self.displacement.value()
    }

    /// Byte address the branch lands on when taken.
    #[must_use]
    pub const fn target(self) -> u32 {
        self.target
    }
}

impl<const LOW: i32, const HIGH: i32> From<Relative<LOW, HIGH>> for Operand {
    fn from(value: Relative<LOW, HIGH>) -> Self {
        Self::Relative {
            displacement: value.displacement(),
            target: value.target,
        }
    }
}

/// Byte address reached by a one-word relative transfer located at `pc`.
#[must_use]
pub const fn resolve_relative(pc: u32, displacement: i32) -> u32 {
    pc.wrapping_add(2).wrapping_add_signed(displacement * 2)
}

/// 7-bit conditional-branch displacement.
pub type ShortRel = Relative<-64, 63>;
/// 12-bit `RJMP`/`RCALL` displacement.
pub type LongRel = Relative<-2048, 2047>;

/// Side effect attached to reading a pointer operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum PointerMode {
    /// Read the pointer unchanged.
    Plain,
    /// Read, then increment the pointer.
    PostIncrement,
    /// Decrement the pointer, then read it.
    PreDecrement,
}

macro_rules! pointer_operand {
    ($(#[$doc:meta])* $name:ident, $mode:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
        pub struct $name(PointerRegister);

        impl $name {
            /// Wraps a pointer register; `X`, `Y` and `Z` are all legal.
            #[must_use]
            pub const fn new(pointer: PointerRegister) -> Self {
                Self(pointer)
            }

            /// The wrapped pointer register.
            #[must_use]
            pub const fn pointer(self) -> PointerRegister {
                self.0
            }

            /// Side effect of reading this operand.
            #[must_use]
            pub const fn mode(self) -> PointerMode {
                PointerMode::$mode
            }
        }

        impl From<$name> for Operand {
            fn from(value: $name) -> Self {
                Self::Pointer {
                    pointer: value.0,
                    mode: PointerMode::$mode,
                }
            }
        }
    };
}

pointer_operand! {
    /// `X`, `Y` or `Z` read unchanged.
    Indirect, Plain
}

pointer_operand! {
    /// `X+`, `Y+` or `Z+`: read then increment.
    PostIncrement, PostIncrement
}

pointer_operand! {
    /// `-X`, `-Y` or `-Z`: decrement then read.
    PreDecrement, PreDecrement
}

/// `Y` or `Z`, the only pointers with a displacement form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct YzPointer(PointerRegister);

impl YzPointer {
    /// Wraps `Y` or `Z`.
    ///
    /// # Errors
    ///
    /// Returns [`OperandError::PointerNotAllowed`] for `X`.
    pub const fn new(pointer: PointerRegister) -> Result<Self, OperandError> {
        match pointer {
            PointerRegister::X => Err(OperandError::PointerNotAllowed { pointer }),
            PointerRegister::Y | PointerRegister::Z => Ok(Self(pointer)),
        }
    }

    /// Decodes the `y` bit of the displacement encodings (1 = `Y`).
    #[must_use]
    pub const fn from_encoding(bit: u16) -> Self {
        if bit & 1 == 1 {
            Self(PointerRegister::Y)
        } else {
            Self(PointerRegister::Z)
        }
    }

    /// The `y` bit placed in the encoding.
    #[must_use]
    pub const fn encoding(self) -> u16 {
        match self.0 {
            PointerRegister::Y => 1,
            PointerRegister::X | PointerRegister::Z => 0,
        }
    }

    /// The wrapped pointer register.
    #[must_use]
    pub const fn pointer(self) -> PointerRegister {
        self.0
    }
}

/// `Y+q` / `Z+q` operand of `LDD` and `STD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Displacement {
    /// Base pointer.
    pub pointer: YzPointer,
    /// Unsigned byte offset added to the pointer.
    pub offset: Imm6,
}

impl Displacement {
    /// Pairs a base pointer with its offset.
    #[must_use]
    pub const fn new(pointer: YzPointer, offset: Imm6) -> Self {
        Self { pointer, offset }
    }

    /// Packs the offset into the split `q` field (`..q. qq.. .... .qqq`).
    #[must_use]
    pub const fn q_field(self) -> u16 {
        let q = self.offset.bits();
        ((q & 0x20) << 8) | ((q & 0x18) << 7) | (q & 0x07)
    }
}

impl From<Displacement> for Operand {
    fn from(value: Displacement) -> Self {
        Self::Displaced {
            pointer: value.pointer.pointer(),
            displacement: value.offset.value(),
        }
    }
}

/// The fixed `Z` operand of `LPM rd, Z` and `ELPM rd, Z`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ZIndirect;

impl From<ZIndirect> for Operand {
    fn from(_: ZIndirect) -> Self {
        Self::Pointer {
            pointer: PointerRegister::Z,
            mode: PointerMode::Plain,
        }
    }
}

/// The fixed `Z+` operand of `LPM rd, Z+` and `ELPM rd, Z+`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ZPostIncrement;

impl From<ZPostIncrement> for Operand {
    fn from(_: ZPostIncrement) -> Self {
        Self::Pointer {
            pointer: PointerRegister::Z,
            mode: PointerMode::PostIncrement,
        }
    }
}

/// Operand-kind-agnostic view used by disassembly and static analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand {
    /// A single 8-bit register.
    Register(Register),
    /// A pointer register with its access side effect.
    Pointer {
        /// Pointer register read.
        pointer: PointerRegister,
        /// Side effect of the read.
        mode: PointerMode,
    },
    /// Pointer plus constant displacement (`Y+q`).
    Displaced {
        /// `Y` or `Z`.
        pointer: PointerRegister,
        /// Unsigned displacement.
        displacement: i32,
    },
    /// Constant.
    Immediate(i32),
    /// Absolute program byte address.
    ProgramAddress(u32),
    /// Absolute data address.
    DataAddress(u16),
    /// PC-relative target.
    Relative {
        /// Signed displacement in words.
        displacement: i32,
        /// Resolved byte address.
        target: u32,
    },
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Register(reg) => write!(f, "{reg}"),
            Self::Pointer { pointer, mode } => match mode {
                PointerMode::Plain => write!(f, "{pointer}"),
                PointerMode::PostIncrement => write!(f, "{pointer}+"),
                PointerMode::PreDecrement => write!(f, "-{pointer}"),
            },
            Self::Displaced {
                pointer,
                displacement,
            } => write!(f, "{pointer}+{displacement}"),
            Self::Immediate(value) => write!(f, "{value}"),
            Self::ProgramAddress(addr) => write!(f, "{addr:#08x}"),
            Self::DataAddress(addr) => write!(f, "{addr:#06x}"),
            Self::Relative { displacement, .. } => write!(f, ".{:+}", displacement * 2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        EvenGpr, Gpr, HighGpr, Imm3, Imm6, Imm8, LongRel, MidGpr, Operand, PointerMode,
        PostIncrement, ProgramAddr, ShortRel, WordGpr, YzPointer,
    };
    use crate::fault::OperandError;
    use crate::symbol::{PointerRegister, Register, RegisterGroup};

    #[test]
    fn immediates_reject_values_outside_their_range() {
        assert_eq!(Imm8::new(255).map(Imm8::value), Ok(255));
        assert_eq!(
            Imm8::new(256),
            Err(OperandError::ImmediateOutOfRange {
                value: 256,
                low: 0,
                high: 255
            })
        );
        assert!(Imm3::new(-1).is_err());
        assert!(Imm6::new(64).is_err());
        assert_eq!(Imm6::MAX, 63);
    }

    #[test]
    #[should_panic(expected = "immediate field out of range")]
    fn masked_field_construction_asserts_range() {
        let _ = Imm3::from_bits(8);
    }

    #[test]
    fn restricted_registers_map_to_encoding_fields() {
        let high = HighGpr::new(Register::R20).expect("r20 is high");
        assert_eq!(high.encoding(), 4);
        assert_eq!(HighGpr::from_encoding(4), high);

        let mid = MidGpr::from_encoding(7);
        assert_eq!(mid.register(), Register::R23);

        let even = EvenGpr::new(Register::R30).expect("r30 is even");
        assert_eq!(even.encoding(), 15);

        let word = WordGpr::from_encoding(3);
        assert_eq!(word.register(), Register::R30);
        assert_eq!(word.encoding(), 3);

        assert_eq!(Gpr::from_encoding(0x3F).register(), Register::R31);
    }

    #[test]
    fn restricted_registers_reject_other_groups() {
        assert_eq!(
            HighGpr::new(Register::R15),
            Err(OperandError::RegisterNotInGroup {
                register: Register::R15,
                group: RegisterGroup::High
            })
        );
        assert!(MidGpr::new(Register::R24).is_err());
        assert!(EvenGpr::new(Register::R3).is_err());
        assert!(WordGpr::new(Register::R22).is_err());
    }

    #[test]
    fn relative_operands_resolve_targets_from_the_next_word() {
        let back = ShortRel::new(-1, 0x0010).expect("in range");
        assert_eq!(back.target(), 0x0010);
        let forward = LongRel::new(2047, 0).expect("in range");
        assert_eq!(forward.target(), 2 + 4094);
        assert!(ShortRel::new(64, 0).is_err());
        assert!(LongRel::new(-2049, 0).is_err());
    }

    #[test]
    fn program_addresses_are_words_rendered_as_bytes() {
        let addr = ProgramAddr::new(0x0010).expect("in range");
        assert_eq!(addr.byte_address(), 0x0020);
        assert_eq!(Operand::from(addr).to_string(), "0x000020");
        assert!(ProgramAddr::new(0x40_0000).is_err());
    }

    #[test]
    fn x_has_no_displacement_form() {
        assert!(YzPointer::new(PointerRegister::X).is_err());
        assert_eq!(YzPointer::from_encoding(1).pointer(), PointerRegister::Y);
        assert_eq!(YzPointer::from_encoding(0).pointer(), PointerRegister::Z);
    }

    #[test]
    fn generic_operands_render_like_assembly() {
        let ptr = Operand::from(PostIncrement::new(PointerRegister::Z));
        assert_eq!(
            ptr,
            Operand::Pointer {
                pointer: PointerRegister::Z,
                mode: PointerMode::PostIncrement
            }
        );
        assert_eq!(ptr.to_string(), "Z+");
        assert_eq!(
            Operand::Pointer {
                pointer: PointerRegister::X,
                mode: PointerMode::PreDecrement
            }
            .to_string(),
            "-X"
        );
        assert_eq!(
            Operand::Relative {
                displacement: -3,
                target: 0
            }
            .to_string(),
            ".-6"
        );
    }
}
