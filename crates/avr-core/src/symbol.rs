//! Canonical register symbols and the process-wide name lookup table.
//!
//! Registers are plain `Copy` enums, so symbol identity is value equality.
//! Each symbol has a logical value (its register number); the restricted
//! operand types in [`crate::operand`] derive their own encoding values
//! from it.

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;

/// Number of general-purpose registers in the register file.
pub const REGISTER_COUNT: usize = 32;

/// General-purpose register `r0`..`r31`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
pub enum Register {
    /// `r0`.
    R0 = 0,
    /// `r1`.
    R1,
    /// `r2`.
    R2,
    /// `r3`.
    R3,
    /// `r4`.
    R4,
    /// `r5`.
    R5,
    /// `r6`.
    R6,
    /// `r7`.
    R7,
    /// `r8`.
    R8,
    /// `r9`.
    R9,
    /// `r10`.
    R10,
    /// `r11`.
    R11,
    /// `r12`.
    R12,
    /// `r13`.
    R13,
    /// `r14`.
    R14,
    /// `r15`.
    R15,
    /// `r16`.
    R16,
    /// `r17`.
    R17,
    /// `r18`.
    R18,
    /// `r19`.
    R19,
    /// `r20`.
    R20,
    /// `r21`.
    R21,
    /// `r22`.
    R22,
    /// `r23`.
    R23,
    /// `r24`.
    R24,
    /// `r25`.
    R25,
    /// `r26`.
    R26,
    /// `r27`.
    R27,
    /// `r28`.
    R28,
    /// `r29`.
    R29,
    /// `r30`.
    R30,
    /// `r31`.
    R31,
}

impl Register {
    /// Ordered list of all registers, indexed by register number.
    pub const ALL: [Self; REGISTER_COUNT] = [
        Self::R0,
        Self::R1,
        Self::R2,
        Self::R3,
        Self::R4,
        Self::R5,
        Self::R6,
        Self::R7,
        Self::R8,
        Self::R9,
        Self::R10,
        Self::R11,
        Self::R12,
        Self::R13,
        Self::R14,
        Self::R15,
        Self::R16,
        Self::R17,
        Self::R18,
        Self::R19,
        Self::R20,
        Self::R21,
        Self::R22,
        Self::R23,
        Self::R24,
        Self::R25,
        Self::R26,
        Self::R27,
        Self::R28,
        Self::R29,
        Self::R30,
        Self::R31,
    ];

    /// Register for a 5-bit field; upper bits are ignored.
    #[must_use]
    pub const fn from_u5(bits: u16) -> Self {
        Self::ALL[(bits & 0x1F) as usize]
    }

    /// Register by number, if `number < 32`.
    #[must_use]
    pub const fn from_number(number: u8) -> Option<Self> {
        if (number as usize) < REGISTER_COUNT {
            Some(Self::ALL[number as usize])
        } else {
            None
        }
    }

    /// Logical value: the register number.
    #[must_use]
    pub const fn number(self) -> u8 {
        self as u8
    }

    /// Index into the register file.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Canonical lower-case name (`"r17"`).
    #[must_use]
    pub const fn name(self) -> &'static str {
        REGISTER_NAMES[self as usize]
    }

    /// Returns `true` when the register belongs to `group`.
    #[must_use]
    pub const fn is_in(self, group: RegisterGroup) -> bool {
        let n = self.number();
        match group {
            RegisterGroup::General => true,
            RegisterGroup::High => n >= 16,
            RegisterGroup::Mid => n >= 16 && n <= 23,
            RegisterGroup::Even => n % 2 == 0,
            RegisterGroup::Word => n >= 24 && n % 2 == 0,
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

const REGISTER_NAMES: [&str; REGISTER_COUNT] = [
    "r0", "r1", "r2", "r3", "r4", "r5", "r6", "r7", "r8", "r9", "r10", "r11", "r12", "r13", "r14",
    "r15", "r16", "r17", "r18", "r19", "r20", "r21", "r22", "r23", "r24", "r25", "r26", "r27",
    "r28", "r29", "r30", "r31",
];

/// Register subsets that restricted encoding slots accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum RegisterGroup {
    /// Any of `r0`..`r31` (5-bit field).
    General,
    /// `r16`..`r31` (4-bit field).
    High,
    /// `r16`..`r23` (3-bit field).
    Mid,
    /// Even registers, addressed as pairs (4-bit field, number / 2).
    Even,
    /// `r24`, `r26`, `r28`, `r30` (2-bit field of the word instructions).
    Word,
}

impl fmt::Display for RegisterGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::General => "general",
            Self::High => "high",
            Self::Mid => "mid",
            Self::Even => "even",
            Self::Word => "word",
        })
    }
}

/// 16-bit pointer register formed by a register pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum PointerRegister {
    /// `r27:r26`.
    X,
    /// `r29:r28`.
    Y,
    /// `r31:r30`.
    Z,
}

impl PointerRegister {
    /// Low byte register of the pair; its number is the logical value.
    #[must_use]
    pub const fn low(self) -> Register {
        match self {
            Self::X => Register::R26,
            Self::Y => Register::R28,
            Self::Z => Register::R30,
        }
    }

    /// High byte register of the pair.
    #[must_use]
    pub const fn high(self) -> Register {
        match self {
            Self::X => Register::R27,
            Self::Y => Register::R29,
            Self::Z => Register::R31,
        }
    }

    /// Upper-case name (`"X"`).
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::X => "X",
            Self::Y => "Y",
            Self::Z => "Z",
        }
    }
}

impl fmt::Display for PointerRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Entry in the symbol table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Symbol {
    /// A single 8-bit register.
    Register(Register),
    /// A pointer register pair.
    Pointer(PointerRegister),
}

static SYMBOLS: Lazy<HashMap<&'static str, Symbol>> = Lazy::new(|| {
    let mut table: HashMap<&'static str, Symbol> = Register::ALL
        .iter()
        .map(|reg| (reg.name(), Symbol::Register(*reg)))
        .collect();
    for (name, reg) in [
        ("xl", Register::R26),
        ("xh", Register::R27),
        ("yl", Register::R28),
        ("yh", Register::R29),
        ("zl", Register::R30),
        ("zh", Register::R31),
    ] {
        table.insert(name, Symbol::Register(reg));
    }
    for ptr in [PointerRegister::X, PointerRegister::Y, PointerRegister::Z] {
        table.insert(
            match ptr {
                PointerRegister::X => "x",
                PointerRegister::Y => "y",
                PointerRegister::Z => "z",
            },
            Symbol::Pointer(ptr),
        );
    }
    table
});

/// Looks up a symbol by name, case-insensitively.
#[must_use]
pub fn lookup(name: &str) -> Option<Symbol> {
    SYMBOLS.get(name.to_ascii_lowercase().as_str()).copied()
}

/// Looks up an 8-bit register by name (`"r5"`, `"ZL"`).
#[must_use]
pub fn lookup_register(name: &str) -> Option<Register> {
    match lookup(name)? {
        Symbol::Register(reg) => Some(reg),
        Symbol::Pointer(_) => None,
    }
}

/// Looks up a pointer register by name (`"X"`, `"z"`).
#[must_use]
pub fn lookup_pointer(name: &str) -> Option<PointerRegister> {
    match lookup(name)? {
        Symbol::Pointer(ptr) => Some(ptr),
        Symbol::Register(_) => None,
    }
}
