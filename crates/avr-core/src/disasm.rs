//! Instruction disassembly.
//!
//! Text rendering goes through the addressing-mode view of an instruction
//! ([`Instr::addr_mode`]), so it needs no per-mnemonic code. Words that do
//! not decode are rendered as `.word 0xXXXX`.

use std::fmt;

use crate::decoder::Decoder;
use crate::instr::Instr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())?;
        for (index, operand) in self.addr_mode().operands().iter().enumerate() {
            let separator = if index == 0 { " " } else { ", " };
            write!(f, "{separator}{operand}")?;
        }
        Ok(())
    }
}

/// Comma-separated operand text of `instr` (`"r5, r6"`).
#[must_use]
pub fn format_operands(instr: &Instr) -> String {
    instr
        .addr_mode()
        .operands()
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// A single disassembled instruction row.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DisassemblyRow {
    /// Byte address of the instruction.
    pub addr_start: u32,
    /// Length in bytes (2 or 4).
    pub len_bytes: u8,
    /// Raw words: first word in the low half, second word (if any) in the high half.
    pub raw_words: u32,
    /// Assembly mnemonic (`"ld"`), or `".word"` for undecodable words.
    pub mnemonic: String,
    /// Formatted operands (`"r0, X+"`), or the raw word for undecodable words.
    pub operands: String,
    /// Whether the word does not decode.
    pub is_illegal: bool,
}

impl fmt::Display for DisassemblyRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06x}: {}", self.addr_start, self.mnemonic)?;
        if !self.operands.is_empty() {
            write!(f, " {}", self.operands)?;
        }
        Ok(())
    }
}

/// Disassembles up to `count` instructions from `image`, whose first byte is
/// at byte address `start`.
///
/// Stops early at the end of the image; a trailing odd byte is ignored.
#[must_use]
pub fn disassemble(image: &[u8], start: u32, count: usize) -> Vec<DisassemblyRow> {
    let mut rows = Vec::with_capacity(count);
    let mut offset = 0usize;
    while rows.len() < count {
        let Some(row) = disassemble_one(image, start, offset) else {
            break;
        };
        offset += usize::from(row.len_bytes);
        rows.push(row);
    }
    rows
}

/// Disassembles a window of instructions around `center_pc` in `image`
/// (which starts at byte address 0).
///
/// Produces up to `before` rows ending at `center_pc`, the row at
/// `center_pc`, and up to `after` rows following it. Rows that cannot be
/// read are omitted.
#[must_use]
pub fn disassemble_window(
    center_pc: u32,
    before: usize,
    after: usize,
    image: &[u8],
) -> Vec<DisassemblyRow> {
    let center = center_pc as usize;
    let mut found_before: Vec<DisassemblyRow> = Vec::new();
    let mut scan = center;

    while scan > 0 && found_before.len() < before {
        let mut found_one = false;
        for len in [4usize, 2] {
            if scan < len {
                continue;
            }
            if let Some(row) = disassemble_one(image, 0, scan - len) {
                if usize::from(row.len_bytes) == len {
                    found_before.push(row);
                    scan -= len;
                    found_one = true;
                    break;
                }
            }
        }
        if !found_one {
            scan = scan.saturating_sub(2);
        }
    }
    found_before.reverse();

    let mut rows = found_before;
    rows.extend(disassemble(image.get(center..).unwrap_or_default(), center_pc, after + 1));
    rows
}

#[allow(clippy::cast_possible_truncation)]
fn disassemble_one(image: &[u8], base: u32, offset: usize) -> Option<DisassemblyRow> {
    let bytes = image.get(offset..)?;
    let word0 = u16::from_le_bytes([*bytes.first()?, *bytes.get(1)?]);
    let pc = base.wrapping_add(offset as u32);

    match Decoder::new().decode_bytes(bytes, pc) {
        Some(decoded) => {
            let raw_words = match decoded.instr.encode().word1 {
                Some(word1) => u32::from(word0) | (u32::from(word1) << 16),
                None => u32::from(word0),
            };
            Some(DisassemblyRow {
                addr_start: pc,
                len_bytes: decoded.size,
                raw_words,
                mnemonic: decoded.instr.name().to_owned(),
                operands: format_operands(&decoded.instr),
                is_illegal: false,
            })
        }
        None => Some(DisassemblyRow {
            addr_start: pc,
            len_bytes: 2,
            raw_words: u32::from(word0),
            mnemonic: ".word".to_owned(),
            operands: format!("{word0:#06x}"),
            is_illegal: true,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::{disassemble, disassemble_window};
    use crate::addr_mode::{LdPostInc, RegReg};
    use crate::instr::Instr;
    use crate::operand::{Gpr, PostIncrement};
    use crate::symbol::PointerRegister;

    #[test]
    fn instructions_render_like_assembly() {
        let add = Instr::Add(RegReg {
            rd: Gpr::from_encoding(5),
            rr: Gpr::from_encoding(6),
        });
        assert_eq!(add.to_string(), "add r5, r6");
        let load = Instr::LdPi(LdPostInc {
            rd: Gpr::from_encoding(0),
            src: PostIncrement::new(PointerRegister::X),
        });
        assert_eq!(load.to_string(), "ld r0, X+");
    }

    #[test]
    fn disassemble_jmp() {
        let rows = disassemble(&[0x0C, 0x94, 0x00, 0x00], 0, 1);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].mnemonic, "jmp");
        assert_eq!(rows[0].operands, "0x000000");
        assert_eq!(rows[0].len_bytes, 4);
        assert_eq!(rows[0].raw_words, 0x0000_940C);
    }

    #[test]
    fn disassemble_nop_and_illegal() {
        let rows = disassemble(&[0x00, 0x00, 0xFF, 0xFF], 0x100, 4);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].mnemonic, "nop");
        assert_eq!(rows[0].operands, "");
        assert_eq!(rows[1].addr_start, 0x102);
        assert_eq!(rows[1].mnemonic, ".word");
        assert_eq!(rows[1].operands, "0xffff");
        assert!(rows[1].is_illegal);
    }

    #[test]
    fn relative_branches_show_their_offset() {
        // rjmp .-2 (an endless loop)
        let rows = disassemble(&[0xFF, 0xCF], 0, 1);
        assert_eq!(rows[0].mnemonic, "rjmp");
        assert_eq!(rows[0].operands, ".-2");
        assert_eq!(rows[0].to_string(), "000000: rjmp .-2");
    }

    #[test]
    fn disassemble_window_before_after() {
        let image = [0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
        let rows = disassemble_window(2, 1, 1, &image);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].addr_start, 0);
        assert_eq!(rows[1].addr_start, 2);
        assert_eq!(rows[2].addr_start, 4);
    }
}
