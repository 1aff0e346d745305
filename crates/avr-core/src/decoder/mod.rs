//! Instruction decoder.
//!
//! Decoding walks the process-wide decision tree over the bits of the
//! first instruction word. Every call keeps its progress in a local
//! scratch record, so a [`Decoder`] is a stateless handle that may be
//! shared freely.

mod fields;
mod tree;

pub use fields::sign_extend;

use fields::Window;
use tree::{Action, Binder, NodeId, TREE};

use crate::instr::Instr;

/// Decoded instruction with its encoded size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Decoded {
    /// The typed instruction.
    pub instr: Instr,
    /// Encoded size in bytes (2 or 4).
    pub size: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    Move,
    Ok,
    Err,
}

/// Progress of one `decode` call.
#[derive(Debug)]
struct DecodeScratch {
    window: Window,
    has_word1: bool,
    size: u8,
    binder: Option<Binder>,
    state: DecodeState,
}

impl DecodeScratch {
    const fn new(word0: u16, word1: Option<u16>, pc: u32) -> Self {
        let (word1, has_word1) = match word1 {
            Some(word) => (word, true),
            None => (0, false),
        };
        Self {
            window: Window { word0, word1, pc },
            has_word1,
            size: 0,
            binder: None,
            state: DecodeState::Move,
        }
    }

    fn enter(&mut self, id: NodeId) {
        let node = TREE.node(id);
        match node.action() {
            Action::None => {}
            Action::Error => self.state = DecodeState::Err,
            Action::Bind(binder) => {
                self.size = binder.size;
                self.binder = Some(binder);
            }
        }
        if self.state == DecodeState::Move && matches!(node, tree::Node::Terminal { .. }) {
            self.state = if self.binder.is_some() {
                DecodeState::Ok
            } else {
                DecodeState::Err
            };
        }
    }

    fn finish(self) -> Option<Decoded> {
        if self.state != DecodeState::Ok {
            return None;
        }
        let binder = self.binder?;
        if binder.size == 4 && !self.has_word1 {
            return None;
        }
        Some(Decoded {
            instr: (binder.build)(&self.window),
            size: self.size,
        })
    }
}

/// Stateless decoder handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Decoder;

impl Decoder {
    /// Creates a decoder handle.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decodes the instruction starting with `word0` at byte address `pc`.
    ///
    /// `word1` is the following program word, needed only by the 4-byte
    /// forms; if such a form is identified without it the result is `None`.
    /// `pc` only feeds the displayed target of relative operands.
    #[must_use]
    pub fn decode(self, word0: u16, word1: Option<u16>, pc: u32) -> Option<Decoded> {
        let mut scratch = DecodeScratch::new(word0, word1, pc);
        let mut node = TREE.root_for(word0);
        while scratch.state == DecodeState::Move {
            let Some(next) = TREE.node(node).transition(word0) else {
                scratch.state = DecodeState::Err;
                break;
            };
            scratch.enter(next);
            node = next;
        }
        scratch.finish()
    }

    /// Decodes from a little-endian byte slice located at byte address `pc`.
    #[must_use]
    pub fn decode_bytes(self, bytes: &[u8], pc: u32) -> Option<Decoded> {
        let word0 = u16::from_le_bytes([*bytes.first()?, *bytes.get(1)?]);
        let word1 = match (bytes.get(2), bytes.get(3)) {
            (Some(&low), Some(&high)) => Some(u16::from_le_bytes([low, high])),
            _ => None,
        };
        self.decode(word0, word1, pc)
    }
}

/// Decodes with a throwaway [`Decoder`] handle.
#[must_use]
pub fn decode(word0: u16, word1: Option<u16>, pc: u32) -> Option<Decoded> {
    Decoder.decode(word0, word1, pc)
}

#[cfg(test)]
mod tests {
    use super::{decode, Decoder};
    use crate::instr::{Instr, Mnemonic};
    use crate::operand::PointerMode;
    use crate::symbol::{PointerRegister, Register};
    use crate::Operand;

    fn mnemonic(word0: u16) -> Option<Mnemonic> {
        decode(word0, Some(0), 0).map(|decoded| decoded.instr.mnemonic())
    }

    #[test]
    fn add_decodes_both_register_fields() {
        let decoded = decode(0x0C56, None, 0).expect("valid");
        assert_eq!(decoded.size, 2);
        let Instr::Add(mode) = decoded.instr else {
            panic!("expected add, got {:?}", decoded.instr);
        };
        assert_eq!(mode.rd.register(), Register::R5);
        assert_eq!(mode.rr.register(), Register::R6);
    }

    #[test]
    fn jump_needs_its_second_word() {
        let decoded = Decoder::new()
            .decode_bytes(&[0x0C, 0x94, 0x00, 0x00], 0)
            .expect("valid");
        assert_eq!(decoded.instr.name(), "jmp");
        assert_eq!(decoded.size, 4);
        assert_eq!(
            decoded.instr.addr_mode().operands(),
            vec![Operand::ProgramAddress(0)]
        );
        assert_eq!(decode(0x940C, None, 0), None);
        assert_eq!(Decoder::new().decode_bytes(&[0x0C], 0), None);
    }

    #[test]
    fn canonical_forms_win_over_aliases() {
        assert_eq!(mnemonic(0x2433), Some(Mnemonic::Eor));
        assert_eq!(mnemonic(0x0C00), Some(Mnemonic::Add));
        assert_eq!(mnemonic(0xEF0F), Some(Mnemonic::Ldi));
        assert_eq!(mnemonic(0xF000), Some(Mnemonic::Brcs));
        assert_eq!(mnemonic(0xF401), Some(Mnemonic::Brne));
        assert_eq!(mnemonic(0x9478), Some(Mnemonic::Sei));
        assert_eq!(mnemonic(0x94F8), Some(Mnemonic::Cli));
    }

    #[test]
    fn zero_displacement_is_plain_indirect() {
        assert_eq!(mnemonic(0x8008), Some(Mnemonic::Ld));
        assert_eq!(mnemonic(0x8009), Some(Mnemonic::Ldd));
        assert_eq!(mnemonic(0x8200), Some(Mnemonic::St));
        assert_eq!(mnemonic(0xA000), Some(Mnemonic::Ldd));
        let decoded = decode(0x8008, None, 0).expect("valid");
        assert_eq!(
            decoded.instr.addr_mode().operands()[1],
            Operand::Pointer {
                pointer: PointerRegister::Y,
                mode: PointerMode::Plain
            }
        );
    }

    #[test]
    fn reserved_patterns_do_not_decode() {
        for word in [0x0001, 0x9003, 0x9008, 0x9203, 0x9404, 0x9528, 0x95F8, 0x9429, 0xF808, 0xFFFF] {
            assert_eq!(mnemonic(word), None, "word {word:#06x}");
        }
    }

    #[test]
    fn control_group_decodes() {
        assert_eq!(mnemonic(0x0000), Some(Mnemonic::Nop));
        assert_eq!(mnemonic(0x9508), Some(Mnemonic::Ret));
        assert_eq!(mnemonic(0x9518), Some(Mnemonic::Reti));
        assert_eq!(mnemonic(0x9588), Some(Mnemonic::Sleep));
        assert_eq!(mnemonic(0x9598), Some(Mnemonic::Break));
        assert_eq!(mnemonic(0x95A8), Some(Mnemonic::Wdr));
        assert_eq!(mnemonic(0x95C8), Some(Mnemonic::Lpm));
        assert_eq!(mnemonic(0x95D8), Some(Mnemonic::Elpm));
        assert_eq!(mnemonic(0x95E8), Some(Mnemonic::Spm));
        assert_eq!(mnemonic(0x9409), Some(Mnemonic::Ijmp));
        assert_eq!(mnemonic(0x9419), Some(Mnemonic::Eijmp));
        assert_eq!(mnemonic(0x9509), Some(Mnemonic::Icall));
        assert_eq!(mnemonic(0x9519), Some(Mnemonic::Eicall));
    }

    #[test]
    fn pc_changes_only_the_displayed_target() {
        let at_zero = decode(0xCFFF, None, 0).expect("valid");
        let at_page = decode(0xCFFF, None, 0x200).expect("valid");
        assert_eq!(at_zero.instr.mnemonic(), at_page.instr.mnemonic());
        assert_eq!(at_zero.instr.encode(), at_page.instr.encode());
        assert_ne!(at_zero.instr, at_page.instr);
    }
}
