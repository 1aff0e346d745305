//! Program memory with a per-word decoded-instruction cache.
//!
//! Each cache slot holds the decode result for the instruction starting at
//! that word address. Loading or writing program memory invalidates every
//! slot whose instruction could cover the changed bytes.

use log::debug;

use crate::decoder::{Decoded, Decoder};
use crate::fault::Fault;
use crate::memory::validate_program_access;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CacheSlot {
    Empty,
    Invalid,
    Valid(Decoded),
}

/// Flash program memory.
#[derive(Debug, Clone)]
pub struct Flash {
    bytes: Vec<u8>,
    cache: Vec<CacheSlot>,
}

impl Flash {
    /// Erased flash of `size` bytes (every byte `0xFF`).
    #[must_use]
    pub fn new(size: usize) -> Self {
        let size = size & !1;
        Self {
            bytes: vec![0xFF; size],
            cache: vec![CacheSlot::Empty; size / 2],
        }
    }

    /// Size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` for a zero-sized flash.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Program image.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Reads one byte.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::ProgramAddressOutOfRange`] past the end.
    pub fn read(&self, addr: u32) -> Result<u8, Fault> {
        let index = validate_program_access(self.bytes.len(), addr)?;
        Ok(self.bytes[index])
    }

    /// Reads the little-endian word at byte address `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::ProgramAddressOutOfRange`] if either byte is past the end.
    pub fn read_word(&self, addr: u32) -> Result<u16, Fault> {
        let low = self.read(addr)?;
        let high = self.read(addr.wrapping_add(1))?;
        Ok(u16::from_le_bytes([low, high]))
    }

    /// Copies `image` into flash at byte address `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::ProgramAddressOutOfRange`] if the image does not fit;
    /// flash is unchanged in that case.
    pub fn load(&mut self, addr: u32, image: &[u8]) -> Result<(), Fault> {
        if image.is_empty() {
            return Ok(());
        }
        let start = validate_program_access(self.bytes.len(), addr)?;
        let end = start + image.len();
        if end > self.bytes.len() {
            return Err(Fault::ProgramAddressOutOfRange {
                addr: u32::try_from(end - 1).unwrap_or(u32::MAX),
            });
        }
        self.bytes[start..end].copy_from_slice(image);
        self.invalidate(start, end);
        Ok(())
    }

    /// Writes one byte.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::ProgramAddressOutOfRange`] past the end.
    pub fn write(&mut self, addr: u32, value: u8) -> Result<(), Fault> {
        let index = validate_program_access(self.bytes.len(), addr)?;
        self.bytes[index] = value;
        self.invalidate(index, index + 1);
        Ok(())
    }

    /// Decodes (or returns the cached decode of) the instruction at byte address `pc`.
    ///
    /// `Ok(None)` means the bytes there are not an instruction.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::ProgramAddressOutOfRange`] when `pc` is past the end
    /// or odd.
    pub fn decode_at(&mut self, pc: u32) -> Result<Option<Decoded>, Fault> {
        let index = validate_program_access(self.bytes.len(), pc)?;
        if index % 2 != 0 {
            return Err(Fault::ProgramAddressOutOfRange { addr: pc });
        }
        let slot = index / 2;
        match self.cache[slot] {
            CacheSlot::Valid(decoded) => return Ok(Some(decoded)),
            CacheSlot::Invalid => return Ok(None),
            CacheSlot::Empty => {}
        }
        let decoded = self.decode_uncached(pc);
        self.cache[slot] = decoded.map_or(CacheSlot::Invalid, CacheSlot::Valid);
        Ok(decoded)
    }

    /// Decodes without consulting or filling the cache.
    #[must_use]
    pub fn decode_uncached(&self, pc: u32) -> Option<Decoded> {
        let word0 = self.read_word(pc).ok()?;
        let word1 = self.read_word(pc.wrapping_add(2)).ok();
        Decoder::new().decode(word0, word1, pc)
    }

    /// Encoded size of the instruction at `pc`; 2 for bytes that do not decode.
    ///
    /// # Errors
    ///
    /// Same as [`Flash::decode_at`].
    pub fn size_at(&mut self, pc: u32) -> Result<u8, Fault> {
        Ok(self.decode_at(pc)?.map_or(2, |decoded| decoded.size))
    }

    fn invalidate(&mut self, start: usize, end: usize) {
        // An instruction starting one word earlier may be 4 bytes long.
        let first = (start / 2).saturating_sub(1);
        let last = end.div_ceil(2).min(self.cache.len());
        for slot in &mut self.cache[first..last] {
            *slot = CacheSlot::Empty;
        }
        debug!("flash cache invalidated for words {first}..{last}");
    }
}

#[cfg(test)]
mod tests {
    use super::Flash;
    use crate::fault::Fault;
    use crate::instr::Mnemonic;

    #[test]
    fn erased_flash_does_not_decode() {
        let mut flash = Flash::new(64);
        assert_eq!(flash.decode_at(0), Ok(None));
        assert_eq!(flash.size_at(0), Ok(2));
    }

    #[test]
    fn loading_invalidates_cached_decodes() {
        let mut flash = Flash::new(64);
        assert_eq!(flash.decode_at(4), Ok(None));
        flash.load(4, &[0x00, 0x00]).expect("fits");
        let decoded = flash.decode_at(4).expect("in range").expect("nop");
        assert_eq!(decoded.instr.mnemonic(), Mnemonic::Nop);
    }

    #[test]
    fn writing_a_second_word_invalidates_the_instruction_before_it() {
        let mut flash = Flash::new(64);
        flash.load(0, &[0x0C, 0x94, 0x00, 0x00]).expect("fits");
        let first = flash.decode_at(0).expect("in range").expect("jmp");
        assert_eq!(first.instr.encode().word1, Some(0));
        flash.write(2, 0x10).expect("in range");
        let second = flash.decode_at(0).expect("in range").expect("jmp");
        assert_eq!(second.instr.encode().word1, Some(0x0010));
    }

    #[test]
    fn accesses_past_the_end_fault() {
        let mut flash = Flash::new(16);
        assert_eq!(
            flash.read(16),
            Err(Fault::ProgramAddressOutOfRange { addr: 16 })
        );
        assert!(flash.load(14, &[0, 0, 0, 0]).is_err());
        assert_eq!(flash.read(14), Ok(0xFF));
        assert_eq!(
            flash.decode_at(3),
            Err(Fault::ProgramAddressOutOfRange { addr: 3 })
        );
    }
}
