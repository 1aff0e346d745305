//! Access legality checks shared by the data segment and program memory.

use super::map::{is_core_io, RegionLayout, Resolved};
use crate::fault::Fault;

/// Validates a data-space address and resolves its region.
///
/// # Errors
///
/// Returns [`Fault::DataAddressOutOfRange`] past the end of data space.
pub const fn validate_data_access(layout: RegionLayout, addr: u32) -> Result<Resolved, Fault> {
    match layout.decode_memory_region(addr) {
        Some(resolved) => Ok(resolved),
        None => Err(Fault::DataAddressOutOfRange { addr }),
    }
}

/// Validates a program-memory byte address against the flash size.
///
/// # Errors
///
/// Returns [`Fault::ProgramAddressOutOfRange`] past the end of flash.
pub const fn validate_program_access(flash_bytes: usize, addr: u32) -> Result<usize, Fault> {
    if (addr as usize) < flash_bytes {
        Ok(addr as usize)
    } else {
        Err(Fault::ProgramAddressOutOfRange { addr })
    }
}

/// Validates that a peripheral handler may be installed at I/O index `io`.
///
/// # Errors
///
/// Returns [`Fault::ReservedIoRegister`] for core-owned registers and
/// [`Fault::DataAddressOutOfRange`] for indices outside the I/O block.
pub const fn validate_io_install(layout: RegionLayout, io: u16) -> Result<usize, Fault> {
    if is_core_io(io) {
        return Err(Fault::ReservedIoRegister { io });
    }
    if io as u32 >= layout.io_registers {
        return Err(Fault::DataAddressOutOfRange {
            addr: super::map::IO_START + io as u32,
        });
    }
    Ok(io as usize)
}

#[cfg(test)]
mod tests {
    use super::{validate_data_access, validate_io_install, validate_program_access};
    use crate::fault::Fault;
    use crate::memory::{MemoryRegion, RegionLayout, SPL_IO};

    const LAYOUT: RegionLayout = RegionLayout {
        io_registers: 64,
        ram_bytes: 32,
    };

    #[test]
    fn data_legality_matches_layout() {
        assert_eq!(
            validate_data_access(LAYOUT, 0).map(|r| r.region),
            Ok(MemoryRegion::RegisterFile)
        );
        assert_eq!(
            validate_data_access(LAYOUT, 127).map(|r| r.offset),
            Ok(31)
        );
        assert_eq!(
            validate_data_access(LAYOUT, 128),
            Err(Fault::DataAddressOutOfRange { addr: 128 })
        );
        assert_eq!(
            validate_data_access(LAYOUT, 0x1_0000),
            Err(Fault::DataAddressOutOfRange { addr: 0x1_0000 })
        );
    }

    #[test]
    fn program_legality_matches_flash_size() {
        assert_eq!(validate_program_access(1024, 1023), Ok(1023));
        assert_eq!(
            validate_program_access(1024, 1024),
            Err(Fault::ProgramAddressOutOfRange { addr: 1024 })
        );
    }

    #[test]
    fn core_registers_cannot_be_replaced() {
        assert_eq!(
            validate_io_install(LAYOUT, SPL_IO),
            Err(Fault::ReservedIoRegister { io: SPL_IO })
        );
        assert_eq!(validate_io_install(LAYOUT, 0x10), Ok(0x10));
        assert_eq!(
            validate_io_install(LAYOUT, 64),
            Err(Fault::DataAddressOutOfRange { addr: 96 })
        );
    }
}
