//! Pluggable I/O register handlers.

/// Handler behind one memory-mapped I/O register.
///
/// Reads and writes may have side effects; [`IoRegister::peek`] must not.
pub trait IoRegister {
    /// Reads the register as the CPU would.
    fn read(&mut self) -> u8;
    /// Writes the register as the CPU would.
    fn write(&mut self, value: u8);
    /// Current value without side effects.
    fn peek(&self) -> u8;

    /// Reads one bit.
    fn read_bit(&mut self, bit: u8) -> bool {
        (self.read() >> (bit & 7)) & 1 == 1
    }

    /// Read-modify-write of one bit.
    fn write_bit(&mut self, bit: u8, value: bool) {
        let mask = 1 << (bit & 7);
        let current = self.peek();
        self.write(if value { current | mask } else { current & !mask });
    }
}

/// Content of one I/O address.
pub(crate) enum IoSlot {
    /// Plain storage byte, no side effects.
    Storage(u8),
    /// Peripheral-provided handler.
    Device(Box<dyn IoRegister>),
}

impl std::fmt::Debug for IoSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Storage(value) => f.debug_tuple("Storage").field(value).finish(),
            Self::Device(device) => f.debug_tuple("Device").field(&device.peek()).finish(),
        }
    }
}

impl IoSlot {
    pub(crate) fn read(&mut self) -> u8 {
        match self {
            Self::Storage(value) => *value,
            Self::Device(device) => device.read(),
        }
    }

    pub(crate) fn write(&mut self, value: u8) {
        match self {
            Self::Storage(slot) => *slot = value,
            Self::Device(device) => device.write(value),
        }
    }

    pub(crate) fn peek(&self) -> u8 {
        match self {
            Self::Storage(value) => *value,
            Self::Device(device) => device.peek(),
        }
    }

    pub(crate) fn read_bit(&mut self, bit: u8) -> bool {
        match self {
            Self::Storage(value) => (*value >> (bit & 7)) & 1 == 1,
            Self::Device(device) => device.read_bit(bit),
        }
    }

    pub(crate) fn write_bit(&mut self, bit: u8, value: bool) {
        match self {
            Self::Storage(slot) => {
                let mask = 1 << (bit & 7);
                *slot = if value { *slot | mask } else { *slot & !mask };
            }
            Self::Device(device) => device.write_bit(bit, value),
        }
    }
}
