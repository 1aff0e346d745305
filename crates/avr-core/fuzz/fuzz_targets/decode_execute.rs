#![no_main]

use avr_core::{decode, disassemble, Interpreter, MachineConfig, RunBoundary};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() < 4 {
        return;
    }

    let word0 = u16::from_le_bytes([data[0], data[1]]);
    let word1 = u16::from_le_bytes([data[2], data[3]]);
    if let Some(decoded) = decode(word0, Some(word1), 0) {
        let encoded = decoded.instr.encode();
        assert_eq!(encoded.size(), decoded.size);
        assert_eq!(decode(encoded.word0, encoded.word1, 0), Some(decoded));
    }

    let _ = disassemble(data, 0, 64);

    let config = MachineConfig {
        flash_bytes: 4096,
        ..MachineConfig::default()
    };
    let mut machine = Interpreter::new(config);
    let image = &data[..data.len().min(4096)];
    if machine.load_program(0, image).is_ok() {
        let _ = machine.run(RunBoundary::Steps(256));
    }
});
