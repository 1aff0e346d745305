//! Deterministic run fingerprint used by CI cross-host comparison.

use avr_core::addr_mode::{Branch, HighImm, Implied, LoadZPostInc, Reg, RegReg, StDirect};
use avr_core::{
    DataAddr, Gpr, HighGpr, Imm8, Instr, Interpreter, MachineConfig, RunBoundary, ShortRel,
    StateView, StepOutcome, ZPostIncrement,
};
use bitflags as _;
use log as _;
use once_cell as _;
use proptest as _;
use rstest as _;
#[cfg(feature = "serde")]
use serde as _;
use strum as _;
use thiserror as _;

const TABLE: u32 = 0x0100;
const RESULT: u16 = 0x0200;

fn ldi(rd: u16, k: i32) -> Instr {
    Instr::Ldi(HighImm {
        rd: HighGpr::from_encoding(rd - 16),
        k: Imm8::from_bits(k),
    })
}

fn reg_reg(rd: u16, rr: u16) -> RegReg {
    RegReg {
        rd: Gpr::from_encoding(rd),
        rr: Gpr::from_encoding(rr),
    }
}

/// Sums and xors a 16-byte flash table, then stores the sum.
fn program() -> Vec<Instr> {
    vec![
        ldi(30, 0x00),
        ldi(31, 0x01),
        ldi(16, 16),
        Instr::LpmPi(LoadZPostInc {
            rd: Gpr::from_encoding(0),
            src: ZPostIncrement,
        }),
        Instr::Add(reg_reg(1, 0)),
        Instr::Eor(reg_reg(2, 0)),
        Instr::Dec(Reg {
            rd: Gpr::from_encoding(16),
        }),
        Instr::Brne(Branch {
            target: ShortRel::from_bits(-5, 0x0E),
        }),
        Instr::Sts(StDirect {
            addr: DataAddr::new(RESULT),
            rr: Gpr::from_encoding(1),
        }),
        Instr::Break(Implied {}),
    ]
}

fn hash_bytes(hash: &mut u64, bytes: &[u8]) {
    for byte in bytes {
        *hash ^= u64::from(*byte);
        *hash = hash.wrapping_mul(0x1000_0000_01B3);
    }
}

fn fingerprint() -> String {
    let mut machine = Interpreter::new(MachineConfig::default());
    let image: Vec<u8> = program()
        .iter()
        .flat_map(|instr| instr.encode().to_bytes())
        .collect();
    machine.load_program(0, &image).expect("program should fit");
    let table: Vec<u8> = (0u8..16).map(|i| i.wrapping_mul(37)).collect();
    machine
        .load_program(TABLE, &table)
        .expect("table should fit");

    let outcome = machine.run(RunBoundary::Cycles(10_000));

    let mut hash = 0xcbf2_9ce4_8422_2325_u64;
    hash_bytes(&mut hash, &outcome.steps.to_le_bytes());

    match outcome.final_step {
        Some(StepOutcome::Retired { cycles }) => {
            hash_bytes(&mut hash, &[0x10]);
            hash_bytes(&mut hash, &cycles.to_le_bytes());
        }
        Some(StepOutcome::Interrupt { number, cycles }) => {
            hash_bytes(&mut hash, &[0x11, number]);
            hash_bytes(&mut hash, &cycles.to_le_bytes());
        }
        Some(StepOutcome::Sleeping) => hash_bytes(&mut hash, &[0x12]),
        Some(StepOutcome::Stopped) => hash_bytes(&mut hash, &[0x13]),
        Some(StepOutcome::Fault { cause }) => {
            hash_bytes(&mut hash, &[0x14]);
            hash_bytes(&mut hash, cause.to_string().as_bytes());
        }
        None => hash_bytes(&mut hash, &[0x15]),
    }

    hash_bytes(&mut hash, &machine.pc().to_le_bytes());
    hash_bytes(&mut hash, &machine.sp().to_le_bytes());
    hash_bytes(&mut hash, &machine.cycles().to_le_bytes());
    hash_bytes(&mut hash, &[machine.sreg().bits()]);
    let data: Vec<u8> = (0..machine.segment().len())
        .filter_map(|addr| machine.sram(addr))
        .collect();
    hash_bytes(&mut hash, &data);

    format!("{hash:016x}")
}

fn main() {
    println!("{}", fingerprint());
}
