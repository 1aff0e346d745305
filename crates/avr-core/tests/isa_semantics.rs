//! Instruction semantics checked against the AVR instruction set manual.

#![allow(clippy::pedantic, clippy::nursery)]

use avr_core::addr_mode::{
    Branch, HighImm, Implied, LdDirect, LdPostInc, Reg, RegReg, StPreDec, WordImm,
};
use avr_core::{
    DataAddr, Gpr, HighGpr, Imm6, Imm8, Instr, Interpreter, MachineConfig, PointerRegister,
    PostIncrement, PreDecrement, Register, RunBoundary, ShortRel, Sreg, StepOutcome, WordGpr,
};
use bitflags as _;
use log as _;
use once_cell as _;
use proptest as _;
use rstest::rstest;
#[cfg(feature = "serde")]
use serde as _;
use strum as _;
use thiserror as _;

fn machine(program: &[Instr]) -> Interpreter {
    let mut interpreter = Interpreter::new(MachineConfig::default());
    let image: Vec<u8> = program
        .iter()
        .flat_map(|instr| instr.encode().to_bytes())
        .collect();
    interpreter.load_program(0, &image).expect("program fits");
    interpreter
}

fn reg_reg(rd: u16, rr: u16) -> RegReg {
    RegReg {
        rd: Gpr::from_encoding(rd),
        rr: Gpr::from_encoding(rr),
    }
}

fn ldi(rd: u16, k: i32) -> Instr {
    Instr::Ldi(HighImm {
        rd: HighGpr::from_encoding(rd - 16),
        k: Imm8::from_bits(k),
    })
}

#[rstest]
#[case::signed_overflow(0x7F, 0x01, 0x80, Sreg::H | Sreg::V | Sreg::N)]
#[case::carry_to_zero(0xFF, 0x01, 0x00, Sreg::H | Sreg::Z | Sreg::C)]
#[case::no_flags(0x10, 0x20, 0x30, Sreg::empty())]
#[case::negative_without_overflow(0xF0, 0x01, 0xF1, Sreg::N | Sreg::S)]
fn add_sets_arithmetic_flags(#[case] a: u8, #[case] b: u8, #[case] sum: u8, #[case] flags: Sreg) {
    let mut m = machine(&[Instr::Add(reg_reg(1, 2))]);
    m.set_register(Register::R1, a);
    m.set_register(Register::R2, b);
    assert_eq!(m.step(), StepOutcome::Retired { cycles: 1 });
    assert_eq!(m.register(Register::R1), sum);
    assert_eq!(m.sreg(), flags);
}

#[rstest]
#[case::borrow(0x00, 0x01, 0xFF, Sreg::H | Sreg::N | Sreg::S | Sreg::C)]
#[case::signed_overflow(0x80, 0x01, 0x7F, Sreg::H | Sreg::V | Sreg::S)]
#[case::equal(0x05, 0x05, 0x00, Sreg::Z)]
fn sub_sets_arithmetic_flags(
    #[case] a: u8,
    #[case] b: u8,
    #[case] difference: u8,
    #[case] flags: Sreg,
) {
    let mut m = machine(&[Instr::Sub(reg_reg(1, 2))]);
    m.set_register(Register::R1, a);
    m.set_register(Register::R2, b);
    m.step();
    assert_eq!(m.register(Register::R1), difference);
    assert_eq!(m.sreg(), flags);
}

#[rstest]
#[case::inc_overflow(true, 0x7F, 0x80, Sreg::V | Sreg::N)]
#[case::inc_wraps(true, 0xFF, 0x00, Sreg::Z)]
#[case::dec_overflow(false, 0x80, 0x7F, Sreg::V | Sreg::S)]
#[case::dec_to_zero(false, 0x01, 0x00, Sreg::Z)]
fn inc_and_dec_keep_carry(
    #[case] increment: bool,
    #[case] value: u8,
    #[case] result: u8,
    #[case] flags: Sreg,
) {
    let rd = Reg {
        rd: Gpr::from_encoding(20),
    };
    let instr = if increment {
        Instr::Inc(rd)
    } else {
        Instr::Dec(rd)
    };
    let mut m = machine(&[instr]);
    m.set_sreg(Sreg::C);
    m.set_register(Register::R20, value);
    m.step();
    assert_eq!(m.register(Register::R20), result);
    assert_eq!(m.sreg(), flags | Sreg::C);
}

#[rstest]
#[case::small(0x03, 0x04, 0x000C, Sreg::empty())]
#[case::largest(0xFF, 0xFF, 0xFE01, Sreg::C)]
#[case::zero(0x00, 0x9A, 0x0000, Sreg::Z)]
fn mul_writes_r1_r0(#[case] a: u8, #[case] b: u8, #[case] product: u16, #[case] flags: Sreg) {
    let mut m = machine(&[Instr::Mul(reg_reg(16, 17))]);
    m.set_register(Register::R16, a);
    m.set_register(Register::R17, b);
    assert_eq!(m.step(), StepOutcome::Retired { cycles: 2 });
    let [lo, hi] = product.to_le_bytes();
    assert_eq!(m.register(Register::R0), lo);
    assert_eq!(m.register(Register::R1), hi);
    assert_eq!(m.sreg(), flags);
}

#[test]
fn adiw_carries_into_the_high_byte() {
    let mut m = machine(&[Instr::Adiw(WordImm {
        rd: WordGpr::from_encoding(1),
        k: Imm6::from_bits(1),
    })]);
    m.set_pointer(PointerRegister::X, 0x00FF);
    assert_eq!(m.step(), StepOutcome::Retired { cycles: 2 });
    assert_eq!(m.pointer(PointerRegister::X), 0x0100);
    assert_eq!(m.register(Register::R26), 0x00);
    assert_eq!(m.register(Register::R27), 0x01);
}

#[test]
fn countdown_loop_charges_taken_branches() {
    // 0: ldi r16, 3
    // 2: dec r16
    // 4: brne .-4
    // 6: break
    let mut m = machine(&[
        ldi(16, 3),
        Instr::Dec(Reg {
            rd: Gpr::from_encoding(16),
        }),
        Instr::Brne(Branch {
            target: ShortRel::from_bits(-2, 4),
        }),
        Instr::Break(Implied {}),
    ]);
    let outcome = m.run(RunBoundary::Steps(100));
    assert_eq!(outcome.steps, 9);
    assert_eq!(outcome.final_step, Some(StepOutcome::Stopped));
    assert_eq!(m.register(Register::R16), 0);
    // ldi 1 + dec 3x1 + brne 2x2 + 1 + break 1
    assert_eq!(m.cycles(), 10);
    assert_eq!(m.pc(), 8);
}

#[test]
fn cycle_boundary_stops_at_or_past_the_budget() {
    let nop = Instr::Nop(Implied {});
    let mut m = machine(&[nop, nop, nop, nop, nop]);
    let outcome = m.run(RunBoundary::Cycles(3));
    assert_eq!(outcome.steps, 3);
    assert_eq!(m.cycles(), 3);
    let outcome = m.run(RunBoundary::Cycles(3));
    assert_eq!(outcome.steps, 0);
    assert_eq!(outcome.final_step, None);
}

#[test]
fn post_increment_load_and_pre_decrement_store() {
    let mut m = machine(&[
        Instr::LdPi(LdPostInc {
            rd: Gpr::from_encoding(5),
            src: PostIncrement::new(PointerRegister::Z),
        }),
        Instr::StPd(StPreDec {
            dst: PreDecrement::new(PointerRegister::Y),
            rr: Gpr::from_encoding(5),
        }),
    ]);
    m.segment_mut().load(0x0200, &[0xA5]).expect("ram");
    m.set_pointer(PointerRegister::Z, 0x0200);
    m.set_pointer(PointerRegister::Y, 0x0301);
    m.step();
    assert_eq!(m.register(Register::R5), 0xA5);
    assert_eq!(m.pointer(PointerRegister::Z), 0x0201);
    m.step();
    assert_eq!(m.pointer(PointerRegister::Y), 0x0300);
    assert_eq!(m.segment().peek(0x0300), Some(0xA5));
}

#[test]
fn lds_past_data_space_faults_without_side_effects() {
    let mut m = machine(&[Instr::Lds(LdDirect {
        rd: Gpr::from_encoding(7),
        addr: DataAddr::new(0xFFFF),
    })]);
    m.set_register(Register::R7, 0x42);
    let outcome = m.step();
    assert!(matches!(outcome, StepOutcome::Fault { .. }));
    assert_eq!(m.register(Register::R7), 0x42);
    assert_eq!(m.pc(), 0);
    assert_eq!(m.step(), outcome);
}

#[test]
fn push_and_pop_move_the_stack_pointer() {
    let mut m = machine(&[
        Instr::Push(Reg {
            rd: Gpr::from_encoding(3),
        }),
        Instr::Pop(Reg {
            rd: Gpr::from_encoding(4),
        }),
    ]);
    let sp = m.stack_pointer();
    m.set_register(Register::R3, 0x5A);
    assert_eq!(m.step(), StepOutcome::Retired { cycles: 2 });
    assert_eq!(m.stack_pointer(), sp - 1);
    assert_eq!(m.segment().peek(u32::from(sp)), Some(0x5A));
    m.step();
    assert_eq!(m.stack_pointer(), sp);
    assert_eq!(m.register(Register::R4), 0x5A);
}
