//! Whole-program runs: raw images, interrupts, sleep and program-memory loads.

#![allow(clippy::pedantic, clippy::nursery)]

use std::cell::RefCell;
use std::rc::Rc;

use avr_core::addr_mode::{AbsJump, Implied, LoadZPostInc, Reg};
use avr_core::{
    disassemble_window, Gpr, Instr, InterruptProbe, Interpreter, MachineConfig, PointerRegister,
    ProgramAddr, Register, RunBoundary, RunState, StateView, StepOutcome, ZPostIncrement,
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

fn place(m: &mut Interpreter, addr: u32, program: &[Instr]) {
    let image: Vec<u8> = program
        .iter()
        .flat_map(|instr| instr.encode().to_bytes())
        .collect();
    m.load_program(addr, &image).expect("program fits");
}

fn jmp(word_address: u32) -> Instr {
    Instr::Jmp(AbsJump {
        target: ProgramAddr::from_bits(word_address),
    })
}

#[test]
fn raw_jmp_to_self_loops_forever() {
    let mut m = Interpreter::new(MachineConfig::default());
    m.load_program(0, &[0x0C, 0x94, 0x00, 0x00]).expect("fits");
    let outcome = m.run(RunBoundary::Steps(4));
    assert_eq!(outcome.steps, 4);
    assert_eq!(outcome.final_step, Some(StepOutcome::Retired { cycles: 3 }));
    assert_eq!(m.pc(), 0);
    assert_eq!(m.cycles(), 12);
}

#[derive(Default)]
struct Events(Rc<RefCell<Vec<&'static str>>>);

impl InterruptProbe for Events {
    fn fire_before_invoke(&mut self, state: &dyn StateView, _number: u8) {
        assert_eq!(state.pc(), 0x24);
        self.0.borrow_mut().push("invoke");
    }

    fn fire_when_posted(&mut self, _state: &dyn StateView, _number: u8) {
        self.0.borrow_mut().push("posted");
    }

    fn fire_when_unposted(&mut self, _state: &dyn StateView, _number: u8) {
        self.0.borrow_mut().push("unposted");
    }
}

#[test]
fn interrupt_wakes_sleep_and_reti_returns() {
    let mut m = Interpreter::new(MachineConfig::default());
    place(&mut m, 0x00, &[jmp(0x10)]);
    place(&mut m, 0x04, &[jmp(0x20)]);
    place(
        &mut m,
        0x20,
        &[
            Instr::Sei(Implied {}),
            Instr::Sleep(Implied {}),
            Instr::Break(Implied {}),
        ],
    );
    place(
        &mut m,
        0x40,
        &[
            Instr::Inc(Reg {
                rd: Gpr::from_encoding(20),
            }),
            Instr::Reti(Implied {}),
        ],
    );
    let events = Rc::new(RefCell::new(Vec::new()));
    m.add_interrupt_probe(Box::new(Events(Rc::clone(&events))));
    let sp = m.stack_pointer();

    m.enable_interrupt(1);
    m.post_interrupt(1);

    assert_eq!(m.step(), StepOutcome::Retired { cycles: 3 });
    assert_eq!(m.step(), StepOutcome::Retired { cycles: 1 });
    // Interrupt held back one instruction after SEI.
    assert_eq!(m.step(), StepOutcome::Retired { cycles: 1 });
    assert_eq!(m.run_state(), RunState::Sleeping);
    assert_eq!(m.step(), StepOutcome::Interrupt { number: 1, cycles: 4 });
    assert_eq!(m.run_state(), RunState::Running);
    assert_eq!(m.pc(), 0x04);
    assert_eq!(m.stack_pointer(), sp - 2);

    let outcome = m.run(RunBoundary::Steps(100));
    assert_eq!(outcome.final_step, Some(StepOutcome::Stopped));
    assert_eq!(m.register(Register::R20), 1);
    assert_eq!(m.stack_pointer(), sp);
    assert_eq!(m.pc(), 0x26);
    assert_eq!(m.cycles(), 3 + 1 + 1 + 4 + 3 + 1 + 4 + 1);
    assert_eq!(*events.borrow(), vec!["posted", "invoke", "unposted"]);
}

#[test]
fn sleeping_core_idles_without_interrupts() {
    let mut m = Interpreter::new(MachineConfig::default());
    place(&mut m, 0, &[Instr::Sleep(Implied {})]);
    m.step();
    assert_eq!(m.step(), StepOutcome::Sleeping);
    assert_eq!(m.step(), StepOutcome::Sleeping);
    assert_eq!(m.pc(), 2);
    assert_eq!(m.cycles(), 3);
}

#[test]
fn lpm_reads_a_table_from_flash() {
    let mut m = Interpreter::new(MachineConfig::default());
    let lpm = |rd| {
        Instr::LpmPi(LoadZPostInc {
            rd: Gpr::from_encoding(rd),
            src: ZPostIncrement,
        })
    };
    place(&mut m, 0, &[lpm(16), lpm(17)]);
    m.load_program(0x100, b"Hi").expect("fits");
    m.set_pointer(PointerRegister::Z, 0x100);
    assert_eq!(m.step(), StepOutcome::Retired { cycles: 3 });
    m.step();
    assert_eq!(m.register(Register::R16), b'H');
    assert_eq!(m.register(Register::R17), b'i');
    assert_eq!(m.pointer(PointerRegister::Z), 0x102);
}

#[test]
fn flash_writes_invalidate_decoded_instructions() {
    let mut m = Interpreter::new(MachineConfig::default());
    place(&mut m, 0, &[Instr::Nop(Implied {}), Instr::Nop(Implied {})]);
    m.step();
    m.set_pc(0);
    // 0x9598 is BREAK
    m.write_flash(0, 0x98).expect("in range");
    m.write_flash(1, 0x95).expect("in range");
    m.step();
    assert_eq!(m.run_state(), RunState::Stopped);
}

#[test]
fn identical_images_run_identically() {
    let run = || {
        let mut m = Interpreter::new(MachineConfig::default());
        place(&mut m, 0, &[jmp(0x10)]);
        place(
            &mut m,
            0x20,
            &[
                Instr::Inc(Reg {
                    rd: Gpr::from_encoding(1),
                }),
                jmp(0x10),
            ],
        );
        m.run(RunBoundary::Cycles(1_000));
        (m.pc(), m.cycles(), m.register(Register::R1), m.sreg())
    };
    assert_eq!(run(), run());
}

#[test]
fn disassembly_window_follows_the_program() {
    let mut m = Interpreter::new(MachineConfig::default());
    place(
        &mut m,
        0,
        &[
            jmp(0x10),
            Instr::Inc(Reg {
                rd: Gpr::from_encoding(1),
            }),
            Instr::Break(Implied {}),
        ],
    );
    let rows = disassemble_window(4, 1, 1, m.flash().bytes());
    let text: Vec<String> = rows.iter().map(ToString::to_string).collect();
    assert_eq!(
        text,
        vec![
            "000000: jmp 0x000020".to_owned(),
            "000004: inc r1".to_owned(),
            "000006: break".to_owned(),
        ]
    );
}
