//! Instruction execution for the AVR core.
//!
//! [`Interpreter`] owns the machine: data space, flash, program counter and
//! cycle counter. One `step` runs the fetch/execute sequence:
//! 1. Return the latched fault or stop, if any
//! 2. Take a pending interrupt (unless `I` was set by the previous instruction)
//! 3. Idle one cycle while sleeping
//! 4. Fetch and decode through the flash cache
//! 5. Fire probes, execute, fire probes
//! 6. Advance PC and charge cycles
//!
//! Execution is all-or-nothing: every instruction validates the addresses
//! it touches before its first architectural write, and a fault latches the
//! machine in [`RunState::Faulted`].

mod flags;
mod helpers;

pub use flags::{
    logic_flags, perform_addition, perform_complement, perform_decrement, perform_increment,
    perform_left_shift, perform_multiply, perform_right_shift, perform_subtraction,
    perform_subtraction_pz, perform_word_addition, perform_word_subtraction, AluResult,
    Signedness, WordResult, MULTIPLY_FLAGS, WORD_FLAGS,
};
pub use helpers::{pointer_access, PointerAccess};

use std::collections::BTreeMap;

use log::{debug, trace, warn};

use crate::addr_mode::{
    AbsJump, BitBranch, Branch, FlagBit, High, HighHigh, HighImm, IoBit, IoReg, LdDirect, LdDisp,
    LdInd, LdPostInc, LdPreDec, LoadZ, LoadZPostInc, MidMid, PairPair, Reg, RegBit, RegIo,
    RegReg, RelJump, StDirect, StDisp, StInd, StPostInc, StPreDec, WordImm,
};
use crate::api::{
    InterruptProbe, InterruptTable, MachineConfig, Probe, RunBoundary, RunOutcome, StateView,
    StepOutcome, Watch, INTERRUPT_VECTOR_BYTES,
};
use crate::fault::Fault;
use crate::flash::Flash;
use crate::instr::{Instr, Mnemonic};
use crate::memory::{IoRegister, MemorySegment, EIND_IO, SPH_IO, SPL_IO, SREG_IO};
use crate::operand::{Imm3, PointerMode};
use crate::state::{RunState, Sreg};
use crate::symbol::{PointerRegister, Register};
use crate::timing::{base_cycles, cycle_cost, CycleCostKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProbePhase {
    Before,
    After,
}

/// A single simulated AVR core.
pub struct Interpreter {
    config: MachineConfig,
    segment: MemorySegment,
    flash: Flash,
    pc: u32,
    next_pc: u32,
    cycles: u64,
    run_state: RunState,
    interrupts: InterruptTable,
    interrupt_delay: bool,
    probes: BTreeMap<u32, Vec<Box<dyn Probe>>>,
    interrupt_probes: Vec<Box<dyn InterruptProbe>>,
}

impl std::fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreter")
            .field("pc", &self.pc)
            .field("cycles", &self.cycles)
            .field("run_state", &self.run_state)
            .field("sreg", &self.sreg())
            .field("sp", &self.stack_pointer())
            .field("interrupts", &self.interrupts)
            .field("probed_addresses", &self.probes.len())
            .finish_non_exhaustive()
    }
}

impl Interpreter {
    /// Builds a machine with erased flash and applies reset.
    #[must_use]
    pub fn new(config: MachineConfig) -> Self {
        let mut interpreter = Self {
            segment: MemorySegment::new(config.layout()),
            flash: Flash::new(config.flash_bytes as usize),
            config,
            pc: 0,
            next_pc: 0,
            cycles: 0,
            run_state: RunState::Running,
            interrupts: InterruptTable::default(),
            interrupt_delay: false,
            probes: BTreeMap::new(),
            interrupt_probes: Vec::new(),
        };
        interpreter.reset();
        interpreter
    }

    /// Resets the core: clears data space, PC, cycles, interrupts and run
    /// state and reloads `SP`. Flash, probes, watches and I/O handlers are kept.
    pub fn reset(&mut self) {
        self.segment.clear();
        self.pc = 0;
        self.next_pc = 0;
        self.cycles = 0;
        self.run_state = RunState::Running;
        self.interrupts = InterruptTable::default();
        self.interrupt_delay = false;
        self.set_stack_pointer(self.config.reset_sp());
        debug!("core reset, sp={:#06x}", self.config.reset_sp());
    }

    /// Machine configuration.
    #[must_use]
    pub const fn config(&self) -> &MachineConfig {
        &self.config
    }

    /// Data space.
    #[must_use]
    pub const fn segment(&self) -> &MemorySegment {
        &self.segment
    }

    /// Mutable data space, for hosts preparing state between steps.
    pub fn segment_mut(&mut self) -> &mut MemorySegment {
        &mut self.segment
    }

    /// Program memory.
    #[must_use]
    pub const fn flash(&self) -> &Flash {
        &self.flash
    }

    /// Copies a program image into flash at byte address `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::ProgramAddressOutOfRange`] if the image does not fit.
    pub fn load_program(&mut self, addr: u32, image: &[u8]) -> Result<(), Fault> {
        self.flash.load(addr, image)
    }

    /// Writes one flash byte.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::ProgramAddressOutOfRange`] past the end of flash.
    pub fn write_flash(&mut self, addr: u32, value: u8) -> Result<(), Fault> {
        self.flash.write(addr, value)
    }

    /// Program counter (byte address).
    #[must_use]
    pub const fn pc(&self) -> u32 {
        self.pc
    }

    /// Moves the program counter; the next step fetches from `pc`.
    pub fn set_pc(&mut self, pc: u32) {
        self.pc = pc;
        self.next_pc = pc;
    }

    /// Control-flow target of the most recently executed instruction.
    #[must_use]
    pub const fn next_pc(&self) -> u32 {
        self.next_pc
    }

    /// Elapsed cycles since reset.
    #[must_use]
    pub const fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Current run state.
    #[must_use]
    pub const fn run_state(&self) -> RunState {
        self.run_state
    }

    /// Continues after `BREAK`. Has no effect in other states.
    pub fn resume(&mut self) {
        if self.run_state == RunState::Stopped {
            self.run_state = RunState::Running;
        }
    }

    /// General-purpose register value.
    #[must_use]
    pub fn register(&self, register: Register) -> u8 {
        self.reg(register)
    }

    /// Sets a general-purpose register.
    pub fn set_register(&mut self, register: Register, value: u8) {
        self.set_reg(register, value);
    }

    /// Status register.
    #[must_use]
    pub fn sreg(&self) -> Sreg {
        Sreg::from_bits_retain(self.segment.core_io(SREG_IO))
    }

    /// Replaces the status register.
    pub fn set_sreg(&mut self, sreg: Sreg) {
        let ctx = self.watch_context();
        self.segment.set_core_io(SREG_IO, sreg.bits(), &ctx);
    }

    fn set_flag(&mut self, flag: Sreg, value: bool) {
        self.set_sreg(self.sreg().assign(flag, value));
    }

    /// Stack pointer (`SPH:SPL`).
    #[must_use]
    pub fn stack_pointer(&self) -> u16 {
        u16::from_le_bytes([
            self.segment.core_io(SPL_IO),
            self.segment.core_io(SPH_IO),
        ])
    }

    /// Sets the stack pointer.
    pub fn set_stack_pointer(&mut self, sp: u16) {
        let [lo, hi] = sp.to_le_bytes();
        let ctx = self.watch_context();
        self.segment.set_core_io(SPL_IO, lo, &ctx);
        self.segment.set_core_io(SPH_IO, hi, &ctx);
    }

    /// 16-bit value of pointer register `pointer`.
    #[must_use]
    pub fn pointer(&self, pointer: PointerRegister) -> u16 {
        self.pair(pointer.low())
    }

    /// Sets pointer register `pointer`.
    pub fn set_pointer(&mut self, pointer: PointerRegister, value: u16) {
        self.set_pair(pointer.low(), value);
    }

    /// Reads a pointer operand, applying its increment or decrement.
    ///
    /// Returns the address the access uses.
    pub fn read_pointer(&mut self, pointer: PointerRegister, mode: PointerMode) -> u16 {
        let access = pointer_access(self.pointer(pointer), mode);
        self.set_pointer(pointer, access.updated);
        access.address
    }

    /// Sets the global interrupt enable flag.
    pub fn enable_interrupts(&mut self) {
        self.set_flag(Sreg::I, true);
    }

    /// Clears the global interrupt enable flag.
    pub fn disable_interrupts(&mut self) {
        self.set_flag(Sreg::I, false);
    }

    /// Posted and enabled interrupt sets.
    #[must_use]
    pub const fn interrupts(&self) -> InterruptTable {
        self.interrupts
    }

    /// Posts interrupt `number`.
    pub fn post_interrupt(&mut self, number: u8) {
        if self.interrupts.post(number) {
            self.notify(|probe, state| probe.fire_when_posted(state, number));
        }
    }

    /// Withdraws interrupt `number`.
    pub fn unpost_interrupt(&mut self, number: u8) {
        if self.interrupts.unpost(number) {
            self.notify(|probe, state| probe.fire_when_unposted(state, number));
        }
    }

    /// Enables interrupt `number`.
    pub fn enable_interrupt(&mut self, number: u8) {
        if self.interrupts.enable(number) {
            self.notify(|probe, state| probe.fire_when_enabled(state, number));
        }
    }

    /// Disables interrupt `number`.
    pub fn disable_interrupt(&mut self, number: u8) {
        if self.interrupts.disable(number) {
            self.notify(|probe, state| probe.fire_when_disabled(state, number));
        }
    }

    /// Registers a probe on the instruction at byte address `pc`.
    pub fn add_probe(&mut self, pc: u32, probe: Box<dyn Probe>) {
        self.probes.entry(pc).or_default().push(probe);
    }

    /// Removes every probe at `pc`, returning how many there were.
    pub fn remove_probes(&mut self, pc: u32) -> usize {
        self.probes.remove(&pc).map_or(0, |probes| probes.len())
    }

    /// Registers an interrupt probe.
    pub fn add_interrupt_probe(&mut self, probe: Box<dyn InterruptProbe>) {
        self.interrupt_probes.push(probe);
    }

    /// Registers a watch on data address `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::DataAddressOutOfRange`] past the end of data space.
    pub fn add_watch(&mut self, addr: u32, watch: Box<dyn Watch>) -> Result<(), Fault> {
        self.segment.add_watch(addr, watch)
    }

    /// Installs a peripheral handler at I/O index `io`.
    ///
    /// # Errors
    ///
    /// See [`MemorySegment::install_io`].
    pub fn install_io(&mut self, io: u16, handler: Box<dyn IoRegister>) -> Result<(), Fault> {
        self.segment.install_io(io, handler)
    }

    fn notify(&mut self, event: impl Fn(&mut dyn InterruptProbe, &dyn StateView)) {
        if self.interrupt_probes.is_empty() {
            return;
        }
        let mut probes = std::mem::take(&mut self.interrupt_probes);
        let state: &dyn StateView = &*self;
        for probe in &mut probes {
            event(probe.as_mut(), state);
        }
        self.interrupt_probes = probes;
    }

    fn fire_probes(&mut self, pc: u32, phase: ProbePhase) {
        let Some(mut probes) = self.probes.remove(&pc) else {
            return;
        };
        let state: &dyn StateView = &*self;
        for probe in &mut probes {
            match phase {
                ProbePhase::Before => probe.fire_before(state, pc),
                ProbePhase::After => probe.fire_after(state, pc),
            }
        }
        self.probes.insert(pc, probes);
    }

    fn latch(&mut self, cause: Fault) -> StepOutcome {
        warn!("fault latched at {:#06x}: {cause}", self.pc);
        self.run_state = RunState::Faulted(cause);
        StepOutcome::Fault { cause }
    }

    /// Takes interrupt `number`: pushes the return address, clears `I` and
    /// jumps to the vector. Wakes a sleeping core.
    ///
    /// Returns the cycles charged.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::DataAddressOutOfRange`] when the stack is outside data space.
    pub fn invoke_interrupt(&mut self, number: u8) -> Result<u32, Fault> {
        self.notify(|probe, state| probe.fire_before_invoke(state, number));
        let return_to = self.pc;
        self.push_pc(return_to)?;
        self.set_flag(Sreg::I, false);
        self.set_pc(u32::from(number) * INTERRUPT_VECTOR_BYTES);
        if self.interrupts.unpost(number) {
            self.notify(|probe, state| probe.fire_when_unposted(state, number));
        }
        if self.run_state == RunState::Sleeping {
            self.run_state = RunState::Running;
        }
        let cycles = cycle_cost(CycleCostKind::InterruptEntry).unwrap_or(4);
        self.cycles += u64::from(cycles);
        debug!("interrupt {number} taken, return to {return_to:#06x}");
        self.notify(|probe, state| probe.fire_after_invoke(state, number));
        Ok(cycles)
    }

    /// Runs one step of the fetch/execute sequence.
    pub fn step(&mut self) -> StepOutcome {
        match self.run_state {
            RunState::Faulted(cause) => return StepOutcome::Fault { cause },
            RunState::Stopped => return StepOutcome::Stopped,
            RunState::Running | RunState::Sleeping => {}
        }

        if self.interrupt_delay {
            self.interrupt_delay = false;
        } else if self.sreg().contains(Sreg::I) {
            if let Some(number) = self.interrupts.pending() {
                return match self.invoke_interrupt(number) {
                    Ok(cycles) => StepOutcome::Interrupt { number, cycles },
                    Err(cause) => self.latch(cause),
                };
            }
        }

        if self.run_state == RunState::Sleeping {
            self.cycles += 1;
            return StepOutcome::Sleeping;
        }

        let pc = self.pc;
        let decoded = match self.flash.decode_at(pc) {
            Ok(Some(decoded)) => decoded,
            Ok(None) => {
                let word = self.flash.read_word(pc).unwrap_or(0xFFFF);
                return self.latch(Fault::IllegalInstruction { pc, word });
            }
            Err(cause) => return self.latch(cause),
        };

        self.fire_probes(pc, ProbePhase::Before);
        let interrupts_were_enabled = self.sreg().contains(Sreg::I);
        match self.execute(&decoded.instr) {
            Ok(cycles) => {
                self.cycles += u64::from(cycles);
                self.pc = self.next_pc;
                trace!("{pc:#06x}: {} ({cycles} cycles)", decoded.instr);
                self.fire_probes(pc, ProbePhase::After);
                if !interrupts_were_enabled && self.sreg().contains(Sreg::I) {
                    self.interrupt_delay = true;
                }
                StepOutcome::Retired { cycles }
            }
            Err(cause) => self.latch(cause),
        }
    }

    /// Steps until `boundary` is reached, a fault latches or `BREAK` stops the core.
    pub fn run(&mut self, boundary: RunBoundary) -> RunOutcome {
        let mut steps = 0;
        let mut final_step = None;
        loop {
            let reached = match boundary {
                RunBoundary::Cycles(budget) => self.cycles >= budget,
                RunBoundary::Steps(limit) => steps >= limit,
            };
            if reached {
                break;
            }
            let outcome = self.step();
            steps += 1;
            final_step = Some(outcome);
            if matches!(outcome, StepOutcome::Fault { .. } | StepOutcome::Stopped) {
                break;
            }
        }
        RunOutcome { steps, final_step }
    }

    /// Applies the side effects of `instr` located at the current PC.
    ///
    /// Sets `next_pc` to the fall-through address first; control transfers
    /// overwrite it. Returns the cycles charged, penalties included. The
    /// program counter itself is advanced by [`Interpreter::step`].
    ///
    /// # Errors
    ///
    /// Returns the fault raised by a memory access or an unimplemented
    /// mnemonic; no architectural state has changed in that case.
    pub fn execute(&mut self, instr: &Instr) -> Result<u32, Fault> {
        self.next_pc = self.pc.wrapping_add(u32::from(instr.size()));
        let penalty = self.dispatch(instr)?;
        Ok(base_cycles(instr.mnemonic()) + penalty)
    }

    fn alu(&mut self, rd: Register, result: AluResult) {
        self.set_reg(rd, result.value);
        self.compare(result);
    }

    fn compare(&mut self, result: AluResult) {
        self.set_sreg(result.apply(self.sreg()));
    }

    fn word(&mut self, rd: Register, result: WordResult) {
        self.set_pair(rd, result.value);
        self.set_sreg(self.sreg().with(WORD_FLAGS, result.flags));
    }

    fn multiply(&mut self, rd: Register, rr: Register, signedness: Signedness, fractional: bool) {
        let result = perform_multiply(self.reg(rd), self.reg(rr), signedness, fractional);
        self.set_pair(Register::R0, result.value);
        self.set_sreg(self.sreg().with(MULTIPLY_FLAGS, result.flags));
    }

    fn status_condition(&self, mnemonic: Mnemonic) -> bool {
        mnemonic
            .status_alias()
            .is_some_and(|(bit, set)| self.sreg().contains(Sreg::from_bit(bit)) == set)
    }

    fn load_indirect(
        &mut self,
        rd: Register,
        pointer: PointerRegister,
        mode: PointerMode,
    ) -> Result<u32, Fault> {
        let access = pointer_access(self.pointer(pointer), mode);
        let value = self.load_data(u32::from(access.address))?;
        self.set_pointer(pointer, access.updated);
        self.set_reg(rd, value);
        Ok(0)
    }

    fn store_indirect(
        &mut self,
        pointer: PointerRegister,
        mode: PointerMode,
        rr: Register,
    ) -> Result<u32, Fault> {
        let value = self.reg(rr);
        let access = pointer_access(self.pointer(pointer), mode);
        self.store_data(u32::from(access.address), value)?;
        self.set_pointer(pointer, access.updated);
        Ok(0)
    }

    fn load_program_memory(
        &mut self,
        rd: Register,
        extended: bool,
        increment: bool,
    ) -> Result<u32, Fault> {
        let addr = self.program_pointer(extended);
        let value = self.flash.read(addr)?;
        self.set_reg(rd, value);
        if increment {
            self.advance_program_pointer(addr, extended);
        }
        Ok(0)
    }

    /// Word address of `EIJMP`/`EICALL`: `EIND:Z` when `EIND` exists, else `Z`.
    fn extended_target(&self) -> u32 {
        let z = u32::from(self.pointer(PointerRegister::Z));
        if self.config.has_eind {
            (u32::from(self.segment.core_io(EIND_IO)) << 16) | z
        } else {
            z
        }
    }

    fn io_bit(&mut self, io: u16, bit: Imm3) -> Result<bool, Fault> {
        let ctx = self.watch_context();
        self.segment.read_io_bit(io, bit_number(bit), &ctx)
    }

    fn write_io_bit(&mut self, io: u16, bit: Imm3, value: bool) -> Result<(), Fault> {
        let ctx = self.watch_context();
        self.segment.write_io_bit(io, bit_number(bit), value, &ctx)
    }

    #[allow(clippy::too_many_lines)]
    fn dispatch(&mut self, instr: &Instr) -> Result<u32, Fault> {
        let sreg = self.sreg();
        let carry = sreg.contains(Sreg::C);
        let zero = sreg.contains(Sreg::Z);

        let penalty = match *instr {
            Instr::Add(RegReg { rd, rr }) => {
                let result = perform_addition(self.reg(rd.register()), self.reg(rr.register()), false);
                self.alu(rd.register(), result);
                0
            }
            Instr::Adc(RegReg { rd, rr }) => {
                let result = perform_addition(self.reg(rd.register()), self.reg(rr.register()), carry);
                self.alu(rd.register(), result);
                0
            }
            Instr::Sub(RegReg { rd, rr }) => {
                let result =
                    perform_subtraction(self.reg(rd.register()), self.reg(rr.register()), false);
                self.alu(rd.register(), result);
                0
            }
            Instr::Sbc(RegReg { rd, rr }) => {
                let result = perform_subtraction_pz(
                    self.reg(rd.register()),
                    self.reg(rr.register()),
                    carry,
                    zero,
                );
                self.alu(rd.register(), result);
                0
            }
            Instr::And(RegReg { rd, rr }) => {
                let value = self.reg(rd.register()) & self.reg(rr.register());
                self.alu(rd.register(), logic_flags(value));
                0
            }
            Instr::Or(RegReg { rd, rr }) => {
                let value = self.reg(rd.register()) | self.reg(rr.register());
                self.alu(rd.register(), logic_flags(value));
                0
            }
            Instr::Eor(RegReg { rd, rr }) => {
                let value = self.reg(rd.register()) ^ self.reg(rr.register());
                self.alu(rd.register(), logic_flags(value));
                0
            }
            Instr::Mov(RegReg { rd, rr }) => {
                self.set_reg(rd.register(), self.reg(rr.register()));
                0
            }
            Instr::Cp(RegReg { rd, rr }) => {
                let result =
                    perform_subtraction(self.reg(rd.register()), self.reg(rr.register()), false);
                self.compare(result);
                0
            }
            Instr::Cpc(RegReg { rd, rr }) => {
                let result = perform_subtraction_pz(
                    self.reg(rd.register()),
                    self.reg(rr.register()),
                    carry,
                    zero,
                );
                self.compare(result);
                0
            }
            Instr::Cpse(RegReg { rd, rr }) => {
                if self.reg(rd.register()) == self.reg(rr.register()) {
                    self.skip()?
                } else {
                    0
                }
            }
            Instr::Mul(RegReg { rd, rr }) => {
                self.multiply(rd.register(), rr.register(), Signedness::Unsigned, false);
                0
            }
            Instr::Movw(PairPair { rd, rr }) => {
                self.set_pair(rd.register(), self.pair(rr.register()));
                0
            }
            Instr::Muls(HighHigh { rd, rr }) => {
                self.multiply(rd.register(), rr.register(), Signedness::Signed, false);
                0
            }
            Instr::Mulsu(MidMid { rd, rr }) => {
                self.multiply(rd.register(), rr.register(), Signedness::SignedUnsigned, false);
                0
            }
            Instr::Fmul(MidMid { rd, rr }) => {
                self.multiply(rd.register(), rr.register(), Signedness::Unsigned, true);
                0
            }
            Instr::Fmuls(MidMid { rd, rr }) => {
                self.multiply(rd.register(), rr.register(), Signedness::Signed, true);
                0
            }
            Instr::Fmulsu(MidMid { rd, rr }) => {
                self.multiply(rd.register(), rr.register(), Signedness::SignedUnsigned, true);
                0
            }
            Instr::Com(Reg { rd }) => {
                self.alu(rd.register(), perform_complement(self.reg(rd.register())));
                0
            }
            Instr::Neg(Reg { rd }) => {
                let result = perform_subtraction(0, self.reg(rd.register()), false);
                self.alu(rd.register(), result);
                0
            }
            Instr::Swap(Reg { rd }) => {
                self.set_reg(rd.register(), self.reg(rd.register()).rotate_left(4));
                0
            }
            Instr::Inc(Reg { rd }) => {
                self.alu(rd.register(), perform_increment(self.reg(rd.register())));
                0
            }
            Instr::Dec(Reg { rd }) => {
                self.alu(rd.register(), perform_decrement(self.reg(rd.register())));
                0
            }
            Instr::Asr(Reg { rd }) => {
                let value = self.reg(rd.register());
                self.alu(rd.register(), perform_right_shift(value, value & 0x80 != 0));
                0
            }
            Instr::Lsr(Reg { rd }) => {
                self.alu(rd.register(), perform_right_shift(self.reg(rd.register()), false));
                0
            }
            Instr::Ror(Reg { rd }) => {
                self.alu(rd.register(), perform_right_shift(self.reg(rd.register()), carry));
                0
            }
            Instr::Push(Reg { rd }) => {
                self.push(self.reg(rd.register()))?;
                0
            }
            Instr::Pop(Reg { rd }) => {
                let value = self.pop()?;
                self.set_reg(rd.register(), value);
                0
            }
            Instr::Clr(Reg { rd }) => {
                self.alu(rd.register(), logic_flags(0));
                0
            }
            Instr::Lsl(Reg { rd }) => {
                let value = self.reg(rd.register());
                self.alu(rd.register(), perform_left_shift(value, false));
                0
            }
            Instr::Rol(Reg { rd }) => {
                let value = self.reg(rd.register());
                self.alu(rd.register(), perform_left_shift(value, carry));
                0
            }
            Instr::Tst(Reg { rd }) => {
                self.compare(logic_flags(self.reg(rd.register())));
                0
            }
            Instr::Cpi(HighImm { rd, k }) => {
                self.compare(perform_subtraction(self.reg(rd.register()), imm8(k), false));
                0
            }
            Instr::Sbci(HighImm { rd, k }) => {
                let result = perform_subtraction_pz(self.reg(rd.register()), imm8(k), carry, zero);
                self.alu(rd.register(), result);
                0
            }
            Instr::Subi(HighImm { rd, k }) => {
                let result = perform_subtraction(self.reg(rd.register()), imm8(k), false);
                self.alu(rd.register(), result);
                0
            }
            Instr::Ori(HighImm { rd, k }) | Instr::Sbr(HighImm { rd, k }) => {
                let value = self.reg(rd.register()) | imm8(k);
                self.alu(rd.register(), logic_flags(value));
                0
            }
            Instr::Andi(HighImm { rd, k }) => {
                let value = self.reg(rd.register()) & imm8(k);
                self.alu(rd.register(), logic_flags(value));
                0
            }
            Instr::Cbr(HighImm { rd, k }) => {
                let value = self.reg(rd.register()) & !imm8(k);
                self.alu(rd.register(), logic_flags(value));
                0
            }
            Instr::Ldi(HighImm { rd, k }) => {
                self.set_reg(rd.register(), imm8(k));
                0
            }
            Instr::Ser(High { rd }) => {
                self.set_reg(rd.register(), 0xFF);
                0
            }
            Instr::Adiw(WordImm { rd, k }) => {
                let result = perform_word_addition(self.pair(rd.register()), k.bits());
                self.word(rd.register(), result);
                0
            }
            Instr::Sbiw(WordImm { rd, k }) => {
                let result = perform_word_subtraction(self.pair(rd.register()), k.bits());
                self.word(rd.register(), result);
                0
            }
            Instr::Bld(RegBit { rd, bit }) => {
                let mask = 1 << bit_number(bit);
                let value = self.reg(rd.register());
                let value = if sreg.contains(Sreg::T) {
                    value | mask
                } else {
                    value & !mask
                };
                self.set_reg(rd.register(), value);
                0
            }
            Instr::Bst(RegBit { rd, bit }) => {
                let set = self.reg(rd.register()) & (1 << bit_number(bit)) != 0;
                self.set_flag(Sreg::T, set);
                0
            }
            Instr::Sbrc(RegBit { rd, bit }) => {
                if self.reg(rd.register()) & (1 << bit_number(bit)) == 0 {
                    self.skip()?
                } else {
                    0
                }
            }
            Instr::Sbrs(RegBit { rd, bit }) => {
                if self.reg(rd.register()) & (1 << bit_number(bit)) != 0 {
                    self.skip()?
                } else {
                    0
                }
            }
            Instr::Cbi(IoBit { io, bit }) => {
                self.write_io_bit(io.bits(), bit, false)?;
                0
            }
            Instr::Sbi(IoBit { io, bit }) => {
                self.write_io_bit(io.bits(), bit, true)?;
                0
            }
            Instr::Sbic(IoBit { io, bit }) => {
                if self.io_bit(io.bits(), bit)? {
                    0
                } else {
                    self.skip()?
                }
            }
            Instr::Sbis(IoBit { io, bit }) => {
                if self.io_bit(io.bits(), bit)? {
                    self.skip()?
                } else {
                    0
                }
            }
            Instr::Bset(FlagBit { bit }) => {
                self.set_flag(Sreg::from_bit(bit_number(bit)), true);
                0
            }
            Instr::Bclr(FlagBit { bit }) => {
                self.set_flag(Sreg::from_bit(bit_number(bit)), false);
                0
            }
            Instr::Brbs(BitBranch { bit, target }) => {
                let taken = sreg.contains(Sreg::from_bit(bit_number(bit)));
                self.branch(taken, target.displacement())
            }
            Instr::Brbc(BitBranch { bit, target }) => {
                let taken = !sreg.contains(Sreg::from_bit(bit_number(bit)));
                self.branch(taken, target.displacement())
            }
            Instr::Breq(Branch { target })
            | Instr::Brne(Branch { target })
            | Instr::Brcs(Branch { target })
            | Instr::Brcc(Branch { target })
            | Instr::Brsh(Branch { target })
            | Instr::Brlo(Branch { target })
            | Instr::Brmi(Branch { target })
            | Instr::Brpl(Branch { target })
            | Instr::Brge(Branch { target })
            | Instr::Brlt(Branch { target })
            | Instr::Brhs(Branch { target })
            | Instr::Brhc(Branch { target })
            | Instr::Brts(Branch { target })
            | Instr::Brtc(Branch { target })
            | Instr::Brvs(Branch { target })
            | Instr::Brvc(Branch { target })
            | Instr::Brie(Branch { target })
            | Instr::Brid(Branch { target }) => {
                let taken = self.status_condition(instr.mnemonic());
                self.branch(taken, target.displacement())
            }
            Instr::Rjmp(RelJump { target }) => {
                self.jump_relative(target.displacement());
                0
            }
            Instr::Rcall(RelJump { target }) => {
                self.push_pc(self.next_pc)?;
                self.jump_relative(target.displacement());
                0
            }
            Instr::Jmp(AbsJump { target }) => {
                self.next_pc = target.byte_address();
                0
            }
            Instr::Call(AbsJump { target }) => {
                self.push_pc(self.next_pc)?;
                self.next_pc = target.byte_address();
                0
            }
            Instr::In(RegIo { rd, io }) => {
                let ctx = self.watch_context();
                let value = self.segment.read_io(io.bits(), &ctx)?;
                self.set_reg(rd.register(), value);
                0
            }
            Instr::Out(IoReg { io, rr }) => {
                let ctx = self.watch_context();
                let value = self.reg(rr.register());
                self.segment.write_io(io.bits(), value, &ctx)?;
                0
            }
            Instr::Ld(LdInd { rd, src }) => self.load_indirect(rd.register(), src.pointer(), src.mode())?,
            Instr::LdPi(LdPostInc { rd, src }) => {
                self.load_indirect(rd.register(), src.pointer(), src.mode())?
            }
            Instr::LdPd(LdPreDec { rd, src }) => {
                self.load_indirect(rd.register(), src.pointer(), src.mode())?
            }
            Instr::St(StInd { dst, rr }) => self.store_indirect(dst.pointer(), dst.mode(), rr.register())?,
            Instr::StPi(StPostInc { dst, rr }) => {
                self.store_indirect(dst.pointer(), dst.mode(), rr.register())?
            }
            Instr::StPd(StPreDec { dst, rr }) => {
                self.store_indirect(dst.pointer(), dst.mode(), rr.register())?
            }
            Instr::Ldd(LdDisp { rd, src }) => {
                let addr = u32::from(self.pointer(src.pointer.pointer())) + u32::from(src.offset.bits());
                let value = self.load_data(addr)?;
                self.set_reg(rd.register(), value);
                0
            }
            Instr::Std(StDisp { dst, rr }) => {
                let addr = u32::from(self.pointer(dst.pointer.pointer())) + u32::from(dst.offset.bits());
                self.store_data(addr, self.reg(rr.register()))?;
                0
            }
            Instr::Lds(LdDirect { rd, addr }) => {
                let value = self.load_data(u32::from(addr.value()))?;
                self.set_reg(rd.register(), value);
                0
            }
            Instr::Sts(StDirect { addr, rr }) => {
                self.store_data(u32::from(addr.value()), self.reg(rr.register()))?;
                0
            }
            Instr::Lpm(_) => self.load_program_memory(Register::R0, false, false)?,
            Instr::LpmD(LoadZ { rd, .. }) => self.load_program_memory(rd.register(), false, false)?,
            Instr::LpmPi(LoadZPostInc { rd, .. }) => {
                self.load_program_memory(rd.register(), false, true)?
            }
            Instr::Elpm(_) => self.load_program_memory(Register::R0, true, false)?,
            Instr::ElpmD(LoadZ { rd, .. }) => self.load_program_memory(rd.register(), true, false)?,
            Instr::ElpmPi(LoadZPostInc { rd, .. }) => {
                self.load_program_memory(rd.register(), true, true)?
            }
            Instr::Nop(_) | Instr::Wdr(_) => 0,
            Instr::Ret(_) => {
                self.next_pc = self.pop_pc()?;
                0
            }
            Instr::Reti(_) => {
                self.next_pc = self.pop_pc()?;
                self.set_flag(Sreg::I, true);
                0
            }
            Instr::Sleep(_) => {
                debug!("sleep at {:#06x}", self.pc);
                self.run_state = RunState::Sleeping;
                0
            }
            Instr::Break(_) => {
                debug!("break at {:#06x}", self.pc);
                self.run_state = RunState::Stopped;
                0
            }
            Instr::Ijmp(_) => {
                self.next_pc = u32::from(self.pointer(PointerRegister::Z)) * 2;
                0
            }
            Instr::Icall(_) => {
                self.push_pc(self.next_pc)?;
                self.next_pc = u32::from(self.pointer(PointerRegister::Z)) * 2;
                0
            }
            Instr::Eijmp(_) => {
                self.next_pc = self.extended_target() * 2;
                0
            }
            Instr::Eicall(_) => {
                self.push_pc(self.next_pc)?;
                self.next_pc = self.extended_target() * 2;
                0
            }
            Instr::Spm(_) => {
                return Err(Fault::Unimplemented {
                    mnemonic: Mnemonic::Spm,
                    pc: self.pc,
                })
            }
            Instr::Sec(_)
            | Instr::Clc(_)
            | Instr::Sez(_)
            | Instr::Clz(_)
            | Instr::Sen(_)
            | Instr::Cln(_)
            | Instr::Sev(_)
            | Instr::Clv(_)
            | Instr::Ses(_)
            | Instr::Cls(_)
            | Instr::Seh(_)
            | Instr::Clh(_)
            | Instr::Set(_)
            | Instr::Clt(_)
            | Instr::Sei(_)
            | Instr::Cli(_) => {
                if let Some((bit, set)) = instr.mnemonic().status_alias() {
                    self.set_flag(Sreg::from_bit(bit), set);
                }
                0
            }
        };
        Ok(penalty)
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn bit_number(bit: Imm3) -> u8 {
    (bit.bits() & 7) as u8
}

#[allow(clippy::cast_possible_truncation)]
const fn imm8(k: crate::operand::Imm8) -> u8 {
    k.bits() as u8
}

impl StateView for Interpreter {
    fn pc(&self) -> u32 {
        self.pc
    }

    fn cycles(&self) -> u64 {
        self.cycles
    }

    fn register(&self, register: Register) -> u8 {
        self.reg(register)
    }

    fn sreg(&self) -> Sreg {
        Self::sreg(self)
    }

    fn sp(&self) -> u16 {
        self.stack_pointer()
    }

    fn sram(&self, addr: u32) -> Option<u8> {
        self.segment.peek(addr)
    }

    fn io(&self, io: u16) -> Option<u8> {
        self.segment.peek_io(io)
    }

    fn flash(&self, addr: u32) -> Option<u8> {
        self.flash.read(addr).ok()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use rstest::rstest;

    use super::Interpreter;
    use crate::addr_mode::{AbsJump, Implied, IoBit, Reg, RegReg};
    use crate::api::{MachineConfig, Probe, RunBoundary, StateView, StepOutcome};
    use crate::fault::Fault;
    use crate::instr::{Instr, Mnemonic};
    use crate::operand::{Gpr, Imm3, Imm5, PointerMode, ProgramAddr};
    use crate::state::{RunState, Sreg};
    use crate::symbol::{PointerRegister, Register};

    fn machine(program: &[Instr]) -> Interpreter {
        let mut interpreter = Interpreter::new(MachineConfig::default());
        let image: Vec<u8> = program
            .iter()
            .flat_map(|instr| instr.encode().to_bytes())
            .collect();
        interpreter.load_program(0, &image).expect("fits");
        interpreter
    }

    fn reg_reg(rd: u16, rr: u16) -> RegReg {
        RegReg {
            rd: Gpr::from_encoding(rd),
            rr: Gpr::from_encoding(rr),
        }
    }

    #[test]
    fn compare_with_carry_propagates_a_nonzero_result() {
        let mut m = machine(&[Instr::Cpc(reg_reg(1, 2))]);
        m.set_register(Register::R1, 7);
        m.set_register(Register::R2, 7);
        m.set_sreg(Sreg::empty());
        assert!(matches!(m.step(), StepOutcome::Retired { cycles: 1 }));
        assert!(!m.sreg().contains(Sreg::Z));
    }

    #[test]
    fn call_and_ret_keep_word_addresses_on_the_stack() {
        let mut m = machine(&[]);
        let sp = m.stack_pointer();
        m.set_pc(0x01FC);
        let call = Instr::Call(AbsJump {
            target: ProgramAddr::from_bits(0x0010),
        });
        assert_eq!(m.execute(&call), Ok(4));
        assert_eq!(m.next_pc(), 0x0020);
        assert_eq!(m.segment().peek(u32::from(sp)), Some(0x00));
        assert_eq!(m.segment().peek(u32::from(sp) - 1), Some(0x01));
        assert_eq!(m.stack_pointer(), sp - 2);

        m.set_pc(0x0020);
        assert_eq!(m.execute(&Instr::Ret(Implied {})), Ok(4));
        assert_eq!(m.next_pc(), 0x0200);
        assert_eq!(m.stack_pointer(), sp);
    }

    #[test]
    fn pointer_reads_apply_their_side_effect() {
        let mut m = machine(&[]);
        m.set_pointer(PointerRegister::Z, 0x0100);
        assert_eq!(m.read_pointer(PointerRegister::Z, PointerMode::PostIncrement), 0x0100);
        assert_eq!(m.pointer(PointerRegister::Z), 0x0101);
        m.set_pointer(PointerRegister::Y, 0x0050);
        assert_eq!(m.read_pointer(PointerRegister::Y, PointerMode::PreDecrement), 0x004F);
        assert_eq!(m.pointer(PointerRegister::Y), 0x004F);
    }

    #[rstest]
    #[case::one_word(Instr::Nop(Implied {}), 2, 4)]
    #[case::two_words(Instr::Jmp(AbsJump { target: ProgramAddr::from_bits(0) }), 3, 6)]
    fn sbic_skips_the_whole_following_instruction(
        #[case] skipped: Instr,
        #[case] cycles: u32,
        #[case] pc: u32,
    ) {
        let sbic = Instr::Sbic(IoBit {
            io: Imm5::from_bits(0x10),
            bit: Imm3::from_bits(0),
        });
        let mut m = machine(&[sbic, skipped, Instr::Nop(Implied {})]);
        assert_eq!(m.step(), StepOutcome::Retired { cycles });
        assert_eq!(m.pc(), pc);
    }

    #[rstest]
    #[case::lsl(false, 0x81, 0x02, Sreg::V | Sreg::S | Sreg::C)]
    #[case::rol(true, 0x48, 0x91, Sreg::H | Sreg::V | Sreg::N)]
    fn shifts_left_through_carry(
        #[case] rotate: bool,
        #[case] value: u8,
        #[case] result: u8,
        #[case] flags: Sreg,
    ) {
        let rd = Reg {
            rd: Gpr::from_encoding(9),
        };
        let instr = if rotate { Instr::Rol(rd) } else { Instr::Lsl(rd) };
        let mut m = machine(&[instr]);
        m.set_sreg(Sreg::C);
        m.set_register(Register::R9, value);
        m.step();
        assert_eq!(m.register(Register::R9), result);
        assert_eq!(m.sreg(), flags);
    }

    #[test]
    fn unimplemented_mnemonic_latches_a_fault() {
        let mut m = machine(&[Instr::Spm(Implied {})]);
        let fault = Fault::Unimplemented {
            mnemonic: Mnemonic::Spm,
            pc: 0,
        };
        assert_eq!(m.step(), StepOutcome::Fault { cause: fault });
        assert_eq!(m.run_state(), RunState::Faulted(fault));
        assert_eq!(m.step(), StepOutcome::Fault { cause: fault });
        assert_eq!(m.pc(), 0);
    }

    #[test]
    fn erased_flash_is_an_illegal_instruction() {
        let mut m = machine(&[]);
        assert_eq!(
            m.step(),
            StepOutcome::Fault {
                cause: Fault::IllegalInstruction { pc: 0, word: 0xFFFF }
            }
        );
    }

    #[test]
    fn interrupts_wait_one_instruction_after_sei() {
        let nop = Instr::Nop(Implied {});
        let mut m = machine(&[nop, nop, Instr::Sei(Implied {}), nop, nop]);
        m.set_pc(4);
        m.enable_interrupt(1);
        m.post_interrupt(1);
        assert!(matches!(m.step(), StepOutcome::Retired { .. }));
        assert!(matches!(m.step(), StepOutcome::Retired { .. }));
        assert_eq!(m.step(), StepOutcome::Interrupt { number: 1, cycles: 4 });
        assert_eq!(m.pc(), 4);
        assert!(!m.sreg().contains(Sreg::I));
        assert!(!m.interrupts().is_posted(1));
    }

    #[test]
    fn break_stops_until_resumed() {
        let mut m = machine(&[Instr::Break(Implied {}), Instr::Nop(Implied {})]);
        let outcome = m.run(RunBoundary::Steps(10));
        assert_eq!(outcome.steps, 2);
        assert_eq!(outcome.final_step, Some(StepOutcome::Stopped));
        m.resume();
        assert!(matches!(m.step(), StepOutcome::Retired { .. }));
    }

    struct Trace(Rc<RefCell<Vec<(u32, u8)>>>);

    impl Probe for Trace {
        fn fire_before(&mut self, state: &dyn StateView, pc: u32) {
            self.0.borrow_mut().push((pc, state.register(Register::R1)));
        }

        fn fire_after(&mut self, state: &dyn StateView, pc: u32) {
            self.0.borrow_mut().push((pc, state.register(Register::R1)));
        }
    }

    #[test]
    fn probes_see_state_around_their_instruction() {
        let mut m = machine(&[Instr::Add(reg_reg(1, 1))]);
        m.set_register(Register::R1, 3);
        let seen = Rc::new(RefCell::new(Vec::new()));
        m.add_probe(0, Box::new(Trace(Rc::clone(&seen))));
        m.step();
        assert_eq!(*seen.borrow(), vec![(0, 3), (0, 6)]);
        assert_eq!(m.remove_probes(0), 1);
    }
}
