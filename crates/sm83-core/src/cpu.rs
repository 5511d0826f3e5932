mod alu;
mod micro;
mod registers;

pub use micro::{MicroOp, Pointer, Program, Routine, Source, Word};
pub use registers::{FLAG_C, FLAG_H, FLAG_N, FLAG_Z, Ime, Registers, SAVE_STATE_LEN};

use std::mem;
use std::sync::Arc;

use crate::diagnostics::{DiagnosticSink, default_sink, diag};
use crate::error::{Fault, MemoryError};
use crate::hardware::Model;
use crate::interrupts::{self, InterruptEntry};
use crate::isa::{self, InstrType, Instruction, Operand, Reg16};
use crate::mmu::{Address, Memory};

const TARGET: &str = "sm83::cpu";

#[derive(Debug, Clone, PartialEq, Eq)]
enum ExecState {
    Fetching,
    Executing(Program),
}

/// Cycle-stepped SM83 core.
///
/// [`tick`](Cpu::tick) advances one M-cycle. A fetch takes its own cycle,
/// after which the instruction's micro-op program runs one op per tick.
/// Interrupt dispatch replaces the fetch and takes five cycles.
pub struct Cpu {
    pub regs: Registers,
    /// M-cycles since construction.
    pub cycles: u64,
    state: ExecState,
    halt_bug: bool,
    locked: bool,
    sink: Arc<dyn DiagnosticSink>,
}

impl Cpu {
    /// CPU in the state the boot ROM leaves for `model`.
    pub fn new(model: Model) -> Self {
        Self::from_registers(Registers::post_boot(model))
    }

    /// CPU at `PC = 0`, for running a boot ROM.
    pub fn power_on() -> Self {
        Self::from_registers(Registers::power_on())
    }

    pub fn from_registers(regs: Registers) -> Self {
        Self {
            regs,
            cycles: 0,
            state: ExecState::Fetching,
            halt_bug: false,
            locked: false,
            sink: default_sink(),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    /// True between instructions.
    pub fn at_boundary(&self) -> bool {
        matches!(self.state, ExecState::Fetching)
    }

    /// The program being executed, if any.
    pub fn program(&self) -> Option<&Program> {
        match &self.state {
            ExecState::Executing(program) => Some(program),
            ExecState::Fetching => None,
        }
    }

    /// Set after executing an invalid opcode. Only a reset clears it.
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Run one instruction (or interrupt dispatch, or one idle halted cycle)
    /// and return the M-cycles it took, fetch included.
    pub fn step<M: Memory + ?Sized>(&mut self, mem: &mut M) -> Result<u32, Fault> {
        let start = self.cycles;
        while !self.tick(mem)? {}
        Ok((self.cycles - start) as u32)
    }

    /// Advance one M-cycle. Returns `true` when this cycle ended on an
    /// instruction boundary.
    pub fn tick<M: Memory + ?Sized>(&mut self, mem: &mut M) -> Result<bool, Fault> {
        self.cycles += 1;
        match mem::replace(&mut self.state, ExecState::Fetching) {
            ExecState::Fetching => self.fetch(mem),
            ExecState::Executing(program) => self.execute(mem, program),
        }
    }

    fn fetch<M: Memory + ?Sized>(&mut self, mem: &mut M) -> Result<bool, Fault> {
        let pc = self.regs.pc;
        let fault = |source| Fault {
            pc,
            opcode: None,
            source,
        };

        if self.locked {
            return Ok(true);
        }
        let pending = interrupts::poll(mem).map_err(fault)?;
        if self.regs.halted {
            if pending.is_none() {
                return Ok(true);
            }
            self.regs.halted = false;
        }

        if self.regs.ime == Ime::Enabled
            && let Some(entry) = pending
        {
            return self.dispatch(mem, entry);
        }

        let opcode = mem.read(pc).map_err(fault)?;
        let decoded = if self.halt_bug {
            // PC stays put, so the opcode byte is read again as the next one.
            self.halt_bug = false;
            isa::decode_repeating(mem, pc)
        } else {
            self.regs.pc = pc.wrapping_add(1);
            isa::decode(mem, pc).map(|(instr, _)| instr)
        };
        let instr = decoded.map_err(|source| Fault {
            pc,
            opcode: Some(opcode),
            source,
        })?;

        #[cfg(feature = "cpu-trace")]
        diag!(
            self.sink,
            Trace,
            TARGET,
            "{pc:04X}: {instr}  {}",
            self.regs.debug_state()
        );

        self.state = ExecState::Executing(Program::for_instruction(instr, pc, opcode));
        Ok(false)
    }

    fn dispatch<M: Memory + ?Sized>(
        &mut self,
        mem: &mut M,
        entry: InterruptEntry,
    ) -> Result<bool, Fault> {
        let pc = self.regs.pc;
        interrupts::acknowledge(mem, entry).map_err(|source| Fault {
            pc,
            opcode: None,
            source,
        })?;
        self.regs.ime = Ime::Disabled;
        diag!(
            self.sink,
            Debug,
            TARGET,
            "dispatching {:?} from {pc:04X}",
            entry.interrupt()
        );
        // The first dispatch cycle is this one.
        self.execute(mem, Program::for_interrupt(entry, pc))
    }

    fn execute<M: Memory + ?Sized>(
        &mut self,
        mem: &mut M,
        mut program: Program,
    ) -> Result<bool, Fault> {
        let index = program.cursor;
        let op = program.ops[usize::from(index)];
        self.run_op(mem, &mut program, op)
            .map_err(|source| Fault {
                pc: program.origin,
                opcode: program.opcode,
                source,
            })?;
        program.cursor += 1;

        if program.apply_at == Some(index) {
            self.apply(&mut program);
        }

        let taken = match program.branch {
            Some((at, cond)) if at == index => cond.holds(self.regs.f()),
            _ => true,
        };
        if taken && !program.is_done() {
            self.state = ExecState::Executing(program);
            return Ok(false);
        }

        self.finish(mem, &program).map_err(|source| Fault {
            pc: program.origin,
            opcode: program.opcode,
            source,
        })?;
        Ok(true)
    }

    fn address(&mut self, ptr: Pointer, program: &Program) -> Address {
        match ptr {
            Pointer::Bc => self.regs.pair(Reg16::BC),
            Pointer::De => self.regs.pair(Reg16::DE),
            Pointer::Hl => self.regs.hl(),
            Pointer::HlInc => {
                let hl = self.regs.hl();
                self.regs.set_pair(Reg16::HL, hl.wrapping_add(1));
                hl
            }
            Pointer::HlDec => {
                let hl = self.regs.hl();
                self.regs.set_pair(Reg16::HL, hl.wrapping_sub(1));
                hl
            }
            Pointer::Wz => program.wz(),
            Pointer::WzNext => program.wz().wrapping_add(1),
            Pointer::HighZ => 0xFF00 | Address::from(program.z),
            Pointer::HighC => 0xFF00 | Address::from(self.regs.c),
        }
    }

    fn word(&self, word: Word) -> u16 {
        match word {
            Word::Pc => self.regs.pc,
            Word::Pair(rr) => self.regs.pair(rr),
        }
    }

    fn immediate<M: Memory + ?Sized>(&mut self, mem: &M) -> Result<u8, MemoryError> {
        let b = mem.read(self.regs.pc)?;
        self.regs.pc = self.regs.pc.wrapping_add(1);
        Ok(b)
    }

    fn push<M: Memory + ?Sized>(&mut self, mem: &mut M, value: u8) -> Result<(), MemoryError> {
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        mem.write(self.regs.sp, value)
    }

    fn pop<M: Memory + ?Sized>(&mut self, mem: &M) -> Result<u8, MemoryError> {
        let b = mem.read(self.regs.sp)?;
        self.regs.sp = self.regs.sp.wrapping_add(1);
        Ok(b)
    }

    fn run_op<M: Memory + ?Sized>(
        &mut self,
        mem: &mut M,
        program: &mut Program,
        op: MicroOp,
    ) -> Result<(), MemoryError> {
        match op {
            MicroOp::Opcode | MicroOp::Internal => {}
            MicroOp::Prefix | MicroOp::ImmLow => program.z = self.immediate(mem)?,
            MicroOp::ImmHigh => program.w = self.immediate(mem)?,
            MicroOp::Read(ptr) => {
                let addr = self.address(ptr, program);
                program.z = mem.read(addr)?;
            }
            MicroOp::Write(ptr, src) => {
                let value = match src {
                    Source::Reg(r) => self.regs.reg8(r),
                    Source::Z => program.z,
                    Source::SpLow => self.regs.sp as u8,
                    Source::SpHigh => (self.regs.sp >> 8) as u8,
                };
                let addr = self.address(ptr, program);
                mem.write(addr, value)?;
            }
            MicroOp::PushHigh(word) => {
                let [hi, _] = self.word(word).to_be_bytes();
                self.push(mem, hi)?;
            }
            MicroOp::PushLow(word) => {
                let [_, lo] = self.word(word).to_be_bytes();
                self.push(mem, lo)?;
            }
            MicroOp::PopLow => program.z = self.pop(mem)?,
            MicroOp::PopHigh => program.w = self.pop(mem)?,
        }
        Ok(())
    }

    /// Value of an 8-bit source operand: a register, or the byte the program
    /// already latched from memory.
    fn source(&self, op: Option<Operand>, z: u8) -> u8 {
        match op {
            Some(Operand::Reg(r)) => self.regs.reg8(r),
            _ => z,
        }
    }

    fn store(&mut self, op: Option<Operand>, program: &mut Program, value: u8) {
        match op {
            Some(Operand::Reg(r)) => self.regs.set_reg8(r, value),
            _ => program.z = value,
        }
    }

    fn apply(&mut self, program: &mut Program) {
        let instr = match program.routine {
            Routine::Interrupt(entry) => {
                self.regs.pc = entry.vector;
                return;
            }
            Routine::Instruction(instr) => instr,
        };
        let z = program.z;
        let wz = program.wz();
        let [first, second] = instr.operands;

        use InstrType as T;
        match instr.kind {
            T::Nop | T::Halt | T::Push => {}
            T::Ld | T::Ldh => match (first, second) {
                (Some(Operand::Pair(Reg16::SP)), Some(Operand::Pair(Reg16::HL))) => {
                    self.regs.sp = self.regs.hl();
                }
                (Some(Operand::Pair(Reg16::HL)), Some(Operand::SpRel(_))) => {
                    let value = self.regs.add_sp_signed(z);
                    self.regs.set_pair(Reg16::HL, value);
                }
                (Some(Operand::Pair(rr)), _) => self.regs.set_pair(rr, wz),
                (Some(Operand::Reg(r)), src) => {
                    let value = self.source(src, z);
                    self.regs.set_reg8(r, value);
                }
                _ => {}
            },
            T::Inc | T::Dec => match first {
                Some(Operand::Pair(rr)) => {
                    let value = self.regs.pair(rr);
                    let value = if instr.kind == T::Inc {
                        value.wrapping_add(1)
                    } else {
                        value.wrapping_sub(1)
                    };
                    self.regs.set_pair(rr, value);
                }
                op => {
                    let value = self.source(op, z);
                    let value = if instr.kind == T::Inc {
                        self.regs.inc8(value)
                    } else {
                        self.regs.dec8(value)
                    };
                    self.store(op, program, value);
                }
            },
            T::Add => match (first, second) {
                (Some(Operand::Pair(Reg16::HL)), Some(Operand::Pair(rr))) => {
                    let value = self.regs.pair(rr);
                    self.regs.add16_hl(value);
                }
                (Some(Operand::Pair(Reg16::SP)), _) => {
                    self.regs.sp = self.regs.add_sp_signed(z);
                }
                (_, src) => {
                    let value = self.source(src, z);
                    self.regs.add8(value, false);
                }
            },
            T::Adc => {
                let value = self.source(second, z);
                self.regs.add8(value, true);
            }
            T::Sbc => {
                let value = self.source(second, z);
                self.regs.sub8(value, true);
            }
            T::Sub | T::And | T::Xor | T::Or | T::Cp => {
                let value = self.source(first, z);
                match instr.kind {
                    T::Sub => self.regs.sub8(value, false),
                    T::And => self.regs.and8(value),
                    T::Xor => self.regs.xor8(value),
                    T::Or => self.regs.or8(value),
                    _ => self.regs.cp8(value),
                }
            }
            T::Rlca | T::Rrca | T::Rla | T::Rra => {
                let a = self.regs.a;
                self.regs.a = match instr.kind {
                    T::Rlca => self.regs.rlc(a),
                    T::Rrca => self.regs.rrc(a),
                    T::Rla => self.regs.rl(a),
                    _ => self.regs.rr(a),
                };
                // The accumulator forms always clear Z.
                self.regs.set_flag(FLAG_Z, false);
            }
            T::Daa => self.regs.daa(),
            T::Cpl => self.regs.cpl(),
            T::Scf => self.regs.scf(),
            T::Ccf => self.regs.ccf(),
            T::Jr => {
                let offset = z as i8;
                self.regs.pc = self.regs.pc.wrapping_add(offset as u16);
            }
            T::Jp => match first {
                Some(Operand::Pair(Reg16::HL)) => self.regs.pc = self.regs.hl(),
                _ => self.regs.pc = wz,
            },
            T::Call | T::Ret => self.regs.pc = wz,
            T::Reti => {
                self.regs.pc = wz;
                self.regs.ime = Ime::Enabled;
            }
            T::Rst => {
                if let Some(Operand::Vector(v)) = first {
                    self.regs.pc = Address::from(v);
                }
            }
            T::Pop => {
                if let Some(Operand::Pair(rr)) = first {
                    self.regs.set_pair(rr, wz);
                }
            }
            T::Stop => {
                // Skip the padding byte and sleep like HALT.
                self.regs.pc = self.regs.pc.wrapping_add(1);
                self.regs.halted = true;
            }
            T::Di => self.regs.ime = Ime::Disabled,
            T::Ei => {
                if self.regs.ime == Ime::Disabled {
                    self.regs.ime = Ime::RequestEnabled;
                }
            }
            T::Rlc | T::Rrc | T::Rl | T::Rr | T::Sla | T::Sra | T::Swap | T::Srl => {
                let value = self.source(first, z);
                let value = match instr.kind {
                    T::Rlc => self.regs.rlc(value),
                    T::Rrc => self.regs.rrc(value),
                    T::Rl => self.regs.rl(value),
                    T::Rr => self.regs.rr(value),
                    T::Sla => self.regs.sla(value),
                    T::Sra => self.regs.sra(value),
                    T::Swap => self.regs.swap(value),
                    _ => self.regs.srl(value),
                };
                self.store(first, program, value);
            }
            T::Bit | T::Res | T::Set => {
                let Some(Operand::Bit(n)) = first else { return };
                let value = self.source(second, z);
                match instr.kind {
                    T::Bit => self.regs.bit(n, value),
                    T::Res => self.store(second, program, value & !(1 << n)),
                    _ => self.store(second, program, value | (1 << n)),
                }
            }
            T::Invalid => {
                self.locked = true;
                diag!(
                    self.sink,
                    Warn,
                    TARGET,
                    "invalid opcode {:02X} at {:04X}, CPU locked",
                    program.opcode.unwrap_or_default(),
                    program.origin
                );
            }
        }
    }

    /// Boundary bookkeeping once a program has run its last op.
    fn finish<M: Memory + ?Sized>(
        &mut self,
        mem: &M,
        program: &Program,
    ) -> Result<(), MemoryError> {
        let Routine::Instruction(instr) = program.routine else {
            return Ok(());
        };

        if self.regs.ime == Ime::RequestEnabled && instr.kind != InstrType::Ei {
            self.regs.ime = Ime::Enabled;
        }

        if instr.kind == InstrType::Halt {
            let pending = interrupts::poll(mem)?;
            if self.regs.ime != Ime::Enabled && pending.is_some() {
                // HALT falls through and the next opcode is read twice.
                self.halt_bug = true;
            } else {
                self.regs.halted = true;
            }
        }
        Ok(())
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new(Model::default())
    }
}

/// Micro-op program the CPU would run for `instr`, for inspection.
pub fn program_for(instr: Instruction) -> Program {
    Program::for_instruction(instr, 0, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{Level, RecordingSink};
    use crate::interrupts::{Interrupt, request};
    use crate::isa::{Condition, Reg8};
    use crate::mmu::{Mmu, REG_IE, REG_IF, RamSection};

    fn bus(at: Address, code: &[u8]) -> Mmu {
        let mut mmu = Mmu::builder()
            .section(RamSection::new("ram", 0x0000, 0xFFFF))
            .section(RamSection::new("ie", 0xFFFF, 1))
            .build()
            .unwrap();
        mmu.load(at, code).unwrap();
        mmu
    }

    fn cpu() -> Cpu {
        let mut regs = Registers::default();
        regs.pc = 0x0100;
        regs.sp = 0xFFFE;
        Cpu::from_registers(regs)
    }

    #[test]
    fn load_increment_halt() {
        let mut mem = bus(0x0100, &[0x3E, 0x05, 0x3C, 0x76]);
        let mut cpu = cpu();
        assert_eq!(cpu.step(&mut mem).unwrap(), 3);
        assert_eq!(cpu.step(&mut mem).unwrap(), 2);
        assert_eq!(cpu.step(&mut mem).unwrap(), 2);
        assert_eq!(cpu.regs.a, 6);
        assert!(!cpu.regs.flag(FLAG_Z));
        assert!(cpu.regs.halted);
        assert_eq!(cpu.cycles, 7);
        assert_eq!(cpu.regs.pc, 0x0104);
    }

    #[test]
    fn tick_reports_boundaries() {
        let mut mem = bus(0x0100, &[0x3E, 0x05]);
        let mut cpu = cpu();
        assert!(!cpu.tick(&mut mem).unwrap());
        assert_eq!(cpu.program().map(|p| p.max_cycles()), Some(2));
        assert!(!cpu.tick(&mut mem).unwrap());
        assert!(cpu.tick(&mut mem).unwrap());
        assert!(cpu.at_boundary());
        assert_eq!(cpu.regs.a, 5);
    }

    #[test]
    fn conditional_branches_end_early() {
        // JR NZ,+2 with Z set, then with Z clear.
        let mut mem = bus(0x0100, &[0x20, 0x02, 0x20, 0x02]);
        let mut cpu = cpu();
        cpu.regs.set_flag(FLAG_Z, true);
        assert_eq!(cpu.step(&mut mem).unwrap(), 1 + 2);
        assert_eq!(cpu.regs.pc, 0x0102);
        cpu.regs.set_flag(FLAG_Z, false);
        assert_eq!(cpu.step(&mut mem).unwrap(), 1 + 3);
        assert_eq!(cpu.regs.pc, 0x0106);
    }

    #[test]
    fn call_and_return() {
        // CALL $0200; ... $0200: RET C; RET
        let mut mem = bus(0x0100, &[0xCD, 0x00, 0x02]);
        mem.load(0x0200, &[0xD8, 0xC9]).unwrap();
        let mut cpu = cpu();
        assert_eq!(cpu.step(&mut mem).unwrap(), 1 + 6);
        assert_eq!(cpu.regs.pc, 0x0200);
        assert_eq!(cpu.regs.sp, 0xFFFC);
        assert_eq!(mem.read16(0xFFFC).unwrap(), 0x0103);

        assert_eq!(cpu.step(&mut mem).unwrap(), 1 + 2);
        assert_eq!(cpu.regs.pc, 0x0201);
        assert_eq!(cpu.step(&mut mem).unwrap(), 1 + 4);
        assert_eq!(cpu.regs.pc, 0x0103);
        assert_eq!(cpu.regs.sp, 0xFFFE);
    }

    #[test]
    fn conditional_jump_taken_and_not() {
        let mut mem = bus(0x0100, &[0xDA, 0x00, 0x03, 0xDA, 0x00, 0x03]);
        let mut cpu = cpu();
        assert_eq!(cpu.step(&mut mem).unwrap(), 1 + 3);
        assert_eq!(cpu.regs.pc, 0x0103);
        cpu.regs.set_flag(FLAG_C, true);
        assert_eq!(cpu.step(&mut mem).unwrap(), 1 + 4);
        assert_eq!(cpu.regs.pc, 0x0300);
    }

    #[test]
    fn push_pop_masks_flags() {
        // LD BC,$12FF; PUSH BC; POP AF
        let mut mem = bus(0x0100, &[0x01, 0xFF, 0x12, 0xC5, 0xF1]);
        let mut cpu = cpu();
        assert_eq!(cpu.step(&mut mem).unwrap(), 4);
        assert_eq!(cpu.step(&mut mem).unwrap(), 5);
        assert_eq!(cpu.step(&mut mem).unwrap(), 4);
        assert_eq!(cpu.regs.a, 0x12);
        assert_eq!(cpu.regs.f(), 0xF0);
    }

    #[test]
    fn read_modify_write_through_hl() {
        // LD HL,$C000; LD (HL),$0F; INC (HL); SET 7,(HL); LD A,(HL+)
        let mut mem = bus(
            0x0100,
            &[0x21, 0x00, 0xC0, 0x36, 0x0F, 0x34, 0xCB, 0xFE, 0x2A],
        );
        let mut cpu = cpu();
        let cycles: Vec<u32> = (0..5).map(|_| cpu.step(&mut mem).unwrap()).collect();
        assert_eq!(cycles, [4, 4, 4, 5, 3]);
        assert_eq!(mem.read(0xC000).unwrap(), 0x90);
        assert_eq!(cpu.regs.a, 0x90);
        assert_eq!(cpu.regs.hl(), 0xC001);
        assert!(cpu.regs.flag(FLAG_H));
    }

    #[test]
    fn high_page_and_direct_loads() {
        // LD A,$42; LDH ($80),A; LD ($C010),A; LD C,$80; LDH A,(C); LD ($C020),SP
        let mut mem = bus(
            0x0100,
            &[
                0x3E, 0x42, 0xE0, 0x80, 0xEA, 0x10, 0xC0, 0x0E, 0x80, 0xF2, 0x08, 0x20, 0xC0,
            ],
        );
        let mut cpu = cpu();
        for _ in 0..6 {
            cpu.step(&mut mem).unwrap();
        }
        assert_eq!(mem.read(0xFF80).unwrap(), 0x42);
        assert_eq!(mem.read(0xC010).unwrap(), 0x42);
        assert_eq!(cpu.regs.a, 0x42);
        assert_eq!(mem.read16(0xC020).unwrap(), 0xFFFE);
    }

    #[test]
    fn ei_takes_effect_after_the_next_instruction() {
        let mut mem = bus(0x0100, &[0xFB, 0x00, 0x00]);
        mem.write(REG_IE, 0x01).unwrap();
        let mut cpu = cpu();
        cpu.step(&mut mem).unwrap();
        assert_eq!(cpu.regs.ime, Ime::RequestEnabled);

        request(&mut mem, Interrupt::VBlank).unwrap();
        cpu.step(&mut mem).unwrap();
        assert_eq!(cpu.regs.ime, Ime::Enabled);
        assert_eq!(cpu.regs.pc, 0x0102);

        assert_eq!(cpu.step(&mut mem).unwrap(), 5);
        assert_eq!(cpu.regs.pc, 0x0040);
        assert_eq!(cpu.regs.ime, Ime::Disabled);
        assert_eq!(mem.read(REG_IF).unwrap() & 0x1F, 0);
        assert_eq!(mem.read16(cpu.regs.sp).unwrap(), 0x0102);
    }

    #[test]
    fn di_cancels_a_pending_ei() {
        let mut mem = bus(0x0100, &[0xFB, 0xF3, 0x00]);
        let mut cpu = cpu();
        cpu.step(&mut mem).unwrap();
        cpu.step(&mut mem).unwrap();
        assert_eq!(cpu.regs.ime, Ime::Disabled);
    }

    #[test]
    fn one_interrupt_per_boundary_in_priority_order() {
        let mut mem = bus(0x0100, &[0x00]);
        mem.load(0x0040, &[0xD9]).unwrap();
        mem.write(REG_IE, 0x13).unwrap();
        mem.write(REG_IF, 0x13).unwrap();
        let mut cpu = cpu();
        cpu.regs.ime = Ime::Enabled;

        assert_eq!(cpu.step(&mut mem).unwrap(), 5);
        assert_eq!(cpu.regs.pc, 0x0040);
        assert_eq!(mem.read(REG_IF).unwrap() & 0x1F, 0x12);

        // RETI re-enables at once, so the next boundary dispatches bit 1.
        cpu.step(&mut mem).unwrap();
        assert_eq!(cpu.regs.pc, 0x0100);
        cpu.step(&mut mem).unwrap();
        assert_eq!(cpu.regs.pc, 0x0048);
        assert_eq!(mem.read(REG_IF).unwrap() & 0x1F, 0x10);
    }

    #[test]
    fn halt_wakes_without_ime() {
        // HALT; INC A
        let mut mem = bus(0x0100, &[0x76, 0x3C]);
        mem.write(REG_IE, 0x04).unwrap();
        let mut cpu = cpu();
        cpu.step(&mut mem).unwrap();
        assert!(cpu.regs.halted);
        assert_eq!(cpu.step(&mut mem).unwrap(), 1);
        assert_eq!(cpu.step(&mut mem).unwrap(), 1);

        request(&mut mem, Interrupt::Timer).unwrap();
        assert_eq!(cpu.step(&mut mem).unwrap(), 2);
        assert!(!cpu.regs.halted);
        assert_eq!(cpu.regs.a, 1);
        assert_eq!(cpu.regs.pc, 0x0102);
    }

    #[test]
    fn halted_cpu_dispatches_when_enabled() {
        let mut mem = bus(0x0100, &[0x76, 0x00]);
        mem.write(REG_IE, 0x01).unwrap();
        let mut cpu = cpu();
        cpu.regs.ime = Ime::Enabled;
        cpu.step(&mut mem).unwrap();
        request(&mut mem, Interrupt::VBlank).unwrap();
        assert_eq!(cpu.step(&mut mem).unwrap(), 5);
        assert_eq!(cpu.regs.pc, 0x0040);
        assert_eq!(mem.read16(cpu.regs.sp).unwrap(), 0x0101);
    }

    #[test]
    fn halt_bug_repeats_the_next_byte() {
        // HALT with an interrupt already pending and IME off; INC A runs twice.
        let mut mem = bus(0x0100, &[0x76, 0x3C, 0x00]);
        mem.write(REG_IE, 0x01).unwrap();
        mem.write(REG_IF, 0x01).unwrap();
        let mut cpu = cpu();
        cpu.step(&mut mem).unwrap();
        assert!(!cpu.regs.halted);
        cpu.step(&mut mem).unwrap();
        assert_eq!(cpu.regs.pc, 0x0101);
        cpu.step(&mut mem).unwrap();
        assert_eq!(cpu.regs.a, 2);
        assert_eq!(cpu.regs.pc, 0x0102);
    }

    #[test]
    fn halt_bug_before_a_prefixed_opcode() {
        // The CB byte is read twice, so CB CB (SET 1,E) runs, not RLC B.
        let mut mem = bus(0x0100, &[0x76, 0xCB, 0x00]);
        mem.write(REG_IE, 0x01).unwrap();
        mem.write(REG_IF, 0x01).unwrap();
        let mut cpu = cpu();
        cpu.regs.b = 0x80;
        cpu.step(&mut mem).unwrap();
        cpu.step(&mut mem).unwrap();
        assert_eq!(cpu.regs.e, 0x02);
        assert_eq!(cpu.regs.b, 0x80);
        assert_eq!(cpu.regs.pc, 0x0102);
    }

    #[test]
    fn invalid_opcode_locks_the_cpu() {
        let sink = RecordingSink::new();
        let mut mem = bus(0x0100, &[0xD3, 0x3C]);
        let mut cpu = cpu().with_sink(sink.clone());
        assert_eq!(cpu.step(&mut mem).unwrap(), 2);
        assert!(cpu.is_locked());
        assert_eq!(cpu.step(&mut mem).unwrap(), 1);
        assert_eq!(cpu.regs.a, 0);
        assert!(sink.contains(Level::Warn, "invalid opcode D3"));
    }

    #[test]
    fn faults_carry_the_instruction_address() {
        let mut mem = Mmu::builder()
            .section(RamSection::new("low", 0x0000, 0x0200))
            .section(RamSection::new("io", 0xFF00, 0x0100))
            .build_sparse()
            .unwrap();
        // LD A,($C000)
        mem.load(0x0100, &[0xFA, 0x00, 0xC0]).unwrap();
        let mut cpu = cpu();
        let fault = cpu.step(&mut mem).unwrap_err();
        assert_eq!(fault.pc, 0x0100);
        assert_eq!(fault.opcode, Some(0xFA));
        assert_eq!(fault.source, MemoryError::AddressNotMapped { addr: 0xC000 });
    }

    #[test]
    fn accumulator_rotates_clear_zero() {
        // RLCA with A = 0, then RLA with A = $80.
        let mut mem = bus(0x0100, &[0x07, 0x17]);
        let mut cpu = cpu();
        cpu.regs.set_flag(FLAG_Z, true);
        cpu.step(&mut mem).unwrap();
        assert_eq!(cpu.regs.f(), 0);
        cpu.regs.a = 0x80;
        cpu.step(&mut mem).unwrap();
        assert_eq!(cpu.regs.a, 0);
        assert_eq!(cpu.regs.f(), FLAG_C);
    }

    #[test]
    fn stack_pointer_arithmetic() {
        // LD SP,$FFF8; ADD SP,2; LD HL,SP-1; LD SP,HL
        let mut mem = bus(0x0100, &[0x31, 0xF8, 0xFF, 0xE8, 0x02, 0xF8, 0xFF, 0xF9]);
        let mut cpu = cpu();
        let cycles: Vec<u32> = (0..4).map(|_| cpu.step(&mut mem).unwrap()).collect();
        assert_eq!(cycles, [4, 5, 4, 3]);
        assert_eq!(cpu.regs.hl(), 0xFFF9);
        assert_eq!(cpu.regs.sp, 0xFFF9);
    }

    #[test]
    fn program_for_exposes_timing() {
        let call = Instruction::binary(
            InstrType::Call,
            Operand::Cond(Condition::NZ),
            Operand::Imm16(0x1234),
        );
        let p = program_for(call);
        assert_eq!((p.min_cycles(), p.max_cycles()), (3, 6));
        let ld = Instruction::binary(InstrType::Ld, Operand::Reg(Reg8::B), Operand::Reg(Reg8::C));
        assert_eq!(program_for(ld).max_cycles(), 1);
    }
}
