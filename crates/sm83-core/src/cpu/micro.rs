//! Per-instruction micro-op programs.
//!
//! Every instruction becomes a short, fixed list of [`MicroOp`]s, one per
//! M-cycle after the opcode fetch. Register effects that don't touch the
//! bus run once, right after the op at `apply_at`. Conditional control flow
//! ends the program early after the op at `branch.0` when the condition is
//! false, so both timings can be read straight off the list.

use arrayvec::ArrayVec;

use crate::interrupts::InterruptEntry;
use crate::isa::{Condition, Indirect, InstrType, Instruction, Operand, Reg8, Reg16};
use crate::mmu::Address;

/// Address driven on the bus by a read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pointer {
    Bc,
    De,
    Hl,
    HlInc,
    HlDec,
    /// The address latched from the instruction's operand bytes.
    Wz,
    WzNext,
    /// `$FF00 + Z`
    HighZ,
    /// `$FF00 + C`
    HighC,
}

/// Byte driven on the bus by a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Reg(Reg8),
    /// The data latch.
    Z,
    SpLow,
    SpHigh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Word {
    Pc,
    Pair(Reg16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicroOp {
    /// The opcode's own cycle.
    Opcode,
    /// Second byte of a `CB` instruction; advances PC.
    Prefix,
    /// Read `[PC]` into Z and advance PC.
    ImmLow,
    /// Read `[PC]` into W and advance PC.
    ImmHigh,
    Internal,
    /// Read into Z.
    Read(Pointer),
    Write(Pointer, Source),
    PushHigh(Word),
    PushLow(Word),
    /// Read `[SP]` into Z and increment SP.
    PopLow,
    /// Read `[SP]` into W and increment SP.
    PopHigh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routine {
    Instruction(Instruction),
    /// Interrupt dispatch: two idle cycles, push PC, jump to the vector.
    Interrupt(InterruptEntry),
}

pub(crate) type Ops = ArrayVec<MicroOp, 6>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    pub(crate) routine: Routine,
    /// Address of the opcode, or of the interrupted instruction.
    pub(crate) origin: Address,
    pub(crate) opcode: Option<u8>,
    pub(crate) ops: Ops,
    pub(crate) apply_at: Option<u8>,
    pub(crate) branch: Option<(u8, Condition)>,
    pub(crate) cursor: u8,
    pub(crate) z: u8,
    pub(crate) w: u8,
}

use MicroOp::{ImmHigh, ImmLow, Internal, Opcode, PopHigh, PopLow, Prefix, PushHigh, PushLow};

fn pointer(ind: Indirect) -> Pointer {
    match ind {
        Indirect::BC => Pointer::Bc,
        Indirect::DE => Pointer::De,
        Indirect::HL => Pointer::Hl,
        Indirect::HLInc => Pointer::HlInc,
        Indirect::HLDec => Pointer::HlDec,
    }
}

fn ops(list: &[MicroOp]) -> Ops {
    list.iter().copied().collect()
}

/// Ops, apply index and branch point for an instruction.
fn shape(instr: &Instruction) -> (Ops, Option<u8>, Option<(u8, Condition)>) {
    use InstrType as T;
    use Operand::{Cond, Direct, Imm8, Imm16, IoC, IoOffset, Pair, Reg, Rel8, SpRel};

    let cond = |op: Option<Operand>| match op {
        Some(Cond(c)) => Some(c),
        _ => None,
    };

    match (instr.kind, instr.operands) {
        (T::Ld, [Some(Reg(_)), Some(Reg(_))]) => (ops(&[Opcode]), Some(0), None),
        (T::Ld, [Some(Reg(_)), Some(Imm8(_))]) => (ops(&[Opcode, ImmLow]), Some(1), None),
        (T::Ld, [Some(Reg(_)), Some(Operand::Indirect(p))]) => {
            (ops(&[Opcode, MicroOp::Read(pointer(p))]), Some(1), None)
        }
        (T::Ld, [Some(Operand::Indirect(p)), Some(Reg(r))]) => (
            ops(&[Opcode, MicroOp::Write(pointer(p), Source::Reg(r))]),
            None,
            None,
        ),
        (T::Ld, [Some(Operand::Indirect(p)), Some(Imm8(_))]) => (
            ops(&[Opcode, ImmLow, MicroOp::Write(pointer(p), Source::Z)]),
            None,
            None,
        ),
        (T::Ld, [Some(Pair(_)), Some(Imm16(_))]) => {
            (ops(&[Opcode, ImmLow, ImmHigh]), Some(2), None)
        }
        (T::Ld, [Some(Direct(_)), Some(Pair(Reg16::SP))]) => (
            ops(&[
                Opcode,
                ImmLow,
                ImmHigh,
                MicroOp::Write(Pointer::Wz, Source::SpLow),
                MicroOp::Write(Pointer::WzNext, Source::SpHigh),
            ]),
            None,
            None,
        ),
        (T::Ld, [Some(Direct(_)), Some(Reg(r))]) => (
            ops(&[
                Opcode,
                ImmLow,
                ImmHigh,
                MicroOp::Write(Pointer::Wz, Source::Reg(r)),
            ]),
            None,
            None,
        ),
        (T::Ld, [Some(Reg(_)), Some(Direct(_))]) => (
            ops(&[Opcode, ImmLow, ImmHigh, MicroOp::Read(Pointer::Wz)]),
            Some(3),
            None,
        ),
        (T::Ld, [Some(Pair(Reg16::SP)), Some(Pair(Reg16::HL))]) => {
            (ops(&[Opcode, Internal]), Some(1), None)
        }
        (T::Ld, [Some(Pair(Reg16::HL)), Some(SpRel(_))]) => {
            (ops(&[Opcode, ImmLow, Internal]), Some(2), None)
        }

        (T::Ldh, [Some(IoOffset(_)), Some(Reg(r))]) => (
            ops(&[Opcode, ImmLow, MicroOp::Write(Pointer::HighZ, Source::Reg(r))]),
            None,
            None,
        ),
        (T::Ldh, [Some(Reg(_)), Some(IoOffset(_))]) => (
            ops(&[Opcode, ImmLow, MicroOp::Read(Pointer::HighZ)]),
            Some(2),
            None,
        ),
        (T::Ldh, [Some(IoC), Some(Reg(r))]) => (
            ops(&[Opcode, MicroOp::Write(Pointer::HighC, Source::Reg(r))]),
            None,
            None,
        ),
        (T::Ldh, [Some(Reg(_)), Some(IoC)]) => {
            (ops(&[Opcode, MicroOp::Read(Pointer::HighC)]), Some(1), None)
        }

        (T::Inc | T::Dec, [Some(Pair(_)), None]) => (ops(&[Opcode, Internal]), Some(1), None),
        (T::Add, [Some(Pair(Reg16::HL)), Some(Pair(_))]) => {
            (ops(&[Opcode, Internal]), Some(1), None)
        }
        (T::Add, [Some(Pair(Reg16::SP)), Some(Rel8(_))]) => {
            (ops(&[Opcode, ImmLow, Internal, Internal]), Some(3), None)
        }

        // Read-modify-write on (HL).
        (T::Inc | T::Dec, [Some(Operand::Indirect(p)), None]) => (
            ops(&[
                Opcode,
                MicroOp::Read(pointer(p)),
                MicroOp::Write(pointer(p), Source::Z),
            ]),
            Some(1),
            None,
        ),
        (T::Inc | T::Dec, [Some(Reg(_)), None]) => (ops(&[Opcode]), Some(0), None),

        (T::Add | T::Adc | T::Sub | T::Sbc | T::And | T::Xor | T::Or | T::Cp, operands) => {
            match operands[1].or(operands[0]) {
                Some(Imm8(_)) => (ops(&[Opcode, ImmLow]), Some(1), None),
                Some(Operand::Indirect(p)) => (ops(&[Opcode, MicroOp::Read(pointer(p))]), Some(1), None),
                _ => (ops(&[Opcode]), Some(0), None),
            }
        }

        (T::Jr, [a, _]) => (
            ops(&[Opcode, ImmLow, Internal]),
            Some(2),
            cond(a).map(|c| (1, c)),
        ),
        (T::Jp, [Some(Pair(Reg16::HL)), None]) => (ops(&[Opcode]), Some(0), None),
        (T::Jp, [a, _]) => (
            ops(&[Opcode, ImmLow, ImmHigh, Internal]),
            Some(3),
            cond(a).map(|c| (2, c)),
        ),
        (T::Call, [a, _]) => (
            ops(&[
                Opcode,
                ImmLow,
                ImmHigh,
                Internal,
                PushHigh(Word::Pc),
                PushLow(Word::Pc),
            ]),
            Some(5),
            cond(a).map(|c| (2, c)),
        ),
        (T::Ret, [Some(Cond(c)), None]) => (
            ops(&[Opcode, Internal, PopLow, PopHigh, Internal]),
            Some(4),
            Some((1, c)),
        ),
        (T::Ret | T::Reti, _) => (ops(&[Opcode, PopLow, PopHigh, Internal]), Some(3), None),
        (T::Rst, _) => (
            ops(&[Opcode, Internal, PushHigh(Word::Pc), PushLow(Word::Pc)]),
            Some(3),
            None,
        ),
        (T::Push, [Some(Pair(rr)), None]) => (
            ops(&[
                Opcode,
                Internal,
                PushHigh(Word::Pair(rr)),
                PushLow(Word::Pair(rr)),
            ]),
            None,
            None,
        ),
        (T::Pop, _) => (ops(&[Opcode, PopLow, PopHigh]), Some(2), None),

        (T::Bit, [_, Some(Operand::Indirect(p))]) => (
            ops(&[Opcode, Prefix, MicroOp::Read(pointer(p))]),
            Some(2),
            None,
        ),
        (
            T::Rlc | T::Rrc | T::Rl | T::Rr | T::Sla | T::Sra | T::Swap | T::Srl,
            [Some(Operand::Indirect(p)), None],
        )
        | (T::Res | T::Set, [_, Some(Operand::Indirect(p))]) => (
            ops(&[
                Opcode,
                Prefix,
                MicroOp::Read(pointer(p)),
                MicroOp::Write(pointer(p), Source::Z),
            ]),
            Some(2),
            None,
        ),
        (
            T::Rlc
            | T::Rrc
            | T::Rl
            | T::Rr
            | T::Sla
            | T::Sra
            | T::Swap
            | T::Srl
            | T::Bit
            | T::Res
            | T::Set,
            _,
        ) => (ops(&[Opcode, Prefix]), Some(1), None),

        // Everything else is a single-cycle register or control operation.
        _ => (ops(&[Opcode]), Some(0), None),
    }
}

impl Program {
    pub fn for_instruction(instr: Instruction, origin: Address, opcode: u8) -> Self {
        let (ops, apply_at, branch) = shape(&instr);
        Self {
            routine: Routine::Instruction(instr),
            origin,
            opcode: Some(opcode),
            ops,
            apply_at,
            branch,
            cursor: 0,
            z: 0,
            w: 0,
        }
    }

    pub fn for_interrupt(entry: InterruptEntry, origin: Address) -> Self {
        Self {
            routine: Routine::Interrupt(entry),
            origin,
            opcode: None,
            ops: ops(&[
                Internal,
                Internal,
                PushHigh(Word::Pc),
                PushLow(Word::Pc),
                Internal,
            ]),
            apply_at: Some(4),
            branch: None,
            cursor: 0,
            z: 0,
            w: 0,
        }
    }

    pub fn routine(&self) -> Routine {
        self.routine
    }

    pub fn ops(&self) -> &[MicroOp] {
        &self.ops
    }

    /// Index of the next op to run.
    pub fn cursor(&self) -> usize {
        usize::from(self.cursor)
    }

    pub fn is_done(&self) -> bool {
        self.cursor() >= self.ops.len()
    }

    /// Cycles when a conditional branch is not taken.
    pub fn min_cycles(&self) -> u8 {
        match self.branch {
            Some((at, _)) => at + 1,
            None => self.max_cycles(),
        }
    }

    pub fn max_cycles(&self) -> u8 {
        self.ops.len() as u8
    }

    /// The 16-bit operand latch.
    pub(crate) fn wz(&self) -> u16 {
        u16::from_be_bytes([self.w, self.z])
    }
}
