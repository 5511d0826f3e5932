use std::collections::HashMap;
use std::sync::OnceLock;

use arrayvec::ArrayVec;

use super::table::{self, Entry, Slot};
use super::{InstrType, Instruction, Operand};
use crate::error::AsmError;
use crate::mmu::{Address, Memory};

type Shape = (InstrType, [Option<Slot>; 2]);

/// Reverse view of the opcode table, keyed by instruction shape.
fn index() -> &'static HashMap<Shape, (u8, Entry)> {
    static INDEX: OnceLock<HashMap<Shape, (u8, Entry)>> = OnceLock::new();
    INDEX.get_or_init(|| {
        let mut map = HashMap::with_capacity(512);
        for op in 0..=0xFFu8 {
            if op != 0xCB {
                let entry = table::primary(op);
                map.insert((entry.kind, entry.slots), (op, entry));
            }
            let entry = table::prefixed(op);
            map.insert((entry.kind, entry.slots), (op, entry));
        }
        map
    })
}

pub(crate) fn lookup(instr: &Instruction) -> Option<(u8, Entry)> {
    // The invalid sentinel's byte is part of its shape, not an operand.
    let slots = if instr.is_invalid() {
        instr.operands.map(|op| op.map(Slot::Fixed))
    } else if instr.kind == InstrType::Stop {
        // A kept padding byte does not change the opcode.
        match instr.operands {
            [None | Some(Operand::Imm8(_)), None] => [None, None],
            _ => return None,
        }
    } else {
        instr.operands.map(|op| op.map(Slot::of))
    };
    index().get(&(instr.kind, slots)).copied()
}

/// Machine code for `instr`: at most three bytes.
pub fn encode_bytes(instr: &Instruction) -> Result<ArrayVec<u8, 3>, AsmError> {
    let (op, entry) = lookup(instr).ok_or(AsmError::NoEncoding {
        instruction: *instr,
    })?;

    let mut out = ArrayVec::new();
    if entry.prefixed {
        out.push(0xCB);
    }
    out.push(op);
    for operand in instr.operands() {
        match operand {
            Operand::Imm8(b) | Operand::Rel8(b) | Operand::IoOffset(b) | Operand::SpRel(b)
                if !instr.is_invalid() =>
            {
                out.push(b)
            }
            Operand::Imm16(w) | Operand::Direct(w) => out.extend(w.to_le_bytes()),
            _ => {}
        }
    }
    if instr.kind == InstrType::Stop && instr.operands[0].is_none() {
        out.push(0x00);
    }
    Ok(out)
}

/// Write `instr` at `pc` and return the address after it.
pub fn encode<M: Memory + ?Sized>(
    mem: &mut M,
    pc: Address,
    instr: &Instruction,
) -> Result<Address, AsmError> {
    let bytes = encode_bytes(instr)?;
    mem.load(pc, &bytes)?;
    Ok(pc.wrapping_add(bytes.len() as u16))
}

/// What to do when an instruction has no encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AsmPolicy {
    #[default]
    Strict,
    /// Skip the instruction and leave `pc` where it was. Meant for editors
    /// that assemble while the user is still typing.
    BestEffort,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Assembler {
    policy: AsmPolicy,
}

impl Assembler {
    pub fn new(policy: AsmPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> AsmPolicy {
        self.policy
    }

    /// Like [`encode`], but applies the policy to unencodable input. Memory
    /// faults are reported under either policy.
    pub fn emit<M: Memory + ?Sized>(
        &self,
        mem: &mut M,
        pc: Address,
        instr: &Instruction,
    ) -> Result<Address, AsmError> {
        match encode(mem, pc, instr) {
            Err(AsmError::NoEncoding { .. }) if self.policy == AsmPolicy::BestEffort => Ok(pc),
            other => other,
        }
    }

    /// Emit a sequence, returning the address after the last instruction.
    pub fn emit_all<M: Memory + ?Sized>(
        &self,
        mem: &mut M,
        pc: Address,
        program: &[Instruction],
    ) -> Result<Address, AsmError> {
        program
            .iter()
            .try_fold(pc, |at, instr| self.emit(mem, at, instr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MemoryError;
    use crate::isa::{Condition, Indirect, Reg8, Reg16, decode};
    use crate::mmu::{Access, RamSection};

    fn bytes(instr: Instruction) -> Vec<u8> {
        encode_bytes(&instr).unwrap().to_vec()
    }

    #[test]
    fn encodes_operands_little_endian() {
        assert_eq!(
            bytes(Instruction::binary(
                InstrType::Ld,
                Operand::Direct(0xFF80),
                Operand::Pair(Reg16::SP)
            )),
            [0x08, 0x80, 0xFF]
        );
        assert_eq!(
            bytes(Instruction::binary(
                InstrType::Jp,
                Operand::Cond(Condition::C),
                Operand::Imm16(0x0150)
            )),
            [0xDA, 0x50, 0x01]
        );
        assert_eq!(
            bytes(Instruction::binary(
                InstrType::Ldh,
                Operand::IoOffset(0x44),
                Operand::Reg(Reg8::A)
            )),
            [0xE0, 0x44]
        );
    }

    #[test]
    fn prefixed_and_padded_forms() {
        assert_eq!(
            bytes(Instruction::binary(
                InstrType::Set,
                Operand::Bit(3),
                Operand::Indirect(Indirect::HL)
            )),
            [0xCB, 0xDE]
        );
        assert_eq!(bytes(Instruction::new(InstrType::Stop)), [0x10, 0x00]);
        assert_eq!(
            bytes(Instruction::unary(InstrType::Stop, Operand::Imm8(0x42))),
            [0x10, 0x42]
        );
        assert_eq!(bytes(Instruction::invalid(0xE4)), [0xE4]);
    }

    #[test]
    fn illegal_combinations_have_no_encoding() {
        let bad = [
            Instruction::binary(InstrType::Ld, Operand::Pair(Reg16::BC), Operand::Reg(Reg8::A)),
            Instruction::binary(
                InstrType::Ld,
                Operand::Indirect(Indirect::HL),
                Operand::Indirect(Indirect::HL),
            ),
            Instruction::unary(InstrType::Push, Operand::Pair(Reg16::SP)),
            Instruction::unary(InstrType::Rst, Operand::Vector(0x05)),
            Instruction::unary(InstrType::Add, Operand::Reg(Reg8::B)),
            Instruction::invalid(0x00),
            Instruction::invalid(0xCB),
        ];
        for instr in bad {
            assert_eq!(
                encode_bytes(&instr),
                Err(AsmError::NoEncoding { instruction: instr }),
                "{instr:?}"
            );
        }
    }

    #[test]
    fn best_effort_leaves_pc_alone() {
        let mut mem = RamSection::new("scratch", 0xC000, 0x10);
        let bad = Instruction::unary(InstrType::Pop, Operand::Pair(Reg16::SP));
        let nop = Instruction::new(InstrType::Nop);

        let strict = Assembler::new(AsmPolicy::Strict);
        assert!(matches!(
            strict.emit(&mut mem, 0xC000, &bad),
            Err(AsmError::NoEncoding { .. })
        ));

        let lenient = Assembler::new(AsmPolicy::BestEffort);
        assert_eq!(lenient.emit_all(&mut mem, 0xC000, &[nop, bad, nop]), Ok(0xC002));
    }

    #[test]
    fn memory_faults_surface_under_best_effort() {
        let mut mem = RamSection::new("scratch", 0xC000, 0x02);
        let call = Instruction::unary(InstrType::Call, Operand::Imm16(0x1234));
        let lenient = Assembler::new(AsmPolicy::BestEffort);
        assert_eq!(
            lenient.emit(&mut mem, 0xC000, &call),
            Err(AsmError::Memory(MemoryError::AddressNotMapped { addr: 0xC002 }))
        );
    }

    #[test]
    fn assembled_program_decodes_back() {
        let program = [
            Instruction::binary(InstrType::Ld, Operand::Reg(Reg8::A), Operand::Imm8(0x05)),
            Instruction::unary(InstrType::Inc, Operand::Reg(Reg8::A)),
            Instruction::binary(InstrType::Jr, Operand::Cond(Condition::NZ), Operand::Rel8(0xFD)),
            Instruction::binary(InstrType::Ld, Operand::Pair(Reg16::HL), Operand::SpRel(0x80)),
            Instruction::new(InstrType::Halt),
        ];
        let mut mem = RamSection::from_bytes("rom", 0x0000, vec![0; 0x20], Access::ReadWrite);
        let end = Assembler::default().emit_all(&mut mem, 0x0000, &program).unwrap();
        assert_eq!(end, 8);

        let mut pc = 0;
        for expected in program {
            let (instr, next) = decode(&mem, pc).unwrap();
            assert_eq!(instr, expected);
            pc = next;
        }
    }
}
