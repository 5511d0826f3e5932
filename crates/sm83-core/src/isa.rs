//! SM83 instruction set model.
//!
//! [`decode`] and [`encode`] are both driven by the opcode table in
//! `table`, so anything one of them produces the other accepts.

mod decode;
mod display;
mod encode;
mod table;

pub use decode::decode;
pub(crate) use decode::decode_repeating;
pub use display::{Line, disassemble};
pub use encode::{AsmPolicy, Assembler, encode, encode_bytes};

use crate::mmu::Address;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reg8 {
    B,
    C,
    D,
    E,
    H,
    L,
    A,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reg16 {
    BC,
    DE,
    HL,
    SP,
    AF,
}

/// Register-indirect memory operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Indirect {
    BC,
    DE,
    /// `(HL+)`: post-increment.
    HLInc,
    /// `(HL-)`: post-decrement.
    HLDec,
    HL,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    NZ,
    Z,
    NC,
    C,
}

impl Condition {
    /// Evaluate against a flags byte.
    pub fn holds(self, f: u8) -> bool {
        match self {
            Condition::NZ => f & 0x80 == 0,
            Condition::Z => f & 0x80 != 0,
            Condition::NC => f & 0x10 == 0,
            Condition::C => f & 0x10 != 0,
        }
    }
}

/// An instruction operand.
///
/// Signed offsets (`Rel8`, `SpRel`) keep the raw byte; use
/// [`Operand::signed`] or [`Instruction::branch_target`] to interpret them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand {
    Imm8(u8),
    Rel8(u8),
    Imm16(u16),
    /// `(a16)`
    Direct(u16),
    /// `($FF00+a8)`
    IoOffset(u8),
    /// `($FF00+C)`
    IoC,
    Reg(Reg8),
    Pair(Reg16),
    Indirect(Indirect),
    /// `SP+r8`
    SpRel(u8),
    /// `RST` target, `0x00..=0x38`.
    Vector(u8),
    Bit(u8),
    Cond(Condition),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandKind {
    Imm8,
    Rel8,
    Imm16,
    Direct,
    IoOffset,
    IoC,
    Reg,
    Pair,
    Indirect,
    SpRel,
    Vector,
    Bit,
    Cond,
}

impl Operand {
    pub fn kind(&self) -> OperandKind {
        match self {
            Operand::Imm8(_) => OperandKind::Imm8,
            Operand::Rel8(_) => OperandKind::Rel8,
            Operand::Imm16(_) => OperandKind::Imm16,
            Operand::Direct(_) => OperandKind::Direct,
            Operand::IoOffset(_) => OperandKind::IoOffset,
            Operand::IoC => OperandKind::IoC,
            Operand::Reg(_) => OperandKind::Reg,
            Operand::Pair(_) => OperandKind::Pair,
            Operand::Indirect(_) => OperandKind::Indirect,
            Operand::SpRel(_) => OperandKind::SpRel,
            Operand::Vector(_) => OperandKind::Vector,
            Operand::Bit(_) => OperandKind::Bit,
            Operand::Cond(_) => OperandKind::Cond,
        }
    }

    /// Two's-complement value of a relative operand.
    pub fn signed(&self) -> Option<i8> {
        match *self {
            Operand::Rel8(b) | Operand::SpRel(b) => Some(b as i8),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstrType {
    Nop,
    Ld,
    Ldh,
    Inc,
    Dec,
    Rlca,
    Rrca,
    Rla,
    Rra,
    Daa,
    Cpl,
    Scf,
    Ccf,
    Jr,
    Jp,
    Call,
    Ret,
    Reti,
    Rst,
    Push,
    Pop,
    Add,
    Adc,
    Sub,
    Sbc,
    And,
    Xor,
    Or,
    Cp,
    Halt,
    Stop,
    Di,
    Ei,
    Rlc,
    Rrc,
    Rl,
    Rr,
    Sla,
    Sra,
    Swap,
    Srl,
    Bit,
    Res,
    Set,
    /// Opcode with no meaning; the raw byte is kept as an `Imm8` operand.
    Invalid,
}

/// A decoded or hand-built instruction.
///
/// The ALU forms that name the accumulator in assembly (`ADD A,r`,
/// `ADC A,r`, `SBC A,r`) carry it as the first operand; `SUB`, `AND`,
/// `XOR`, `OR` and `CP` take only the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Instruction {
    pub kind: InstrType,
    pub operands: [Option<Operand>; 2],
}

impl Instruction {
    pub const fn new(kind: InstrType) -> Self {
        Self {
            kind,
            operands: [None, None],
        }
    }

    pub const fn unary(kind: InstrType, op: Operand) -> Self {
        Self {
            kind,
            operands: [Some(op), None],
        }
    }

    pub const fn binary(kind: InstrType, dst: Operand, src: Operand) -> Self {
        Self {
            kind,
            operands: [Some(dst), Some(src)],
        }
    }

    pub const fn invalid(byte: u8) -> Self {
        Self::unary(InstrType::Invalid, Operand::Imm8(byte))
    }

    pub fn is_invalid(&self) -> bool {
        self.kind == InstrType::Invalid
    }

    pub fn operands(&self) -> impl Iterator<Item = Operand> + '_ {
        self.operands.iter().flatten().copied()
    }

    /// Encoded size in bytes, or `None` if there is no encoding.
    pub fn len(&self) -> Option<u16> {
        encode::lookup(self).map(|(_, entry)| entry.len())
    }

    /// Where control goes if the branch is taken. `next` is the address
    /// right after this instruction, which relative jumps count from.
    pub fn branch_target(&self, next: Address) -> Option<Address> {
        match (self.kind, self.operands) {
            (InstrType::Jr, [Some(Operand::Rel8(e)), None])
            | (InstrType::Jr, [Some(Operand::Cond(_)), Some(Operand::Rel8(e))]) => {
                Some(next.wrapping_add(e as i8 as u16))
            }
            (InstrType::Jp | InstrType::Call, [Some(Operand::Imm16(a)), None])
            | (InstrType::Jp | InstrType::Call, [Some(Operand::Cond(_)), Some(Operand::Imm16(a))]) => {
                Some(a)
            }
            (InstrType::Rst, [Some(Operand::Vector(v)), None]) => Some(u16::from(v)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_target_counts_from_next_instruction() {
        let jr = Instruction::binary(InstrType::Jr, Operand::Cond(Condition::NZ), Operand::Rel8(0xFD));
        assert_eq!(jr.branch_target(0x0105), Some(0x0102));
        let fwd = Instruction::unary(InstrType::Jr, Operand::Rel8(0x05));
        assert_eq!(fwd.branch_target(0x0102), Some(0x0107));
        assert_eq!(Instruction::new(InstrType::Nop).branch_target(0), None);
    }

    #[test]
    fn lengths_come_from_the_table() {
        assert_eq!(Instruction::new(InstrType::Nop).len(), Some(1));
        assert_eq!(
            Instruction::binary(InstrType::Ld, Operand::Reg(Reg8::A), Operand::Imm8(5)).len(),
            Some(2)
        );
        assert_eq!(
            Instruction::binary(InstrType::Jp, Operand::Cond(Condition::Z), Operand::Imm16(0x150))
                .len(),
            Some(3)
        );
        assert_eq!(Instruction::new(InstrType::Stop).len(), Some(2));
        assert_eq!(
            Instruction::binary(InstrType::Bit, Operand::Bit(7), Operand::Indirect(Indirect::HL))
                .len(),
            Some(2)
        );
        assert_eq!(Instruction::invalid(0xD3).len(), Some(1));
        assert_eq!(
            Instruction::binary(InstrType::Ld, Operand::Reg(Reg8::A), Operand::Pair(Reg16::BC))
                .len(),
            None
        );
    }

    #[test]
    fn conditions_test_zero_and_carry() {
        assert!(Condition::Z.holds(0x80));
        assert!(!Condition::NZ.holds(0x80));
        assert!(Condition::C.holds(0x10));
        assert!(Condition::NC.holds(0x80));
    }
}
