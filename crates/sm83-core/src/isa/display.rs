use std::fmt;

use arrayvec::ArrayVec;

use super::{Condition, Indirect, InstrType, Instruction, Operand, Reg8, Reg16, decode};
use crate::error::MemoryError;
use crate::mmu::{Address, Memory};

impl fmt::Display for Reg8 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Reg8::A => "A",
            Reg8::B => "B",
            Reg8::C => "C",
            Reg8::D => "D",
            Reg8::E => "E",
            Reg8::H => "H",
            Reg8::L => "L",
        })
    }
}

impl fmt::Display for Reg16 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Reg16::BC => "BC",
            Reg16::DE => "DE",
            Reg16::HL => "HL",
            Reg16::SP => "SP",
            Reg16::AF => "AF",
        })
    }
}

impl fmt::Display for Indirect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Indirect::BC => "(BC)",
            Indirect::DE => "(DE)",
            Indirect::HLInc => "(HL+)",
            Indirect::HLDec => "(HL-)",
            Indirect::HL => "(HL)",
        })
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Condition::NZ => "NZ",
            Condition::Z => "Z",
            Condition::NC => "NC",
            Condition::C => "C",
        })
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Operand::Imm8(b) => write!(f, "${b:02X}"),
            Operand::Rel8(b) => write!(f, "{}", b as i8),
            Operand::Imm16(w) => write!(f, "${w:04X}"),
            Operand::Direct(w) => write!(f, "(${w:04X})"),
            Operand::IoOffset(b) => write!(f, "($FF{b:02X})"),
            Operand::IoC => f.write_str("(C)"),
            Operand::Reg(r) => write!(f, "{r}"),
            Operand::Pair(rr) => write!(f, "{rr}"),
            Operand::Indirect(i) => write!(f, "{i}"),
            Operand::SpRel(b) => {
                let e = b as i8;
                if e < 0 {
                    write!(f, "SP-{}", e.unsigned_abs())
                } else {
                    write!(f, "SP+{e}")
                }
            }
            Operand::Vector(v) => write!(f, "${v:02X}"),
            Operand::Bit(n) => write!(f, "{n}"),
            Operand::Cond(c) => write!(f, "{c}"),
        }
    }
}

impl InstrType {
    pub fn mnemonic(self) -> &'static str {
        match self {
            InstrType::Nop => "NOP",
            InstrType::Ld => "LD",
            InstrType::Ldh => "LDH",
            InstrType::Inc => "INC",
            InstrType::Dec => "DEC",
            InstrType::Rlca => "RLCA",
            InstrType::Rrca => "RRCA",
            InstrType::Rla => "RLA",
            InstrType::Rra => "RRA",
            InstrType::Daa => "DAA",
            InstrType::Cpl => "CPL",
            InstrType::Scf => "SCF",
            InstrType::Ccf => "CCF",
            InstrType::Jr => "JR",
            InstrType::Jp => "JP",
            InstrType::Call => "CALL",
            InstrType::Ret => "RET",
            InstrType::Reti => "RETI",
            InstrType::Rst => "RST",
            InstrType::Push => "PUSH",
            InstrType::Pop => "POP",
            InstrType::Add => "ADD",
            InstrType::Adc => "ADC",
            InstrType::Sub => "SUB",
            InstrType::Sbc => "SBC",
            InstrType::And => "AND",
            InstrType::Xor => "XOR",
            InstrType::Or => "OR",
            InstrType::Cp => "CP",
            InstrType::Halt => "HALT",
            InstrType::Stop => "STOP",
            InstrType::Di => "DI",
            InstrType::Ei => "EI",
            InstrType::Rlc => "RLC",
            InstrType::Rrc => "RRC",
            InstrType::Rl => "RL",
            InstrType::Rr => "RR",
            InstrType::Sla => "SLA",
            InstrType::Sra => "SRA",
            InstrType::Swap => "SWAP",
            InstrType::Srl => "SRL",
            InstrType::Bit => "BIT",
            InstrType::Res => "RES",
            InstrType::Set => "SET",
            InstrType::Invalid => "DB",
        }
    }
}

impl fmt::Display for InstrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

fn write_instruction(
    f: &mut fmt::Formatter<'_>,
    instr: &Instruction,
    target: Option<Address>,
) -> fmt::Result {
    f.write_str(instr.kind.mnemonic())?;
    for (i, operand) in instr.operands().enumerate() {
        f.write_str(if i == 0 { " " } else { "," })?;
        match (operand, target) {
            (Operand::Rel8(_), Some(dest)) if instr.kind == InstrType::Jr => {
                write!(f, "${dest:04X}")?
            }
            _ => write!(f, "{operand}")?,
        }
    }
    Ok(())
}

/// Assembly text. Relative jumps show their raw signed offset since the
/// instruction does not know its own address; [`Line`] resolves them.
impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_instruction(f, self, None)
    }
}

/// One disassembled instruction with its location and raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub addr: Address,
    pub instruction: Instruction,
    pub bytes: ArrayVec<u8, 3>,
}

impl Line {
    pub fn next(&self) -> Address {
        self.addr.wrapping_add(self.bytes.len() as u16)
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut hex = String::with_capacity(8);
        for (i, b) in self.bytes.iter().enumerate() {
            if i > 0 {
                hex.push(' ');
            }
            hex.push_str(&format!("{b:02X}"));
        }
        write!(f, "{:04X}  {hex:<8}  ", self.addr)?;
        write_instruction(f, &self.instruction, self.instruction.branch_target(self.next()))
    }
}

/// Decode `count` consecutive instructions starting at `start`.
pub fn disassemble<M: Memory + ?Sized>(
    mem: &M,
    start: Address,
    count: usize,
) -> Result<Vec<Line>, MemoryError> {
    let mut lines = Vec::with_capacity(count);
    let mut pc = start;
    for _ in 0..count {
        let (instruction, next) = decode(mem, pc)?;
        let len = next.wrapping_sub(pc);
        let mut bytes = ArrayVec::new();
        for i in 0..len.min(3) {
            bytes.push(mem.read(pc.wrapping_add(i))?);
        }
        lines.push(Line {
            addr: pc,
            instruction,
            bytes,
        });
        pc = next;
    }
    Ok(lines)
}
