//! The opcode table shared by the decoder, the encoder and the CPU.
//!
//! Opcodes are split the usual way: `x = op >> 6`, `y = op >> 3 & 7`,
//! `z = op & 7`, `p = y >> 1`, `q = y & 1`.

use super::{Condition, Indirect, InstrType, Operand, Reg8, Reg16};

/// How one operand position is filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Slot {
    /// Implied by the opcode itself.
    Fixed(Operand),
    D8,
    R8,
    D16,
    A16,
    A8,
    SpR8,
}

impl Slot {
    /// Shape of the slot that would hold `op`.
    pub(crate) fn of(op: Operand) -> Self {
        match op {
            Operand::Imm8(_) => Slot::D8,
            Operand::Rel8(_) => Slot::R8,
            Operand::Imm16(_) => Slot::D16,
            Operand::Direct(_) => Slot::A16,
            Operand::IoOffset(_) => Slot::A8,
            Operand::SpRel(_) => Slot::SpR8,
            other => Slot::Fixed(other),
        }
    }

    pub(crate) fn width(self) -> u16 {
        match self {
            Slot::Fixed(_) => 0,
            Slot::D16 | Slot::A16 => 2,
            Slot::D8 | Slot::R8 | Slot::A8 | Slot::SpR8 => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Entry {
    pub kind: InstrType,
    pub slots: [Option<Slot>; 2],
    pub prefixed: bool,
}

impl Entry {
    const fn new(kind: InstrType) -> Self {
        Self {
            kind,
            slots: [None, None],
            prefixed: false,
        }
    }

    const fn one(kind: InstrType, a: Slot) -> Self {
        Self {
            kind,
            slots: [Some(a), None],
            prefixed: false,
        }
    }

    const fn two(kind: InstrType, a: Slot, b: Slot) -> Self {
        Self {
            kind,
            slots: [Some(a), Some(b)],
            prefixed: false,
        }
    }

    /// Bytes including the opcode, any `CB` prefix and `STOP`'s padding byte.
    pub(crate) fn len(&self) -> u16 {
        let operands: u16 = self.slots.iter().flatten().map(|s| s.width()).sum();
        let extra = u16::from(self.prefixed) + u16::from(self.kind == InstrType::Stop);
        1 + extra + operands
    }
}

use Slot::{A8, A16, D8, D16, Fixed, R8, SpR8};

const fn reg(r: Reg8) -> Slot {
    Fixed(Operand::Reg(r))
}

const fn pair(rr: Reg16) -> Slot {
    Fixed(Operand::Pair(rr))
}

const A: Slot = reg(Reg8::A);
const HL: Slot = pair(Reg16::HL);
const SP: Slot = pair(Reg16::SP);

/// `r[z]`: index 6 is `(HL)`.
pub(crate) fn r(idx: u8) -> Operand {
    match idx & 7 {
        0 => Operand::Reg(Reg8::B),
        1 => Operand::Reg(Reg8::C),
        2 => Operand::Reg(Reg8::D),
        3 => Operand::Reg(Reg8::E),
        4 => Operand::Reg(Reg8::H),
        5 => Operand::Reg(Reg8::L),
        6 => Operand::Indirect(Indirect::HL),
        _ => Operand::Reg(Reg8::A),
    }
}

fn rp(p: u8) -> Reg16 {
    match p & 3 {
        0 => Reg16::BC,
        1 => Reg16::DE,
        2 => Reg16::HL,
        _ => Reg16::SP,
    }
}

fn rp2(p: u8) -> Reg16 {
    match p & 3 {
        0 => Reg16::BC,
        1 => Reg16::DE,
        2 => Reg16::HL,
        _ => Reg16::AF,
    }
}

fn cc(y: u8) -> Condition {
    match y & 3 {
        0 => Condition::NZ,
        1 => Condition::Z,
        2 => Condition::NC,
        _ => Condition::C,
    }
}

fn indirect(p: u8) -> Operand {
    Operand::Indirect(match p & 3 {
        0 => Indirect::BC,
        1 => Indirect::DE,
        2 => Indirect::HLInc,
        _ => Indirect::HLDec,
    })
}

/// `ADD A,x`, `ADC A,x` and `SBC A,x` name the accumulator; the rest don't.
fn alu(y: u8, src: Slot) -> Entry {
    match y & 7 {
        0 => Entry::two(InstrType::Add, A, src),
        1 => Entry::two(InstrType::Adc, A, src),
        2 => Entry::one(InstrType::Sub, src),
        3 => Entry::two(InstrType::Sbc, A, src),
        4 => Entry::one(InstrType::And, src),
        5 => Entry::one(InstrType::Xor, src),
        6 => Entry::one(InstrType::Or, src),
        _ => Entry::one(InstrType::Cp, src),
    }
}

fn invalid(op: u8) -> Entry {
    Entry::one(InstrType::Invalid, Fixed(Operand::Imm8(op)))
}

/// Unprefixed opcode space. `0xCB` itself maps to the invalid sentinel; the
/// decoder never looks it up.
pub(crate) fn primary(op: u8) -> Entry {
    let x = op >> 6;
    let y = (op >> 3) & 0x07;
    let z = op & 0x07;
    let p = y >> 1;
    let q = y & 0x01;

    match (x, z) {
        (0, 0) => match y {
            0 => Entry::new(InstrType::Nop),
            1 => Entry::two(InstrType::Ld, A16, SP),
            2 => Entry::new(InstrType::Stop),
            3 => Entry::one(InstrType::Jr, R8),
            _ => Entry::two(InstrType::Jr, Fixed(Operand::Cond(cc(y - 4))), R8),
        },
        (0, 1) if q == 0 => Entry::two(InstrType::Ld, pair(rp(p)), D16),
        (0, 1) => Entry::two(InstrType::Add, HL, pair(rp(p))),
        (0, 2) if q == 0 => Entry::two(InstrType::Ld, Fixed(indirect(p)), A),
        (0, 2) => Entry::two(InstrType::Ld, A, Fixed(indirect(p))),
        (0, 3) if q == 0 => Entry::one(InstrType::Inc, pair(rp(p))),
        (0, 3) => Entry::one(InstrType::Dec, pair(rp(p))),
        (0, 4) => Entry::one(InstrType::Inc, Fixed(r(y))),
        (0, 5) => Entry::one(InstrType::Dec, Fixed(r(y))),
        (0, 6) => Entry::two(InstrType::Ld, Fixed(r(y)), D8),
        (0, _) => Entry::new(match y {
            0 => InstrType::Rlca,
            1 => InstrType::Rrca,
            2 => InstrType::Rla,
            3 => InstrType::Rra,
            4 => InstrType::Daa,
            5 => InstrType::Cpl,
            6 => InstrType::Scf,
            _ => InstrType::Ccf,
        }),
        (1, _) if op == 0x76 => Entry::new(InstrType::Halt),
        (1, _) => Entry::two(InstrType::Ld, Fixed(r(y)), Fixed(r(z))),
        (2, _) => alu(y, Fixed(r(z))),
        (_, 0) => match y {
            0..=3 => Entry::one(InstrType::Ret, Fixed(Operand::Cond(cc(y)))),
            4 => Entry::two(InstrType::Ldh, A8, A),
            5 => Entry::two(InstrType::Add, SP, R8),
            6 => Entry::two(InstrType::Ldh, A, A8),
            _ => Entry::two(InstrType::Ld, HL, SpR8),
        },
        (_, 1) if q == 0 => Entry::one(InstrType::Pop, pair(rp2(p))),
        (_, 1) => match p {
            0 => Entry::new(InstrType::Ret),
            1 => Entry::new(InstrType::Reti),
            2 => Entry::one(InstrType::Jp, HL),
            _ => Entry::two(InstrType::Ld, SP, HL),
        },
        (_, 2) => match y {
            0..=3 => Entry::two(InstrType::Jp, Fixed(Operand::Cond(cc(y))), D16),
            4 => Entry::two(InstrType::Ldh, Fixed(Operand::IoC), A),
            5 => Entry::two(InstrType::Ld, A16, A),
            6 => Entry::two(InstrType::Ldh, A, Fixed(Operand::IoC)),
            _ => Entry::two(InstrType::Ld, A, A16),
        },
        (_, 3) => match y {
            0 => Entry::one(InstrType::Jp, D16),
            6 => Entry::new(InstrType::Di),
            7 => Entry::new(InstrType::Ei),
            _ => invalid(op),
        },
        (_, 4) if y < 4 => Entry::two(InstrType::Call, Fixed(Operand::Cond(cc(y))), D16),
        (_, 4) => invalid(op),
        (_, 5) if q == 0 => Entry::one(InstrType::Push, pair(rp2(p))),
        (_, 5) if p == 0 => Entry::one(InstrType::Call, D16),
        (_, 5) => invalid(op),
        (_, 6) => alu(y, D8),
        _ => Entry::one(InstrType::Rst, Fixed(Operand::Vector(y * 8))),
    }
}

/// `CB`-prefixed opcode space. Every byte has a meaning.
pub(crate) fn prefixed(op: u8) -> Entry {
    let x = op >> 6;
    let y = (op >> 3) & 0x07;
    let z = op & 0x07;
    let target = Fixed(r(z));

    let mut entry = match x {
        0 => Entry::one(
            match y {
                0 => InstrType::Rlc,
                1 => InstrType::Rrc,
                2 => InstrType::Rl,
                3 => InstrType::Rr,
                4 => InstrType::Sla,
                5 => InstrType::Sra,
                6 => InstrType::Swap,
                _ => InstrType::Srl,
            },
            target,
        ),
        1 => Entry::two(InstrType::Bit, Fixed(Operand::Bit(y)), target),
        2 => Entry::two(InstrType::Res, Fixed(Operand::Bit(y)), target),
        _ => Entry::two(InstrType::Set, Fixed(Operand::Bit(y)), target),
    };
    entry.prefixed = true;
    entry
}

#[cfg(test)]
mod tests {
    use super::*;

    const INVALID: [u8; 11] = [
        0xD3, 0xDB, 0xDD, 0xE3, 0xE4, 0xEB, 0xEC, 0xED, 0xF4, 0xFC, 0xFD,
    ];

    #[test]
    fn exactly_the_documented_holes_are_invalid() {
        let holes: Vec<u8> = (0..=0xFFu8)
            .filter(|&op| op != 0xCB && primary(op).kind == InstrType::Invalid)
            .collect();
        assert_eq!(holes, INVALID);
    }

    #[test]
    fn conditional_absolute_jumps_take_a_word() {
        for op in [0xC2, 0xCA, 0xD2, 0xDA] {
            assert_eq!(primary(op).len(), 3, "{op:#04X}");
        }
    }

    #[test]
    fn lengths_match_the_opcode_map() {
        let cases = [
            (0x00, 1),
            (0x01, 3),
            (0x08, 3),
            (0x10, 2),
            (0x18, 2),
            (0x36, 2),
            (0x76, 1),
            (0xC6, 2),
            (0xCD, 3),
            (0xE0, 2),
            (0xE2, 1),
            (0xE8, 2),
            (0xEA, 3),
            (0xF8, 2),
            (0xFF, 1),
        ];
        for (op, len) in cases {
            assert_eq!(primary(op).len(), len, "{op:#04X}");
        }
        assert!((0..=0xFFu8).all(|op| prefixed(op).len() == 2));
    }
}
