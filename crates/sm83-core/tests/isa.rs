use sm83_core::AsmError;
use sm83_core::isa::{
    AsmPolicy, Assembler, Condition, Indirect, InstrType, Instruction, Operand, Reg8, Reg16,
    decode, disassemble, encode, encode_bytes,
};
use sm83_core::mmu::{Access, Memory, RamSection};

const HOLES: [u8; 11] = [
    0xD3, 0xDB, 0xDD, 0xE3, 0xE4, 0xEB, 0xEC, 0xED, 0xF4, 0xFC, 0xFD,
];

fn rom(bytes: &[u8]) -> RamSection {
    RamSection::from_bytes("rom", 0, bytes.to_vec(), Access::Read)
}

/// Decode `bytes` and encode the result again.
fn reencode(bytes: &[u8]) -> (Instruction, Vec<u8>, usize) {
    let (instr, next) = decode(&rom(bytes), 0).unwrap();
    let out = encode_bytes(&instr).unwrap().to_vec();
    (instr, out, usize::from(next))
}

#[test]
fn every_primary_opcode_reencodes_byte_for_byte() {
    for op in 0..=0xFFu8 {
        if op == 0xCB || HOLES.contains(&op) {
            continue;
        }
        let bytes = [op, 0x9A, 0x12];
        let (instr, out, len) = reencode(&bytes);
        assert!(!instr.is_invalid(), "{op:#04X}");
        assert_eq!(out, bytes[..len], "{op:#04X} {instr}");
        assert_eq!(instr.len(), Some(len as u16));
    }
}

#[test]
fn every_prefixed_opcode_reencodes_byte_for_byte() {
    for op in 0..=0xFFu8 {
        let bytes = [0xCB, op];
        let (instr, out, len) = reencode(&bytes);
        assert_eq!(len, 2);
        assert_eq!(out, bytes, "CB {op:#04X} {instr}");
    }
}

#[test]
fn holes_decode_to_the_sentinel() {
    for op in HOLES {
        let (instr, next) = decode(&rom(&[op, 0x00]), 0).unwrap();
        assert!(instr.is_invalid());
        assert_eq!(instr.operands, [Some(Operand::Imm8(op)), None]);
        assert_eq!(next, 1);
        assert_eq!(instr.to_string(), format!("DB ${op:02X}"));
    }
}

#[test]
fn constructed_instructions_survive_encode_then_decode() {
    use Operand::{Bit, Cond, Direct, Imm8, Imm16, IoC, IoOffset, Pair, Reg, Rel8, SpRel, Vector};
    let program = [
        Instruction::binary(InstrType::Ld, Reg(Reg8::H), Operand::Indirect(Indirect::HL)),
        Instruction::binary(InstrType::Ld, Operand::Indirect(Indirect::HLDec), Reg(Reg8::A)),
        Instruction::binary(InstrType::Ld, Pair(Reg16::SP), Imm16(0xDFFF)),
        Instruction::binary(InstrType::Ld, Direct(0xC0DE), Pair(Reg16::SP)),
        Instruction::binary(InstrType::Ldh, IoOffset(0x44), Reg(Reg8::A)),
        Instruction::binary(InstrType::Ldh, Reg(Reg8::A), IoC),
        Instruction::binary(InstrType::Ld, Pair(Reg16::HL), SpRel(0xFE)),
        Instruction::binary(InstrType::Add, Pair(Reg16::SP), Rel8(0x80)),
        Instruction::binary(InstrType::Jp, Cond(Condition::C), Imm16(0x4000)),
        Instruction::binary(InstrType::Jr, Cond(Condition::NZ), Rel8(0xFD)),
        Instruction::binary(InstrType::Call, Cond(Condition::Z), Imm16(0x1234)),
        Instruction::unary(InstrType::Ret, Cond(Condition::NC)),
        Instruction::unary(InstrType::Push, Pair(Reg16::AF)),
        Instruction::unary(InstrType::Rst, Vector(0x38)),
        Instruction::binary(InstrType::Adc, Reg(Reg8::A), Imm8(0x10)),
        Instruction::unary(InstrType::Cp, Operand::Indirect(Indirect::HL)),
        Instruction::unary(InstrType::Swap, Reg(Reg8::E)),
        Instruction::binary(InstrType::Res, Bit(3), Operand::Indirect(Indirect::HL)),
        Instruction::new(InstrType::Stop),
        Instruction::new(InstrType::Reti),
    ];

    let mut mem = RamSection::new("scratch", 0xC000, 0x100);
    let end = Assembler::default().emit_all(&mut mem, 0xC000, &program).unwrap();

    let mut pc = 0xC000;
    for expected in program {
        let (instr, next) = decode(&mem, pc).unwrap();
        assert_eq!(instr, expected);
        pc = next;
    }
    assert_eq!(pc, end);
}

#[test]
fn conditional_absolute_jumps_take_a_word() {
    let jp = Instruction::binary(InstrType::Jp, Operand::Cond(Condition::Z), Operand::Imm16(0x0150));
    assert_eq!(encode_bytes(&jp).unwrap().as_slice(), [0xCA, 0x50, 0x01]);
    let jp = Instruction::binary(InstrType::Jp, Operand::Cond(Condition::C), Operand::Imm16(0x0150));
    assert_eq!(encode_bytes(&jp).unwrap().as_slice(), [0xDA, 0x50, 0x01]);
}

#[test]
fn unencodable_combinations() {
    let bad = Instruction::binary(InstrType::Ld, Operand::Pair(Reg16::BC), Operand::Pair(Reg16::DE));
    let mut mem = RamSection::new("scratch", 0xC000, 0x10);

    assert_eq!(
        encode(&mut mem, 0xC000, &bad),
        Err(AsmError::NoEncoding { instruction: bad })
    );
    assert!(Assembler::new(AsmPolicy::Strict).emit(&mut mem, 0xC000, &bad).is_err());

    let lenient = Assembler::new(AsmPolicy::BestEffort);
    let nop = Instruction::new(InstrType::Nop);
    let end = lenient.emit_all(&mut mem, 0xC000, &[bad, nop, bad, nop]).unwrap();
    assert_eq!(end, 0xC002);
}

#[test]
fn encoding_into_read_only_memory_faults() {
    let mut mem = rom(&[0; 4]);
    let err = encode(&mut mem, 0, &Instruction::new(InstrType::Nop)).unwrap_err();
    assert!(matches!(err, AsmError::Memory(_)));
}

#[test]
fn relative_offsets_keep_their_raw_byte() {
    let (instr, _) = decode(&rom(&[0x18, 0xFE]), 0).unwrap();
    assert_eq!(instr.operands[0], Some(Operand::Rel8(0xFE)));
    assert_eq!(instr.operands[0].and_then(|op| op.signed()), Some(-2));
    assert_eq!(instr.branch_target(0x0102), Some(0x0100));
    assert_eq!(instr.to_string(), "JR -2");
}

#[test]
fn listing() {
    let mut mem = RamSection::new("rom", 0x0100, 0x10);
    mem.load(0x0100, &[0x3E, 0x05, 0x3C, 0x20, 0xFD, 0x76]).unwrap();
    let text: Vec<String> = disassemble(&mem, 0x0100, 4)
        .unwrap()
        .iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(
        text,
        [
            "0100  3E 05     LD A,$05",
            "0102  3C        INC A",
            "0103  20 FD     JR NZ,$0102",
            "0105  76        HALT",
        ]
    );

    let hl = Instruction::binary(InstrType::Bit, Operand::Bit(7), Operand::Indirect(Indirect::HL));
    assert_eq!(hl.to_string(), "BIT 7,(HL)");
}
