use super::table::{self, Slot};
use super::{InstrType, Instruction, Operand};
use crate::error::MemoryError;
use crate::mmu::{Address, Memory};

fn next8<M: Memory + ?Sized>(mem: &M, at: &mut Address) -> Result<u8, MemoryError> {
    let b = mem.read(*at)?;
    *at = at.wrapping_add(1);
    Ok(b)
}

/// Decode from a byte stream, returning the instruction and the number of
/// bytes it spans.
fn decode_stream<F>(mut next: F) -> Result<(Instruction, u16), MemoryError>
where
    F: FnMut() -> Result<u8, MemoryError>,
{
    let mut len = 1;
    let op = next()?;
    let entry = if op == 0xCB {
        len += 1;
        table::prefixed(next()?)
    } else {
        table::primary(op)
    };

    let mut operands = [None; 2];
    for (slot, out) in entry.slots.iter().zip(operands.iter_mut()) {
        let Some(slot) = *slot else { continue };
        *out = Some(match slot {
            Slot::Fixed(operand) => operand,
            Slot::D8 | Slot::R8 | Slot::A8 | Slot::SpR8 => {
                len += 1;
                let b = next()?;
                match slot {
                    Slot::D8 => Operand::Imm8(b),
                    Slot::R8 => Operand::Rel8(b),
                    Slot::A8 => Operand::IoOffset(b),
                    _ => Operand::SpRel(b),
                }
            }
            Slot::D16 | Slot::A16 => {
                len += 2;
                let lo = next()?;
                let hi = next()?;
                let w = u16::from_le_bytes([lo, hi]);
                if slot == Slot::D16 {
                    Operand::Imm16(w)
                } else {
                    Operand::Direct(w)
                }
            }
        });
    }

    // STOP is followed by a byte the CPU skips. Anything but the usual zero
    // is kept as an operand so the bytes encode back unchanged.
    if entry.kind == InstrType::Stop {
        len += 1;
        let pad = next()?;
        if pad != 0x00 {
            operands[0] = Some(Operand::Imm8(pad));
        }
    }

    Ok((
        Instruction {
            kind: entry.kind,
            operands,
        },
        len,
    ))
}

/// Decode the instruction at `pc`, returning it with the address of the
/// byte after it.
///
/// Bytes with no meaning decode to [`InstrType::Invalid`]; only a memory
/// fault makes this fail.
pub fn decode<M: Memory + ?Sized>(
    mem: &M,
    pc: Address,
) -> Result<(Instruction, Address), MemoryError> {
    let mut at = pc;
    let (instr, len) = decode_stream(|| next8(mem, &mut at))?;
    Ok((instr, pc.wrapping_add(len)))
}

/// Decode as the CPU sees the bytes after the HALT bug: the byte at `pc` is
/// read twice before the stream moves on.
pub(crate) fn decode_repeating<M: Memory + ?Sized>(
    mem: &M,
    pc: Address,
) -> Result<Instruction, MemoryError> {
    let mut at = pc;
    let mut repeat = true;
    let (instr, _) = decode_stream(|| {
        if repeat {
            repeat = false;
            mem.read(pc)
        } else {
            next8(mem, &mut at)
        }
    })?;
    Ok(instr)
}
