//! Interrupt sources, priority and the IF/IE registers
//! (gbdev.io/pandocs/Interrupts.html).

use crate::error::MemoryError;
use crate::mmu::{Address, Memory, REG_IE, REG_IF};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interrupt {
    VBlank,
    LcdStat,
    Timer,
    Serial,
    Joypad,
}

impl Interrupt {
    /// In priority order.
    pub const ALL: [Interrupt; 5] = [
        Interrupt::VBlank,
        Interrupt::LcdStat,
        Interrupt::Timer,
        Interrupt::Serial,
        Interrupt::Joypad,
    ];

    pub fn bit(self) -> u8 {
        self as u8
    }

    pub fn mask(self) -> u8 {
        1 << self.bit()
    }

    pub fn vector(self) -> Address {
        0x40 + 8 * Address::from(self.bit())
    }

    pub fn entry(self) -> InterruptEntry {
        TABLE[usize::from(self.bit())]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptEntry {
    pub vector: Address,
    pub bit: u8,
}

impl InterruptEntry {
    pub fn interrupt(&self) -> Interrupt {
        Interrupt::ALL[usize::from(self.bit)]
    }
}

pub const TABLE: [InterruptEntry; 5] = [
    InterruptEntry { vector: 0x0040, bit: 0 },
    InterruptEntry { vector: 0x0048, bit: 1 },
    InterruptEntry { vector: 0x0050, bit: 2 },
    InterruptEntry { vector: 0x0058, bit: 3 },
    InterruptEntry { vector: 0x0060, bit: 4 },
];

/// Highest-priority interrupt that is both requested and enabled.
pub fn pending(if_reg: u8, ie: u8) -> Option<InterruptEntry> {
    let active = if_reg & ie & 0x1F;
    (active != 0).then(|| TABLE[active.trailing_zeros() as usize])
}

/// Read IF and IE through the bus and pick the next interrupt.
pub fn poll<M: Memory + ?Sized>(mem: &M) -> Result<Option<InterruptEntry>, MemoryError> {
    Ok(pending(mem.read(REG_IF)?, mem.read(REG_IE)?))
}

/// Raise `irq` in IF, as a peripheral would.
pub fn request<M: Memory + ?Sized>(mem: &mut M, irq: Interrupt) -> Result<(), MemoryError> {
    let flags = mem.read(REG_IF)?;
    mem.write(REG_IF, flags | irq.mask())
}

/// Clear the IF bit of an interrupt being serviced.
pub fn acknowledge<M: Memory + ?Sized>(
    mem: &mut M,
    entry: InterruptEntry,
) -> Result<(), MemoryError> {
    let flags = mem.read(REG_IF)?;
    mem.write(REG_IF, flags & !(1 << entry.bit))
}
