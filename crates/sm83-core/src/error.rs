use thiserror::Error;

use crate::isa::Instruction;
use crate::mmu::{Access, Address};

/// Faults raised by the address space mapper.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    #[error("address ${addr:04X} is not mapped")]
    AddressNotMapped { addr: Address },

    #[error("{access:?} access to ${addr:04X} violates section '{section}'")]
    AccessViolation {
        addr: Address,
        section: String,
        access: Access,
    },
}

/// Raised while composing a memory map whose sections do not tile the
/// address space.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MapError {
    #[error("no section covers ${addr:04X}")]
    Gap { addr: u32 },

    #[error("sections '{first}' and '{second}' overlap at ${addr:04X}")]
    Overlap {
        addr: Address,
        first: String,
        second: String,
    },

    #[error("section '{second}' does not start where '{first}' ends")]
    NotAdjacent { first: String, second: String },

    #[error("section '{name}' spans {len:#X} bytes, more than a section can describe")]
    TooLong { name: String, len: u32 },
}

#[derive(Error, Debug)]
pub enum CartridgeError {
    #[error("ROM image is {len} bytes, smaller than the 0x150-byte header")]
    TooSmall { len: usize },

    #[error("unsupported cartridge type ${0:02X}")]
    UnsupportedMapper(u8),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Map(#[from] MapError),
}

/// `encode` could not produce bytes for an instruction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AsmError {
    #[error("no encoding for `{instruction}`")]
    NoEncoding { instruction: Instruction },

    #[error(transparent)]
    Memory(#[from] MemoryError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocError {
    #[error("no free range of {size} bytes")]
    OutOfMemory { size: usize },

    #[error("bank {bank} does not exist")]
    InvalidBank { bank: usize },

    #[error("range ${addr:04X}+{size} in bank {bank} is not allocated")]
    NotAllocated {
        bank: usize,
        addr: Address,
        size: usize,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SaveStateError {
    #[error("register state must be 14 bytes, got {len}")]
    Length { len: usize },

    #[error("invalid IME encoding {0}")]
    InvalidIme(u8),
}

/// A micro-op fault, annotated with the instruction that raised it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("fault at PC=${pc:04X}{}: {source}", .opcode.map(|op| format!(" (opcode ${op:02X})")).unwrap_or_default())]
pub struct Fault {
    pub pc: Address,
    pub opcode: Option<u8>,
    #[source]
    pub source: MemoryError,
}
