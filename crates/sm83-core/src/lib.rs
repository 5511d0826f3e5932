//! Cycle-stepped SM83 (Game Boy CPU) core.
//!
//! The crate holds the CPU, the instruction codec and the bank-switched
//! memory map it runs against. Front ends drive it through the [`gameboy`]
//! facade or by pairing a [`cpu::Cpu`] with any [`mmu::Memory`].

/// Best-fit ROM/RAM space allocator for ROM authoring.
pub mod allocator;

/// Cartridge header, checksums and the ROM-only / MBC1 controllers.
pub mod cartridge;

/// Registers, flag rules and the micro-op execution engine.
pub mod cpu;

/// Injected diagnostic sinks.
pub mod diagnostics;

pub mod error;

/// High-level facade that wires a cartridge, the memory map and the CPU.
pub mod gameboy;

/// Console models and their post-boot register values.
pub mod hardware;

/// Interrupt sources, priority and IF/IE helpers.
pub mod interrupts;

/// Opcode table, decoder, encoder and disassembler.
pub mod isa;

/// Memory map and the sections it is composed from.
pub mod mmu;

/// Run loop, cancellation and the background worker.
pub mod runner;

pub use cartridge::Cartridge;
pub use cpu::{Cpu, Registers};
pub use error::{AllocError, AsmError, CartridgeError, Fault, MapError, MemoryError};
pub use gameboy::GameBoy;
pub use hardware::Model;
pub use isa::{Instruction, decode, encode};
pub use mmu::{Address, Memory, Mmu, Section};
