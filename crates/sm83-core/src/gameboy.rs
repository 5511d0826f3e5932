use std::io;
use std::sync::{Arc, MutexGuard};

use crate::cartridge::{self, Cartridge, SharedCartridge};
use crate::cpu::Cpu;
use crate::diagnostics::{DiagnosticSink, default_sink};
use crate::error::{Fault, MapError};
use crate::hardware::Model;
use crate::mmu::{BootLatch, Mmu, dmg_map};
use crate::runner::{self, CancelToken, RunLimits, RunReport};

/// One emulated session: a cartridge, the DMG memory map around it and a
/// CPU driving that map.
pub struct GameBoy {
    pub cpu: Cpu,
    pub mmu: Mmu,
    pub model: Model,
    cart: SharedCartridge,
    boot: BootLatch,
}

impl GameBoy {
    /// Start at the post-boot state for `model`, as if the boot ROM had
    /// already run.
    pub fn new(cart: Cartridge, model: Model) -> Result<Self, MapError> {
        Self::build(cart, model, None, default_sink())
    }

    /// Start at `PC = 0` with `boot_rom` mapped over the cartridge until
    /// the program writes to `$FF50`.
    pub fn with_boot_rom(cart: Cartridge, model: Model, boot_rom: Vec<u8>) -> Result<Self, MapError> {
        Self::build(cart, model, Some(boot_rom), default_sink())
    }

    pub fn build(
        cart: Cartridge,
        model: Model,
        boot_rom: Option<Vec<u8>>,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Result<Self, MapError> {
        let cpu = if boot_rom.is_some() {
            Cpu::power_on()
        } else {
            Cpu::new(model)
        };
        let (mmu, cart, boot) = dmg_map(cart, boot_rom)?;
        Ok(Self {
            cpu: cpu.with_sink(sink),
            mmu,
            model,
            cart,
            boot,
        })
    }

    pub fn step(&mut self) -> Result<u32, Fault> {
        self.cpu.step(&mut self.mmu)
    }

    pub fn tick(&mut self) -> Result<bool, Fault> {
        self.cpu.tick(&mut self.mmu)
    }

    pub fn run(&mut self, limits: RunLimits, cancel: &CancelToken) -> Result<RunReport, Fault> {
        runner::run(&mut self.cpu, &mut self.mmu, limits, cancel)
    }

    pub fn cartridge(&self) -> MutexGuard<'_, Cartridge> {
        cartridge::lock(&self.cart)
    }

    pub fn boot_rom_mapped(&self) -> bool {
        self.boot.is_mapped()
    }

    /// Flush battery-backed cartridge RAM to disk.
    pub fn save_ram(&self) -> io::Result<()> {
        self.cartridge().save_ram()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::fix_checksums;
    use crate::diagnostics::NullSink;
    use crate::mmu::Memory;

    fn cart(code: &[u8]) -> Cartridge {
        let mut rom = vec![0u8; 0x8000];
        rom[0x100..0x100 + code.len()].copy_from_slice(code);
        fix_checksums(&mut rom).unwrap();
        Cartridge::load(rom, &NullSink).unwrap()
    }

    #[test]
    fn runs_from_the_entry_point() {
        // LD A,$42; LD ($C000),A; HALT
        let mut gb = GameBoy::new(cart(&[0x3E, 0x42, 0xEA, 0x00, 0xC0, 0x76]), Model::Dmg).unwrap();
        for _ in 0..3 {
            gb.step().unwrap();
        }
        assert!(gb.cpu.regs.halted);
        assert_eq!(gb.mmu.read(0xC000).unwrap(), 0x42);
        assert_eq!(gb.mmu.read(0xE000).unwrap(), 0x42);
        assert_eq!(gb.cartridge().title, "");
    }

    #[test]
    fn boot_rom_hands_over_to_the_cartridge() {
        // LD A,1; LDH ($50),A at 0x0000; the cartridge has NOP there.
        let boot = vec![0x3E, 0x01, 0xE0, 0x50];
        let mut gb = GameBoy::with_boot_rom(cart(&[]), Model::Dmg, boot).unwrap();
        assert_eq!(gb.cpu.regs.pc, 0x0000);
        assert_eq!(gb.mmu.read(0x0000).unwrap(), 0x3E);
        gb.step().unwrap();
        gb.step().unwrap();
        assert!(!gb.boot_rom_mapped());
        assert_eq!(gb.mmu.read(0x0000).unwrap(), 0x00);
    }
}
