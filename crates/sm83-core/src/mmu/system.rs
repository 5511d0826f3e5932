use super::{
    BootLatch, BootRomOverlay, CombiSection, IoRegisters, Mmu, OpenBus, RamSection, Remap,
};
use crate::cartridge::{self, Cartridge, SharedCartridge};
use crate::error::MapError;

/// Compose the DMG address space around `cart`.
///
/// ```text
/// 0000-7FFF  cartridge ROM + MBC control (boot ROM over 0000-00FF)
/// 8000-9FFF  VRAM
/// A000-BFFF  cartridge RAM
/// C000-DFFF  WRAM, fixed and switchable halves
/// E000-FDFF  echo of C000-DDFF
/// FE00-FE9F  OAM
/// FEA0-FEFF  unusable
/// FF00-FF7F  I/O registers
/// FF80-FFFE  HRAM
/// FFFF       IE
/// ```
pub fn dmg_map(
    cart: Cartridge,
    boot_rom: Option<Vec<u8>>,
) -> Result<(Mmu, SharedCartridge, BootLatch), MapError> {
    let (shared, rom, ram) = cartridge::sections(cart);
    let latch = BootLatch::new(boot_rom.is_some());

    let wram = CombiSection::new(
        "wram",
        RamSection::new("wram0", 0xC000, 0x1000),
        RamSection::new("wram1", 0xD000, 0x1000),
    )?;

    let builder = match boot_rom {
        Some(boot) => Mmu::builder().section(BootRomOverlay::new(boot, latch.clone(), rom)),
        None => Mmu::builder().section(rom),
    };

    let mmu = builder
        .section(RamSection::new("vram", 0x8000, 0x2000))
        .section(ram)
        .section(wram)
        .remap(Remap::new("echo", 0xE000, 0x1E00, 0xC000))
        .section(RamSection::new("oam", 0xFE00, 0xA0))
        .section(OpenBus::new("unusable", 0xFEA0, 0x60))
        .section(IoRegisters::new(latch.clone()))
        .section(RamSection::new("hram", 0xFF80, 0x7F))
        .section(RamSection::new("ie", 0xFFFF, 1))
        .build()?;

    Ok((mmu, shared, latch))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::fix_checksums;
    use crate::diagnostics::NullSink;
    use crate::mmu::Memory;

    fn cart() -> Cartridge {
        let mut rom = vec![0u8; 0x8000];
        rom[0x4000] = 0x44;
        fix_checksums(&mut rom).unwrap();
        Cartridge::load(rom, &NullSink).unwrap()
    }

    #[test]
    fn map_covers_every_address() {
        let (mmu, _, _) = dmg_map(cart(), None).unwrap();
        let names: Vec<_> = mmu.regions().map(|(_, _, name)| name.to_string()).collect();
        assert_eq!(
            names,
            [
                "rom", "vram", "sram", "wram", "echo", "oam", "unusable", "io", "hram", "ie"
            ]
        );
        for addr in 0..=0xFFFFu16 {
            assert!(mmu.read(addr).is_ok(), "${addr:04X}");
        }
    }

    #[test]
    fn echo_ram_mirrors_wram() {
        let (mut mmu, _, _) = dmg_map(cart(), None).unwrap();
        mmu.write(0xC010, 0x77).unwrap();
        assert_eq!(mmu.read(0xE010), Ok(0x77));
        mmu.write(0xF000, 0x88).unwrap();
        assert_eq!(mmu.read(0xD000), Ok(0x88));
    }

    #[test]
    fn unusable_area_floats_high() {
        let (mut mmu, _, _) = dmg_map(cart(), None).unwrap();
        mmu.write(0xFEA0, 0x00).unwrap();
        assert_eq!(mmu.read(0xFEA0), Ok(0xFF));
    }

    #[test]
    fn boot_rom_is_unmapped_through_ff50() {
        let (mut mmu, _, latch) = dmg_map(cart(), Some(vec![0x31; 0x100])).unwrap();
        assert_eq!(mmu.read(0x0000), Ok(0x31));
        assert_eq!(mmu.read(0x0100), Ok(0x00));
        mmu.write(0xFF50, 0x01).unwrap();
        assert!(!latch.is_mapped());
        assert_eq!(mmu.read(0x0000), Ok(0x00));
        assert_eq!(mmu.read(0x4000), Ok(0x44));
    }
}
