#![allow(dead_code)]

use sm83_core::cartridge::{Cartridge, NINTENDO_LOGO, ROM_BANK_SIZE, fix_checksums};
use sm83_core::diagnostics::NullSink;
use sm83_core::{GameBoy, Model};

/// 32 KiB ROM-only image with `code` at the entry point and valid
/// checksums.
pub fn rom_with_code(code: &[u8]) -> Vec<u8> {
    let mut rom = vec![0u8; 2 * ROM_BANK_SIZE];
    rom[0x104..0x134].copy_from_slice(&NINTENDO_LOGO);
    rom[0x100..0x100 + code.len()].copy_from_slice(code);
    fix_checksums(&mut rom).unwrap();
    rom
}

/// Image whose every bank starts with its own bank number.
pub fn banked_rom(cart_type: u8, rom_code: u8, ram_code: u8) -> Vec<u8> {
    let banks = 2usize << rom_code;
    let mut rom = vec![0u8; banks * ROM_BANK_SIZE];
    for bank in 0..banks {
        rom[bank * ROM_BANK_SIZE] = bank as u8;
    }
    rom[0x147] = cart_type;
    rom[0x148] = rom_code;
    rom[0x149] = ram_code;
    fix_checksums(&mut rom).unwrap();
    rom
}

pub fn load(rom: Vec<u8>) -> Cartridge {
    Cartridge::load(rom, &NullSink).unwrap()
}

pub fn machine(code: &[u8]) -> GameBoy {
    GameBoy::new(load(rom_with_code(code)), Model::Dmg).unwrap()
}
