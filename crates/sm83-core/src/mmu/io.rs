use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{Address, IO_START, REG_BOOT, REG_DIV, REG_IF, REG_LCDC, REG_LY, REG_STAT, Section};

const IO_LEN: u16 = 0x80;
const REG_P1: Address = 0xFF00;

/// Shared flag telling whether the boot ROM still shadows the cartridge.
///
/// Cleared through the I/O block (`FF50`) and observed by
/// [`BootRomOverlay`](super::BootRomOverlay).
#[derive(Debug, Clone, Default)]
pub struct BootLatch(Arc<AtomicBool>);

impl BootLatch {
    pub fn new(mapped: bool) -> Self {
        Self(Arc::new(AtomicBool::new(mapped)))
    }

    pub fn is_mapped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn unmap(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// The `FF00-FF7F` register block.
///
/// Registers without a peripheral behind them behave as plain storage. The
/// ones listed below carry the side effects the CPU can observe on its own.
pub struct IoRegisters {
    regs: [u8; IO_LEN as usize],
    boot: BootLatch,
}

impl IoRegisters {
    pub fn new(boot: BootLatch) -> Self {
        let mut regs = [0u8; IO_LEN as usize];
        regs[idx(REG_P1)] = 0xCF;
        regs[idx(REG_LCDC)] = 0x91;
        regs[idx(REG_STAT)] = 0x85;
        regs[idx(REG_BOOT)] = u8::from(!boot.is_mapped());
        Self { regs, boot }
    }

    pub fn boot_latch(&self) -> &BootLatch {
        &self.boot
    }
}

fn idx(addr: Address) -> usize {
    usize::from(addr - IO_START)
}

impl Section for IoRegisters {
    fn name(&self) -> &str {
        "io"
    }

    fn start(&self) -> Address {
        IO_START
    }

    fn length(&self) -> u16 {
        IO_LEN
    }

    fn read(&self, addr: Address) -> u8 {
        let value = self.regs[idx(addr)];
        match addr {
            REG_P1 => value | 0xC0,
            REG_IF => value | 0xE0,
            REG_STAT => value | 0x80,
            REG_BOOT => value | 0xFE,
            _ => value,
        }
    }

    fn write(&mut self, addr: Address, value: u8) {
        match addr {
            REG_P1 => {
                let cur = self.regs[idx(REG_P1)];
                self.regs[idx(REG_P1)] = (cur & 0xCF) | (value & 0x30);
            }
            REG_DIV => self.regs[idx(REG_DIV)] = 0,
            REG_IF => self.regs[idx(REG_IF)] = value & 0x1F,
            REG_LCDC => {
                self.regs[idx(REG_LCDC)] = value;
                if value & 0x80 == 0 {
                    self.regs[idx(REG_LY)] = 0;
                    self.regs[idx(REG_STAT)] &= !0x03;
                }
            }
            // Mode and coincidence bits belong to the PPU.
            REG_STAT => {
                let cur = self.regs[idx(REG_STAT)];
                self.regs[idx(REG_STAT)] = (cur & 0x07) | (value & 0x78);
            }
            REG_LY => {}
            REG_BOOT => {
                if value != 0 && self.boot.is_mapped() {
                    self.boot.unmap();
                    self.regs[idx(REG_BOOT)] = 1;
                }
            }
            _ => self.regs[idx(addr)] = value,
        }
    }
}
