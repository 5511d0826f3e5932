use crate::error::SaveStateError;
use crate::hardware::{Model, post_boot_registers};
use crate::isa::{Reg8, Reg16};

// CPU flag bits as documented in gbdev.io/pandocs/The_CPU_Flags.html
pub const FLAG_Z: u8 = 0x80; // Zero
pub const FLAG_N: u8 = 0x40; // Subtract
pub const FLAG_H: u8 = 0x20; // Half Carry
pub const FLAG_C: u8 = 0x10; // Carry

// Post-boot CPU state from gbdev.io/pandocs/Power_Up_State.html
const BOOT_PC: u16 = 0x0100;
const BOOT_SP: u16 = 0xFFFE;

pub const SAVE_STATE_LEN: usize = 14;

/// Interrupt master enable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Ime {
    #[default]
    Disabled,
    /// Set by `EI`; becomes `Enabled` once the next instruction finishes.
    RequestEnabled,
    Enabled,
}

impl Ime {
    pub fn to_byte(self) -> u8 {
        match self {
            Ime::Disabled => 0,
            Ime::RequestEnabled => 1,
            Ime::Enabled => 2,
        }
    }

    pub fn from_byte(b: u8) -> Result<Self, SaveStateError> {
        match b {
            0 => Ok(Ime::Disabled),
            1 => Ok(Ime::RequestEnabled),
            2 => Ok(Ime::Enabled),
            other => Err(SaveStateError::InvalidIme(other)),
        }
    }
}

/// Architectural register file. `F` is private so its low nibble can be
/// kept clear on every write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Registers {
    pub a: u8,
    f: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,
    pub sp: u16,
    pub pc: u16,
    pub ime: Ime,
    pub halted: bool,
}

impl Registers {
    /// State the boot ROM hands over to the cartridge at `0x0100`.
    pub fn post_boot(model: Model) -> Self {
        let [a, f, b, c, d, e, h, l] = post_boot_registers(model);
        let mut regs = Self {
            a,
            b,
            c,
            d,
            e,
            h,
            l,
            sp: BOOT_SP,
            pc: BOOT_PC,
            ..Self::default()
        };
        regs.set_f(f);
        regs
    }

    /// All zero with `PC = 0`, for running a boot ROM.
    pub fn power_on() -> Self {
        Self::default()
    }

    pub fn f(&self) -> u8 {
        self.f
    }

    pub fn set_f(&mut self, value: u8) {
        self.f = value & 0xF0;
    }

    pub fn flag(&self, mask: u8) -> bool {
        self.f & mask != 0
    }

    pub fn set_flag(&mut self, mask: u8, on: bool) {
        if on {
            self.set_f(self.f | mask);
        } else {
            self.set_f(self.f & !mask);
        }
    }

    /// Replace all four flags at once.
    pub(crate) fn set_flags(&mut self, z: bool, n: bool, h: bool, c: bool) {
        self.f = (if z { FLAG_Z } else { 0 })
            | (if n { FLAG_N } else { 0 })
            | (if h { FLAG_H } else { 0 })
            | (if c { FLAG_C } else { 0 });
    }

    pub fn reg8(&self, r: Reg8) -> u8 {
        match r {
            Reg8::A => self.a,
            Reg8::B => self.b,
            Reg8::C => self.c,
            Reg8::D => self.d,
            Reg8::E => self.e,
            Reg8::H => self.h,
            Reg8::L => self.l,
        }
    }

    pub fn set_reg8(&mut self, r: Reg8, value: u8) {
        match r {
            Reg8::A => self.a = value,
            Reg8::B => self.b = value,
            Reg8::C => self.c = value,
            Reg8::D => self.d = value,
            Reg8::E => self.e = value,
            Reg8::H => self.h = value,
            Reg8::L => self.l = value,
        }
    }

    pub fn pair(&self, rr: Reg16) -> u16 {
        let join = |hi: u8, lo: u8| u16::from_be_bytes([hi, lo]);
        match rr {
            Reg16::AF => join(self.a, self.f),
            Reg16::BC => join(self.b, self.c),
            Reg16::DE => join(self.d, self.e),
            Reg16::HL => join(self.h, self.l),
            Reg16::SP => self.sp,
        }
    }

    pub fn set_pair(&mut self, rr: Reg16, value: u16) {
        let [hi, lo] = value.to_be_bytes();
        match rr {
            Reg16::AF => {
                self.a = hi;
                self.set_f(lo);
            }
            Reg16::BC => (self.b, self.c) = (hi, lo),
            Reg16::DE => (self.d, self.e) = (hi, lo),
            Reg16::HL => (self.h, self.l) = (hi, lo),
            Reg16::SP => self.sp = value,
        }
    }

    pub fn hl(&self) -> u16 {
        self.pair(Reg16::HL)
    }

    /// `A,F,B,C,D,E,H,L`, `SP` and `PC` little-endian, then IME and the
    /// halted flag.
    pub fn to_bytes(&self) -> [u8; SAVE_STATE_LEN] {
        let [sp_lo, sp_hi] = self.sp.to_le_bytes();
        let [pc_lo, pc_hi] = self.pc.to_le_bytes();
        [
            self.a,
            self.f,
            self.b,
            self.c,
            self.d,
            self.e,
            self.h,
            self.l,
            sp_lo,
            sp_hi,
            pc_lo,
            pc_hi,
            self.ime.to_byte(),
            u8::from(self.halted),
        ]
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SaveStateError> {
        let bytes: &[u8; SAVE_STATE_LEN] = bytes
            .try_into()
            .map_err(|_| SaveStateError::Length { len: bytes.len() })?;
        let mut regs = Self {
            a: bytes[0],
            b: bytes[2],
            c: bytes[3],
            d: bytes[4],
            e: bytes[5],
            h: bytes[6],
            l: bytes[7],
            sp: u16::from_le_bytes([bytes[8], bytes[9]]),
            pc: u16::from_le_bytes([bytes[10], bytes[11]]),
            ime: Ime::from_byte(bytes[12])?,
            halted: bytes[13] != 0,
            ..Self::default()
        };
        regs.set_f(bytes[1]);
        Ok(regs)
    }

    /// Formatted register state for debugging.
    pub fn debug_state(&self) -> String {
        format!(
            "AF:{:04X} BC:{:04X} DE:{:04X} HL:{:04X} PC:{:04X} SP:{:04X} IME:{:?}{}",
            self.pair(Reg16::AF),
            self.pair(Reg16::BC),
            self.pair(Reg16::DE),
            self.hl(),
            self.pc,
            self.sp,
            self.ime,
            if self.halted { " HALT" } else { "" }
        )
    }
}
