use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::diagnostics::{DiagnosticSink, diag};
use crate::error::CartridgeError;
use crate::mmu::{Address, Section};

pub const ROM_BANK_SIZE: usize = 0x4000;
pub const RAM_BANK_SIZE: usize = 0x2000;

const HEADER_END: usize = 0x150;

pub const NINTENDO_LOGO: [u8; 48] = [
    0xCE, 0xED, 0x66, 0x66, 0xCC, 0x0D, 0x00, 0x0B, 0x03, 0x73, 0x00, 0x83, 0x00, 0x0C, 0x00, 0x0D,
    0x00, 0x08, 0x11, 0x1F, 0x88, 0x89, 0x00, 0x0E, 0xDC, 0xCC, 0x6E, 0xE6, 0xDD, 0xDD, 0xD9, 0x99,
    0xBB, 0xBB, 0x67, 0x63, 0x6E, 0x0E, 0xEC, 0xCC, 0xDD, 0xDC, 0x99, 0x9F, 0xBB, 0xB9, 0x33, 0x3E,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MbcType {
    RomOnly,
    Mbc1,
}

/// Read-only view over the `0x100..0x150` cartridge header.
#[derive(Clone, Copy)]
pub struct Header<'a> {
    data: &'a [u8],
}

impl<'a> Header<'a> {
    /// `None` when `data` is too short to hold a header.
    pub fn parse(data: &'a [u8]) -> Option<Self> {
        (data.len() >= HEADER_END).then_some(Self { data })
    }

    fn byte(&self, offset: usize) -> u8 {
        self.data[offset]
    }

    pub fn entry_point(&self) -> [u8; 4] {
        [
            self.byte(0x100),
            self.byte(0x101),
            self.byte(0x102),
            self.byte(0x103),
        ]
    }

    pub fn logo(&self) -> &'a [u8] {
        &self.data[0x104..0x134]
    }

    pub fn logo_valid(&self) -> bool {
        self.logo() == NINTENDO_LOGO
    }

    /// Title with trailing NULs removed. Newer carts reuse the last bytes of
    /// the field for the manufacturer code, which is included. A set CGB flag
    /// at `0x143` is not part of the title.
    pub fn title(&self) -> String {
        let end = if self.cgb_flag() & 0x80 != 0 { 0x143 } else { 0x144 };
        let mut slice = &self.data[0x134..end];
        if let Some(pos) = slice.iter().position(|&b| b == 0) {
            slice = &slice[..pos];
        }
        String::from_utf8_lossy(slice).trim().to_string()
    }

    pub fn manufacturer_code(&self) -> &'a [u8] {
        &self.data[0x13F..0x143]
    }

    pub fn cgb_flag(&self) -> u8 {
        self.byte(0x143)
    }

    pub fn new_licensee(&self) -> [u8; 2] {
        [self.byte(0x144), self.byte(0x145)]
    }

    pub fn sgb_flag(&self) -> u8 {
        self.byte(0x146)
    }

    pub fn cart_type(&self) -> u8 {
        self.byte(0x147)
    }

    pub fn mbc_type(&self) -> Option<MbcType> {
        match self.cart_type() {
            0x00 | 0x08 | 0x09 => Some(MbcType::RomOnly),
            0x01..=0x03 => Some(MbcType::Mbc1),
            _ => None,
        }
    }

    pub fn has_battery(&self) -> bool {
        matches!(self.cart_type(), 0x03 | 0x09)
    }

    pub fn rom_size_code(&self) -> u8 {
        self.byte(0x148)
    }

    /// `2 << code` banks of 16 KiB.
    pub fn rom_banks(&self) -> Option<usize> {
        let code = self.rom_size_code();
        (code <= 0x08).then(|| 2usize << code)
    }

    pub fn ram_size_code(&self) -> u8 {
        self.byte(0x149)
    }

    /// Banks of 8 KiB. Code 1 is an unused 2 KiB size and yields no banks.
    pub fn ram_banks(&self) -> Option<usize> {
        match self.ram_size_code() {
            0x00 | 0x01 => Some(0),
            0x02 => Some(1),
            0x03 => Some(4),
            0x04 => Some(16),
            0x05 => Some(8),
            _ => None,
        }
    }

    pub fn destination(&self) -> u8 {
        self.byte(0x14A)
    }

    pub fn old_licensee(&self) -> u8 {
        self.byte(0x14B)
    }

    pub fn version(&self) -> u8 {
        self.byte(0x14C)
    }

    pub fn header_checksum(&self) -> u8 {
        self.byte(0x14D)
    }

    /// Stored big-endian.
    pub fn rom_checksum(&self) -> u16 {
        u16::from_be_bytes([self.byte(0x14E), self.byte(0x14F)])
    }
}

impl fmt::Debug for Header<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Header")
            .field("title", &self.title())
            .field("cart_type", &format_args!("{:#04X}", self.cart_type()))
            .field("rom_banks", &self.rom_banks())
            .field("ram_banks", &self.ram_banks())
            .field("version", &self.version())
            .finish()
    }
}

/// Checksum the boot ROM verifies: `x = x - byte - 1` over `0x134..=0x14C`.
/// The caller must pass at least `0x14D` bytes.
pub fn compute_header_checksum(rom: &[u8]) -> u8 {
    rom[0x134..=0x14C]
        .iter()
        .fold(0u8, |x, &b| x.wrapping_sub(b).wrapping_sub(1))
}

/// Sum of every byte in the image except the checksum itself.
pub fn compute_rom_checksum(rom: &[u8]) -> u16 {
    rom.iter()
        .enumerate()
        .filter(|&(i, _)| i != 0x14E && i != 0x14F)
        .fold(0u16, |sum, (_, &b)| sum.wrapping_add(u16::from(b)))
}

/// Rewrite both checksum fields from the image contents, as `rgbfix -v`
/// does. The header checksum goes first since the ROM checksum covers it.
pub fn fix_checksums(rom: &mut [u8]) -> Result<(), CartridgeError> {
    if rom.len() < HEADER_END {
        return Err(CartridgeError::TooSmall { len: rom.len() });
    }
    rom[0x14D] = compute_header_checksum(rom);
    let [hi, lo] = compute_rom_checksum(rom).to_be_bytes();
    rom[0x14E] = hi;
    rom[0x14F] = lo;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChecksumReport {
    pub header_stored: u8,
    pub header_computed: u8,
    pub rom_stored: u16,
    pub rom_computed: u16,
}

impl ChecksumReport {
    pub fn of(rom: &[u8]) -> Option<Self> {
        let header = Header::parse(rom)?;
        Some(Self {
            header_stored: header.header_checksum(),
            header_computed: compute_header_checksum(rom),
            rom_stored: header.rom_checksum(),
            rom_computed: compute_rom_checksum(rom),
        })
    }

    pub fn header_ok(&self) -> bool {
        self.header_stored == self.header_computed
    }

    pub fn rom_ok(&self) -> bool {
        self.rom_stored == self.rom_computed
    }
}

#[derive(Debug)]
enum MbcState {
    RomOnly,
    Mbc1 {
        /// BANK1, low five bits of the ROM bank. Never zero.
        rom_bank: u8,
        /// BANK2, two bits shared between ROM bank bits 5-6 and the RAM bank.
        secondary: u8,
        mode: u8,
        ram_enable: bool,
    },
}

#[derive(Debug)]
pub struct Cartridge {
    rom: Vec<u8>,
    ram: Vec<u8>,
    pub mbc: MbcType,
    pub title: String,
    cart_type: u8,
    rom_banks: usize,
    ram_banks: usize,
    battery: bool,
    checksums: ChecksumReport,
    save_path: Option<PathBuf>,
    mbc_state: MbcState,
}

impl Cartridge {
    /// Build a cartridge from a raw image.
    ///
    /// ROM storage is sized from the header, padding a short image with
    /// `0xFF`. Checksum mismatches are reported through `sink` and kept in
    /// [`checksums`](Self::checksums) but never reject the image.
    pub fn load(data: Vec<u8>, sink: &dyn DiagnosticSink) -> Result<Self, CartridgeError> {
        let header = Header::parse(&data).ok_or(CartridgeError::TooSmall { len: data.len() })?;
        let cart_type = header.cart_type();
        let mbc = header
            .mbc_type()
            .ok_or(CartridgeError::UnsupportedMapper(cart_type))?;
        let title = header.title();
        let battery = header.has_battery();

        let rom_banks = header.rom_banks().unwrap_or_else(|| {
            let banks = data.len().div_ceil(ROM_BANK_SIZE).next_power_of_two().max(2);
            diag!(
                sink,
                Warn,
                "cartridge",
                "unknown ROM size code ${:02X}, assuming {banks} banks",
                header.rom_size_code()
            );
            banks
        });
        let ram_banks = header.ram_banks().unwrap_or_else(|| {
            diag!(
                sink,
                Warn,
                "cartridge",
                "unknown RAM size code ${:02X}, no RAM mapped",
                header.ram_size_code()
            );
            0
        });

        let checksums = ChecksumReport::of(&data).ok_or(CartridgeError::TooSmall { len: data.len() })?;
        if !checksums.header_ok() {
            diag!(
                sink,
                Warn,
                "cartridge",
                "header checksum mismatch: stored ${:02X}, computed ${:02X}",
                checksums.header_stored,
                checksums.header_computed
            );
        }
        if !checksums.rom_ok() {
            diag!(
                sink,
                Warn,
                "cartridge",
                "ROM checksum mismatch: stored ${:04X}, computed ${:04X}",
                checksums.rom_stored,
                checksums.rom_computed
            );
        }

        let mut rom = data;
        if rom.len() != rom_banks * ROM_BANK_SIZE {
            diag!(
                sink,
                Debug,
                "cartridge",
                "resizing {} byte image to {rom_banks} banks",
                rom.len()
            );
        }
        rom.resize(rom_banks * ROM_BANK_SIZE, 0xFF);

        let mbc_state = match mbc {
            MbcType::RomOnly => MbcState::RomOnly,
            MbcType::Mbc1 => MbcState::Mbc1 {
                rom_bank: 1,
                secondary: 0,
                mode: 0,
                ram_enable: false,
            },
        };

        diag!(
            sink,
            Info,
            "cartridge",
            "loaded '{title}' ({mbc:?}, {rom_banks} ROM banks, {ram_banks} RAM banks)"
        );

        Ok(Self {
            rom,
            ram: vec![0; ram_banks * RAM_BANK_SIZE],
            mbc,
            title,
            cart_type,
            rom_banks,
            ram_banks,
            battery,
            checksums,
            save_path: None,
            mbc_state,
        })
    }

    /// Load an image from disk. Battery-backed RAM is restored from a `.sav`
    /// file next to the ROM when one exists.
    pub fn from_file<P: AsRef<Path>>(
        path: P,
        sink: &dyn DiagnosticSink,
    ) -> Result<Self, CartridgeError> {
        let data = fs::read(&path)?;
        let mut cart = Self::load(data, sink)?;

        if cart.battery && !cart.ram.is_empty() {
            let save = path.as_ref().with_extension("sav");
            if let Ok(bytes) = fs::read(&save) {
                for (d, s) in cart.ram.iter_mut().zip(bytes.iter()) {
                    *d = *s;
                }
                diag!(sink, Debug, "cartridge", "restored RAM from {}", save.display());
            }
            cart.save_path = Some(save);
        }
        Ok(cart)
    }

    pub fn header(&self) -> Header<'_> {
        Header { data: &self.rom }
    }

    pub fn cart_type(&self) -> u8 {
        self.cart_type
    }

    pub fn checksums(&self) -> ChecksumReport {
        self.checksums
    }

    pub fn rom_banks(&self) -> usize {
        self.rom_banks
    }

    pub fn ram_banks(&self) -> usize {
        self.ram_banks
    }

    pub fn rom(&self) -> &[u8] {
        &self.rom
    }

    pub fn ram(&self) -> &[u8] {
        &self.ram
    }

    /// Bank visible at `0x4000-0x7FFF`.
    pub fn rom_bank(&self) -> usize {
        match self.mbc_state {
            MbcState::RomOnly => 1,
            MbcState::Mbc1 {
                rom_bank,
                secondary,
                ..
            } => ((usize::from(secondary) << 5) | usize::from(rom_bank)) % self.rom_banks,
        }
    }

    /// Bank visible at `0xA000-0xBFFF`.
    pub fn ram_bank(&self) -> usize {
        match self.mbc_state {
            MbcState::Mbc1 {
                secondary, mode: 1, ..
            } if self.ram_banks > 0 => usize::from(secondary) % self.ram_banks,
            _ => 0,
        }
    }

    pub fn ram_enabled(&self) -> bool {
        match self.mbc_state {
            MbcState::RomOnly => !self.ram.is_empty(),
            MbcState::Mbc1 { ram_enable, .. } => ram_enable && !self.ram.is_empty(),
        }
    }

    fn ram_index(&self, addr: u16) -> usize {
        self.ram_bank() * RAM_BANK_SIZE + (addr as usize - 0xA000)
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x3FFF => self.rom.get(addr as usize).copied().unwrap_or(0xFF),
            0x4000..=0x7FFF => {
                let offset = self.rom_bank() * ROM_BANK_SIZE + (addr as usize - 0x4000);
                self.rom.get(offset).copied().unwrap_or(0xFF)
            }
            0xA000..=0xBFFF if self.ram_enabled() => {
                self.ram.get(self.ram_index(addr)).copied().unwrap_or(0xFF)
            }
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        if (0xA000..=0xBFFF).contains(&addr) {
            if self.ram_enabled() {
                let idx = self.ram_index(addr);
                if let Some(b) = self.ram.get_mut(idx) {
                    *b = val;
                }
            }
            return;
        }
        match (&mut self.mbc_state, addr) {
            (MbcState::Mbc1 { ram_enable, .. }, 0x0000..=0x1FFF) => {
                *ram_enable = val & 0x0F == 0x0A;
            }
            (MbcState::Mbc1 { rom_bank, .. }, 0x2000..=0x3FFF) => {
                *rom_bank = val & 0x1F;
                if *rom_bank == 0 {
                    *rom_bank = 1;
                }
            }
            (MbcState::Mbc1 { secondary, .. }, 0x4000..=0x5FFF) => {
                *secondary = val & 0x03;
            }
            (MbcState::Mbc1 { mode, .. }, 0x6000..=0x7FFF) => {
                *mode = val & 0x01;
            }
            // ROM-only carts ignore writes to the ROM area.
            _ => {}
        }
    }

    /// Write battery-backed RAM back to the `.sav` file chosen by
    /// [`from_file`](Self::from_file).
    pub fn save_ram(&self) -> io::Result<()> {
        match &self.save_path {
            Some(path) if self.battery => fs::write(path, &self.ram),
            _ => Ok(()),
        }
    }
}

/// A cartridge shared between its ROM and RAM windows.
pub type SharedCartridge = Arc<Mutex<Cartridge>>;

pub fn lock(cart: &SharedCartridge) -> MutexGuard<'_, Cartridge> {
    cart.lock().unwrap_or_else(PoisonError::into_inner)
}

/// `0x0000-0x7FFF`: ROM reads and MBC control writes.
pub struct CartridgeRom(pub SharedCartridge);

/// `0xA000-0xBFFF`: external RAM.
pub struct CartridgeRam(pub SharedCartridge);

impl Section for CartridgeRom {
    fn name(&self) -> &str {
        "rom"
    }

    fn start(&self) -> Address {
        0x0000
    }

    fn length(&self) -> u16 {
        0x8000
    }

    fn read(&self, addr: Address) -> u8 {
        lock(&self.0).read(addr)
    }

    fn write(&mut self, addr: Address, value: u8) {
        lock(&self.0).write(addr, value);
    }
}

impl Section for CartridgeRam {
    fn name(&self) -> &str {
        "sram"
    }

    fn start(&self) -> Address {
        0xA000
    }

    fn length(&self) -> u16 {
        0x2000
    }

    fn read(&self, addr: Address) -> u8 {
        lock(&self.0).read(addr)
    }

    fn write(&mut self, addr: Address, value: u8) {
        lock(&self.0).write(addr, value);
    }
}

/// Split a cartridge into the two sections the system map needs.
pub fn sections(cart: Cartridge) -> (SharedCartridge, CartridgeRom, CartridgeRam) {
    let shared = Arc::new(Mutex::new(cart));
    (
        Arc::clone(&shared),
        CartridgeRom(Arc::clone(&shared)),
        CartridgeRam(shared),
    )
}
