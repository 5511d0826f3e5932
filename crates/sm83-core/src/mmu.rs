//! Address space mapper.
//!
//! An [`Mmu`] owns a set of [`Section`]s that tile the 16-bit address
//! space and dispatches every CPU access to the one section owning the
//! address. Remapped regions (echo RAM) are resolved here rather than by the
//! sections themselves.

use crate::error::{MapError, MemoryError};

mod boot;
mod combi;
mod io;
mod open_bus;
mod ram;
mod system;

pub use boot::BootRomOverlay;
pub use combi::CombiSection;
pub use io::{BootLatch, IoRegisters};
pub use open_bus::OpenBus;
pub use ram::RamSection;
pub use system::dmg_map;

pub type Address = u16;

pub const IO_START: Address = 0xFF00;
pub const REG_DIV: Address = 0xFF04;
pub const REG_IF: Address = 0xFF0F;
pub const REG_LCDC: Address = 0xFF40;
pub const REG_STAT: Address = 0xFF41;
pub const REG_LY: Address = 0xFF44;
pub const REG_BOOT: Address = 0xFF50;
pub const REG_IE: Address = 0xFFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
    ReadWrite,
}

impl Access {
    pub fn readable(self) -> bool {
        matches!(self, Access::Read | Access::ReadWrite)
    }

    pub fn writable(self) -> bool {
        matches!(self, Access::Write | Access::ReadWrite)
    }
}

/// A byte-addressable region that can be composed into an [`Mmu`].
///
/// `read` and `write` receive absolute addresses. The mapper only calls them
/// for addresses the section [`accepts`](Section::accepts) and after the
/// access rules have been checked.
pub trait Section: Send {
    fn name(&self) -> &str;
    fn start(&self) -> Address;
    fn length(&self) -> u16;

    fn access(&self) -> Access {
        Access::ReadWrite
    }

    /// Rule for one address. Sections built from parts with different
    /// rules override this; the mapper checks it on every access.
    fn access_at(&self, _addr: Address) -> Access {
        self.access()
    }

    /// One past the last address, widened so a section may end at 0xFFFF.
    fn end(&self) -> u32 {
        u32::from(self.start()) + u32::from(self.length())
    }

    fn accepts(&self, addr: Address) -> bool {
        addr >= self.start() && u32::from(addr) < self.end()
    }

    fn read(&self, addr: Address) -> u8;
    fn write(&mut self, addr: Address, value: u8);
}

/// Byte-level bus used by the CPU and by the instruction codec.
pub trait Memory {
    fn read(&self, addr: Address) -> Result<u8, MemoryError>;
    fn write(&mut self, addr: Address, value: u8) -> Result<(), MemoryError>;

    fn read16(&self, addr: Address) -> Result<u16, MemoryError> {
        let lo = self.read(addr)?;
        let hi = self.read(addr.wrapping_add(1))?;
        Ok(u16::from_le_bytes([lo, hi]))
    }

    /// Copy `bytes` starting at `addr`, wrapping at the top of the space.
    fn load(&mut self, addr: Address, bytes: &[u8]) -> Result<(), MemoryError> {
        let mut at = addr;
        for &b in bytes {
            self.write(at, b)?;
            at = at.wrapping_add(1);
        }
        Ok(())
    }
}

/// Window that rewrites incoming addresses onto another region of the same
/// map. The hardware echo RAM is `Remap::new("echo", 0xE000, 0x1E00, 0xC000)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remap {
    name: String,
    start: Address,
    length: u16,
    target: Address,
}

impl Remap {
    pub fn new(name: impl Into<String>, start: Address, length: u16, target: Address) -> Self {
        Self {
            name: name.into(),
            start,
            length,
            target,
        }
    }

    fn translate(&self, addr: Address) -> Address {
        self.target.wrapping_add(addr - self.start)
    }
}

enum Region {
    Backed(Box<dyn Section>),
    Remap(Remap),
}

impl Region {
    fn name(&self) -> &str {
        match self {
            Region::Backed(s) => s.name(),
            Region::Remap(r) => &r.name,
        }
    }

    fn start(&self) -> Address {
        match self {
            Region::Backed(s) => s.start(),
            Region::Remap(r) => r.start,
        }
    }

    fn end(&self) -> u32 {
        match self {
            Region::Backed(s) => s.end(),
            Region::Remap(r) => u32::from(r.start) + u32::from(r.length),
        }
    }
}

/// Collects regions before they are validated into an [`Mmu`].
#[derive(Default)]
pub struct MmuBuilder {
    regions: Vec<Region>,
}

impl MmuBuilder {
    pub fn section(mut self, section: impl Section + 'static) -> Self {
        self.regions.push(Region::Backed(Box::new(section)));
        self
    }

    pub fn boxed(mut self, section: Box<dyn Section>) -> Self {
        self.regions.push(Region::Backed(section));
        self
    }

    pub fn remap(mut self, remap: Remap) -> Self {
        self.regions.push(Region::Remap(remap));
        self
    }

    /// Build a map that must cover every address exactly once.
    pub fn build(self) -> Result<Mmu, MapError> {
        let mmu = self.build_sparse()?;
        let mut expected = 0u32;
        for region in &mmu.regions {
            if u32::from(region.start()) != expected {
                return Err(MapError::Gap { addr: expected });
            }
            expected = region.end();
        }
        if expected != 0x1_0000 {
            return Err(MapError::Gap { addr: expected });
        }
        Ok(mmu)
    }

    /// Build a map that may leave holes; accesses there fault with
    /// `AddressNotMapped`.
    pub fn build_sparse(mut self) -> Result<Mmu, MapError> {
        self.regions.sort_by_key(|r| r.start());
        for pair in self.regions.windows(2) {
            if u32::from(pair[1].start()) >= pair[0].end() {
                continue;
            }
            return Err(MapError::Overlap {
                addr: pair[1].start(),
                first: pair[0].name().to_string(),
                second: pair[1].name().to_string(),
            });
        }
        let starts = self.regions.iter().map(Region::start).collect();
        Ok(Mmu {
            regions: self.regions,
            starts,
        })
    }
}

pub struct Mmu {
    regions: Vec<Region>,
    starts: Vec<Address>,
}

impl Mmu {
    pub fn builder() -> MmuBuilder {
        MmuBuilder::default()
    }

    /// `(start, length, name)` of every region in address order.
    pub fn regions(&self) -> impl Iterator<Item = (Address, u32, &str)> {
        self.regions
            .iter()
            .map(|r| (r.start(), r.end() - u32::from(r.start()), r.name()))
    }

    fn index_of(&self, addr: Address) -> Option<usize> {
        let idx = self.starts.partition_point(|&s| s <= addr).checked_sub(1)?;
        (u32::from(addr) < self.regions[idx].end()).then_some(idx)
    }

    /// Follow remaps until a backed section owns the address.
    fn resolve(&self, addr: Address) -> Result<(usize, Address), MemoryError> {
        let mut at = addr;
        // A remap pointing at another remap is legal; a cycle is not.
        for _ in 0..=self.regions.len() {
            let idx = self
                .index_of(at)
                .ok_or(MemoryError::AddressNotMapped { addr })?;
            match &self.regions[idx] {
                Region::Backed(_) => return Ok((idx, at)),
                Region::Remap(r) => at = r.translate(at),
            }
        }
        Err(MemoryError::AddressNotMapped { addr })
    }

    /// Name of the region that owns `addr`, before any remapping.
    pub fn section_name(&self, addr: Address) -> Option<&str> {
        self.index_of(addr).map(|idx| self.regions[idx].name())
    }
}

impl Memory for Mmu {
    fn read(&self, addr: Address) -> Result<u8, MemoryError> {
        let (idx, at) = self.resolve(addr)?;
        let Region::Backed(section) = &self.regions[idx] else {
            return Err(MemoryError::AddressNotMapped { addr });
        };
        if !section.access_at(at).readable() {
            return Err(MemoryError::AccessViolation {
                addr,
                section: section.name().to_string(),
                access: Access::Read,
            });
        }
        Ok(section.read(at))
    }

    fn write(&mut self, addr: Address, value: u8) -> Result<(), MemoryError> {
        let (idx, at) = self.resolve(addr)?;
        let Region::Backed(section) = &mut self.regions[idx] else {
            return Err(MemoryError::AddressNotMapped { addr });
        };
        if !section.access_at(at).writable() {
            return Err(MemoryError::AccessViolation {
                addr,
                section: section.name().to_string(),
                access: Access::Write,
            });
        }
        section.write(at, value);
        Ok(())
    }
}
