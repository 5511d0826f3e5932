use super::{Access, Address, Section};
use crate::error::MapError;

/// Two adjacent sections presented as one contiguous region, e.g. the fixed
/// and switchable halves of work RAM.
pub struct CombiSection<A, B> {
    name: String,
    low: A,
    high: B,
}

impl<A: Section, B: Section> CombiSection<A, B> {
    pub fn new(name: impl Into<String>, low: A, high: B) -> Result<Self, MapError> {
        if low.end() != u32::from(high.start()) || low.end() + u32::from(high.length()) > 0x1_0000
        {
            return Err(MapError::NotAdjacent {
                first: low.name().to_string(),
                second: high.name().to_string(),
            });
        }
        let name = name.into();
        let len = u32::from(low.length()) + u32::from(high.length());
        if len > u32::from(u16::MAX) {
            return Err(MapError::TooLong { name, len });
        }
        Ok(Self {
            name,
            low,
            high,
        })
    }

    pub fn low(&self) -> &A {
        &self.low
    }

    pub fn high(&self) -> &B {
        &self.high
    }
}

impl<A: Section, B: Section> Section for CombiSection<A, B> {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&self) -> Address {
        self.low.start()
    }

    fn length(&self) -> u16 {
        self.low.length() + self.high.length()
    }

    /// The narrower of the two halves' permissions. Halves that allow
    /// disjoint accesses report `ReadWrite` here; [`access_at`] has the
    /// rule that is enforced.
    ///
    /// [`access_at`]: Section::access_at
    fn access(&self) -> Access {
        match (self.low.access(), self.high.access()) {
            (a, b) if a == b => a,
            (Access::ReadWrite, other) | (other, Access::ReadWrite) => other,
            _ => Access::ReadWrite,
        }
    }

    fn access_at(&self, addr: Address) -> Access {
        if self.low.accepts(addr) {
            self.low.access_at(addr)
        } else {
            self.high.access_at(addr)
        }
    }

    fn read(&self, addr: Address) -> u8 {
        if self.low.accepts(addr) {
            self.low.read(addr)
        } else {
            self.high.read(addr)
        }
    }

    fn write(&mut self, addr: Address, value: u8) {
        if self.low.accepts(addr) {
            self.low.write(addr, value);
        } else {
            self.high.write(addr, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MemoryError;
    use crate::mmu::{Memory, Mmu, RamSection};

    #[test]
    fn stitches_adjacent_halves() {
        let wram = CombiSection::new(
            "wram",
            RamSection::new("wram0", 0xC000, 0x1000),
            RamSection::new("wram1", 0xD000, 0x1000),
        )
        .unwrap();
        assert_eq!(wram.start(), 0xC000);
        assert_eq!(wram.length(), 0x2000);

        let mut mmu = Mmu::builder().section(wram).build_sparse().unwrap();
        mmu.write(0xCFFF, 1).unwrap();
        mmu.write(0xD000, 2).unwrap();
        assert_eq!(mmu.read(0xCFFF), Ok(1));
        assert_eq!(mmu.read(0xD000), Ok(2));
    }

    #[test]
    fn rejects_halves_with_a_hole() {
        let err = CombiSection::new(
            "wram",
            RamSection::new("wram0", 0xC000, 0x1000),
            RamSection::new("wram1", 0xD800, 0x800),
        )
        .err();
        assert_eq!(
            err,
            Some(MapError::NotAdjacent {
                first: "wram0".into(),
                second: "wram1".into(),
            })
        );
    }

    #[test]
    fn each_half_keeps_its_own_access_rule() {
        let rom = RamSection::from_bytes("ro", 0xC000, vec![0x11; 0x1000], Access::Read);
        let log = RamSection::new("wo", 0xD000, 0x1000).with_access(Access::Write);
        let mut mmu = Mmu::builder()
            .section(CombiSection::new("mixed", rom, log).unwrap())
            .build_sparse()
            .unwrap();

        assert_eq!(mmu.read(0xC000), Ok(0x11));
        assert_eq!(
            mmu.write(0xC000, 0),
            Err(MemoryError::AccessViolation {
                addr: 0xC000,
                section: "mixed".into(),
                access: Access::Write,
            })
        );
        assert!(mmu.write(0xD000, 5).is_ok());
        assert_eq!(
            mmu.read(0xD000),
            Err(MemoryError::AccessViolation {
                addr: 0xD000,
                section: "mixed".into(),
                access: Access::Read,
            })
        );
    }

    #[test]
    fn rejects_a_span_of_the_whole_space() {
        let err = CombiSection::new(
            "all",
            RamSection::new("low", 0x0000, 0x8000),
            RamSection::new("high", 0x8000, 0x8000),
        )
        .err();
        assert_eq!(
            err,
            Some(MapError::TooLong {
                name: "all".into(),
                len: 0x1_0000,
            })
        );
    }
}
