use super::{Access, Address, Memory, Section};
use crate::error::MemoryError;

/// Plain byte array mapped at a fixed base. Also used standalone as a
/// scratch buffer for the assembler.
#[derive(Debug, Clone)]
pub struct RamSection {
    name: String,
    start: Address,
    data: Vec<u8>,
    access: Access,
}

impl RamSection {
    pub fn new(name: impl Into<String>, start: Address, length: u16) -> Self {
        Self::from_bytes(name, start, vec![0; usize::from(length)], Access::ReadWrite)
    }

    /// Wrap existing contents. Bytes past the end of the address space are
    /// dropped.
    pub fn from_bytes(
        name: impl Into<String>,
        start: Address,
        mut data: Vec<u8>,
        access: Access,
    ) -> Self {
        let room = 0x1_0000 - usize::from(start);
        data.truncate(room.min(usize::from(u16::MAX)));
        Self {
            name: name.into(),
            start,
            data,
            access,
        }
    }

    pub fn with_access(mut self, access: Access) -> Self {
        self.access = access;
        self
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    fn offset(&self, addr: Address) -> Option<usize> {
        let off = usize::from(addr.checked_sub(self.start)?);
        (off < self.data.len()).then_some(off)
    }
}

impl Section for RamSection {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&self) -> Address {
        self.start
    }

    fn length(&self) -> u16 {
        self.data.len() as u16
    }

    fn access(&self) -> Access {
        self.access
    }

    fn read(&self, addr: Address) -> u8 {
        self.offset(addr).map_or(0xFF, |off| self.data[off])
    }

    fn write(&mut self, addr: Address, value: u8) {
        if let Some(off) = self.offset(addr) {
            self.data[off] = value;
        }
    }
}

impl Memory for RamSection {
    fn read(&self, addr: Address) -> Result<u8, MemoryError> {
        let off = self
            .offset(addr)
            .ok_or(MemoryError::AddressNotMapped { addr })?;
        if !self.access.readable() {
            return Err(MemoryError::AccessViolation {
                addr,
                section: self.name.clone(),
                access: Access::Read,
            });
        }
        Ok(self.data[off])
    }

    fn write(&mut self, addr: Address, value: u8) -> Result<(), MemoryError> {
        let off = self
            .offset(addr)
            .ok_or(MemoryError::AddressNotMapped { addr })?;
        if !self.access.writable() {
            return Err(MemoryError::AccessViolation {
                addr,
                section: self.name.clone(),
                access: Access::Write,
            });
        }
        self.data[off] = value;
        Ok(())
    }
}
