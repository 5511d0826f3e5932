//! Best-fit space allocator over ROM or RAM banks, for laying out data in a
//! ROM being authored.

use std::ops::Range;

use crate::cartridge::{RAM_BANK_SIZE, ROM_BANK_SIZE};
use crate::error::AllocError;
use crate::mmu::Address;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Space {
    /// 16 KiB banks; bank 0 sits at `$0000`, the rest at `$4000`.
    Rom,
    /// 8 KiB banks at `$A000`.
    Ram,
}

impl Space {
    pub fn bank_size(self) -> usize {
        match self {
            Space::Rom => ROM_BANK_SIZE,
            Space::Ram => RAM_BANK_SIZE,
        }
    }

    /// CPU address of the first byte of `bank`.
    pub fn window(self, bank: usize) -> Address {
        match (self, bank) {
            (Space::Rom, 0) => 0x0000,
            (Space::Rom, _) => 0x4000,
            (Space::Ram, _) => 0xA000,
        }
    }
}

/// A block handed out by [`BankAllocator`]. `addr` is where the CPU sees
/// it with `bank` selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Allocation {
    pub bank: usize,
    pub addr: Address,
    pub size: usize,
}

#[derive(Debug, Clone)]
pub struct BankAllocator {
    space: Space,
    /// Free ranges per bank as bank-relative offsets, sorted and disjoint.
    free: Vec<Vec<Range<usize>>>,
}

impl BankAllocator {
    pub fn new(space: Space, banks: usize) -> Self {
        let size = space.bank_size();
        Self {
            space,
            free: (0..banks).map(|_| vec![0..size]).collect(),
        }
    }

    pub fn rom(banks: usize) -> Self {
        Self::new(Space::Rom, banks)
    }

    pub fn ram(banks: usize) -> Self {
        Self::new(Space::Ram, banks)
    }

    pub fn space(&self) -> Space {
        self.space
    }

    pub fn banks(&self) -> usize {
        self.free.len()
    }

    /// Free bytes left in `bank`.
    pub fn available(&self, bank: usize) -> usize {
        self.free
            .get(bank)
            .map_or(0, |ranges| ranges.iter().map(|r| r.len()).sum())
    }

    /// Allocate `size` bytes from the smallest free range that fits, in
    /// `bank` or anywhere. Ties go to the lowest bank, then the lowest
    /// address.
    pub fn allocate(&mut self, size: usize, bank: Option<usize>) -> Result<Allocation, AllocError> {
        if let Some(b) = bank
            && b >= self.free.len()
        {
            return Err(AllocError::InvalidBank { bank: b });
        }
        if size == 0 {
            return Err(AllocError::OutOfMemory { size });
        }

        let best = self
            .free
            .iter()
            .enumerate()
            .filter(|(b, _)| bank.is_none_or(|want| want == *b))
            .flat_map(|(b, ranges)| ranges.iter().enumerate().map(move |(i, r)| (b, i, r)))
            .filter(|(_, _, r)| r.len() >= size)
            .min_by_key(|(b, _, r)| (r.len(), *b, r.start))
            .map(|(b, i, _)| (b, i));

        let Some((b, i)) = best else {
            return Err(AllocError::OutOfMemory { size });
        };
        let range = &mut self.free[b][i];
        let offset = range.start;
        range.start += size;
        if range.is_empty() {
            self.free[b].remove(i);
        }
        Ok(self.allocation(b, offset, size))
    }

    /// Claim a fixed range, such as the cartridge header.
    pub fn reserve(
        &mut self,
        bank: usize,
        offset: usize,
        size: usize,
    ) -> Result<Allocation, AllocError> {
        let ranges = self
            .free
            .get_mut(bank)
            .ok_or(AllocError::InvalidBank { bank })?;
        let end = offset + size;
        let i = ranges
            .iter()
            .position(|r| r.start <= offset && end <= r.end)
            .ok_or(AllocError::OutOfMemory { size })?;

        let r = ranges.remove(i);
        if end < r.end {
            ranges.insert(i, end..r.end);
        }
        if r.start < offset {
            ranges.insert(i, r.start..offset);
        }
        Ok(self.allocation(bank, offset, size))
    }

    /// Return a block, merging it with free neighbours.
    pub fn free(&mut self, alloc: Allocation) -> Result<(), AllocError> {
        let not_allocated = AllocError::NotAllocated {
            bank: alloc.bank,
            addr: alloc.addr,
            size: alloc.size,
        };
        let window = usize::from(self.space.window(alloc.bank));
        let bank_size = self.space.bank_size();
        let ranges = self
            .free
            .get_mut(alloc.bank)
            .ok_or(AllocError::InvalidBank { bank: alloc.bank })?;

        let start = usize::from(alloc.addr)
            .checked_sub(window)
            .ok_or(not_allocated.clone())?;
        let end = start + alloc.size;
        if alloc.size == 0 || end > bank_size {
            return Err(not_allocated);
        }

        let i = ranges.partition_point(|r| r.start < start);
        let overlaps_prev = i > 0 && ranges[i - 1].end > start;
        let overlaps_next = ranges.get(i).is_some_and(|r| r.start < end);
        if overlaps_prev || overlaps_next {
            return Err(not_allocated);
        }

        ranges.insert(i, start..end);
        if i + 1 < ranges.len() && ranges[i].end == ranges[i + 1].start {
            ranges[i].end = ranges[i + 1].end;
            ranges.remove(i + 1);
        }
        if i > 0 && ranges[i - 1].end == ranges[i].start {
            ranges[i - 1].end = ranges[i].end;
            ranges.remove(i);
        }
        Ok(())
    }

    fn allocation(&self, bank: usize, offset: usize, size: usize) -> Allocation {
        Allocation {
            bank,
            addr: self.space.window(bank) + offset as Address,
            size,
        }
    }
}
