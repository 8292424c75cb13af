use nvtree_types::BackendKind;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::traits::{Backend, Geometry, IoStats};
use crate::ERASED;

/// In-memory NOR cell array.
///
/// Programming can only clear bits, erases work on whole aligned sectors
/// and every sector keeps an erase counter. Tests can inject corruption
/// and program failures.
#[derive(Debug)]
pub struct FlashArray {
    cells: Vec<u8>,
    page_size: u32,
    erase_size: u32,
    erase_counts: Vec<u32>,
    stats: IoStats,
    failing_writes: u32,
}

impl FlashArray {
    /// Create an erased array. `capacity` must be a multiple of `erase_size`.
    pub fn new(capacity: u32, page_size: u32, erase_size: u32) -> Self {
        let sectors = capacity.div_ceil(erase_size) as usize;
        Self {
            cells: vec![ERASED; capacity as usize],
            page_size,
            erase_size,
            erase_counts: vec![0; sectors],
            stats: IoStats::default(),
            failing_writes: 0,
        }
    }

    pub fn geometry(&self) -> Geometry {
        Geometry {
            capacity: self.cells.len() as u32,
            page_size: self.page_size,
            erase_size: self.erase_size,
        }
    }

    pub fn stats(&self) -> IoStats {
        self.stats
    }

    fn range(&self, offset: u32, len: usize) -> StoreResult<std::ops::Range<usize>> {
        let start = offset as usize;
        let end = start.checked_add(len).filter(|&end| end <= self.cells.len());
        end.map(|end| start..end).ok_or(StoreError::OutOfRange {
            offset,
            len,
            capacity: self.cells.len() as u32,
        })
    }

    pub fn read(&mut self, offset: u32, buf: &mut [u8]) -> StoreResult<()> {
        let range = self.range(offset, buf.len())?;
        buf.copy_from_slice(&self.cells[range]);
        self.stats.reads += 1;
        Ok(())
    }

    pub fn program(&mut self, offset: u32, data: &[u8]) -> StoreResult<()> {
        let range = self.range(offset, data.len())?;
        if self.failing_writes > 0 {
            self.failing_writes -= 1;
            return Err(StoreError::ProgramFailure { offset });
        }
        let target = &mut self.cells[range];
        if let Some(i) = target.iter().zip(data).position(|(old, new)| old & new != *new) {
            return Err(StoreError::NotErased {
                offset: offset + i as u32,
            });
        }
        for (old, new) in target.iter_mut().zip(data) {
            *old &= new;
        }
        self.stats.writes += 1;
        Ok(())
    }

    pub fn erase(&mut self, offset: u32, len: u32) -> StoreResult<()> {
        if offset % self.erase_size != 0 || len % self.erase_size != 0 {
            return Err(StoreError::Misaligned {
                offset,
                len,
                align: self.erase_size,
            });
        }
        let range = self.range(offset, len as usize)?;
        self.cells[range].fill(ERASED);
        let first = (offset / self.erase_size) as usize;
        let count = (len / self.erase_size) as usize;
        for counter in &mut self.erase_counts[first..first + count] {
            *counter += 1;
        }
        self.stats.erases += 1;
        debug!(offset, len, "sectors erased");
        Ok(())
    }

    /// Times the sector containing `offset` has been erased.
    pub fn erase_count(&self, offset: u32) -> u32 {
        self.erase_counts
            .get((offset / self.erase_size) as usize)
            .copied()
            .unwrap_or(0)
    }

    /// Raw view of the cells, bypassing the bus.
    pub fn contents(&self, offset: u32, len: usize) -> &[u8] {
        let start = (offset as usize).min(self.cells.len());
        let end = start.saturating_add(len).min(self.cells.len());
        &self.cells[start..end]
    }

    /// Flip bits in place, as a worn or disturbed cell would.
    pub fn corrupt(&mut self, offset: u32, mask: u8) {
        if let Some(cell) = self.cells.get_mut(offset as usize) {
            *cell ^= mask;
        }
    }

    /// Make the next `count` program operations fail.
    pub fn fail_next_writes(&mut self, count: u32) {
        self.failing_writes = count;
    }
}

/// Memory-mapped parallel NOR flash.
#[derive(Debug)]
pub struct NorFlash {
    array: FlashArray,
}

impl NorFlash {
    pub const SECTOR_SIZE: u32 = 4096;

    pub fn new(capacity: u32) -> Self {
        Self {
            array: FlashArray::new(capacity, Self::SECTOR_SIZE, Self::SECTOR_SIZE),
        }
    }

    pub fn array(&self) -> &FlashArray {
        &self.array
    }

    pub fn array_mut(&mut self) -> &mut FlashArray {
        &mut self.array
    }
}

impl Backend for NorFlash {
    fn kind(&self) -> BackendKind {
        BackendKind::Nor
    }

    fn geometry(&self) -> Geometry {
        self.array.geometry()
    }

    fn read(&mut self, offset: u32, buf: &mut [u8]) -> StoreResult<()> {
        self.array.read(offset, buf)
    }

    fn write(&mut self, offset: u32, data: &[u8]) -> StoreResult<()> {
        self.array.program(offset, data)
    }

    fn erase(&mut self, offset: u32, len: u32) -> StoreResult<()> {
        self.array.erase(offset, len)
    }

    fn stats(&self) -> IoStats {
        self.array.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_erased() {
        let mut nor = NorFlash::new(8192);
        let mut buf = [0u8; 16];
        nor.read(4000, &mut buf).unwrap();
        assert_eq!(buf, [ERASED; 16]);
    }

    #[test]
    fn program_needs_erase() {
        let mut nor = NorFlash::new(8192);
        nor.write(0, &[0x0F, 0xF0]).unwrap();
        // Clearing more bits is fine, setting them is not.
        nor.write(0, &[0x0E, 0xF0]).unwrap();
        assert!(matches!(
            nor.write(0, &[0xFF, 0xF0]),
            Err(StoreError::NotErased { offset: 0 })
        ));
        nor.erase(0, 4096).unwrap();
        nor.write(0, &[0xFF, 0x00]).unwrap();
        assert_eq!(nor.array().contents(0, 2), &[0xFF, 0x00]);
        assert_eq!(nor.array().erase_count(100), 1);
        assert_eq!(nor.array().erase_count(5000), 0);
    }

    #[test]
    fn erase_alignment_and_range() {
        let mut nor = NorFlash::new(8192);
        assert!(matches!(nor.erase(100, 4096), Err(StoreError::Misaligned { .. })));
        assert!(matches!(nor.erase(4096, 8192), Err(StoreError::OutOfRange { .. })));
        let mut buf = [0u8; 4];
        assert!(matches!(nor.read(8190, &mut buf), Err(StoreError::OutOfRange { .. })));
    }

    #[test]
    fn injected_failures() {
        let mut nor = NorFlash::new(4096);
        nor.array_mut().fail_next_writes(1);
        assert!(matches!(nor.write(0, &[1]), Err(StoreError::ProgramFailure { .. })));
        nor.write(0, &[1]).unwrap();
        nor.array_mut().corrupt(0, 0x80);
        assert_eq!(nor.array().contents(0, 1), &[0x81]);
        assert_eq!(nor.stats().writes, 1);
    }
}
