use nvtree_types::BackendKind;

use crate::error::{StoreError, StoreResult};
use crate::traits::{Backend, Geometry, IoStats};
use crate::ERASED;

/// RAM mirror of an image. Writes overwrite, erases just fill with `0xFF`.
#[derive(Debug)]
pub struct RamMirror {
    mem: Vec<u8>,
    stats: IoStats,
}

impl RamMirror {
    pub fn new(capacity: u32) -> Self {
        Self {
            mem: vec![ERASED; capacity as usize],
            stats: IoStats::default(),
        }
    }

    pub fn contents(&self) -> &[u8] {
        &self.mem
    }

    fn range(&self, offset: u32, len: usize) -> StoreResult<std::ops::Range<usize>> {
        let start = offset as usize;
        match start.checked_add(len) {
            Some(end) if end <= self.mem.len() => Ok(start..end),
            _ => Err(StoreError::OutOfRange {
                offset,
                len,
                capacity: self.mem.len() as u32,
            }),
        }
    }
}

impl Backend for RamMirror {
    fn kind(&self) -> BackendKind {
        BackendKind::Ram
    }

    fn geometry(&self) -> Geometry {
        Geometry {
            capacity: self.mem.len() as u32,
            page_size: 4096,
            erase_size: 1,
        }
    }

    fn read(&mut self, offset: u32, buf: &mut [u8]) -> StoreResult<()> {
        let range = self.range(offset, buf.len())?;
        buf.copy_from_slice(&self.mem[range]);
        self.stats.reads += 1;
        Ok(())
    }

    fn write(&mut self, offset: u32, data: &[u8]) -> StoreResult<()> {
        let range = self.range(offset, data.len())?;
        self.mem[range].copy_from_slice(data);
        self.stats.writes += 1;
        Ok(())
    }

    fn erase(&mut self, offset: u32, len: u32) -> StoreResult<()> {
        let range = self.range(offset, len as usize)?;
        self.mem[range].fill(ERASED);
        self.stats.erases += 1;
        Ok(())
    }

    fn stats(&self) -> IoStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overwrite_without_erase() {
        let mut ram = RamMirror::new(64);
        ram.write(8, b"abc").unwrap();
        ram.write(8, b"xyz").unwrap();
        let mut buf = [0u8; 3];
        ram.read(8, &mut buf).unwrap();
        assert_eq!(&buf, b"xyz");
        ram.erase(8, 2).unwrap();
        assert_eq!(&ram.contents()[8..11], &[ERASED, ERASED, b'z']);
        assert_eq!(ram.stats(), IoStats { reads: 1, writes: 2, erases: 1 });
    }

    #[test]
    fn bounds() {
        let mut ram = RamMirror::new(16);
        assert!(ram.write(15, b"ab").is_err());
        assert!(ram.erase(u32::MAX, 2).is_err());
    }
}
