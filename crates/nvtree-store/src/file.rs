use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use nvtree_types::BackendKind;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::traits::{Backend, Geometry, IoStats};
use crate::ERASED;

/// Device image kept in a host file.
///
/// Stands in for any backend kind, so the command-line tool can edit a
/// dumped flash image offline. A new file is created erased at the given
/// capacity; an existing one keeps its size.
#[derive(Debug)]
pub struct FileFlash {
    file: File,
    path: PathBuf,
    kind: BackendKind,
    capacity: u32,
    stats: IoStats,
}

impl FileFlash {
    /// Open (or create) an image file.
    pub fn open(path: &Path, kind: BackendKind, capacity: u32) -> StoreResult<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let existing = file.metadata()?.len();
        let capacity = if existing == 0 {
            file.write_all(&vec![ERASED; capacity as usize])?;
            file.sync_data()?;
            debug!(path = %path.display(), capacity, "created erased image file");
            capacity
        } else {
            u32::try_from(existing).unwrap_or(u32::MAX)
        };
        Ok(Self {
            file,
            path: path.to_path_buf(),
            kind,
            capacity,
            stats: IoStats::default(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn check(&self, offset: u32, len: usize) -> StoreResult<()> {
        match (offset as usize).checked_add(len) {
            Some(end) if end <= self.capacity as usize => Ok(()),
            _ => Err(StoreError::OutOfRange {
                offset,
                len,
                capacity: self.capacity,
            }),
        }
    }
}

impl Backend for FileFlash {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn geometry(&self) -> Geometry {
        Geometry {
            capacity: self.capacity,
            page_size: 4096,
            erase_size: 1,
        }
    }

    fn read(&mut self, offset: u32, buf: &mut [u8]) -> StoreResult<()> {
        self.check(offset, buf.len())?;
        self.file.seek(SeekFrom::Start(u64::from(offset)))?;
        self.file.read_exact(buf)?;
        self.stats.reads += 1;
        Ok(())
    }

    fn write(&mut self, offset: u32, data: &[u8]) -> StoreResult<()> {
        self.check(offset, data.len())?;
        self.file.seek(SeekFrom::Start(u64::from(offset)))?;
        self.file.write_all(data)?;
        self.file.sync_data()?;
        self.stats.writes += 1;
        Ok(())
    }

    fn erase(&mut self, offset: u32, len: u32) -> StoreResult<()> {
        self.check(offset, len as usize)?;
        self.file.seek(SeekFrom::Start(u64::from(offset)))?;
        self.file.write_all(&vec![ERASED; len as usize])?;
        self.file.sync_data()?;
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
    fn create_write_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nvram.img");
        {
            let mut f = FileFlash::open(&path, BackendKind::Nor, 8192).unwrap();
            assert_eq!(f.geometry().capacity, 8192);
            f.write(100, b"persisted").unwrap();
        }
        let mut f = FileFlash::open(&path, BackendKind::Nor, 1).unwrap();
        assert_eq!(f.geometry().capacity, 8192);
        let mut buf = [0u8; 9];
        f.read(100, &mut buf).unwrap();
        assert_eq!(&buf, b"persisted");

        f.erase(100, 4).unwrap();
        f.read(100, &mut buf).unwrap();
        assert_eq!(&buf[..5], &[ERASED, ERASED, ERASED, ERASED, b'i']);
    }

    #[test]
    fn out_of_range() {
        let dir = tempfile::tempdir().unwrap();
        let mut f = FileFlash::open(&dir.path().join("x.img"), BackendKind::Ram, 16).unwrap();
        let mut buf = [0u8; 4];
        assert!(matches!(f.read(14, &mut buf), Err(StoreError::OutOfRange { .. })));
    }
}
