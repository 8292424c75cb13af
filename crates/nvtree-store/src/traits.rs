use std::time::Duration;

use nvtree_types::BackendKind;

use crate::error::StoreResult;

/// Size parameters of a device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Geometry {
    pub capacity: u32,
    /// Largest write the device programs in one go.
    pub page_size: u32,
    /// Erase granularity; erases must be aligned to it.
    pub erase_size: u32,
}

/// Serial bus transfer mode, named by command-address-data line counts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BusMode {
    /// 1-1-1: works with every part; required for erase and status.
    Single,
    /// 1-1-2 fast read.
    Dual,
    /// 1-4-4 quad read and program.
    Quad,
}

/// What a probe learned about a device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlashProbe {
    /// The part was identified; fast modes are safe to use.
    pub known: bool,
    /// The part supports quad page program.
    pub quad_program: bool,
    pub max_clock_hz: u32,
}

impl FlashProbe {
    /// Probe result for devices without a serial bus.
    pub fn memory_mapped() -> Self {
        Self {
            known: true,
            quad_program: false,
            max_clock_hz: 0,
        }
    }

    /// Read mode to use after this probe.
    pub fn read_mode(&self) -> BusMode {
        if self.known {
            BusMode::Quad
        } else {
            BusMode::Dual
        }
    }

    /// Program mode to use after this probe.
    pub fn write_mode(&self) -> BusMode {
        if self.known && self.quad_program {
            BusMode::Quad
        } else {
            BusMode::Single
        }
    }
}

/// Operation counters, for diagnostics and tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IoStats {
    pub reads: u64,
    pub writes: u64,
    pub erases: u64,
}

/// A byte-addressed storage device.
///
/// The lifecycle hooks at the bottom matter only for devices behind a
/// serial bus; memory-mapped devices keep the defaults.
pub trait Backend: Send {
    fn kind(&self) -> BackendKind;

    fn geometry(&self) -> Geometry;

    /// Fill `buf` from `offset`.
    fn read(&mut self, offset: u32, buf: &mut [u8]) -> StoreResult<()>;

    /// Program `data` at `offset`. Flash devices require the range to be
    /// erased first.
    fn write(&mut self, offset: u32, data: &[u8]) -> StoreResult<()>;

    /// Return `len` bytes at `offset` to the erased state.
    fn erase(&mut self, offset: u32, len: u32) -> StoreResult<()>;

    fn stats(&self) -> IoStats {
        IoStats::default()
    }

    // ---------------------------------------------------------------
    // Serial bus lifecycle
    // ---------------------------------------------------------------

    /// One power-up attempt. `Ok(false)` means "not ready yet, retry".
    fn power_up(&mut self) -> StoreResult<bool> {
        Ok(true)
    }

    /// Reset the device and its bus controller after a failed power-up.
    fn reset(&mut self) -> StoreResult<()> {
        Ok(())
    }

    /// Identify the part and its capabilities.
    fn probe(&mut self) -> StoreResult<FlashProbe> {
        Ok(FlashProbe::memory_mapped())
    }

    fn set_bus_mode(&mut self, _mode: BusMode) -> StoreResult<()> {
        Ok(())
    }

    fn set_write_protect(&mut self, _protect: bool) -> StoreResult<()> {
        Ok(())
    }

    /// Bring an idle device back. Returns how long to wait before use.
    fn wake_up(&mut self) -> Option<Duration> {
        None
    }
}
