use std::time::Duration;

use nvtree_types::BackendKind;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::flash::FlashArray;
use crate::traits::{Backend, BusMode, FlashProbe, Geometry, IoStats};

/// Construction parameters of a [`SerialFlash`].
#[derive(Clone, Debug)]
pub struct SerialFlashOptions {
    pub capacity: u32,
    pub erase_size: u32,
    /// The part answers its identification command.
    pub known: bool,
    pub quad_program: bool,
    pub max_clock_hz: u32,
    /// Power-up attempts that report "not ready" before the part responds.
    pub slow_power_ups: u32,
    /// Delay the part needs after a wake-up command.
    pub wake_delay: Duration,
}

impl Default for SerialFlashOptions {
    fn default() -> Self {
        Self {
            capacity: 1024 * 1024,
            erase_size: 4096,
            known: true,
            quad_program: false,
            max_clock_hz: 50_000_000,
            slow_power_ups: 0,
            wake_delay: Duration::from_micros(30),
        }
    }
}

/// Serial (SPI) NOR flash behind a bus controller.
///
/// Models what the session has to get right: the part must be powered up
/// (possibly over several attempts), erase and status commands need the
/// single-line bus mode, programming needs single or (on capable parts)
/// quad mode, the part powers up write-protected, and an idle part must be
/// woken before use.
#[derive(Debug)]
pub struct SerialFlash {
    array: FlashArray,
    options: SerialFlashOptions,
    mode: BusMode,
    write_protected: bool,
    ready: bool,
    asleep: bool,
    slow_left: u32,
    power_attempts: u32,
    resets: u32,
}

impl SerialFlash {
    pub fn new(options: SerialFlashOptions) -> Self {
        Self {
            array: FlashArray::new(options.capacity, 256, options.erase_size),
            slow_left: options.slow_power_ups,
            options,
            mode: BusMode::Single,
            write_protected: true,
            ready: false,
            asleep: false,
            power_attempts: 0,
            resets: 0,
        }
    }

    pub fn mode(&self) -> BusMode {
        self.mode
    }

    pub fn is_write_protected(&self) -> bool {
        self.write_protected
    }

    pub fn power_attempts(&self) -> u32 {
        self.power_attempts
    }

    pub fn resets(&self) -> u32 {
        self.resets
    }

    /// Put the part into deep power-down, as an idle timer would.
    pub fn sleep(&mut self) {
        self.asleep = true;
    }

    pub fn array(&self) -> &FlashArray {
        &self.array
    }

    pub fn array_mut(&mut self) -> &mut FlashArray {
        &mut self.array
    }

    fn check_awake(&self) -> StoreResult<()> {
        if !self.ready || self.asleep {
            return Err(StoreError::NotReady);
        }
        Ok(())
    }

    fn check_writable(&self, op: &'static str, allowed: bool) -> StoreResult<()> {
        self.check_awake()?;
        if self.write_protected {
            return Err(StoreError::WriteProtected);
        }
        if !allowed {
            return Err(StoreError::WrongBusMode {
                mode: self.mode,
                op,
            });
        }
        Ok(())
    }
}

impl Backend for SerialFlash {
    fn kind(&self) -> BackendKind {
        BackendKind::SerialFlash
    }

    fn geometry(&self) -> Geometry {
        self.array.geometry()
    }

    fn read(&mut self, offset: u32, buf: &mut [u8]) -> StoreResult<()> {
        self.check_awake()?;
        self.array.read(offset, buf)
    }

    fn write(&mut self, offset: u32, data: &[u8]) -> StoreResult<()> {
        let allowed = match self.mode {
            BusMode::Single => true,
            BusMode::Quad => self.options.quad_program,
            BusMode::Dual => false,
        };
        self.check_writable("program", allowed)?;
        self.array.program(offset, data)
    }

    fn erase(&mut self, offset: u32, len: u32) -> StoreResult<()> {
        self.check_writable("erase", self.mode == BusMode::Single)?;
        self.array.erase(offset, len)
    }

    fn stats(&self) -> IoStats {
        self.array.stats()
    }

    fn power_up(&mut self) -> StoreResult<bool> {
        self.power_attempts += 1;
        if self.slow_left > 0 {
            self.slow_left -= 1;
            return Ok(false);
        }
        self.ready = true;
        self.asleep = false;
        Ok(true)
    }

    fn reset(&mut self) -> StoreResult<()> {
        self.resets += 1;
        self.mode = BusMode::Single;
        self.write_protected = true;
        Ok(())
    }

    fn probe(&mut self) -> StoreResult<FlashProbe> {
        self.check_awake()?;
        Ok(FlashProbe {
            known: self.options.known,
            quad_program: self.options.known && self.options.quad_program,
            max_clock_hz: self.options.max_clock_hz,
        })
    }

    fn set_bus_mode(&mut self, mode: BusMode) -> StoreResult<()> {
        self.check_awake()?;
        debug!(from = ?self.mode, to = ?mode, "bus mode switch");
        self.mode = mode;
        Ok(())
    }

    fn set_write_protect(&mut self, protect: bool) -> StoreResult<()> {
        self.check_awake()?;
        if self.mode != BusMode::Single {
            return Err(StoreError::WrongBusMode {
                mode: self.mode,
                op: "status write",
            });
        }
        self.write_protected = protect;
        Ok(())
    }

    fn wake_up(&mut self) -> Option<Duration> {
        if !self.asleep {
            return None;
        }
        self.asleep = false;
        Some(self.options.wake_delay)
    }
}
