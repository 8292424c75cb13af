//! Storage backends for the nvtree storage engine.
//!
//! A backend is a flat, byte-addressed region that can be read, written
//! and erased. The session decides where in the region an image lives
//! (the per-kind base offset) and in what chunk sizes it is committed.
//!
//! # Backends
//!
//! All backends implement the [`Backend`] trait:
//!
//! - [`RamMirror`] -- plain memory, writes overwrite
//! - [`NorFlash`] -- erase-before-write semantics, sector-aligned erases
//! - [`SerialFlash`] -- NOR array behind a bus with power-up, bus modes and
//!   write protection
//! - [`FileFlash`] -- an image file on the host filesystem
//!
//! # Sharing
//!
//! A device is a process-wide resource. [`DeviceSet`] hands out one
//! [`SharedBackend`] per `(kind, unit)`, creating it on first use; callers
//! hold the lock for the whole of a multi-step erase/program sequence.
//!
//! # Design Rules
//!
//! 1. Out-of-range and misaligned requests are errors, never clamped.
//! 2. Erased flash reads as `0xFF`.
//! 3. All I/O errors are propagated, never silently ignored.

pub mod devices;
pub mod error;
pub mod file;
pub mod flash;
pub mod ram;
pub mod serial;
pub mod traits;

pub use devices::{lock, BackendFactory, DeviceSet, SharedBackend};
pub use error::{StoreError, StoreResult};
pub use file::FileFlash;
pub use flash::{FlashArray, NorFlash};
pub use ram::RamMirror;
pub use serial::{SerialFlash, SerialFlashOptions};
pub use traits::{Backend, BusMode, FlashProbe, Geometry, IoStats};

/// Value of an erased byte.
pub const ERASED: u8 = 0xFF;
