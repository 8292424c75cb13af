use nvtree_types::BackendKind;

use crate::traits::BusMode;

/// Errors from storage backends.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("range {offset:#x}+{len:#x} outside device of {capacity:#x} bytes")]
    OutOfRange { offset: u32, len: usize, capacity: u32 },

    #[error("range {offset:#x}+{len:#x} not aligned to {align:#x}")]
    Misaligned { offset: u32, len: u32, align: u32 },

    /// NOR programming can only clear bits; the target was not erased.
    #[error("byte at {offset:#x} not erased before programming")]
    NotErased { offset: u32 },

    #[error("device is write protected")]
    WriteProtected,

    #[error("{op} not possible in bus mode {mode:?}")]
    WrongBusMode { mode: BusMode, op: &'static str },

    /// Serial device has not completed power-up.
    #[error("device not ready")]
    NotReady,

    /// A simulated program failure (power loss, worn cell).
    #[error("program failure at {offset:#x}")]
    ProgramFailure { offset: u32 },

    #[error("no {kind} device unit {unit}")]
    NoDevice { kind: BackendKind, unit: u32 },

    #[error("{kind} unit {unit} did not come up after {attempts} attempts")]
    Unavailable {
        kind: BackendKind,
        unit: u32,
        attempts: u32,
    },

    #[error("device lock poisoned")]
    Poisoned,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for backend operations.
pub type StoreResult<T> = Result<T, StoreError>;
