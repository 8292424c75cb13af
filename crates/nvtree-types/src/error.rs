/// Errors from decoding or validating foundation types.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TypeError {
    /// Item names must be 1..=31 bytes without `.` or NUL.
    #[error("invalid item name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },

    /// A length outside the encodable range (or the erased marker).
    #[error("invalid length {0:#x}")]
    InvalidLength(u32),

    /// The kind bits of a length word name no known kind.
    #[error("unknown item kind bits {0:#x}")]
    UnknownKind(u32),

    /// A hash word appeared where a length word was expected.
    #[error("unexpected hash word {0:#010x}")]
    UnexpectedHashWord(u32),

    /// Unknown asset key class.
    #[error("unknown key class {0:?}")]
    UnknownKeyClass(String),

    /// Unknown backend name.
    #[error("unknown backend {0:?}")]
    UnknownBackend(String),

    /// A textual value could not be parsed for the requested kind.
    #[error("invalid value {input:?}: {reason}")]
    InvalidValue { input: String, reason: String },
}

/// Result alias for foundation-type operations.
pub type TypeResult<T> = Result<T, TypeError>;
