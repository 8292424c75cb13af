use nvtree_tree::TreeError;
use nvtree_types::ItemKind;

/// Errors from encoding or decoding images.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The header does not start with the image magic: nothing persisted.
    #[error("bad magic {found:#010x}")]
    BadMagic { found: u32 },

    #[error("unknown format version {0}")]
    UnknownFormat(u32),

    /// Non-zero checksum word with a tag no scheme uses.
    #[error("unknown checksum tag in {0:#010x}")]
    UnknownChecksumTag(u32),

    /// The image was written before checksums existed.
    #[error("image carries no checksum")]
    Unsealed,

    #[error("checksum mismatch: stored {stored:#06x}, computed {computed:#06x}")]
    BadChecksum { stored: u16, computed: u16 },

    #[error("unknown key class code {0}")]
    UnknownKeyClass(u32),

    /// Payload longer than the pool can hold.
    #[error("payload of {len} bytes exceeds limit of {limit}")]
    TooLarge { len: u32, limit: u32 },

    /// Entry stream is internally inconsistent.
    #[error("malformed stream at offset {offset}: {reason}")]
    Malformed { offset: usize, reason: String },

    #[error("buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    /// The entry's kind does not accept this operation.
    #[error("entry is a {kind}, operation not applicable")]
    KindMismatch { kind: ItemKind },

    /// In-place update must keep the entry's exact length.
    #[error("entry holds {expected} bytes, got {actual}")]
    LengthMismatch { expected: u32, actual: usize },

    #[error(transparent)]
    Tree(#[from] TreeError),
}

impl CodecError {
    pub(crate) fn malformed(offset: usize, reason: impl Into<String>) -> Self {
        Self::Malformed {
            offset,
            reason: reason.into(),
        }
    }
}

/// Result alias for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;
