/// Errors from wrapping or unwrapping an asset.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CipherError {
    /// The package is shorter than its fixed framing.
    #[error("asset package of {len} bytes is too short")]
    PackageTooShort { len: usize },

    /// Tag mismatch: wrong key, wrong asset id or tampered bytes.
    #[error("asset authentication failed")]
    Authentication,

    #[error("invalid device secret: {0}")]
    InvalidSecret(String),
}

/// Result alias for cipher operations.
pub type CipherResult<T> = Result<T, CipherError>;
