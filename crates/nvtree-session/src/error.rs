use nvtree_codec::CodecError;
use nvtree_crypto::CipherError;
use nvtree_store::StoreError;
use nvtree_tree::TreeError;

use crate::session::SessionState;

/// Errors from session commands.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The command is not valid in the session's current state.
    #[error("{op} not allowed in state {state:?}")]
    InvalidState {
        op: &'static str,
        state: SessionState,
    },

    #[error("item not found: {0}")]
    NotFound(String),

    /// The pool buffer could not be allocated.
    #[error("could not allocate a pool of {0} bytes")]
    AllocationFailure(usize),

    /// The pool size can only change before the pool is allocated.
    #[error("pool already allocated")]
    PoolLocked,

    /// Re-sealing a legacy image failed; nothing was loaded.
    #[error("legacy image migration failed: {0}")]
    Migration(Box<SessionError>),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Cipher(#[from] CipherError),
}

/// Result alias for session commands.
pub type SessionResult<T> = Result<T, SessionError>;
