use nvtree_types::{ItemKind, TypeError};

use crate::node::NodeId;

/// Errors from tree operations.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    /// The mutation would push the image past the session's byte budget.
    #[error("out of budget: need {needed} bytes, {available} available")]
    OutOfBudget { needed: u32, available: u32 },

    /// No item matched the lookup path.
    #[error("item not found: {0}")]
    NotFound(String),

    /// The handle refers to an item that has since been deleted.
    #[error("stale item handle {0}")]
    StaleNode(NodeId),

    /// Children can only be added under a group.
    #[error("{0:?} is not a group")]
    NotAGroup(String),

    /// The root cannot be deleted, filled or written.
    #[error("the root item cannot be modified this way")]
    RootImmutable,

    /// The operation does not apply to an item of this kind.
    #[error("{name:?} is a {kind}, operation not applicable")]
    KindMismatch { name: String, kind: ItemKind },

    /// Value size does not match the item's fixed width.
    #[error("{name:?} holds {expected} bytes, got {actual}")]
    SizeMismatch {
        name: String,
        expected: u32,
        actual: usize,
    },

    /// Memory for a new item could not be reserved.
    #[error("allocation failure")]
    AllocationFailure,

    #[error(transparent)]
    Type(#[from] TypeError),
}

/// Result alias for tree operations.
pub type TreeResult<T> = Result<T, TreeError>;
