//! In-memory item tree for the nvtree storage engine.
//!
//! [`Tree`] owns an arena of [`TreeItem`]s addressed by generation-checked
//! [`NodeId`] handles. Every group caches the serialized size of its
//! subtree, so the root always knows the exact length of the packed image
//! and every mutation can be checked against the session's byte budget
//! before anything is linked.
//!
//! # Invariants
//!
//! - A group's aggregate equals the sum of its children's serialized sizes,
//!   for every group including the root, after every public operation.
//! - Siblings keep insertion order; lookup scans them front to back.
//! - A handle to a deleted item is rejected, never silently reused.

pub mod error;
pub mod node;
pub mod render;
pub mod tree;

pub use error::{TreeError, TreeResult};
pub use node::{NodeId, TreeItem};
pub use render::Walk;
pub use tree::Tree;
