//! Binary image format for the nvtree storage engine.
//!
//! A persisted image is a 16-byte [`TableHeader`] followed by the payload:
//! the tree flattened depth-first, one entry per item.
//!
//! ```text
//! entry   := name NUL [hash:u32be] length:u32be payload
//! payload := leaf bytes (length of them) | child entries (length bytes total)
//! ```
//!
//! The header carries the magic, the payload length and format version,
//! a tagged checksum word and the encryption envelope word. See
//! [`header`] for the exact bit layout.
//!
//! # Engines
//!
//! - [`pack`] / [`unpack`] -- full conversion between [`Tree`] and bytes
//! - [`lite`] -- lookup and in-place update directly on the payload bytes,
//!   without building a tree
//!
//! [`Tree`]: nvtree_tree::Tree

pub mod checksum;
pub mod error;
pub mod header;
pub mod lite;
pub mod pack;
mod wire;

pub use checksum::{crc16, xor8, ChecksumWord};
pub use error::{CodecError, CodecResult};
pub use header::{Envelope, TableHeader, MAGIC, TABLE_HEADER_SIZE};
pub use lite::{lite_find, lite_update, LiteEntry};
pub use pack::{pack, pack_into, unpack};
