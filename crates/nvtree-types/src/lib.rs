//! Foundation types for the nvtree storage engine.
//!
//! Everything above the byte layer shares these definitions: the tree
//! engine, the binary codec, the lite buffer engine and the session.
//!
//! # Core Types
//!
//! - [`ItemKind`] -- group / variable-length text / fixed-width value
//! - [`NameHash`] -- 32-bit tagged hash of an item name
//! - [`Value`] -- typed value read from or written to a leaf
//! - [`FormatVersion`] -- whether every serialized entry carries a hash word
//! - [`ChecksumScheme`], [`KeyClass`], [`BackendKind`] -- persistence options
//!
//! # Paths
//!
//! Items are addressed with dotted paths (`net.if0.mtu`). A token ending in
//! `*` (at least two characters long) matches any GROUP whose name starts
//! with the text before the `*`. See [`path::tokens`].

pub mod error;
pub mod format;
pub mod hash;
pub mod kind;
pub mod path;
pub mod value;

pub use error::{TypeError, TypeResult};
pub use format::{BackendKind, ChecksumScheme, FormatVersion, KeyClass};
pub use hash::NameHash;
pub use kind::{decode_length_word, ItemKind};
pub use path::{tokens, validate_name, PathToken};
pub use value::Value;

/// Low 24 bits of a length word: the length itself.
pub const LEN_MASK: u32 = 0x00FF_FFFF;
/// Bits 24..27 of a length word: the item kind.
pub const TYPE_MASK: u32 = 0x0F00_0000;
/// Kind bits of a fixed-width item.
pub const FIXED_MARK: u32 = 0x0000_0000;
/// Kind bits of a variable-length text item.
pub const TEXT_MARK: u32 = 0x0100_0000;
/// Kind bits of a group.
pub const GROUP_MARK: u32 = 0x0200_0000;
/// Tag bit that distinguishes a hash word from a length word.
pub const HASH_MARK: u32 = 0x8000_0000;
/// Largest usable length; `LEN_MASK` itself marks an erased/invalid word.
pub const MAX_LEN: u32 = LEN_MASK - 1;

/// Name buffer size including the terminating NUL.
pub const NAME_MAX: usize = 32;
/// Size of an entry's length word.
pub const LENGTH_WORD_SIZE: u32 = 4;
/// Size of an entry's optional hash word.
pub const HASH_WORD_SIZE: u32 = 4;
