use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{TypeError, TypeResult};
use crate::{FIXED_MARK, GROUP_MARK, HASH_MARK, LEN_MASK, MAX_LEN, TEXT_MARK, TYPE_MASK};

/// What an item holds.
///
/// Only leaves carry a payload length. A group's serialized length is the
/// aggregate size of its subtree and lives on the tree node, not here.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemKind {
    /// Interior node; holds children, no value.
    Group,
    /// NUL-terminated text occupying exactly this many bytes.
    Text(u32),
    /// Fixed-width value. Widths 1, 2 and 4 are big-endian integers.
    Fixed(u32),
}

impl ItemKind {
    /// Payload bytes carried by a leaf. Zero for groups.
    pub fn payload_len(self) -> u32 {
        match self {
            Self::Group => 0,
            Self::Text(len) | Self::Fixed(len) => len,
        }
    }

    pub fn is_group(self) -> bool {
        matches!(self, Self::Group)
    }

    /// Same kind with a different payload length. Groups are unchanged.
    pub fn with_len(self, len: u32) -> Self {
        match self {
            Self::Group => Self::Group,
            Self::Text(_) => Self::Text(len),
            Self::Fixed(_) => Self::Fixed(len),
        }
    }

    /// Reject lengths that cannot be encoded in a length word.
    pub fn validate(self) -> TypeResult<()> {
        match self {
            Self::Group => Ok(()),
            Self::Text(0) => Err(TypeError::InvalidLength(0)),
            Self::Text(len) | Self::Fixed(len) if len > MAX_LEN => {
                Err(TypeError::InvalidLength(len))
            }
            _ => Ok(()),
        }
    }

    /// Encode the length word. `group_len` is used only for groups.
    pub fn length_word(self, group_len: u32) -> u32 {
        match self {
            Self::Group => GROUP_MARK | (group_len & LEN_MASK),
            Self::Text(len) => TEXT_MARK | (len & LEN_MASK),
            Self::Fixed(len) => FIXED_MARK | (len & LEN_MASK),
        }
    }

    /// Short label used by tree rendering.
    pub fn label(self) -> &'static str {
        match self {
            Self::Group => "GROUP",
            Self::Text(_) => "STR",
            Self::Fixed(1) => "UINT8",
            Self::Fixed(2) => "UINT16",
            Self::Fixed(4) => "UINT32",
            Self::Fixed(_) => "BLOB",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Group => write!(f, "group"),
            Self::Text(len) => write!(f, "text[{len}]"),
            Self::Fixed(len) => write!(f, "fixed[{len}]"),
        }
    }
}

/// Decode a serialized length word into its kind and the length it carries.
///
/// For a group the returned length is the aggregate subtree size; for a
/// leaf it equals the payload length inside the kind.
pub fn decode_length_word(word: u32) -> TypeResult<(ItemKind, u32)> {
    if word & HASH_MARK != 0 {
        return Err(TypeError::UnexpectedHashWord(word));
    }
    let len = word & LEN_MASK;
    if len == LEN_MASK {
        return Err(TypeError::InvalidLength(len));
    }
    let kind = match word & TYPE_MASK {
        FIXED_MARK => ItemKind::Fixed(len),
        TEXT_MARK => ItemKind::Text(len),
        GROUP_MARK => ItemKind::Group,
        other => return Err(TypeError::UnknownKind(other)),
    };
    kind.validate()?;
    Ok((kind, len))
}
