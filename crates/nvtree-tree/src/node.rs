use std::fmt;

use serde::{Deserialize, Serialize};

use nvtree_types::{FormatVersion, ItemKind, NameHash, Value};

/// Handle to an item inside a [`Tree`](crate::Tree).
///
/// The generation changes whenever a slot is reused, so a handle kept
/// across a delete is detected instead of aliasing a newer item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

/// A single named item: a group or a leaf holding a value.
#[derive(Clone, Debug)]
pub struct TreeItem {
    pub(crate) name: String,
    pub(crate) hash: Option<NameHash>,
    /// The hash word was present in the stream this item was read from.
    pub(crate) stored_hash: bool,
    pub(crate) kind: ItemKind,
    /// Wire bytes of the value; `kind.payload_len()` long.
    pub(crate) value: Vec<u8>,
    /// Serialized size of all descendants. Groups only.
    pub(crate) subtree_len: u32,
    pub(crate) parent: Option<NodeId>,
    pub(crate) first_child: Option<NodeId>,
    pub(crate) last_child: Option<NodeId>,
    pub(crate) prev: Option<NodeId>,
    pub(crate) next: Option<NodeId>,
}

impl TreeItem {
    pub(crate) fn new(name: String, hash: Option<NameHash>, kind: ItemKind, value: Vec<u8>) -> Self {
        Self {
            name,
            hash,
            stored_hash: false,
            kind,
            value,
            subtree_len: 0,
            parent: None,
            first_child: None,
            last_child: None,
            prev: None,
            next: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stored name hash. `None` for items read from an image without one.
    pub fn hash(&self) -> Option<NameHash> {
        self.hash
    }

    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    /// Whether a packed entry for this item carries a hash word. Hashed
    /// layouts always do; compat entries only when their source did.
    pub fn writes_hash(&self, format: FormatVersion) -> bool {
        format == FormatVersion::Hashed || self.stored_hash
    }

    pub fn is_group(&self) -> bool {
        self.kind.is_group()
    }

    /// Length recorded in this item's length word: the aggregate subtree
    /// size for a group, the payload length for a leaf.
    pub fn len(&self) -> u32 {
        match self.kind {
            ItemKind::Group => self.subtree_len,
            other => other.payload_len(),
        }
    }

    /// Raw wire bytes of the value. Empty for groups.
    pub fn value_bytes(&self) -> &[u8] {
        &self.value
    }

    /// Typed value. `None` for groups.
    pub fn value(&self) -> Option<Value> {
        Value::from_payload(self.kind, &self.value)
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Bytes this item (and its subtree) occupies in a packed image.
    pub fn serialized_size(&self, format: FormatVersion) -> u32 {
        entry_size(self.name.len(), format, self.stored_hash) + self.len()
    }
}

/// Bytes of name, terminator, hash word and length word for one entry.
pub(crate) fn entry_size(name_len: usize, format: FormatVersion, stored_hash: bool) -> u32 {
    let kept_hash = if stored_hash && format == FormatVersion::Compat { 4 } else { 0 };
    name_len as u32 + 1 + format.entry_overhead() + kept_hash
}
