use tracing::debug;

use nvtree_types::{tokens, validate_name, FormatVersion, ItemKind, NameHash, PathToken, Value};

use crate::error::{TreeError, TreeResult};
use crate::node::{entry_size, NodeId, TreeItem};
use crate::render::{Children, Walk};

struct Slot {
    generation: u32,
    item: Option<TreeItem>,
}

/// Arena-backed item tree with a byte budget.
///
/// `capacity` is the number of payload bytes the packed image may occupy.
/// Adds and growing writes are refused once they would eat into a reserve
/// of two entry headers below that capacity.
pub struct Tree {
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: NodeId,
    format: FormatVersion,
    capacity: u32,
    count: usize,
}

impl Tree {
    /// Create a tree holding only the root group.
    pub fn new(format: FormatVersion, capacity: u32) -> Self {
        let root = TreeItem::new(String::new(), None, ItemKind::Group, Vec::new());
        Self {
            slots: vec![Slot {
                generation: 0,
                item: Some(root),
            }],
            free: Vec::new(),
            root: NodeId {
                index: 0,
                generation: 0,
            },
            format,
            capacity,
            count: 0,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Entry layout used for size accounting.
    pub fn format(&self) -> FormatVersion {
        self.format
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn set_capacity(&mut self, capacity: u32) {
        self.capacity = capacity;
    }

    /// Number of items, not counting the root.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Aggregate length of the root: the size of the packed payload.
    pub fn total_len(&self) -> u32 {
        self.get(self.root).map_or(0, |root| root.subtree_len)
    }

    /// Bytes still available to adds and growing writes.
    pub fn room(&self) -> u32 {
        let reserve = 2 * self.format.entry_overhead();
        self.capacity
            .saturating_sub(self.total_len().saturating_add(reserve))
    }

    pub fn get(&self, id: NodeId) -> Option<&TreeItem> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.item.as_ref())
    }

    /// Resolve a handle, rejecting stale ones.
    pub fn item(&self, id: NodeId) -> TreeResult<&TreeItem> {
        self.get(id).ok_or(TreeError::StaleNode(id))
    }

    fn item_mut(&mut self, id: NodeId) -> TreeResult<&mut TreeItem> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.item.as_mut())
            .ok_or(TreeError::StaleNode(id))
    }

    /// Direct children of `parent` in insertion order.
    pub fn children(&self, parent: NodeId) -> Children<'_> {
        Children::new(self, self.get(parent).and_then(|item| item.first_child))
    }

    /// Pre-order walk of every descendant of `from`, with depths
    /// relative to it.
    pub fn walk(&self, from: NodeId) -> Walk<'_> {
        Walk::new(self, from)
    }

    // ---------------------------------------------------------------
    // Mutation
    // ---------------------------------------------------------------

    /// Append a new item under `parent`.
    ///
    /// The name hash is generated here. Leaves start zero-filled at the
    /// kind's length; use [`fill`](Self::fill) to set the value.
    pub fn add(&mut self, parent: NodeId, name: &str, kind: ItemKind) -> TreeResult<NodeId> {
        validate_name(name)?;
        kind.validate()?;
        let needed = entry_size(name.len(), self.format, false) + kind.payload_len();
        let available = self.room();
        if needed > available {
            return Err(TreeError::OutOfBudget { needed, available });
        }
        self.insert(parent, name, kind, Some(NameHash::of(name)), false, None)
    }

    /// Append an item restored from a packed image.
    ///
    /// Unlike [`add`](Self::add) this keeps the hash exactly as stored
    /// (possibly none), takes the leaf's wire bytes verbatim and skips the
    /// budget check; the image's length was already bounded when it was
    /// read. A stored hash is counted, and re-packed, even in the compat
    /// layout. `value` must be empty for groups.
    pub fn attach(
        &mut self,
        parent: NodeId,
        name: &str,
        kind: ItemKind,
        hash: Option<NameHash>,
        value: &[u8],
    ) -> TreeResult<NodeId> {
        validate_name(name)?;
        kind.validate()?;
        if value.len() != kind.payload_len() as usize {
            return Err(TreeError::SizeMismatch {
                name: name.to_string(),
                expected: kind.payload_len(),
                actual: value.len(),
            });
        }
        self.insert(parent, name, kind, hash, hash.is_some(), Some(value))
    }

    fn insert(
        &mut self,
        parent: NodeId,
        name: &str,
        kind: ItemKind,
        hash: Option<NameHash>,
        stored_hash: bool,
        bytes: Option<&[u8]>,
    ) -> TreeResult<NodeId> {
        let parent_item = self.item(parent)?;
        if !parent_item.is_group() {
            return Err(TreeError::NotAGroup(parent_item.name.clone()));
        }
        let last = parent_item.last_child;

        let mut value = zeroed(kind.payload_len() as usize)?;
        if let Some(bytes) = bytes {
            value.copy_from_slice(bytes);
        }
        let mut item = TreeItem::new(name.to_string(), hash, kind, value);
        item.stored_hash = stored_hash;
        item.parent = Some(parent);
        item.prev = last;
        let id = self.allocate(item)?;

        match last {
            Some(last) => self.item_mut(last)?.next = Some(id),
            None => self.item_mut(parent)?.first_child = Some(id),
        }
        self.item_mut(parent)?.last_child = Some(id);

        let size = entry_size(name.len(), self.format, stored_hash) + kind.payload_len();
        self.adjust_aggregates(Some(parent), i64::from(size));
        self.count += 1;
        debug!(name, %kind, size, total = self.total_len(), "item added");
        Ok(id)
    }

    fn allocate(&mut self, item: TreeItem) -> TreeResult<NodeId> {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.item = Some(item);
            return Ok(NodeId {
                index,
                generation: slot.generation,
            });
        }
        self.slots
            .try_reserve(1)
            .map_err(|_| TreeError::AllocationFailure)?;
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            item: Some(item),
        });
        Ok(NodeId {
            index,
            generation: 0,
        })
    }

    /// Remove an item and its whole subtree.
    pub fn delete(&mut self, id: NodeId) -> TreeResult<()> {
        if id == self.root {
            return Err(TreeError::RootImmutable);
        }
        let item = self.item(id)?;
        let size = item.serialized_size(self.format);
        let (parent, prev, next) = (item.parent, item.prev, item.next);
        debug!(name = %item.name, size, "item deleted");

        match prev {
            Some(prev) => self.item_mut(prev)?.next = next,
            None => {
                if let Some(parent) = parent {
                    self.item_mut(parent)?.first_child = next;
                }
            }
        }
        match next {
            Some(next) => self.item_mut(next)?.prev = prev,
            None => {
                if let Some(parent) = parent {
                    self.item_mut(parent)?.last_child = prev;
                }
            }
        }
        self.adjust_aggregates(parent, -i64::from(size));
        self.release(id);
        Ok(())
    }

    /// Empty the tree and switch it to `format`, keeping the budget.
    pub fn reset(&mut self, format: FormatVersion) -> TreeResult<()> {
        let root = self.root;
        self.clear(root)?;
        self.format = format;
        Ok(())
    }

    /// Delete every child of `group`. Returns how many were removed.
    pub fn clear(&mut self, group: NodeId) -> TreeResult<usize> {
        let children: Vec<NodeId> = self.children(group).collect();
        for &child in &children {
            self.delete(child)?;
        }
        Ok(children.len())
    }

    fn release(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            let Some(slot) = self.slots.get_mut(id.index as usize) else {
                continue;
            };
            if slot.generation != id.generation {
                continue;
            }
            let Some(item) = slot.item.take() else {
                continue;
            };
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(id.index);
            self.count -= 1;
            stack.extend(Children::new(self, item.first_child));
        }
    }

    /// Add `delta` to the aggregate of `from` and every ancestor above it.
    fn adjust_aggregates(&mut self, mut at: Option<NodeId>, delta: i64) {
        while let Some(id) = at {
            let Ok(item) = self.item_mut(id) else { break };
            item.subtree_len = (i64::from(item.subtree_len) + delta).max(0) as u32;
            at = item.parent;
        }
    }

    /// Set a leaf's value.
    ///
    /// Fixed-width items need exactly their width. Text shrinks to the
    /// string plus terminator and the saving is released to every
    /// ancestor; text longer than the slot is truncated.
    pub fn fill(&mut self, id: NodeId, data: &[u8]) -> TreeResult<()> {
        self.store(id, data, false)
    }

    /// Like [`fill`](Self::fill), but text may also grow (subject to the
    /// budget) and a fixed-width item accepts a shorter value, zero-padded.
    pub fn write(&mut self, id: NodeId, data: &[u8]) -> TreeResult<()> {
        self.store(id, data, true)
    }

    fn store(&mut self, id: NodeId, data: &[u8], grow: bool) -> TreeResult<()> {
        if id == self.root {
            return Err(TreeError::RootImmutable);
        }
        let item = self.item(id)?;
        let (parent, kind) = (item.parent, item.kind);
        match kind {
            ItemKind::Group => Err(TreeError::KindMismatch {
                name: item.name.clone(),
                kind,
            }),
            ItemKind::Fixed(width) => {
                let fits = data.len() == width as usize || (grow && data.len() < width as usize);
                if !fits {
                    return Err(TreeError::SizeMismatch {
                        name: item.name.clone(),
                        expected: width,
                        actual: data.len(),
                    });
                }
                let item = self.item_mut(id)?;
                item.value[..data.len()].copy_from_slice(data);
                item.value[data.len()..].fill(0);
                Ok(())
            }
            ItemKind::Text(len) => {
                let text_len = data.iter().position(|&b| b == 0).unwrap_or(data.len());
                let wanted = text_len as u32 + 1;
                let new_len = if wanted <= len {
                    wanted
                } else if grow {
                    ItemKind::Text(wanted).validate()?;
                    let available = self.room();
                    if wanted - len > available {
                        return Err(TreeError::OutOfBudget {
                            needed: wanted - len,
                            available,
                        });
                    }
                    wanted
                } else {
                    len
                };
                let copy = text_len.min(new_len as usize - 1);
                let mut value = zeroed(new_len as usize)?;
                value[..copy].copy_from_slice(&data[..copy]);

                let item = self.item_mut(id)?;
                item.value = value;
                item.kind = ItemKind::Text(new_len);
                let delta = i64::from(new_len) - i64::from(len);
                if delta != 0 {
                    debug!(name = %item.name, old = len, new = new_len, "text resized");
                    self.adjust_aggregates(parent, delta);
                }
                Ok(())
            }
        }
    }

    // ---------------------------------------------------------------
    // Lookup
    // ---------------------------------------------------------------

    /// Resolve a dotted path below `from`.
    pub fn find(&self, from: NodeId, path: &str) -> TreeResult<NodeId> {
        self.item(from)?;
        let mut current = None;
        for token in tokens(path) {
            let parent = current.unwrap_or(from);
            current = Some(
                self.find_child(parent, token)
                    .ok_or_else(|| TreeError::NotFound(path.to_string()))?,
            );
        }
        current.ok_or_else(|| TreeError::NotFound(path.to_string()))
    }

    /// First child of `parent` matching one path token.
    ///
    /// Exact names are pre-screened by hash; items without a stored hash
    /// fall through to the name comparison.
    pub fn find_child(&self, parent: NodeId, token: PathToken<'_>) -> Option<NodeId> {
        let probe = match token {
            PathToken::Exact(name) => Some(NameHash::of(name)),
            PathToken::Prefix(_) => None,
        };
        self.children(parent).find(|&id| {
            self.get(id).is_some_and(|item| {
                probe.map_or(true, |p| NameHash::admits(item.hash, p))
                    && token.matches(&item.name, item.is_group())
            })
        })
    }

    /// Typed value of a leaf; `None` for groups.
    pub fn read(&self, id: NodeId) -> TreeResult<Option<Value>> {
        Ok(self.item(id)?.value())
    }
}

fn zeroed(len: usize) -> TreeResult<Vec<u8>> {
    let mut value = Vec::new();
    value
        .try_reserve_exact(len)
        .map_err(|_| TreeError::AllocationFailure)?;
    value.resize(len, 0);
    Ok(value)
}
