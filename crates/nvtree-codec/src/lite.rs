//! Direct-buffer engine: look up and patch entries without building a tree.
//!
//! Lookups walk the payload exactly like [`unpack`](crate::unpack) would,
//! but skip whole subtrees by their length word instead of materialising
//! them. Results always agree with a tree built from the same bytes.

use nvtree_types::{tokens, FormatVersion, ItemKind, NameHash, PathToken, Value};
use tracing::debug;

use crate::error::{CodecError, CodecResult};
use crate::wire::{read_head, EntryHead};

/// Location of an entry inside a payload buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LiteEntry {
    /// Offset of the entry's name.
    pub offset: usize,
    pub name: String,
    pub kind: ItemKind,
    /// Length word value (subtree bytes for a group).
    pub len: u32,
    /// Offset of the first payload byte.
    pub value_offset: usize,
}

impl LiteEntry {
    fn from_head(head: EntryHead) -> Self {
        Self {
            offset: head.offset,
            name: head.name,
            kind: head.kind,
            len: head.len,
            value_offset: head.body,
        }
    }

    /// Raw payload bytes. Empty for groups.
    pub fn payload<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
        if self.kind.is_group() {
            return &[];
        }
        buf.get(self.value_offset..self.value_offset + self.len as usize)
            .unwrap_or(&[])
    }

    /// Typed value; `None` for groups.
    pub fn value(&self, buf: &[u8]) -> Option<Value> {
        Value::from_payload(self.kind, self.payload(buf))
    }
}

/// Find the entry at `path` inside a payload written in `format`.
///
/// Returns `Ok(None)` when nothing matches.
pub fn lite_find(payload: &[u8], format: FormatVersion, path: &str) -> CodecResult<Option<LiteEntry>> {
    let mut scope = 0..payload.len();
    let mut found: Option<EntryHead> = None;

    for token in tokens(path) {
        if let Some(head) = found.take() {
            if !head.kind.is_group() {
                return Ok(None);
            }
            scope = head.body..head.end();
        }
        match scan(payload, scope.clone(), format, token)? {
            Some(head) => found = Some(head),
            None => return Ok(None),
        }
    }
    Ok(found.map(LiteEntry::from_head))
}

/// Scan the sibling entries in `scope` for the first match of `token`.
fn scan(
    payload: &[u8],
    scope: std::ops::Range<usize>,
    format: FormatVersion,
    token: PathToken<'_>,
) -> CodecResult<Option<EntryHead>> {
    let probe = match token {
        PathToken::Exact(name) => Some(NameHash::of(name)),
        PathToken::Prefix(_) => None,
    };
    let mut pos = scope.start;
    while pos < scope.end {
        let head = read_head(payload, pos, format)?;
        if head.end() > scope.end {
            return Err(CodecError::malformed(pos, "entry overruns its group"));
        }
        let admitted = probe.map_or(true, |p| NameHash::admits(head.hash, p));
        if admitted && token.matches(&head.name, head.kind.is_group()) {
            return Ok(Some(head));
        }
        pos = head.end();
    }
    Ok(None)
}

/// Overwrite a leaf's payload in place.
///
/// The new bytes must have exactly the entry's length; text must keep its
/// terminator. Nothing around the entry moves.
pub fn lite_update(payload: &mut [u8], entry: &LiteEntry, value: &[u8]) -> CodecResult<()> {
    match entry.kind {
        ItemKind::Group => return Err(CodecError::KindMismatch { kind: entry.kind }),
        ItemKind::Text(_) if value.last() != Some(&0) => {
            return Err(CodecError::malformed(entry.value_offset, "text must end in NUL"));
        }
        _ => {}
    }
    if value.len() != entry.len as usize {
        return Err(CodecError::LengthMismatch {
            expected: entry.len,
            actual: value.len(),
        });
    }
    let available = payload.len();
    let end = entry.value_offset + value.len();
    let dst = payload
        .get_mut(entry.value_offset..end)
        .ok_or(CodecError::BufferTooSmall {
            needed: end,
            available,
        })?;
    dst.copy_from_slice(value);
    debug!(name = %entry.name, offset = entry.value_offset, len = value.len(), "entry patched in place");
    Ok(())
}

#[cfg(test)]
mod tests {
    use nvtree_tree::Tree;
    use proptest::prelude::*;

    use super::*;
    use crate::pack::{pack, unpack};

    fn sample(format: FormatVersion) -> (Tree, Vec<u8>) {
        let mut t = Tree::new(format, 4096);
        let net = t.add(t.root(), "net", ItemKind::Group).unwrap();
        let ifa = t.add(net, "ifa", ItemKind::Fixed(1)).unwrap();
        t.fill(ifa, &[9]).unwrap();
        let if0 = t.add(net, "if0", ItemKind::Group).unwrap();
        let mtu = t.add(if0, "mtu", ItemKind::Fixed(2)).unwrap();
        t.fill(mtu, &1500u16.to_be_bytes()).unwrap();
        let name = t.add(if0, "name", ItemKind::Text(5)).unwrap();
        t.fill(name, b"eth0").unwrap();
        let bytes = pack(&t).unwrap();
        (t, bytes)
    }

    #[test]
    fn finds_leaves_and_groups() {
        for format in [FormatVersion::Compat, FormatVersion::Hashed] {
            let (t, bytes) = sample(format);
            let mtu = lite_find(&bytes, format, "net.if0.mtu").unwrap().unwrap();
            assert_eq!(mtu.value(&bytes), Some(Value::U16(1500)));

            let if0 = lite_find(&bytes, format, "net.if0").unwrap().unwrap();
            let tree_if0 = t.find(t.root(), "net.if0").unwrap();
            assert_eq!(if0.len, t.item(tree_if0).unwrap().len());
            assert_eq!(if0.value(&bytes), None);
        }
    }

    #[test]
    fn wildcard_skips_leaves() {
        let (_, bytes) = sample(FormatVersion::Compat);
        let hit = lite_find(&bytes, FormatVersion::Compat, "net.if*").unwrap().unwrap();
        assert_eq!(hit.name, "if0");
        assert_eq!(hit.kind, ItemKind::Group);
        let deep = lite_find(&bytes, FormatVersion::Compat, "net.if*.name").unwrap().unwrap();
        assert_eq!(deep.value(&bytes), Some(Value::Text("eth0".into())));
    }

    #[test]
    fn misses() {
        let (_, bytes) = sample(FormatVersion::Compat);
        for path in ["", "nope", "net.mtu", "net.ifa.x", "net.if0.mtu.deeper"] {
            assert_eq!(lite_find(&bytes, FormatVersion::Compat, path).unwrap(), None, "{path}");
        }
    }

    #[test]
    fn update_in_place_matches_tree_view() {
        let format = FormatVersion::Compat;
        let (_, mut bytes) = sample(format);
        let before = bytes.len();
        let entry = lite_find(&bytes, format, "net.if0.mtu").unwrap().unwrap();
        lite_update(&mut bytes, &entry, &9000u16.to_be_bytes()).unwrap();
        assert_eq!(bytes.len(), before);

        let mut t = Tree::new(format, 4096);
        unpack(&bytes, format, &mut t).unwrap();
        let mtu = t.find(t.root(), "net.if0.mtu").unwrap();
        assert_eq!(t.read(mtu).unwrap(), Some(Value::U16(9000)));
    }

    #[test]
    fn update_rejects_resizing() {
        let format = FormatVersion::Compat;
        let (_, mut bytes) = sample(format);
        let name = lite_find(&bytes, format, "net.if0.name").unwrap().unwrap();
        assert!(matches!(
            lite_update(&mut bytes, &name, b"wlan0\0"),
            Err(CodecError::LengthMismatch { expected: 5, actual: 6 })
        ));
        lite_update(&mut bytes, &name, b"eth1\0").unwrap();
        assert!(lite_update(&mut bytes, &name, b"eth12").is_err());

        let group = lite_find(&bytes, format, "net").unwrap().unwrap();
        assert!(matches!(
            lite_update(&mut bytes, &group, &[]),
            Err(CodecError::KindMismatch { .. })
        ));
    }

    #[test]
    fn corrupt_length_is_malformed() {
        let format = FormatVersion::Compat;
        let (_, mut bytes) = sample(format);
        // Inflate the "net" group's length word past the end of the buffer.
        bytes[5] = 0x10;
        assert!(matches!(
            lite_find(&bytes, format, "other"),
            Err(CodecError::Malformed { .. })
        ));
    }

    #[test]
    fn compat_stream_with_hashes_agrees_with_tree() {
        let (_, bytes) = sample(FormatVersion::Hashed);
        let mut t = Tree::new(FormatVersion::Compat, 4096);
        unpack(&bytes, FormatVersion::Compat, &mut t).unwrap();
        assert_eq!(t.total_len() as usize, bytes.len());
        for path in ["net", "net.ifa", "net.if0", "net.if0.mtu", "net.if0.name", "net.if*"] {
            let lite = lite_find(&bytes, FormatVersion::Compat, path).unwrap().unwrap();
            let item = t.item(t.find(t.root(), path).unwrap()).unwrap();
            assert_eq!(lite.len, item.len(), "{path}");
            assert_eq!(lite.value(&bytes), item.value(), "{path}");
        }
    }

    proptest! {
        #[test]
        fn lite_and_tree_agree(
            shape in prop::collection::vec((0usize..6, any::<bool>(), 1u32..6), 1..30),
            probes in prop::collection::vec(0usize..64, 1..20),
            hashed in any::<bool>(),
        ) {
            let format = if hashed { FormatVersion::Hashed } else { FormatVersion::Compat };
            let mut t = Tree::new(format, 1 << 16);
            let mut groups = vec![(t.root(), String::new())];
            let mut paths = Vec::new();
            for (n, (parent, group, len)) in shape.into_iter().enumerate() {
                let (parent_id, parent_path) = groups[parent % groups.len()].clone();
                let name = format!("i{n}");
                let path = if parent_path.is_empty() { name.clone() } else { format!("{parent_path}.{name}") };
                if group {
                    let id = t.add(parent_id, &name, ItemKind::Group).unwrap();
                    groups.push((id, path.clone()));
                } else {
                    let id = t.add(parent_id, &name, ItemKind::Fixed(len)).unwrap();
                    t.fill(id, &vec![n as u8; len as usize]).unwrap();
                }
                paths.push(path);
            }
            // A few paths that cannot exist, plus wildcard probes.
            paths.push("missing".into());
            paths.push("i0.missing".into());
            paths.push("i*".into());
            paths.push("i1*.i2".into());

            let bytes = pack(&t).unwrap();
            for p in probes {
                let path = &paths[p % paths.len()];
                let lite = lite_find(&bytes, format, path).unwrap();
                let tree = t.find(t.root(), path).ok().map(|id| t.item(id).unwrap());
                match (lite, tree) {
                    (None, None) => {}
                    (Some(l), Some(item)) => {
                        prop_assert_eq!(&l.name, item.name());
                        prop_assert_eq!(l.len, item.len());
                        prop_assert_eq!(l.value(&bytes), item.value());
                    }
                    (l, item) => prop_assert!(false, "{path}: lite {:?} vs tree {:?}", l, item.map(|i| i.name())),
                }
            }
        }
    }
}
