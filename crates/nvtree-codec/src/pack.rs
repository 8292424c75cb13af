use tracing::{debug, warn};

use nvtree_tree::{NodeId, Tree};
use nvtree_types::{FormatVersion, NameHash};

use crate::error::{CodecError, CodecResult};
use crate::wire::{read_head, Writer};

/// Flatten the tree into a new buffer of exactly `tree.total_len()` bytes.
pub fn pack(tree: &Tree) -> CodecResult<Vec<u8>> {
    let mut out = vec![0u8; tree.total_len() as usize];
    pack_into(tree, &mut out)?;
    Ok(out)
}

/// Flatten the tree into `buf` in pre-order, using the tree's format.
///
/// Returns the number of bytes written, which always equals the root's
/// aggregate length.
pub fn pack_into(tree: &Tree, buf: &mut [u8]) -> CodecResult<usize> {
    let total = tree.total_len() as usize;
    if total > buf.len() {
        return Err(CodecError::BufferTooSmall {
            needed: total,
            available: buf.len(),
        });
    }
    let format = tree.format();
    let mut w = Writer::new(buf);
    for (_, id) in tree.walk(tree.root()) {
        let item = tree.item(id)?;
        w.put(item.name().as_bytes())?;
        w.put(&[0])?;
        if item.writes_hash(format) {
            let hash = item.hash().unwrap_or_else(|| NameHash::of(item.name()));
            w.put_u32(hash.word())?;
        }
        w.put_u32(item.kind().length_word(item.len()))?;
        w.put(item.value_bytes())?;
    }
    debug_assert_eq!(w.position(), total);
    debug!(bytes = w.position(), items = tree.len(), "tree packed");
    Ok(w.position())
}

/// Rebuild the tree from a payload written in `format`.
///
/// The tree is emptied and switched to `format` first, so its aggregates
/// match the stream byte for byte, hash words included. Each group's length
/// word must be consumed exactly by its children; any inconsistency fails
/// with [`CodecError::Malformed`] and leaves the tree empty. Returns the
/// number of items restored.
pub fn unpack(payload: &[u8], format: FormatVersion, tree: &mut Tree) -> CodecResult<usize> {
    let root = tree.root();
    tree.reset(format)?;
    match rebuild(payload, format, tree) {
        Ok(count) => {
            debug!(bytes = payload.len(), items = count, "tree unpacked");
            Ok(count)
        }
        Err(err) => {
            warn!(error = %err, "discarding partially unpacked tree");
            tree.clear(root)?;
            Err(err)
        }
    }
}

fn rebuild(payload: &[u8], format: FormatVersion, tree: &mut Tree) -> CodecResult<usize> {
    // One (parent, bytes left in its body) frame per open group.
    let mut frames: Vec<(NodeId, usize)> = vec![(tree.root(), payload.len())];
    let mut pos = 0;
    let mut count = 0;

    while let Some(frame) = frames.last_mut() {
        if frame.1 == 0 {
            frames.pop();
            continue;
        }
        let parent = frame.0;
        let head = read_head(payload, pos, format)?;
        let size = head.head_len() + head.len as usize;
        if size > frame.1 {
            return Err(CodecError::malformed(
                pos,
                format!("entry {:?} overruns its group by {} bytes", head.name, size - frame.1),
            ));
        }
        frame.1 -= size;

        if head.kind.is_group() {
            let id = tree
                .attach(parent, &head.name, head.kind, head.hash, &[])
                .map_err(|e| CodecError::malformed(head.offset, e.to_string()))?;
            frames.push((id, head.len as usize));
            pos = head.body;
        } else {
            let body = payload
                .get(head.body..head.end())
                .ok_or_else(|| CodecError::malformed(head.body, "truncated payload"))?;
            tree.attach(parent, &head.name, head.kind, head.hash, body)
                .map_err(|e| CodecError::malformed(head.offset, e.to_string()))?;
            pos = head.end();
        }
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use nvtree_types::{ItemKind, Value};
    use proptest::prelude::*;

    use super::*;

    fn sample(format: FormatVersion) -> Tree {
        let mut t = Tree::new(format, 4096);
        let net = t.add(t.root(), "net", ItemKind::Group).unwrap();
        let if0 = t.add(net, "if0", ItemKind::Group).unwrap();
        let name = t.add(if0, "name", ItemKind::Text(8)).unwrap();
        t.fill(name, b"eth0").unwrap();
        let mtu = t.add(if0, "mtu", ItemKind::Fixed(2)).unwrap();
        t.fill(mtu, &1500u16.to_be_bytes()).unwrap();
        t.add(net, "empty", ItemKind::Group).unwrap();
        let mac = t.add(t.root(), "mac", ItemKind::Fixed(6)).unwrap();
        t.fill(mac, &[0, 1, 2, 3, 4, 5]).unwrap();
        t
    }

    fn dump(t: &Tree) -> Vec<(usize, String, ItemKind, u32, Option<Value>)> {
        t.walk(t.root())
            .map(|(d, id)| {
                let item = t.item(id).unwrap();
                (d, item.name().to_string(), item.kind(), item.len(), item.value())
            })
            .collect()
    }

    #[test]
    fn compat_stream_layout() {
        let mut t = Tree::new(FormatVersion::Compat, 256);
        let g = t.add(t.root(), "g", ItemKind::Group).unwrap();
        let v = t.add(g, "v", ItemKind::Fixed(1)).unwrap();
        t.fill(v, &[0xAB]).unwrap();
        let bytes = pack(&t).unwrap();
        assert_eq!(
            bytes,
            vec![
                b'g', 0, 0x02, 0x00, 0x00, 0x07, // group, 7 bytes of children
                b'v', 0, 0x00, 0x00, 0x00, 0x01, 0xAB,
            ]
        );
    }

    #[test]
    fn roundtrip_both_formats() {
        for format in [FormatVersion::Compat, FormatVersion::Hashed] {
            let t = sample(format);
            let bytes = pack(&t).unwrap();
            assert_eq!(bytes.len() as u32, t.total_len());

            let mut back = Tree::new(format, 4096);
            assert_eq!(unpack(&bytes, format, &mut back).unwrap(), t.len());
            assert_eq!(dump(&back), dump(&t));
            assert_eq!(back.total_len(), t.total_len());
        }
    }

    #[test]
    fn compat_reader_keeps_stored_hashes() {
        let hashed = sample(FormatVersion::Hashed);
        let bytes = pack(&hashed).unwrap();
        let mut back = Tree::new(FormatVersion::Compat, 4096);
        unpack(&bytes, FormatVersion::Compat, &mut back).unwrap();
        let names: Vec<String> = dump(&back).into_iter().map(|e| e.1).collect();
        assert_eq!(names, ["net", "if0", "name", "mtu", "empty", "mac"]);
        assert_eq!(dump(&back), dump(&hashed));
        assert_eq!(back.total_len() as usize, bytes.len());
        assert_eq!(pack(&back).unwrap(), bytes);

        // New items in a compat tree go out without a hash word.
        let mac = back.find(back.root(), "mac").unwrap();
        back.delete(mac).unwrap();
        back.add(back.root(), "id", ItemKind::Fixed(1)).unwrap();
        let repacked = pack(&back).unwrap();
        assert_eq!(repacked.len() as u32, back.total_len());
        assert_eq!(&repacked[repacked.len() - 8..], &[b'i', b'd', 0, 0, 0, 0, 1, 0]);
    }

    #[test]
    fn unpack_adopts_the_stream_layout() {
        let compat = sample(FormatVersion::Compat);
        let bytes = pack(&compat).unwrap();
        let mut back = Tree::new(FormatVersion::Hashed, 4096);
        unpack(&bytes, FormatVersion::Compat, &mut back).unwrap();
        assert_eq!(back.format(), FormatVersion::Compat);
        assert_eq!(back.total_len() as usize, bytes.len());
        assert_eq!(pack(&back).unwrap(), bytes);
    }

    #[test]
    fn buffer_too_small() {
        let t = sample(FormatVersion::Compat);
        let mut buf = vec![0u8; t.total_len() as usize - 1];
        assert!(matches!(pack_into(&t, &mut buf), Err(CodecError::BufferTooSmall { .. })));
    }

    #[test]
    fn group_length_mismatch_is_malformed() {
        let t = sample(FormatVersion::Compat);
        let mut bytes = pack(&t).unwrap();
        // "net\0" then the group's length word; shrink it by one byte.
        bytes[7] -= 1;
        let mut back = sample(FormatVersion::Compat);
        assert!(matches!(
            unpack(&bytes, FormatVersion::Compat, &mut back),
            Err(CodecError::Malformed { .. })
        ));
        assert!(back.is_empty());
        assert_eq!(back.total_len(), 0);
    }

    #[test]
    fn truncated_and_trailing_bytes_are_malformed() {
        let t = sample(FormatVersion::Compat);
        let bytes = pack(&t).unwrap();
        let mut back = Tree::new(FormatVersion::Compat, 4096);
        assert!(unpack(&bytes[..bytes.len() - 3], FormatVersion::Compat, &mut back).is_err());
        let mut longer = bytes.clone();
        longer.extend_from_slice(&[0xFF; 4]);
        assert!(unpack(&longer, FormatVersion::Compat, &mut back).is_err());
        assert!(back.is_empty());
    }

    #[test]
    fn empty_payload_is_empty_tree() {
        let mut back = sample(FormatVersion::Compat);
        assert_eq!(unpack(&[], FormatVersion::Compat, &mut back).unwrap(), 0);
        assert!(back.is_empty());
    }

    proptest! {
        #[test]
        fn arbitrary_trees_roundtrip(
            shape in prop::collection::vec((0usize..8, 0u8..3, 1u32..12), 1..40),
            hashed in any::<bool>(),
        ) {
            let format = if hashed { FormatVersion::Hashed } else { FormatVersion::Compat };
            let mut t = Tree::new(format, 1 << 16);
            let mut groups = vec![t.root()];
            for (n, (parent, kind, len)) in shape.into_iter().enumerate() {
                let parent = groups[parent % groups.len()];
                let name = format!("n{n}");
                match kind {
                    0 => groups.push(t.add(parent, &name, ItemKind::Group).unwrap()),
                    1 => {
                        let id = t.add(parent, &name, ItemKind::Text(len)).unwrap();
                        t.fill(id, name.as_bytes()).unwrap();
                    }
                    _ => {
                        let id = t.add(parent, &name, ItemKind::Fixed(len)).unwrap();
                        t.fill(id, &vec![n as u8; len as usize]).unwrap();
                    }
                }
            }
            let bytes = pack(&t).unwrap();
            let mut back = Tree::new(format, 1 << 16);
            unpack(&bytes, format, &mut back).unwrap();
            prop_assert_eq!(dump(&back), dump(&t));
            prop_assert_eq!(pack(&back).unwrap(), bytes);
        }
    }
}
