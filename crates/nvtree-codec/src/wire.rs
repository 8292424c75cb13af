//! Cursor helpers over entry streams.

use nvtree_types::{decode_length_word, FormatVersion, ItemKind, NameHash, NAME_MAX};

use crate::error::{CodecError, CodecResult};

pub(crate) struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    pub(crate) fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn put(&mut self, bytes: &[u8]) -> CodecResult<()> {
        let end = self.pos + bytes.len();
        let available = self.buf.len();
        let dst = self
            .buf
            .get_mut(self.pos..end)
            .ok_or(CodecError::BufferTooSmall {
                needed: end,
                available,
            })?;
        dst.copy_from_slice(bytes);
        self.pos = end;
        Ok(())
    }

    pub(crate) fn put_u32(&mut self, word: u32) -> CodecResult<()> {
        self.put(&word.to_be_bytes())
    }
}

/// Header of one serialized entry.
pub(crate) struct EntryHead {
    pub(crate) offset: usize,
    pub(crate) name: String,
    pub(crate) hash: Option<NameHash>,
    pub(crate) kind: ItemKind,
    /// Length word value: subtree bytes for groups, payload bytes for leaves.
    pub(crate) len: u32,
    /// Offset of the first payload (or child) byte.
    pub(crate) body: usize,
}

impl EntryHead {
    /// Offset just past this entry, subtree included.
    pub(crate) fn end(&self) -> usize {
        self.body + self.len as usize
    }

    /// Bytes this entry spends before its body.
    pub(crate) fn head_len(&self) -> usize {
        self.body - self.offset
    }
}

/// Parse the entry header starting at `offset`.
///
/// In the compat layout a hash word is optional and recognised by its tag
/// bit; in the hashed layout it is mandatory.
pub(crate) fn read_head(buf: &[u8], offset: usize, format: FormatVersion) -> CodecResult<EntryHead> {
    let rest = buf.get(offset..).unwrap_or(&[]);
    let limit = rest.len().min(NAME_MAX);
    let nul = rest[..limit]
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| CodecError::malformed(offset, "unterminated name"))?;
    if nul == 0 {
        return Err(CodecError::malformed(offset, "empty name"));
    }
    let name = std::str::from_utf8(&rest[..nul])
        .map_err(|_| CodecError::malformed(offset, "name is not UTF-8"))?
        .to_string();

    let mut pos = offset + nul + 1;
    let mut hash = None;
    let first = read_u32(buf, pos)?;
    if let Some(h) = NameHash::from_word(first) {
        hash = Some(h);
        pos += 4;
    } else if format == FormatVersion::Hashed {
        return Err(CodecError::malformed(pos, "missing hash word"));
    }
    let word = read_u32(buf, pos)?;
    let (kind, len) =
        decode_length_word(word).map_err(|e| CodecError::malformed(pos, e.to_string()))?;
    pos += 4;
    Ok(EntryHead {
        offset,
        name,
        hash,
        kind,
        len,
        body: pos,
    })
}

pub(crate) fn read_u32(buf: &[u8], pos: usize) -> CodecResult<u32> {
    buf.get(pos..pos + 4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_be_bytes)
        .ok_or_else(|| CodecError::malformed(pos, "truncated word"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, hash: bool, word: u32, payload: &[u8]) -> Vec<u8> {
        let mut out = name.as_bytes().to_vec();
        out.push(0);
        if hash {
            out.extend_from_slice(&NameHash::of(name).word().to_be_bytes());
        }
        out.extend_from_slice(&word.to_be_bytes());
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn compat_reader_peeks_for_hash() {
        let with = entry("mtu", true, 0x0000_0002, &[5, 0xDC]);
        let without = entry("mtu", false, 0x0000_0002, &[5, 0xDC]);
        let a = read_head(&with, 0, FormatVersion::Compat).unwrap();
        let b = read_head(&without, 0, FormatVersion::Compat).unwrap();
        assert_eq!(a.hash, Some(NameHash::of("mtu")));
        assert_eq!(b.hash, None);
        assert_eq!((a.kind, a.len, a.end()), (ItemKind::Fixed(2), 2, with.len()));
        assert_eq!(b.head_len(), 8);
    }

    #[test]
    fn hashed_reader_requires_hash() {
        let without = entry("mtu", false, 0x0000_0002, &[5, 0xDC]);
        assert!(matches!(
            read_head(&without, 0, FormatVersion::Hashed),
            Err(CodecError::Malformed { offset: 4, .. })
        ));
    }

    #[test]
    fn bad_heads() {
        assert!(read_head(b"\0\0\0\0\x01", 0, FormatVersion::Compat).is_err());
        assert!(read_head(&[b'a'; 40], 0, FormatVersion::Compat).is_err());
        assert!(read_head(b"ab\0\x00\x00", 0, FormatVersion::Compat).is_err());
        let erased = entry("x", false, 0x00FF_FFFF, &[]);
        assert!(read_head(&erased, 0, FormatVersion::Compat).is_err());
    }

    #[test]
    fn writer_bounds() {
        let mut buf = [0u8; 6];
        let mut w = Writer::new(&mut buf);
        w.put_u32(1).unwrap();
        assert!(matches!(w.put_u32(2), Err(CodecError::BufferTooSmall { needed: 8, available: 6 })));
        assert_eq!(w.position(), 4);
    }
}
