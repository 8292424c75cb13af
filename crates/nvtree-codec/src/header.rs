use nvtree_types::{FormatVersion, KeyClass, LEN_MASK, TYPE_MASK};

use crate::checksum::ChecksumWord;
use crate::error::{CodecError, CodecResult};

/// Image magic, "NVIT" read as a little-endian word.
pub const MAGIC: u32 = 0x5449_564E;

/// Bytes of table header ahead of the payload.
pub const TABLE_HEADER_SIZE: usize = 16;

const UNENCRYPTED: u32 = 0xFFFF_FFFF;
const FORMAT_SHIFT: u32 = 24;

/// Encryption envelope recorded in the header's reserved word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Envelope {
    pub key_class: KeyClass,
    /// Length of the stored (wrapped) payload.
    pub len: u32,
}

/// The fixed header in front of every image.
///
/// Four little-endian words:
///
/// ```text
/// [0] magic
/// [1] payload length (bits 0..23) | format version (bits 24..27)
/// [2] checksum word (see ChecksumWord)
/// [3] 0xFFFFFFFF, or key class (bits 24..27) | wrapped length (bits 0..23)
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TableHeader {
    /// Plaintext payload length.
    pub total_len: u32,
    pub format: FormatVersion,
    pub checksum: ChecksumWord,
    pub envelope: Option<Envelope>,
}

impl TableHeader {
    pub fn new(total_len: u32, format: FormatVersion) -> Self {
        Self {
            total_len,
            format,
            checksum: ChecksumWord::Unset,
            envelope: None,
        }
    }

    /// Bytes of payload actually stored after the header.
    pub fn stored_len(&self) -> u32 {
        self.envelope.map_or(self.total_len, |e| e.len)
    }

    pub fn encode(&self) -> [u8; TABLE_HEADER_SIZE] {
        let reserved = self.envelope.map_or(UNENCRYPTED, |e| {
            ((e.key_class.code() << FORMAT_SHIFT) & TYPE_MASK) | (e.len & LEN_MASK)
        });
        let words = [
            MAGIC,
            (self.format.code() << FORMAT_SHIFT) | (self.total_len & LEN_MASK),
            self.checksum.to_word(),
            reserved,
        ];
        let mut out = [0u8; TABLE_HEADER_SIZE];
        for (chunk, word) in out.chunks_exact_mut(4).zip(words) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        out
    }

    /// Decode a header. Fails with [`CodecError::BadMagic`] when the bytes
    /// are not an image at all.
    pub fn decode(bytes: &[u8]) -> CodecResult<Self> {
        if bytes.len() < TABLE_HEADER_SIZE {
            return Err(CodecError::BufferTooSmall {
                needed: TABLE_HEADER_SIZE,
                available: bytes.len(),
            });
        }
        let word = |i: usize| {
            let mut raw = [0u8; 4];
            raw.copy_from_slice(&bytes[i * 4..i * 4 + 4]);
            u32::from_le_bytes(raw)
        };
        let magic = word(0);
        if magic != MAGIC {
            return Err(CodecError::BadMagic { found: magic });
        }
        let length = word(1);
        let format_code = length >> FORMAT_SHIFT;
        let format =
            FormatVersion::from_code(format_code).ok_or(CodecError::UnknownFormat(format_code))?;
        let checksum = ChecksumWord::from_word(word(2))?;
        let reserved = word(3);
        let envelope = if reserved == UNENCRYPTED {
            None
        } else {
            let code = (reserved & TYPE_MASK) >> FORMAT_SHIFT;
            let key_class = KeyClass::from_code(code).ok_or(CodecError::UnknownKeyClass(code))?;
            Some(Envelope {
                key_class,
                len: reserved & LEN_MASK,
            })
        };
        Ok(Self {
            total_len: length & LEN_MASK,
            format,
            checksum,
            envelope,
        })
    }
}
