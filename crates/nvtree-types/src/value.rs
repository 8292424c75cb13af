use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{TypeError, TypeResult};
use crate::kind::ItemKind;

/// Typed value of a leaf item.
///
/// On the wire, integers are big-endian and text is NUL-terminated and
/// NUL-padded to the item's declared length.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Text(String),
    U8(u8),
    U16(u16),
    U32(u32),
    Bytes(Vec<u8>),
}

impl Value {
    /// Kind of the item that holds exactly this value.
    ///
    /// Fails with [`TypeError::InvalidLength`] when the value is too long
    /// for a length word.
    pub fn kind(&self) -> TypeResult<ItemKind> {
        let sized = |len: usize| u32::try_from(len).map_err(|_| TypeError::InvalidLength(u32::MAX));
        let kind = match self {
            Self::Text(s) => ItemKind::Text(sized(s.len())?.saturating_add(1)),
            Self::U8(_) => ItemKind::Fixed(1),
            Self::U16(_) => ItemKind::Fixed(2),
            Self::U32(_) => ItemKind::Fixed(4),
            Self::Bytes(b) => ItemKind::Fixed(sized(b.len())?),
        };
        kind.validate()?;
        Ok(kind)
    }

    /// Wire bytes of the value (text includes its NUL terminator).
    pub fn to_payload(&self) -> Vec<u8> {
        match self {
            Self::Text(s) => {
                let mut out = Vec::with_capacity(s.len() + 1);
                out.extend_from_slice(s.as_bytes());
                out.push(0);
                out
            }
            Self::U8(v) => vec![*v],
            Self::U16(v) => v.to_be_bytes().to_vec(),
            Self::U32(v) => v.to_be_bytes().to_vec(),
            Self::Bytes(b) => b.clone(),
        }
    }

    /// Decode wire bytes held by an item of `kind`. Groups have no value.
    pub fn from_payload(kind: ItemKind, payload: &[u8]) -> Option<Self> {
        match kind {
            ItemKind::Group => None,
            ItemKind::Text(_) => {
                let end = payload.iter().position(|&b| b == 0).unwrap_or(payload.len());
                Some(Self::Text(String::from_utf8_lossy(&payload[..end]).into_owned()))
            }
            ItemKind::Fixed(_) => Some(match *payload {
                [a] => Self::U8(a),
                [a, b] => Self::U16(u16::from_be_bytes([a, b])),
                [a, b, c, d] => Self::U32(u32::from_be_bytes([a, b, c, d])),
                _ => Self::Bytes(payload.to_vec()),
            }),
        }
    }

    /// Whether this value may be stored in an item of `kind` as-is.
    pub fn fits_kind(&self, kind: ItemKind) -> bool {
        match (self, kind) {
            (Self::Text(_), ItemKind::Text(_)) => true,
            (Self::Text(_), _) | (_, ItemKind::Text(_)) | (_, ItemKind::Group) => false,
            (v, ItemKind::Fixed(len)) => v.kind().is_ok_and(|k| k.payload_len() == len),
        }
    }

    /// Parse a value from a `type:literal` string such as `u16:1500`,
    /// `hex:deadbeef` or `text:eth0`. A bare literal is text.
    pub fn parse_tagged(input: &str) -> TypeResult<Self> {
        let invalid = |reason: String| TypeError::InvalidValue {
            input: input.to_string(),
            reason,
        };
        let (tag, literal) = match input.split_once(':') {
            Some((tag, literal)) => (tag, literal),
            None => return Ok(Self::Text(input.to_string())),
        };
        let int = |bits: u32| {
            parse_int(literal)
                .filter(|v| *v < (1u64 << bits))
                .ok_or_else(|| invalid(format!("not a valid u{bits}")))
        };
        match tag {
            "text" | "str" => Ok(Self::Text(literal.to_string())),
            "u8" => int(8).map(|v| Self::U8(v as u8)),
            "u16" => int(16).map(|v| Self::U16(v as u16)),
            "u32" => int(32).map(|v| Self::U32(v as u32)),
            "hex" => hex::decode(literal)
                .map(Self::Bytes)
                .map_err(|e| invalid(e.to_string())),
            _ => Ok(Self::Text(input.to_string())),
        }
    }
}

fn parse_int(literal: &str) -> Option<u64> {
    match literal.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => literal.parse().ok(),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::U8(v) => write!(f, "{v} (0x{v:02x})"),
            Self::U16(v) => write!(f, "{v} (0x{v:04x})"),
            Self::U32(v) => write!(f, "{v} (0x{v:08x})"),
            Self::Bytes(b) => f.write_str(&hex::encode(b)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_are_big_endian() {
        assert_eq!(Value::U16(0x1234).to_payload(), vec![0x12, 0x34]);
        assert_eq!(
            Value::from_payload(ItemKind::Fixed(4), &[0, 0, 5, 0xDC]),
            Some(Value::U32(1500))
        );
    }

    #[test]
    fn text_stops_at_nul() {
        assert_eq!(Value::Text("ab".into()).to_payload(), b"ab\0".to_vec());
        assert_eq!(
            Value::from_payload(ItemKind::Text(9), b"ab\0\0\0\0\0\0\0"),
            Some(Value::Text("ab".into()))
        );
        assert_eq!(Value::Text("abcdefgh".into()).kind(), Ok(ItemKind::Text(9)));
    }

    #[test]
    fn oversized_values_have_no_kind() {
        let blob = Value::Bytes(vec![0; crate::MAX_LEN as usize + 1]);
        assert_eq!(blob.kind(), Err(TypeError::InvalidLength(crate::MAX_LEN + 1)));
        assert!(!blob.fits_kind(ItemKind::Fixed(crate::MAX_LEN)));
        let text = Value::Text("x".repeat(crate::MAX_LEN as usize));
        assert_eq!(text.kind(), Err(TypeError::InvalidLength(crate::MAX_LEN + 1)));
        assert_eq!(Value::Bytes(vec![1; 6]).kind(), Ok(ItemKind::Fixed(6)));
    }

    #[test]
    fn odd_widths_are_blobs() {
        assert_eq!(
            Value::from_payload(ItemKind::Fixed(3), &[1, 2, 3]),
            Some(Value::Bytes(vec![1, 2, 3]))
        );
        assert_eq!(Value::from_payload(ItemKind::Group, &[]), None);
    }

    #[test]
    fn fits_kind() {
        assert!(Value::U16(1).fits_kind(ItemKind::Fixed(2)));
        assert!(!Value::U16(1).fits_kind(ItemKind::Fixed(4)));
        assert!(Value::Text("x".into()).fits_kind(ItemKind::Text(20)));
        assert!(!Value::U8(1).fits_kind(ItemKind::Text(2)));
    }

    #[test]
    fn parse_tagged_literals() {
        assert_eq!(Value::parse_tagged("u16:1500").unwrap(), Value::U16(1500));
        assert_eq!(Value::parse_tagged("u8:0x1f").unwrap(), Value::U8(0x1F));
        assert_eq!(Value::parse_tagged("hex:0a0b").unwrap(), Value::Bytes(vec![10, 11]));
        assert_eq!(Value::parse_tagged("eth0").unwrap(), Value::Text("eth0".into()));
        assert!(Value::parse_tagged("u8:300").is_err());
        assert!(Value::parse_tagged("hex:zz").is_err());
    }
}
