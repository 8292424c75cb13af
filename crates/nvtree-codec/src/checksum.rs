use crc::{Crc, CRC_16_XMODEM};

use nvtree_types::ChecksumScheme;

use crate::error::{CodecError, CodecResult};

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

const TAG_SHIFT: u32 = 8;
const TAG_MASK: u32 = 0xFF << TAG_SHIFT;
const TAG_XOR8: u32 = 0x80;
const TAG_XOR8_SEALED: u32 = 0x81;
const TAG_CRC16: u32 = 0x82;
const TAG_CRC16_SEALED: u32 = 0x83;

/// 8-bit XOR of every byte.
pub fn xor8(data: &[u8]) -> u8 {
    data.iter().fold(0, |acc, b| acc ^ b)
}

/// CRC-16/XMODEM (polynomial 0x1021, initial value 0).
pub fn crc16(data: &[u8]) -> u16 {
    CRC16.checksum(data)
}

/// Decoded header checksum word.
///
/// Word layout: `0` means the image predates checksums. Otherwise bits
/// 8..15 hold the tag (`0x80` XOR8, `0x82` CRC16, plus one when the
/// payload is encrypted), the XOR value sits in bits 0..7 and the CRC in
/// bits 16..31.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChecksumWord {
    /// Legacy image; forces a one-time re-save.
    Unset,
    Sealed {
        scheme: ChecksumScheme,
        encrypted: bool,
        value: u16,
    },
}

impl ChecksumWord {
    /// Compute the checksum of the stored payload bytes.
    pub fn compute(scheme: ChecksumScheme, encrypted: bool, data: &[u8]) -> Self {
        let value = match scheme {
            ChecksumScheme::Xor8 => u16::from(xor8(data)),
            ChecksumScheme::Crc16 => crc16(data),
        };
        Self::Sealed {
            scheme,
            encrypted,
            value,
        }
    }

    pub fn to_word(self) -> u32 {
        match self {
            Self::Unset => 0,
            Self::Sealed {
                scheme,
                encrypted,
                value,
            } => {
                let sealed = u32::from(encrypted);
                match scheme {
                    ChecksumScheme::Xor8 => {
                        ((TAG_XOR8 | sealed) << TAG_SHIFT) | u32::from(value & 0xFF)
                    }
                    ChecksumScheme::Crc16 => {
                        (u32::from(value) << 16) | ((TAG_CRC16 | sealed) << TAG_SHIFT)
                    }
                }
            }
        }
    }

    pub fn from_word(word: u32) -> CodecResult<Self> {
        if word == 0 {
            return Ok(Self::Unset);
        }
        let tag = (word & TAG_MASK) >> TAG_SHIFT;
        let (scheme, encrypted, value) = match tag {
            TAG_XOR8 | TAG_XOR8_SEALED if word >> 16 == 0 => {
                (ChecksumScheme::Xor8, tag == TAG_XOR8_SEALED, (word & 0xFF) as u16)
            }
            TAG_CRC16 | TAG_CRC16_SEALED if word & 0xFF == 0 => {
                (ChecksumScheme::Crc16, tag == TAG_CRC16_SEALED, (word >> 16) as u16)
            }
            _ => return Err(CodecError::UnknownChecksumTag(word)),
        };
        Ok(Self::Sealed {
            scheme,
            encrypted,
            value,
        })
    }

    /// Whether the word claims an encrypted payload.
    pub fn is_encrypted(self) -> bool {
        matches!(self, Self::Sealed { encrypted: true, .. })
    }

    /// Check `data` (the stored payload bytes) against this word.
    pub fn verify(self, data: &[u8]) -> CodecResult<()> {
        let Self::Sealed {
            scheme,
            encrypted,
            value,
        } = self
        else {
            return Err(CodecError::Unsealed);
        };
        let Self::Sealed { value: computed, .. } = Self::compute(scheme, encrypted, data) else {
            return Err(CodecError::Unsealed);
        };
        if computed != value {
            return Err(CodecError::BadChecksum {
                stored: value,
                computed,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc16_check_value() {
        // Standard check input for CRC-16/XMODEM.
        assert_eq!(crc16(b"123456789"), 0x31C3);
    }

    #[test]
    fn word_layout() {
        let xor = ChecksumWord::Sealed {
            scheme: ChecksumScheme::Xor8,
            encrypted: false,
            value: 0x5A,
        };
        assert_eq!(xor.to_word(), 0x0000_805A);
        let crc = ChecksumWord::Sealed {
            scheme: ChecksumScheme::Crc16,
            encrypted: true,
            value: 0x31C3,
        };
        assert_eq!(crc.to_word(), 0x31C3_8300);
        assert_eq!(ChecksumWord::from_word(crc.to_word()).unwrap(), crc);
        assert_eq!(ChecksumWord::from_word(0).unwrap(), ChecksumWord::Unset);
    }

    #[test]
    fn foreign_tags_are_corrupt() {
        for word in [0x0000_7F00, 0x0000_0001, 0x1234_805A, 0xFFFF_FFFF] {
            assert!(matches!(
                ChecksumWord::from_word(word),
                Err(CodecError::UnknownChecksumTag(_))
            ));
        }
    }

    #[test]
    fn single_byte_flip_detected_by_both_schemes() {
        let data: Vec<u8> = (0..200u8).collect();
        for scheme in [ChecksumScheme::Xor8, ChecksumScheme::Crc16] {
            let word = ChecksumWord::compute(scheme, false, &data);
            word.verify(&data).unwrap();
            for i in [0, 57, 199] {
                let mut bad = data.clone();
                bad[i] ^= 0x10;
                assert!(matches!(word.verify(&bad), Err(CodecError::BadChecksum { .. })));
            }
        }
    }

    #[test]
    fn unset_never_verifies() {
        assert!(matches!(ChecksumWord::Unset.verify(b"x"), Err(CodecError::Unsealed)));
    }
}
