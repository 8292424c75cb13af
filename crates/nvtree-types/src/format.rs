use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::{HASH_WORD_SIZE, LENGTH_WORD_SIZE};

/// Serialized entry layout, recorded in the table header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatVersion {
    /// No hash words are written. Readers peek for one per entry, so
    /// images written by either layout parse.
    #[default]
    Compat,
    /// Every entry carries a hash word ahead of its length word.
    Hashed,
}

impl FormatVersion {
    /// Bytes of hash word per serialized entry.
    pub fn hash_bytes(self) -> u32 {
        match self {
            Self::Compat => 0,
            Self::Hashed => HASH_WORD_SIZE,
        }
    }

    /// Fixed bytes per entry besides the name: hash word plus length word.
    pub fn entry_overhead(self) -> u32 {
        self.hash_bytes() + LENGTH_WORD_SIZE
    }

    /// Version number stored in bits 24..27 of the header's length word.
    pub fn code(self) -> u32 {
        match self {
            Self::Compat => 0,
            Self::Hashed => 1,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Compat),
            1 => Some(Self::Hashed),
            _ => None,
        }
    }
}

/// Integrity check applied to the persisted payload.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecksumScheme {
    /// 8-bit XOR over the payload bytes.
    #[default]
    Xor8,
    /// 16-bit CRC (XMODEM polynomial) over the payload bytes.
    Crc16,
}

/// Device key used to wrap an encrypted image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyClass {
    Root,
    Kcp,
    Kpicv,
}

impl KeyClass {
    pub const ALL: [KeyClass; 3] = [Self::Root, Self::Kcp, Self::Kpicv];

    /// Code stored in the header's reserved word.
    pub fn code(self) -> u32 {
        match self {
            Self::Root => 1,
            Self::Kcp => 2,
            Self::Kpicv => 3,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.code() == code)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Kcp => "kcp",
            Self::Kpicv => "kpicv",
        }
    }
}

impl fmt::Display for KeyClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for KeyClass {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| TypeError::UnknownKeyClass(s.to_string()))
    }
}

/// Kind of storage device an image lives on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Memory-mapped parallel NOR flash.
    Nor,
    /// Serial (SPI) flash behind a bus controller.
    SerialFlash,
    /// RAM mirror.
    Ram,
}

impl BackendKind {
    pub const ALL: [BackendKind; 3] = [Self::Nor, Self::SerialFlash, Self::Ram];

    pub fn name(self) -> &'static str {
        match self {
            Self::Nor => "nor",
            Self::SerialFlash => "serial_flash",
            Self::Ram => "ram",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendKind {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nor" => Ok(Self::Nor),
            "serial_flash" | "sflash" => Ok(Self::SerialFlash),
            "ram" => Ok(Self::Ram),
            _ => Err(TypeError::UnknownBackend(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overhead_per_format() {
        assert_eq!(FormatVersion::Compat.entry_overhead(), 4);
        assert_eq!(FormatVersion::Hashed.entry_overhead(), 8);
    }

    #[test]
    fn format_codes_roundtrip() {
        for f in [FormatVersion::Compat, FormatVersion::Hashed] {
            assert_eq!(FormatVersion::from_code(f.code()), Some(f));
        }
        assert_eq!(FormatVersion::from_code(7), None);
    }

    #[test]
    fn key_class_parsing() {
        assert_eq!("KCP".parse::<KeyClass>().unwrap(), KeyClass::Kcp);
        assert_eq!(KeyClass::from_code(3), Some(KeyClass::Kpicv));
        assert_eq!(KeyClass::from_code(0), None);
        assert!("otp".parse::<KeyClass>().is_err());
    }

    #[test]
    fn backend_names() {
        assert_eq!("sflash".parse::<BackendKind>().unwrap(), BackendKind::SerialFlash);
        assert_eq!(BackendKind::Ram.to_string(), "ram");
    }

    #[test]
    fn serde_names() {
        let json = serde_json::to_string(&BackendKind::SerialFlash).unwrap();
        assert_eq!(json, "\"serial_flash\"");
        let f: FormatVersion = serde_json::from_str("\"hashed\"").unwrap();
        assert_eq!(f, FormatVersion::Hashed);
    }
}
