use std::fmt;

use serde::{Deserialize, Serialize};

use crate::HASH_MARK;

const CASE_SENSITIVE_MASK: u32 = 0x0000_FFFF;
const CASE_INSENSITIVE_MASK: u32 = 0x0FFF_0000;
const ERASED_WORD: u32 = 0xFFFF_FFFF;

/// Tagged 32-bit name hash.
///
/// Layout: bit 31 is the hash tag, bits 16..27 hold the byte sum of the
/// upper-cased name and bits 0..15 the plain byte sum. The tag bit never
/// appears in a length word, so a reader can tell the two apart.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NameHash(u32);

impl NameHash {
    /// Hash an item name.
    pub fn of(name: &str) -> Self {
        let (sensitive, insensitive) = name.bytes().fold((0u32, 0u32), |(s, i), b| {
            (
                s.wrapping_add(b as u32),
                i.wrapping_add(b.to_ascii_uppercase() as u32),
            )
        });
        Self(
            HASH_MARK
                | ((insensitive << 16) & CASE_INSENSITIVE_MASK)
                | (sensitive & CASE_SENSITIVE_MASK),
        )
    }

    /// Interpret a serialized word as a hash, if it carries the tag bit.
    ///
    /// An all-ones word is erased storage, never a hash.
    pub fn from_word(word: u32) -> Option<Self> {
        (word & HASH_MARK != 0 && word != ERASED_WORD).then_some(Self(word))
    }

    pub fn word(self) -> u32 {
        self.0
    }

    pub fn case_sensitive(self) -> u16 {
        (self.0 & CASE_SENSITIVE_MASK) as u16
    }

    pub fn case_insensitive(self) -> u16 {
        ((self.0 & CASE_INSENSITIVE_MASK) >> 16) as u16
    }

    /// Whether a stored hash can belong to the probed name.
    ///
    /// Items without a hash (legacy images) always pass; the name
    /// comparison that follows decides.
    pub fn admits(stored: Option<NameHash>, probe: NameHash) -> bool {
        stored.map_or(true, |h| h == probe)
    }
}

impl fmt::Display for NameHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0.to_be_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn known_value() {
        // "ab": 0x61 + 0x62 = 0xC3, upper-cased 0x41 + 0x42 = 0x83.
        let h = NameHash::of("ab");
        assert_eq!(h.word(), 0x8083_00C3);
        assert_eq!(h.case_sensitive(), 0xC3);
        assert_eq!(h.case_insensitive(), 0x83);
        assert_eq!(h.to_string(), "808300c3");
    }

    #[test]
    fn case_only_differences_share_insensitive_half() {
        let a = NameHash::of("Eth0");
        let b = NameHash::of("ETH0");
        assert_eq!(a.case_insensitive(), b.case_insensitive());
        assert_ne!(a, b);
    }

    #[test]
    fn erased_word_is_not_a_hash() {
        assert_eq!(NameHash::from_word(0xFFFF_FFFF), None);
        assert_eq!(NameHash::from_word(0x0100_0004), None);
        assert!(NameHash::from_word(0x8000_0001).is_some());
    }

    #[test]
    fn missing_hash_always_admits() {
        let probe = NameHash::of("mtu");
        assert!(NameHash::admits(None, probe));
        assert!(NameHash::admits(Some(probe), probe));
        assert!(!NameHash::admits(Some(NameHash::of("mac")), probe));
    }

    proptest! {
        #[test]
        fn hash_always_tagged_and_recognised(name in "[a-zA-Z0-9_]{1,31}") {
            let h = NameHash::of(&name);
            prop_assert!(h.word() & HASH_MARK != 0);
            prop_assert_eq!(NameHash::from_word(h.word()), Some(h));
        }
    }
}
