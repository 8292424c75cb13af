use nvtree_types::KeyClass;

use crate::error::{CipherError, CipherResult};

/// Asset id bound into every image package ("NVRM").
pub const ASSET_ID: u32 = 0x4E56_524D;

/// Nonce used when wrapping an image.
pub const IMAGE_NONCE: u32 = 0x0A0A_0A00;

const NONCE_LEN: usize = 4;
const TAG_LEN: usize = 16;

/// Authenticated wrapping of a payload under a device key class.
pub trait AssetCipher: Send + Sync {
    /// Wrap `plaintext`, binding it to `asset_id`.
    fn wrap(&self, key: KeyClass, asset_id: u32, nonce: u32, plaintext: &[u8])
        -> CipherResult<Vec<u8>>;

    /// Verify and unwrap a package produced by [`wrap`](Self::wrap).
    fn unwrap(&self, key: KeyClass, asset_id: u32, package: &[u8]) -> CipherResult<Vec<u8>>;

    /// Bytes a package adds on top of the plaintext.
    fn overhead(&self) -> usize;
}

/// Keyed-BLAKE3 asset cipher.
///
/// Package layout: `nonce:u32be || ciphertext || tag[16]`. The keystream
/// is the keyed XOF over `asset_id || nonce`; the tag is a keyed hash over
/// `asset_id || nonce || ciphertext` under a separate derived key.
pub struct Blake3AssetCipher {
    secret: [u8; 32],
}

impl Blake3AssetCipher {
    pub fn new(secret: [u8; 32]) -> Self {
        Self { secret }
    }

    /// Parse a 32-byte secret from hex.
    pub fn from_hex(secret: &str) -> CipherResult<Self> {
        let bytes = hex::decode(secret.trim()).map_err(|e| CipherError::InvalidSecret(e.to_string()))?;
        let secret: [u8; 32] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| CipherError::InvalidSecret(format!("expected 32 bytes, got {}", b.len())))?;
        Ok(Self::new(secret))
    }

    /// Stretch an arbitrary passphrase into a secret.
    pub fn from_passphrase(passphrase: &str) -> Self {
        Self::new(blake3::derive_key("nvtree device secret v1", passphrase.as_bytes()))
    }

    fn keys(&self, class: KeyClass) -> ([u8; 32], [u8; 32]) {
        let (enc, mac) = match class {
            KeyClass::Root => ("nvtree asset root enc v1", "nvtree asset root mac v1"),
            KeyClass::Kcp => ("nvtree asset kcp enc v1", "nvtree asset kcp mac v1"),
            KeyClass::Kpicv => ("nvtree asset kpicv enc v1", "nvtree asset kpicv mac v1"),
        };
        (
            blake3::derive_key(enc, &self.secret),
            blake3::derive_key(mac, &self.secret),
        )
    }

    fn apply_keystream(key: &[u8; 32], asset_id: u32, nonce: u32, data: &mut [u8]) {
        let mut xof = blake3::Hasher::new_keyed(key)
            .update(&asset_id.to_be_bytes())
            .update(&nonce.to_be_bytes())
            .finalize_xof();
        let mut block = [0u8; 64];
        for chunk in data.chunks_mut(block.len()) {
            xof.fill(&mut block[..chunk.len()]);
            for (b, k) in chunk.iter_mut().zip(block.iter()) {
                *b ^= k;
            }
        }
    }

    fn tag(key: &[u8; 32], asset_id: u32, nonce: u32, ciphertext: &[u8]) -> [u8; TAG_LEN] {
        let hash = blake3::Hasher::new_keyed(key)
            .update(&asset_id.to_be_bytes())
            .update(&nonce.to_be_bytes())
            .update(ciphertext)
            .finalize();
        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&hash.as_bytes()[..TAG_LEN]);
        tag
    }
}

impl AssetCipher for Blake3AssetCipher {
    fn wrap(
        &self,
        key: KeyClass,
        asset_id: u32,
        nonce: u32,
        plaintext: &[u8],
    ) -> CipherResult<Vec<u8>> {
        let (enc, mac) = self.keys(key);
        let mut package = Vec::with_capacity(plaintext.len() + self.overhead());
        package.extend_from_slice(&nonce.to_be_bytes());
        package.extend_from_slice(plaintext);
        Self::apply_keystream(&enc, asset_id, nonce, &mut package[NONCE_LEN..]);
        let tag = Self::tag(&mac, asset_id, nonce, &package[NONCE_LEN..]);
        package.extend_from_slice(&tag);
        Ok(package)
    }

    fn unwrap(&self, key: KeyClass, asset_id: u32, package: &[u8]) -> CipherResult<Vec<u8>> {
        if package.len() < self.overhead() {
            return Err(CipherError::PackageTooShort { len: package.len() });
        }
        let (enc, mac) = self.keys(key);
        let (nonce, rest) = package.split_at(NONCE_LEN);
        let (ciphertext, tag) = rest.split_at(rest.len() - TAG_LEN);
        let nonce = u32::from_be_bytes([nonce[0], nonce[1], nonce[2], nonce[3]]);

        let expected = Self::tag(&mac, asset_id, nonce, ciphertext);
        let diff = expected.iter().zip(tag).fold(0u8, |acc, (a, b)| acc | (a ^ b));
        if diff != 0 {
            return Err(CipherError::Authentication);
        }
        let mut plaintext = ciphertext.to_vec();
        Self::apply_keystream(&enc, asset_id, nonce, &mut plaintext);
        Ok(plaintext)
    }

    fn overhead(&self) -> usize {
        NONCE_LEN + TAG_LEN
    }
}
