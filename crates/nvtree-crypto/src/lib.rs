//! Asset wrapping for encrypted nvtree images.
//!
//! The session never sees key material. It hands the payload to an
//! [`AssetCipher`] together with a [`KeyClass`], a fixed asset id and a
//! nonce, and stores whatever package comes back. On load the package is
//! unwrapped, and authenticated, before any byte of it is parsed.
//!
//! [`Blake3AssetCipher`] derives one key per class from a device secret
//! and uses keyed BLAKE3 for both the keystream and the tag. It wraps an
//! established primitive; nothing here is novel cryptography.
//!
//! [`KeyClass`]: nvtree_types::KeyClass

pub mod cipher;
pub mod error;

pub use cipher::{AssetCipher, Blake3AssetCipher, ASSET_ID, IMAGE_NONCE};
pub use error::{CipherError, CipherResult};
