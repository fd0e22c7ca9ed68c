//! Key material and the key provider contract
//!
//! Each key tier has one [`KeyProvider`]. A provider hands out a
//! [`KeyBundle`] for new messages and reconstructs the same key on decrypt
//! from the supplement that travelled inside the envelope.

mod keystore;
mod password;
mod wrapped;

pub use keystore::KeystoreKeyProvider;
pub use password::PasswordKeyProvider;
pub use wrapped::WrappedKeyProvider;

use std::fmt;

use rand::RngCore;
use rand::rngs::OsRng;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::Result;

/// Length of every AES key handled by the engine.
pub const KEY_LEN: usize = 32;

/// AES-256 key material, wiped when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey([u8; KEY_LEN]);

impl SecretKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Copies a key out of `bytes`, or `None` if the length is wrong.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let array: [u8; KEY_LEN] = bytes.try_into().ok()?;
        Some(Self(array))
    }

    /// A fresh key from the operating system RNG.
    pub fn generate() -> Self {
        let mut key = Self([0u8; KEY_LEN]);
        OsRng.fill_bytes(&mut key.0);
        key
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

/// Key material plus the supplement that must be stored alongside the
/// ciphertext to get the key back later. The supplement is empty for keys
/// that are looked up by alias.
#[derive(Debug)]
pub struct KeyBundle {
    pub key: SecretKey,
    pub supplement: Vec<u8>,
}

impl KeyBundle {
    pub fn new(key: SecretKey, supplement: Vec<u8>) -> Self {
        Self { key, supplement }
    }

    /// A bundle without supplement.
    pub fn bare(key: SecretKey) -> Self {
        Self::new(key, Vec::new())
    }
}

/// Produces and reconstructs keys for one key tier.
///
/// Both operations fail with `KeyUnavailable` when the backing store cannot
/// serve the request. During encryption that failure makes the engine fall
/// back to the next lower tier.
pub trait KeyProvider: Send {
    /// Key material for a new message.
    fn encrypt_bundle(&mut self) -> Result<KeyBundle>;

    /// Rebuilds the key a message was encrypted with from its supplement.
    fn decrypt_key(&mut self, supplement: &[u8]) -> Result<SecretKey>;
}
