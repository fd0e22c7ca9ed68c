//! Asymmetric key wrapping tier
//!
//! Every message is encrypted under a fresh AES key. That key is wrapped with
//! the public half of a key pair kept in the protected key store, and the
//! wrapped blob becomes the envelope supplement.

use std::sync::Arc;

use super::{KeyBundle, KeyProvider, SecretKey};
use crate::error::Result;
use crate::store::ProtectedKeyStore;

pub struct WrappedKeyProvider {
    key_store: Arc<dyn ProtectedKeyStore>,
    alias: String,
}

impl WrappedKeyProvider {
    pub fn new(key_store: Arc<dyn ProtectedKeyStore>, app_id: &str) -> Self {
        Self {
            key_store,
            alias: format!("{}-wrap", app_id),
        }
    }
}

impl KeyProvider for WrappedKeyProvider {
    fn encrypt_bundle(&mut self) -> Result<KeyBundle> {
        let key = SecretKey::generate();
        let wrapped = self.key_store.wrap_key(&self.alias, &key)?;
        Ok(KeyBundle::new(key, wrapped))
    }

    fn decrypt_key(&mut self, supplement: &[u8]) -> Result<SecretKey> {
        self.key_store.unwrap_key(&self.alias, supplement)
    }
}
