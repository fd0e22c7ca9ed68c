//! Keystore-resident key tiers
//!
//! The key lives entirely inside the protected key store under a fixed
//! alias, so envelopes carry no supplement. The same provider serves the
//! software keystore tier and the hardware-backed tier.

use std::sync::Arc;

use super::{KeyBundle, KeyProvider, SecretKey};
use crate::error::Result;
use crate::store::{KeyProtection, ProtectedKeyStore};

pub struct KeystoreKeyProvider {
    key_store: Arc<dyn ProtectedKeyStore>,
    alias: String,
    protection: KeyProtection,
    key: Option<SecretKey>,
}

impl KeystoreKeyProvider {
    /// Provider for the software keystore tier.
    pub fn software(key_store: Arc<dyn ProtectedKeyStore>, app_id: &str) -> Self {
        Self::new(key_store, format!("{}-keystore", app_id), KeyProtection::Software)
    }

    /// Provider for the hardware-backed tier.
    pub fn hardware(key_store: Arc<dyn ProtectedKeyStore>, app_id: &str) -> Self {
        Self::new(key_store, format!("{}-strongbox", app_id), KeyProtection::Hardware)
    }

    fn new(
        key_store: Arc<dyn ProtectedKeyStore>,
        alias: String,
        protection: KeyProtection,
    ) -> Self {
        Self {
            key_store,
            alias,
            protection,
            key: None,
        }
    }

    fn stored_key(&mut self) -> Result<&SecretKey> {
        let key = match self.key.take() {
            Some(key) => key,
            None => self.key_store.secret_key(&self.alias, self.protection)?,
        };
        Ok(self.key.insert(key))
    }
}

impl KeyProvider for KeystoreKeyProvider {
    fn encrypt_bundle(&mut self) -> Result<KeyBundle> {
        Ok(KeyBundle::bare(self.stored_key()?.clone()))
    }

    fn decrypt_key(&mut self, _supplement: &[u8]) -> Result<SecretKey> {
        Ok(self.stored_key()?.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::store::{MemoryPreferences, SoftwareKeyStore};

    fn key_store(hardware: bool) -> Arc<SoftwareKeyStore> {
        Arc::new(SoftwareKeyStore::new(Arc::new(MemoryPreferences::new())).with_hardware(hardware))
    }

    #[test]
    fn test_encrypt_key_has_empty_supplement() {
        let mut provider = KeystoreKeyProvider::software(key_store(false), "app");
        let bundle = provider.encrypt_bundle().unwrap();
        assert!(bundle.supplement.is_empty());
    }

    #[test]
    fn test_same_key_every_time() {
        let store = key_store(false);
        let mut provider = KeystoreKeyProvider::software(store.clone(), "app");
        let a = provider.encrypt_bundle().unwrap();

        let mut other = KeystoreKeyProvider::software(store, "app");
        let b = other.decrypt_key(&[]).unwrap();
        assert_eq!(a.key.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_hardware_tier_without_hardware_fails() {
        let mut provider = KeystoreKeyProvider::hardware(key_store(false), "app");
        let err = provider.encrypt_bundle().expect_err("expected hardware refusal");
        assert_eq!(err.kind, ErrorKind::KeyUnavailable);
    }

    #[test]
    fn test_hardware_tier_uses_own_alias() {
        let store = key_store(true);
        let soft = KeystoreKeyProvider::software(store.clone(), "app")
            .encrypt_bundle()
            .unwrap();
        let hard = KeystoreKeyProvider::hardware(store, "app")
            .encrypt_bundle()
            .unwrap();
        assert_ne!(soft.key.as_bytes(), hard.key.as_bytes());
    }
}
