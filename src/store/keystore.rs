//! Software protected key store
//!
//! Keys are persisted through a [`PreferenceStore`]: symmetric keys as
//! base64, RSA private keys as base64 PKCS#8 DER. Key wrapping uses RSA-OAEP
//! with SHA-256.

use std::collections::HashMap;
use std::sync::Arc;

use base64::{Engine, engine::general_purpose::STANDARD};
use parking_lot::Mutex;
use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use tracing::debug;
use zeroize::Zeroizing;

use super::{KeyProtection, PreferenceStore, ProtectedKeyStore};
use crate::error::{CompatError, Result};
use crate::key::SecretKey;

/// RSA modulus size for wrapping key pairs.
const RSA_BITS: usize = 2048;

/// Stores keys in software, optionally claiming hardware backing.
///
/// A store built without hardware support refuses
/// [`KeyProtection::Hardware`] requests, which is how a device lacking a
/// hardware security module behaves.
pub struct SoftwareKeyStore {
    entries: Arc<dyn PreferenceStore>,
    hardware: bool,
    key_pairs: Mutex<HashMap<String, Arc<RsaPrivateKey>>>,
}

impl SoftwareKeyStore {
    pub fn new(entries: Arc<dyn PreferenceStore>) -> Self {
        Self {
            entries,
            hardware: false,
            key_pairs: Mutex::new(HashMap::new()),
        }
    }

    /// Sets whether hardware-backed keys can be created.
    pub fn with_hardware(mut self, hardware: bool) -> Self {
        self.hardware = hardware;
        self
    }

    fn key_pair(&self, alias: &str) -> Result<Arc<RsaPrivateKey>> {
        let mut cache = self.key_pairs.lock();
        if let Some(pair) = cache.get(alias) {
            return Ok(Arc::clone(pair));
        }

        let encoded = Zeroizing::new(self.entries.get_or_insert_with(
            &format!("rsa:{}", alias),
            &mut || {
                debug!(alias, "generating wrapping key pair");
                let private = RsaPrivateKey::new(&mut OsRng, RSA_BITS).map_err(|e| {
                    CompatError::key_unavailable(format!("key pair generation failed: {}", e))
                })?;
                let der = private.to_pkcs8_der().map_err(|e| {
                    CompatError::key_unavailable(format!("key pair encoding failed: {}", e))
                })?;
                Ok(STANDARD.encode(der.as_bytes()))
            },
        )?);

        let der = Zeroizing::new(STANDARD.decode(encoded.as_bytes()).map_err(|e| {
            CompatError::key_unavailable(format!("stored key pair {} is not base64: {}", alias, e))
        })?);
        let private = RsaPrivateKey::from_pkcs8_der(&der).map_err(|e| {
            CompatError::key_unavailable(format!("stored key pair {} is corrupt: {}", alias, e))
        })?;

        let pair = Arc::new(private);
        cache.insert(alias.to_owned(), Arc::clone(&pair));
        Ok(pair)
    }
}

impl ProtectedKeyStore for SoftwareKeyStore {
    fn supports(&self, protection: KeyProtection) -> bool {
        match protection {
            KeyProtection::Software => true,
            KeyProtection::Hardware => self.hardware,
        }
    }

    fn secret_key(&self, alias: &str, protection: KeyProtection) -> Result<SecretKey> {
        if !self.supports(protection) {
            return Err(CompatError::key_unavailable(format!(
                "{} keys are not supported by this key store",
                protection.label()
            )));
        }

        let encoded = Zeroizing::new(self.entries.get_or_insert_with(
            &format!("secret:{}:{}", protection.label(), alias),
            &mut || {
                debug!(alias, "generating secret key");
                Ok(STANDARD.encode(SecretKey::generate().as_bytes()))
            },
        )?);

        let bytes = Zeroizing::new(STANDARD.decode(encoded.as_bytes()).map_err(|e| {
            CompatError::key_unavailable(format!("stored key {} is not base64: {}", alias, e))
        })?);
        SecretKey::from_slice(&bytes).ok_or_else(|| {
            CompatError::key_unavailable(format!("stored key {} has wrong length", alias))
        })
    }

    fn wrap_key(&self, alias: &str, key: &SecretKey) -> Result<Vec<u8>> {
        let private = self.key_pair(alias)?;
        let public = RsaPublicKey::from(&*private);
        public
            .encrypt(&mut OsRng, Oaep::new::<Sha256>(), key.as_bytes())
            .map_err(|e| CompatError::key_unavailable(format!("key wrapping failed: {}", e)))
    }

    fn unwrap_key(&self, alias: &str, wrapped: &[u8]) -> Result<SecretKey> {
        let private = self.key_pair(alias)?;
        let bytes = Zeroizing::new(
            private
                .decrypt(Oaep::new::<Sha256>(), wrapped)
                .map_err(|_| CompatError::key_unavailable("wrapped key cannot be unwrapped"))?,
        );
        SecretKey::from_slice(&bytes)
            .ok_or_else(|| CompatError::key_unavailable("unwrapped key has wrong length"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::store::MemoryPreferences;

    fn store(hardware: bool) -> (Arc<MemoryPreferences>, SoftwareKeyStore) {
        let entries = Arc::new(MemoryPreferences::new());
        let store = SoftwareKeyStore::new(entries.clone()).with_hardware(hardware);
        (entries, store)
    }

    #[test]
    fn test_secret_key_is_stable_per_alias() {
        let (_, store) = store(false);
        let a = store.secret_key("app-keystore", KeyProtection::Software).unwrap();
        let b = store.secret_key("app-keystore", KeyProtection::Software).unwrap();
        let other = store.secret_key("other", KeyProtection::Software).unwrap();

        assert_eq!(a.as_bytes(), b.as_bytes());
        assert_ne!(a.as_bytes(), other.as_bytes());
    }

    #[test]
    fn test_secret_key_survives_new_store_over_same_entries() {
        let (entries, store) = store(false);
        let original = store.secret_key("alias", KeyProtection::Software).unwrap();

        let reopened = SoftwareKeyStore::new(entries);
        let again = reopened.secret_key("alias", KeyProtection::Software).unwrap();
        assert_eq!(original.as_bytes(), again.as_bytes());
    }

    #[test]
    fn test_hardware_refused_without_support() {
        let (_, store) = store(false);
        assert!(!store.supports(KeyProtection::Hardware));
        let err = store
            .secret_key("alias", KeyProtection::Hardware)
            .expect_err("expected hardware refusal");
        assert_eq!(err.kind, ErrorKind::KeyUnavailable);
    }

    #[test]
    fn test_hardware_and_software_keys_are_distinct() {
        let (_, store) = store(true);
        let soft = store.secret_key("alias", KeyProtection::Software).unwrap();
        let hard = store.secret_key("alias", KeyProtection::Hardware).unwrap();
        assert_ne!(soft.as_bytes(), hard.as_bytes());
    }

    #[test]
    fn test_corrupt_stored_key_is_unavailable() {
        let (entries, store) = store(false);
        entries
            .get_or_insert_with("secret:software:alias", &mut || Ok("AAAA".to_owned()))
            .unwrap();
        let err = store
            .secret_key("alias", KeyProtection::Software)
            .expect_err("expected wrong length error");
        assert_eq!(err.kind, ErrorKind::KeyUnavailable);
    }

    #[test]
    fn test_wrap_unwrap() {
        let (_, store) = store(false);
        let key = SecretKey::generate();

        let wrapped = store.wrap_key("app-wrap", &key).unwrap();
        assert_ne!(&wrapped[..], &key.as_bytes()[..]);
        assert_eq!(wrapped.len(), RSA_BITS / 8);

        let unwrapped = store.unwrap_key("app-wrap", &wrapped).unwrap();
        assert_eq!(unwrapped.as_bytes(), key.as_bytes());
    }

    #[test]
    fn test_unwrap_short_key_is_unavailable() {
        let (_, store) = store(false);
        let private = store.key_pair("app-wrap").unwrap();
        let wrapped = RsaPublicKey::from(&*private)
            .encrypt(&mut OsRng, Oaep::new::<Sha256>(), &[7u8; 16])
            .unwrap();

        let err = store
            .unwrap_key("app-wrap", &wrapped)
            .expect_err("expected wrong length error");
        assert_eq!(err.kind, ErrorKind::KeyUnavailable);
        assert_eq!(err.message(), "unwrapped key has wrong length");
    }

    #[test]
    fn test_unwrap_garbage_is_unavailable() {
        let (_, store) = store(false);
        let err = store
            .unwrap_key("app-wrap", &[0u8; 16])
            .expect_err("expected unwrap failure");
        assert_eq!(err.kind, ErrorKind::KeyUnavailable);
    }
}
