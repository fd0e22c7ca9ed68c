//! Password-derived key tier
//!
//! A random password is generated once and kept in the preference store.
//! Every message gets a fresh salt; the key is derived from password and salt
//! using scrypt, and the salt becomes the envelope supplement.

use std::sync::Arc;

use base64::{Engine, engine::general_purpose::STANDARD};
use rand::RngCore;
use rand::rngs::OsRng;
use scrypt::{Params, scrypt};
use tracing::debug;
use zeroize::Zeroizing;

use super::{KEY_LEN, KeyBundle, KeyProvider, SecretKey};
use crate::error::{CompatError, Result};
use crate::store::PreferenceStore;

/// Length of salt in bytes
const SALT_LEN: usize = 32;

/// Length of the generated password in random bytes (before base64)
const PASSWORD_LEN: usize = 32;

/// scrypt N parameter (CPU/memory cost)
const SCRYPT_N: u32 = 32768;

/// scrypt r parameter (block size)
const SCRYPT_R: u32 = 8;

/// scrypt p parameter (parallelization)
const SCRYPT_P: u32 = 1;

pub struct PasswordKeyProvider {
    preferences: Arc<dyn PreferenceStore>,
    preference_key: String,
    password: Option<Zeroizing<Vec<u8>>>,
}

impl PasswordKeyProvider {
    pub fn new(preferences: Arc<dyn PreferenceStore>, app_id: &str) -> Self {
        Self {
            preferences,
            preference_key: format!("{}-password", app_id),
            password: None,
        }
    }

    /// Loads the stored password, generating and persisting one on first use.
    fn password(&mut self) -> Result<&[u8]> {
        let password = match self.password.take() {
            Some(password) => password,
            None => {
                let stored = Zeroizing::new(self.preferences.get_or_insert_with(
                    &self.preference_key,
                    &mut || {
                        debug!("generating stored password");
                        let mut bytes = Zeroizing::new([0u8; PASSWORD_LEN]);
                        OsRng.fill_bytes(&mut bytes[..]);
                        Ok(STANDARD.encode(&bytes[..]))
                    },
                )?);
                Zeroizing::new(stored.as_bytes().to_vec())
            }
        };
        Ok(self.password.insert(password).as_slice())
    }

    fn derive_key(&mut self, salt: &[u8]) -> Result<SecretKey> {
        derive_key(self.password()?, salt)
    }
}

/// Derive a 32-byte key from a password and salt using scrypt
fn derive_key(password: &[u8], salt: &[u8]) -> Result<SecretKey> {
    let params = Params::new(
        SCRYPT_N.ilog2() as u8, // log_n
        SCRYPT_R,
        SCRYPT_P,
        KEY_LEN,
    )
    .map_err(|e| CompatError::key_unavailable(format!("invalid scrypt params: {}", e)))?;

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    scrypt(password, salt, &params, &mut key[..])
        .map_err(|e| CompatError::key_unavailable(format!("scrypt key derivation failed: {}", e)))?;

    Ok(SecretKey::from_bytes(*key))
}

impl KeyProvider for PasswordKeyProvider {
    fn encrypt_bundle(&mut self) -> Result<KeyBundle> {
        let mut salt = vec![0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let key = self.derive_key(&salt)?;
        Ok(KeyBundle::new(key, salt))
    }

    fn decrypt_key(&mut self, supplement: &[u8]) -> Result<SecretKey> {
        if supplement.len() != SALT_LEN {
            return Err(CompatError::key_unavailable(format!(
                "salt must be {} bytes, got {}",
                SALT_LEN,
                supplement.len()
            )));
        }
        self.derive_key(supplement)
    }
}
