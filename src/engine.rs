//! The encryption engine
//!
//! Encryption always uses the strongest cipher tier in the table and the
//! strongest key tier that can currently produce key material. A key tier
//! that fails is dropped from the table for the rest of the engine's life, so
//! a broken key store is only probed once. Decryption is driven entirely by
//! the tags inside the envelope and never falls back.

use tracing::{debug, error, warn};
use zeroize::{Zeroize, Zeroizing};

use crate::config::EngineConfig;
use crate::envelope;
use crate::error::{CompatError, ErrorCategory, ErrorKind, Result};
use crate::key::KeyBundle;
use crate::store::HostServices;
use crate::table::ProviderTable;
use crate::tier::{CipherTier, KeyTier};

pub struct Engine {
    table: ProviderTable,
}

impl Engine {
    /// Validates `config` and builds the provider table it calls for.
    pub fn new(config: &EngineConfig, services: &HostServices) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_table(ProviderTable::for_platform(config, services)))
    }

    /// An engine over a prepared table.
    pub fn with_table(table: ProviderTable) -> Self {
        Self { table }
    }

    /// Encrypts `plaintext` into a base64 envelope. Empty input yields an
    /// empty string rather than an envelope.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<String> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        let cipher_tier = self
            .table
            .highest_cipher()
            .ok_or_else(|| CompatError::unsupported_tier("no cipher tier available"))?;
        let (key_tier, bundle) = self.select_key()?;

        let cipher = self.table.cipher_provider(cipher_tier).ok_or_else(|| {
            CompatError::new(
                ErrorCategory::Internal,
                ErrorKind::InternalInvariant,
                format!("cipher tier {} vanished from the table", cipher_tier),
            )
        })?;
        let aad =
            envelope::header_bytes(key_tier.tag(), cipher_tier.tag(), &bundle.supplement)?;
        let segment = cipher.encrypt(&bundle.key, plaintext, &aad)?;

        debug!(key_tier = %key_tier, cipher_tier = %cipher_tier, "encrypted message");
        envelope::assemble(
            key_tier.tag(),
            cipher_tier.tag(),
            &bundle.supplement,
            &segment,
        )
    }

    /// Walks the key tiers from strongest to weakest, dropping every tier
    /// that fails along the way.
    fn select_key(&mut self) -> Result<(KeyTier, KeyBundle)> {
        for tier in self.table.key_tiers() {
            let Some(provider) = self.table.key_provider(tier) else {
                continue;
            };
            match provider.encrypt_bundle() {
                Ok(bundle) => return Ok((tier, bundle)),
                Err(err) => {
                    warn!(
                        key_tier = %tier,
                        error = %err,
                        "key tier failed, removing it and falling back"
                    );
                    self.table.remove_key_provider(tier);
                }
            }
        }

        error!("no key tier could produce a key");
        Err(CompatError::new(
            ErrorCategory::Internal,
            ErrorKind::NoKeyAvailable,
            "no key tier could produce a key",
        ))
    }

    /// Decrypts a base64 envelope. Empty input yields empty output.
    pub fn decrypt(&mut self, encoded: &str) -> Result<Zeroizing<Vec<u8>>> {
        if encoded.is_empty() {
            return Ok(Zeroizing::new(Vec::new()));
        }

        let envelope = envelope::disassemble(encoded)?;
        let key_tier = KeyTier::from_tag(envelope.key_tier).ok_or_else(|| {
            CompatError::unsupported_tier(format!("unknown key tier {}", envelope.key_tier))
        })?;
        let cipher_tier = CipherTier::from_tag(envelope.cipher_tier).ok_or_else(|| {
            CompatError::unsupported_tier(format!("unknown cipher tier {}", envelope.cipher_tier))
        })?;
        if self.table.cipher_provider(cipher_tier).is_none() {
            return Err(CompatError::unsupported_tier(format!(
                "cipher tier {} is not available",
                cipher_tier
            )));
        }

        let key = self
            .table
            .key_provider(key_tier)
            .ok_or_else(|| {
                CompatError::unsupported_tier(format!("key tier {} is not available", key_tier))
            })?
            .decrypt_key(&envelope.supplement)?;

        let cipher = self.table.cipher_provider(cipher_tier).ok_or_else(|| {
            CompatError::unsupported_tier(format!("cipher tier {} is not available", cipher_tier))
        })?;
        cipher.decrypt(&key, &envelope.segment, &envelope.header()?)
    }

    pub fn encrypt_str(&mut self, plaintext: &str) -> Result<String> {
        self.encrypt(plaintext.as_bytes())
    }

    /// Like [`Engine::decrypt`], but the plaintext must be UTF-8.
    pub fn decrypt_str(&mut self, encoded: &str) -> Result<String> {
        into_utf8(self.decrypt(encoded)?)
    }

    /// Key tiers still in the table, strongest first.
    pub fn key_tiers(&self) -> Vec<KeyTier> {
        self.table.key_tiers()
    }

    /// Cipher tiers in the table, strongest first.
    pub fn cipher_tiers(&self) -> Vec<CipherTier> {
        self.table.cipher_tiers()
    }
}

/// Converts decrypted bytes to text. Invalid bytes are wiped before the
/// error is returned.
pub(crate) fn into_utf8(mut plaintext: Zeroizing<Vec<u8>>) -> Result<String> {
    String::from_utf8(std::mem::take(&mut *plaintext)).map_err(|e| {
        let mut bytes = e.into_bytes();
        bytes.zeroize();
        CompatError::new(
            ErrorCategory::User,
            ErrorKind::InvalidUtf8,
            "decrypted data is not valid UTF-8",
        )
    })
}
