//! Provider table
//!
//! Ordered maps from tier to provider. Built once per engine from the
//! configuration; a tier without an entry is simply unavailable.

use std::collections::BTreeMap;

use tracing::debug;

use crate::cipher::{CbcHmacCipher, CipherProvider, GcmCipher};
use crate::config::EngineConfig;
use crate::key::{KeyProvider, KeystoreKeyProvider, PasswordKeyProvider, WrappedKeyProvider};
use crate::store::HostServices;
use crate::tier::{CipherTier, KeyTier};

#[derive(Default)]
pub struct ProviderTable {
    keys: BTreeMap<KeyTier, Box<dyn KeyProvider>>,
    ciphers: BTreeMap<CipherTier, Box<dyn CipherProvider>>,
}

impl ProviderTable {
    /// An empty table, to be filled by hand.
    pub fn new() -> Self {
        Self::default()
    }

    /// The table for a configuration: every tier whose platform window
    /// overlaps the configured range, backed by the host services.
    pub fn for_platform(config: &EngineConfig, services: &HostServices) -> Self {
        let mut table = Self::new();
        let app_id = config.app_id.as_str();

        for tier in KeyTier::ALL {
            if !tier.is_available(config.platform, config.hardware_backed) {
                continue;
            }
            let provider: Box<dyn KeyProvider> = match tier {
                KeyTier::Password => Box::new(PasswordKeyProvider::new(
                    services.preferences.clone(),
                    app_id,
                )),
                KeyTier::WrappedKey => {
                    Box::new(WrappedKeyProvider::new(services.key_store.clone(), app_id))
                }
                KeyTier::Keystore => {
                    Box::new(KeystoreKeyProvider::software(services.key_store.clone(), app_id))
                }
                KeyTier::StrongBox => {
                    Box::new(KeystoreKeyProvider::hardware(services.key_store.clone(), app_id))
                }
            };
            table.insert_key_provider(tier, provider);
        }

        for tier in CipherTier::ALL {
            if !tier.is_available(config.platform) {
                continue;
            }
            let provider: Box<dyn CipherProvider> = match tier {
                CipherTier::CbcHmac => Box::new(CbcHmacCipher::new()),
                CipherTier::Gcm => Box::new(GcmCipher::new()),
            };
            table.insert_cipher_provider(tier, provider);
        }

        debug!(
            platform = %config.platform,
            hardware_backed = config.hardware_backed,
            key_tiers = ?table.key_tiers(),
            cipher_tiers = ?table.cipher_tiers(),
            "built provider table"
        );
        table
    }

    /// Adds or replaces the provider for a key tier.
    pub fn insert_key_provider(&mut self, tier: KeyTier, provider: Box<dyn KeyProvider>) {
        self.keys.insert(tier, provider);
    }

    /// Adds or replaces the provider for a cipher tier.
    pub fn insert_cipher_provider(&mut self, tier: CipherTier, provider: Box<dyn CipherProvider>) {
        self.ciphers.insert(tier, provider);
    }

    pub(crate) fn remove_key_provider(&mut self, tier: KeyTier) -> bool {
        self.keys.remove(&tier).is_some()
    }

    pub(crate) fn key_provider(
        &mut self,
        tier: KeyTier,
    ) -> Option<&mut (dyn KeyProvider + 'static)> {
        self.keys.get_mut(&tier).map(|p| p.as_mut())
    }

    pub(crate) fn cipher_provider(&self, tier: CipherTier) -> Option<&dyn CipherProvider> {
        self.ciphers.get(&tier).map(|p| p.as_ref())
    }

    /// The strongest cipher tier present.
    pub(crate) fn highest_cipher(&self) -> Option<CipherTier> {
        self.ciphers.keys().next_back().copied()
    }

    /// Populated key tiers, strongest first.
    pub fn key_tiers(&self) -> Vec<KeyTier> {
        self.keys.keys().rev().copied().collect()
    }

    /// Populated cipher tiers, strongest first.
    pub fn cipher_tiers(&self) -> Vec<CipherTier> {
        self.ciphers.keys().rev().copied().collect()
    }
}
