//! Host services consumed by key providers
//!
//! Key tiers persist their secrets through two narrow interfaces: a small
//! per-application key/value store, and a protected key store that can
//! generate-or-fetch symmetric keys by alias and wrap/unwrap keys under a
//! stored asymmetric key pair. Implementations must be safe to share between
//! engines, and every "get-or-create" must be idempotent: an existing secret
//! is never regenerated or overwritten.

mod keystore;
mod preferences;

pub use keystore::SoftwareKeyStore;
pub use preferences::{FilePreferences, MemoryPreferences};

use std::sync::Arc;

use crate::error::Result;
use crate::key::SecretKey;

/// Persistent key/value store scoped to one application identity.
pub trait PreferenceStore: Send + Sync {
    /// Returns the stored value for `key`, if any.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Returns the stored value for `key`, calling `init` and persisting its
    /// result only when no value exists yet. `init` runs at most once per
    /// missing key even with concurrent callers.
    fn get_or_insert_with(
        &self,
        key: &str,
        init: &mut dyn FnMut() -> Result<String>,
    ) -> Result<String>;

    /// Removes `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

/// Where a protected key must live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyProtection {
    Software,
    Hardware,
}

impl KeyProtection {
    fn label(self) -> &'static str {
        match self {
            KeyProtection::Software => "software",
            KeyProtection::Hardware => "hardware",
        }
    }
}

/// Protected storage for long-lived key material.
pub trait ProtectedKeyStore: Send + Sync {
    /// Whether keys with `protection` can be created by this store.
    fn supports(&self, protection: KeyProtection) -> bool;

    /// Fetches the symmetric key stored under `alias`, generating it on first
    /// use. Fails with `KeyUnavailable` if the protection is unsupported.
    fn secret_key(&self, alias: &str, protection: KeyProtection) -> Result<SecretKey>;

    /// Wraps `key` with the public half of the key pair stored under `alias`,
    /// generating the pair on first use.
    fn wrap_key(&self, alias: &str, key: &SecretKey) -> Result<Vec<u8>>;

    /// Reverses [`ProtectedKeyStore::wrap_key`]. Fails with `KeyUnavailable`
    /// if the blob does not unwrap to a key under the stored pair.
    fn unwrap_key(&self, alias: &str, wrapped: &[u8]) -> Result<SecretKey>;
}

/// The collaborators an engine needs from its host.
#[derive(Clone)]
pub struct HostServices {
    pub preferences: Arc<dyn PreferenceStore>,
    pub key_store: Arc<dyn ProtectedKeyStore>,
}

impl HostServices {
    pub fn new(
        preferences: Arc<dyn PreferenceStore>,
        key_store: Arc<dyn ProtectedKeyStore>,
    ) -> Self {
        Self {
            preferences,
            key_store,
        }
    }

    /// In-memory services; secrets live as long as the returned value.
    ///
    /// `hardware` controls whether the key store accepts hardware-backed key
    /// requests.
    pub fn in_memory(hardware: bool) -> Self {
        let preferences: Arc<dyn PreferenceStore> = Arc::new(MemoryPreferences::new());
        let key_store = Arc::new(
            SoftwareKeyStore::new(Arc::new(MemoryPreferences::new())).with_hardware(hardware),
        );
        Self::new(preferences, key_store)
    }
}
