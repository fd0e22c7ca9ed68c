//! Encryption that uses the strongest key and cipher scheme a platform range
//! supports, while keeping every envelope it ever produced decryptable.

#![forbid(unsafe_code)]

pub mod cipher;
pub mod compat;
pub mod config;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod file_ops;
pub mod key;
pub mod store;
pub mod table;
pub mod tier;

pub use compat::EncryptionCompat;
pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{CompatError, ErrorCategory, ErrorKind, Result};
pub use store::HostServices;
pub use tier::{CipherTier, KeyTier, PlatformRange};
