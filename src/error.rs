use std::error::Error as StdError;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorCategory {
    /// Any failure that cannot be confidently attributed to the caller's
    /// input: key stores refusing requests, storage failures, bugs.
    Internal,

    /// The caller provided input that can never succeed as given, such as a
    /// tampered or truncated envelope, or an invalid configuration.
    User,
}

/// Fine-grained condition flags for consumers that want to branch on error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A single key tier could not create or reconstruct key material.
    KeyUnavailable,
    /// Every key tier failed while encrypting.
    NoKeyAvailable,
    /// The envelope names a key or cipher tier absent from the provider table.
    UnsupportedTier,
    /// Integrity verification failed: wrong key, corruption, or tampering.
    AuthenticationFailed,
    /// The textual envelope could not be decoded or its framing is invalid.
    MalformedEnvelope,
    /// A ciphertext segment violates its cipher's layout.
    MalformedInput,
    /// The engine configuration is not usable.
    InvalidConfig,
    /// Decrypted bytes were requested as text but are not UTF-8.
    InvalidUtf8,
    /// A preference or key store failed to read or persist data.
    Storage,
    /// The serialized worker is no longer running.
    EngineClosed,
    /// Interaction with the filesystem, stdin/stdout, or other I/O failed.
    Io,
    /// Unexpected state reached within the engine.
    InternalInvariant,
}

#[derive(Debug, Error)]
#[error("{msg}")]
pub struct CompatError {
    /// Broad error category, always provided.
    pub category: ErrorCategory,
    /// Specific condition tag.
    pub kind: ErrorKind,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    msg: String,
}

impl CompatError {
    /// Creates a new error tagged with a category and kind.
    pub fn new(category: ErrorCategory, kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self {
            category,
            kind,
            source: None,
            msg: msg.into(),
        }
    }

    /// Creates a new error that retains the originating source error.
    pub fn with_source(
        category: ErrorCategory,
        kind: ErrorKind,
        msg: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            category,
            kind,
            source: Some(Box::new(source)),
            msg: msg.into(),
        }
    }

    pub(crate) fn key_unavailable(msg: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Internal, ErrorKind::KeyUnavailable, msg)
    }

    pub(crate) fn authentication_failed() -> Self {
        Self::new(
            ErrorCategory::User,
            ErrorKind::AuthenticationFailed,
            "corrupt input, tampered-with data, or wrong key",
        )
    }

    pub(crate) fn malformed_input(msg: impl Into<String>) -> Self {
        Self::new(ErrorCategory::User, ErrorKind::MalformedInput, msg)
    }

    pub(crate) fn malformed_envelope(msg: impl Into<String>) -> Self {
        Self::new(ErrorCategory::User, ErrorKind::MalformedEnvelope, msg)
    }

    pub(crate) fn unsupported_tier(msg: impl Into<String>) -> Self {
        Self::new(ErrorCategory::User, ErrorKind::UnsupportedTier, msg)
    }

    pub(crate) fn storage(
        msg: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::with_source(ErrorCategory::Internal, ErrorKind::Storage, msg, source)
    }

    /// The user-facing message carried by the error.
    pub fn message(&self) -> &str {
        &self.msg
    }

    /// Returns the preserved source error if present.
    pub fn source_error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    /// Wraps the current error with a higher-level message while preserving
    /// the original as source. Category and kind carry over.
    pub fn with_context(self, msg: impl Into<String>) -> Self {
        let category = self.category;
        let kind = self.kind;
        Self {
            category,
            kind,
            source: Some(Box::new(self)),
            msg: msg.into(),
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, CompatError>;
