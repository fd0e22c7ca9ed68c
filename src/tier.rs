//! Capability tiers and platform version gating
//!
//! Every tier is tagged with the platform version that introduced it, and
//! that tag is what gets written into envelopes. A tier covers the platform
//! window from its own tag up to (excluding) the tag of the tier that
//! supersedes it. The lowest tier's window is open below. `StrongBox` is
//! gated on hardware, so it never supersedes `Keystore`: both windows are
//! open above.

use std::fmt;

/// Inclusive range of platform versions an engine must serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformRange {
    pub min: u32,
    pub max: u32,
}

impl PlatformRange {
    pub fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    /// A range covering exactly one platform version.
    pub fn single(version: u32) -> Self {
        Self::new(version, version)
    }

    pub fn is_empty(&self) -> bool {
        self.min > self.max
    }

    /// Whether the window `[start, end)` overlaps this range. `None` bounds
    /// are unbounded.
    fn overlaps(&self, start: Option<u32>, end: Option<u32>) -> bool {
        let reaches_start = start.is_none_or(|s| self.max >= s);
        let ends_after = end.is_none_or(|e| self.min < e);
        !self.is_empty() && reaches_start && ends_after
    }
}

impl fmt::Display for PlatformRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}

/// Key management schemes, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum KeyTier {
    /// Per-message key derived from a stored password and a random salt.
    Password = 14,
    /// Per-message key wrapped with a stored asymmetric key pair.
    WrappedKey = 18,
    /// Global key held by the protected key store.
    Keystore = 23,
    /// Global key held by hardware-backed protected storage.
    StrongBox = 28,
}

impl KeyTier {
    /// All key tiers in ascending order.
    pub const ALL: [KeyTier; 4] = [
        KeyTier::Password,
        KeyTier::WrappedKey,
        KeyTier::Keystore,
        KeyTier::StrongBox,
    ];

    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|tier| tier.tag() == tag)
    }

    /// Whether this tier belongs in a provider table for `range`. The
    /// hardware predicate gates only `StrongBox`.
    pub fn is_available(self, range: PlatformRange, hardware_backed: bool) -> bool {
        if self == KeyTier::StrongBox && !hardware_backed {
            return false;
        }
        let (start, end) = match self {
            KeyTier::Password => (None, Some(KeyTier::WrappedKey)),
            KeyTier::WrappedKey => (Some(self), Some(KeyTier::Keystore)),
            KeyTier::Keystore | KeyTier::StrongBox => (Some(self), None),
        };
        let start = start.map(|t| u32::from(t.tag()));
        let end = end.map(|t| u32::from(t.tag()));
        range.overlaps(start, end)
    }
}

impl fmt::Display for KeyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KeyTier::Password => "password",
            KeyTier::WrappedKey => "wrapped-key",
            KeyTier::Keystore => "keystore",
            KeyTier::StrongBox => "strongbox",
        };
        write!(f, "{} ({})", name, self.tag())
    }
}

/// Cipher schemes, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum CipherTier {
    /// AES-256-CBC with HMAC-SHA256, encrypt-then-MAC.
    CbcHmac = 14,
    /// AES-256-GCM.
    Gcm = 21,
}

impl CipherTier {
    /// All cipher tiers in ascending order.
    pub const ALL: [CipherTier; 2] = [CipherTier::CbcHmac, CipherTier::Gcm];

    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|tier| tier.tag() == tag)
    }

    pub fn is_available(self, range: PlatformRange) -> bool {
        match self {
            CipherTier::CbcHmac => range.overlaps(None, Some(u32::from(CipherTier::Gcm.tag()))),
            CipherTier::Gcm => range.overlaps(Some(u32::from(self.tag())), None),
        }
    }
}

impl fmt::Display for CipherTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CipherTier::CbcHmac => "aes-cbc-hmac",
            CipherTier::Gcm => "aes-gcm",
        };
        write!(f, "{} ({})", name, self.tag())
    }
}
