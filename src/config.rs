//! Engine configuration

use crate::error::{CompatError, ErrorCategory, ErrorKind, Result};
use crate::tier::PlatformRange;

/// What an engine must support and under which identity it stores secrets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Namespace for stored passwords and key aliases.
    pub app_id: String,
    /// Platform versions every produced envelope must stay decryptable on.
    pub platform: PlatformRange,
    /// Whether hardware-backed key storage may be used.
    pub hardware_backed: bool,
}

impl EngineConfig {
    pub fn new(app_id: impl Into<String>, platform: PlatformRange) -> Self {
        Self {
            app_id: app_id.into(),
            platform,
            hardware_backed: false,
        }
    }

    pub fn with_hardware_backed(mut self, hardware_backed: bool) -> Self {
        self.hardware_backed = hardware_backed;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.app_id.is_empty() {
            return Err(CompatError::new(
                ErrorCategory::User,
                ErrorKind::InvalidConfig,
                "application id must not be empty",
            ));
        }
        if self.platform.is_empty() {
            return Err(CompatError::new(
                ErrorCategory::User,
                ErrorKind::InvalidConfig,
                format!(
                    "platform range {} is empty: minimum exceeds maximum",
                    self.platform
                ),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_software_keys() {
        let config = EngineConfig::new("app", PlatformRange::new(14, 28));
        assert!(!config.hardware_backed);
        assert!(config.with_hardware_backed(true).hardware_backed);
    }

    #[test]
    fn test_valid() {
        EngineConfig::new("app", PlatformRange::single(23)).validate().unwrap();
    }

    #[test]
    fn test_inverted_range() {
        let err = EngineConfig::new("app", PlatformRange::new(28, 23))
            .validate()
            .expect_err("expected invalid config");
        assert_eq!(err.kind, ErrorKind::InvalidConfig);
    }

    #[test]
    fn test_empty_app_id() {
        let err = EngineConfig::new("", PlatformRange::new(14, 28))
            .validate()
            .expect_err("expected invalid config");
        assert_eq!(err.kind, ErrorKind::InvalidConfig);
    }
}
