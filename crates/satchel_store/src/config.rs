//! Store configuration.

use crate::error::{StoreError, StoreResult};

/// Configuration for opening a record store.
///
/// Every recognized option is an explicit field with a default; the
/// struct is validated once, at [`crate::RecordStore::open`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Passphrase the at-rest encryption key is derived from.
    ///
    /// Never used as raw key material; see
    /// [`satchel_codec::EncryptionKey::derive_from_passphrase`].
    pub encryption_key: String,

    /// Whether the codec's compaction transform is applied.
    pub compression_enabled: bool,

    /// Soft storage quota reported through stats, in megabytes.
    pub max_storage_size_mb: u64,

    /// Whether a due cleanup runs automatically at open.
    pub auto_cleanup: bool,

    /// Age in days beyond which records are purged by cleanup.
    pub cleanup_threshold_days: u32,
}

impl StoreConfig {
    /// Creates a configuration with the given passphrase and defaults for
    /// everything else.
    pub fn new(encryption_key: impl Into<String>) -> Self {
        Self {
            encryption_key: encryption_key.into(),
            compression_enabled: true,
            max_storage_size_mb: 100,
            auto_cleanup: true,
            cleanup_threshold_days: 90,
        }
    }

    /// Sets whether compaction is applied.
    #[must_use]
    pub fn compression_enabled(mut self, value: bool) -> Self {
        self.compression_enabled = value;
        self
    }

    /// Sets the storage quota in megabytes.
    #[must_use]
    pub fn max_storage_size_mb(mut self, value: u64) -> Self {
        self.max_storage_size_mb = value;
        self
    }

    /// Sets whether a due cleanup runs at open.
    #[must_use]
    pub fn auto_cleanup(mut self, value: bool) -> Self {
        self.auto_cleanup = value;
        self
    }

    /// Sets the cleanup age threshold in days.
    #[must_use]
    pub fn cleanup_threshold_days(mut self, value: u32) -> Self {
        self.cleanup_threshold_days = value;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the passphrase is empty or a numeric option is
    /// zero.
    pub fn validate(&self) -> StoreResult<()> {
        if self.encryption_key.is_empty() {
            return Err(StoreError::invalid_config("encryption_key must be set"));
        }
        if self.max_storage_size_mb == 0 {
            return Err(StoreError::invalid_config(
                "max_storage_size_mb must be greater than zero",
            ));
        }
        if self.cleanup_threshold_days == 0 {
            return Err(StoreError::invalid_config(
                "cleanup_threshold_days must be greater than zero",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = StoreConfig::new("secret");
        assert!(config.compression_enabled);
        assert_eq!(config.max_storage_size_mb, 100);
        assert!(config.auto_cleanup);
        assert_eq!(config.cleanup_threshold_days, 90);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_pattern() {
        let config = StoreConfig::new("secret")
            .compression_enabled(false)
            .max_storage_size_mb(10)
            .cleanup_threshold_days(30);

        assert!(!config.compression_enabled);
        assert_eq!(config.max_storage_size_mb, 10);
        assert_eq!(config.cleanup_threshold_days, 30);
    }

    #[test]
    fn empty_passphrase_rejected() {
        assert!(StoreConfig::new("").validate().is_err());
    }

    #[test]
    fn zero_quota_rejected() {
        let config = StoreConfig::new("secret").max_storage_size_mb(0);
        assert!(config.validate().is_err());
    }
}
