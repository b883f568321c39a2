//! Store configuration.

use std::time::Duration;

/// Options applied to every store opened with them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// How often the background flusher syncs dirty stores.
    ///
    /// `Duration::ZERO` syncs on every write instead.
    pub sync_interval: Duration,

    /// Whether reads re-check each record's CRC.
    pub verify_checksums: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(1),
            verify_checksums: true,
        }
    }
}

impl StoreConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the background sync interval.
    #[must_use]
    pub const fn sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Sets whether reads verify checksums.
    #[must_use]
    pub const fn verify_checksums(mut self, value: bool) -> Self {
        self.verify_checksums = value;
        self
    }

    /// Returns true when every write is synced before it returns.
    #[must_use]
    pub fn syncs_every_write(&self) -> bool {
        self.sync_interval.is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_flushes_in_background() {
        let config = StoreConfig::default();
        assert_eq!(config.sync_interval, Duration::from_secs(1));
        assert!(!config.syncs_every_write());
        assert!(config.verify_checksums);
    }

    #[test]
    fn zero_interval_syncs_each_write() {
        let config = StoreConfig::new().sync_interval(Duration::ZERO);
        assert!(config.syncs_every_write());
    }
}
