//! Database configuration.

use kindstore_codec::CodecConfig;
use kindstore_engine::StoreConfig;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for opening a database.
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether to create the root (and its parents) if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether open runs one compaction pass over stores that hold data.
    pub compact_on_open: bool,

    /// Where the open-time compaction writes its snapshot.
    ///
    /// `None` uses `<root>.tmp`.
    pub scratch_dir: Option<PathBuf>,

    /// Whether backup blocks every get/put/del for its whole duration.
    pub exclusive_backup: bool,

    /// Options for each per-kind store.
    pub store: StoreConfig,

    /// Buffer pool sizing for the shared codec.
    pub codec: CodecConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            compact_on_open: true,
            scratch_dir: None,
            exclusive_backup: false,
            store: StoreConfig::default(),
            codec: CodecConfig::default(),
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the root if missing.
    #[must_use]
    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether open compacts existing data.
    #[must_use]
    pub fn compact_on_open(mut self, value: bool) -> Self {
        self.compact_on_open = value;
        self
    }

    /// Sets the open-time snapshot location.
    #[must_use]
    pub fn scratch_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(path.into());
        self
    }

    /// Sets whether backup excludes all record operations while it runs.
    #[must_use]
    pub fn exclusive_backup(mut self, value: bool) -> Self {
        self.exclusive_backup = value;
        self
    }

    /// Replaces the store options.
    #[must_use]
    pub fn store(mut self, store: StoreConfig) -> Self {
        self.store = store;
        self
    }

    /// Shorthand for the store sync interval. Zero syncs on every write.
    #[must_use]
    pub fn sync_interval(mut self, interval: Duration) -> Self {
        self.store = self.store.sync_interval(interval);
        self
    }

    /// Replaces the codec pool sizing.
    #[must_use]
    pub fn codec(mut self, codec: CodecConfig) -> Self {
        self.codec = codec;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert!(config.create_if_missing);
        assert!(config.compact_on_open);
        assert!(!config.exclusive_backup);
        assert!(config.scratch_dir.is_none());
        assert_eq!(config.store.sync_interval, Duration::from_secs(1));
    }

    #[test]
    fn builder_chains() {
        let config = Config::new()
            .create_if_missing(false)
            .compact_on_open(false)
            .exclusive_backup(true)
            .scratch_dir("/var/tmp/ks")
            .sync_interval(Duration::ZERO);

        assert!(!config.create_if_missing);
        assert!(!config.compact_on_open);
        assert!(config.exclusive_backup);
        assert_eq!(config.scratch_dir, Some(PathBuf::from("/var/tmp/ks")));
        assert!(config.store.syncs_every_write());
    }
}
