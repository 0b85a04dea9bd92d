//! Densefile global configuration options.

use std::sync::{OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Global configuration options for the densefile crate.
///
/// Retrieve the global [`Config`] with [`global_config`] and modify it with [`global_config_mut`].
///
/// ## Validate Checksums
///  > default: [`true`]
///
/// If enabled, opening a file verifies the CRC32C checksum of its metadata document against the checksum recorded in the superblock.
/// A mismatch is reported as corrupt metadata.
///
/// ## Sync Metadata
///  > default: [`true`]
///
/// If enabled, data and the new metadata document are flushed to the storage device before the superblock is repointed at them.
/// Disabling this trades crash consistency for commit latency.
///
/// ## Parallel Codecs
///  > default: [`true`]
///
/// If enabled, chunks are encoded and decoded concurrently across the [`rayon`] thread pool when an operation touches more than one chunk.
#[derive(Debug)]
pub struct Config {
    validate_checksums: bool,
    sync_metadata: bool,
    parallel_codecs: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            validate_checksums: true,
            sync_metadata: true,
            parallel_codecs: true,
        }
    }
}

impl Config {
    /// Get the [validate checksums](#validate-checksums) configuration.
    #[must_use]
    pub fn validate_checksums(&self) -> bool {
        self.validate_checksums
    }

    /// Set the [validate checksums](#validate-checksums) configuration.
    pub fn set_validate_checksums(&mut self, validate_checksums: bool) {
        self.validate_checksums = validate_checksums;
    }

    /// Get the [sync metadata](#sync-metadata) configuration.
    #[must_use]
    pub fn sync_metadata(&self) -> bool {
        self.sync_metadata
    }

    /// Set the [sync metadata](#sync-metadata) configuration.
    pub fn set_sync_metadata(&mut self, sync_metadata: bool) {
        self.sync_metadata = sync_metadata;
    }

    /// Get the [parallel codecs](#parallel-codecs) configuration.
    #[must_use]
    pub fn parallel_codecs(&self) -> bool {
        self.parallel_codecs
    }

    /// Set the [parallel codecs](#parallel-codecs) configuration.
    pub fn set_parallel_codecs(&mut self, parallel_codecs: bool) {
        self.parallel_codecs = parallel_codecs;
    }
}

static CONFIG: OnceLock<RwLock<Config>> = OnceLock::new();

/// Returns a reference to the global densefile configuration.
///
/// # Panics
/// This function panics if the underlying lock has been poisoned and might panic if the global config is already held by the current thread.
pub fn global_config() -> RwLockReadGuard<'static, Config> {
    CONFIG
        .get_or_init(|| RwLock::new(Config::default()))
        .read()
        .unwrap()
}

/// Returns a mutable reference to the global densefile configuration.
///
/// # Panics
/// This function panics if the underlying lock has been poisoned and might panic if the global config is already held by the current thread.
pub fn global_config_mut() -> RwLockWriteGuard<'static, Config> {
    CONFIG
        .get_or_init(|| RwLock::new(Config::default()))
        .write()
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_parallel_codecs() {
        assert!(global_config().parallel_codecs());
        global_config_mut().set_parallel_codecs(false);
        assert!(!global_config().parallel_codecs());
        global_config_mut().set_parallel_codecs(true);
    }

    #[test]
    fn config_defaults() {
        let config = Config::default();
        assert!(config.validate_checksums());
        assert!(config.sync_metadata());
        assert!(config.parallel_codecs());
    }
}
