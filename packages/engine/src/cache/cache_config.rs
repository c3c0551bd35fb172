//! Cache configuration and preset policies
//!
//! Provides `CacheConfig` for the on-disk location, size limit, recovery
//! mode and entry flavor of a response cache.

use std::path::PathBuf;

use super::cache_entry::EntryFlavor;
use crate::error::{Result, invalid_config};
use crate::io::DEFAULT_BUFFER_SIZE;
use crate::journal::DEFAULT_COMPACTION_THRESHOLD;

/// Smallest buffer accepted for pooled streams
const MIN_BUFFER_SIZE: usize = 512;

/// Cache configuration and limits
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Directory holding the journal and entry files
    pub directory: PathBuf,
    /// Version of the stored data; changing it discards the cache
    pub format_version: u32,
    /// Maximum total size of stored entries in bytes
    pub max_size_bytes: u64,
    /// Replay the journal on a background thread during install
    pub async_recovery: bool,
    /// Cacheability rules for stored entries
    pub flavor: EntryFlavor,
    /// Remove entries whose metadata cannot be decoded instead of leaving
    /// them for eviction
    pub remove_malformed_entries: bool,
    /// Redundant journal records tolerated before a rewrite
    pub compaction_threshold: usize,
    /// Size of pooled stream buffers
    pub buffer_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: std::env::temp_dir().join("respcache"),
            format_version: 1,
            max_size_bytes: 50 * 1024 * 1024, // 50MB
            async_recovery: false,
            flavor: EntryFlavor::Http,
            remove_malformed_entries: false,
            compaction_threshold: DEFAULT_COMPACTION_THRESHOLD,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl CacheConfig {
    /// Default configuration rooted at `directory`
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ..Self::default()
        }
    }

    /// Create aggressive caching configuration
    #[must_use]
    pub fn aggressive(directory: impl Into<PathBuf>) -> Self {
        Self {
            max_size_bytes: 500 * 1024 * 1024, // 500MB
            async_recovery: true,
            flavor: EntryFlavor::Permanent,
            buffer_size: 64 * 1024,
            ..Self::new(directory)
        }
    }

    /// Create conservative caching configuration
    #[must_use]
    pub fn conservative(directory: impl Into<PathBuf>) -> Self {
        Self {
            max_size_bytes: 10 * 1024 * 1024, // 10MB
            remove_malformed_entries: true,
            compaction_threshold: 500,
            buffer_size: 4 * 1024,
            ..Self::new(directory)
        }
    }

    /// Rejects values the cache cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.directory.as_os_str().is_empty() {
            return Err(invalid_config("directory must not be empty"));
        }
        if self.max_size_bytes == 0 {
            return Err(invalid_config("max_size_bytes must be greater than 0"));
        }
        if self.compaction_threshold == 0 {
            return Err(invalid_config("compaction_threshold must be greater than 0"));
        }
        if self.buffer_size < MIN_BUFFER_SIZE {
            return Err(invalid_config(format!(
                "buffer_size must be at least {MIN_BUFFER_SIZE} bytes"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_are_valid() {
        assert!(CacheConfig::default().validate().is_ok());
        assert!(CacheConfig::aggressive("/tmp/a").validate().is_ok());
        assert!(CacheConfig::conservative("/tmp/c").validate().is_ok());
        assert_eq!(CacheConfig::aggressive("/tmp/a").flavor, EntryFlavor::Permanent);
    }

    #[test]
    fn bad_values_are_rejected() {
        let config = CacheConfig {
            max_size_bytes: 0,
            ..CacheConfig::new("/tmp/x")
        };
        assert!(config.validate().is_err());

        let config = CacheConfig {
            buffer_size: 16,
            ..CacheConfig::new("/tmp/x")
        };
        assert!(config.validate().is_err());
        assert!(CacheConfig::new("").validate().is_err());
    }
}
