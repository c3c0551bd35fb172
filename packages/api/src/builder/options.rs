//! Fluent setters for cache settings

use std::sync::Arc;

use respcache_engine::cache::EntryFlavor;
use respcache_engine::io::BufferPool;

use super::core::ResponseCacheBuilder;

impl ResponseCacheBuilder {
    /// Version of the stored data. Changing it discards existing entries.
    #[must_use]
    pub fn format_version(mut self, version: u32) -> Self {
        self.config.format_version = version;
        self
    }

    /// Maximum total size of stored entries in bytes
    #[must_use]
    pub fn max_size(mut self, bytes: u64) -> Self {
        self.config.max_size_bytes = bytes;
        self
    }

    /// Replay the journal on a background thread during install
    #[must_use]
    pub fn async_recovery(mut self, enabled: bool) -> Self {
        self.config.async_recovery = enabled;
        self
    }

    /// Cacheability rules applied to responses
    #[must_use]
    pub fn flavor(mut self, flavor: EntryFlavor) -> Self {
        self.config.flavor = flavor;
        self
    }

    /// Shorthand for `flavor(EntryFlavor::Permanent)`
    #[must_use]
    pub fn permanent(self) -> Self {
        self.flavor(EntryFlavor::Permanent)
    }

    /// Remove entries with unreadable metadata as soon as they are found
    #[must_use]
    pub fn remove_malformed_entries(mut self, enabled: bool) -> Self {
        self.config.remove_malformed_entries = enabled;
        self
    }

    /// Redundant journal records tolerated before the journal is rewritten
    #[must_use]
    pub fn compaction_threshold(mut self, records: usize) -> Self {
        self.config.compaction_threshold = records;
        self
    }

    /// Size of the buffers used for metadata and body streams
    #[must_use]
    pub fn buffer_size(mut self, bytes: usize) -> Self {
        self.config.buffer_size = bytes;
        self
    }

    /// Share an existing buffer pool instead of creating one
    #[must_use]
    pub fn buffer_pool(mut self, pool: Arc<dyn BufferPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Log the final configuration when building
    #[must_use]
    pub fn debug(mut self) -> Self {
        self.debug_enabled = true;
        self
    }
}
