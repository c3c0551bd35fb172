//! Core ResponseCache structure and initialization
//!
//! The cache owns an optional journal store behind a read/write lock: the
//! store is present between `install` and teardown, and every operation
//! works on a clone of it.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::super::{cache_config::CacheConfig, cache_stats::CacheStats};
use crate::error::{CacheError, Result};
use crate::io::{BufferPool, SharedBufferPool};
use crate::journal::JournalStore;

/// Disk-backed HTTP response cache
pub struct ResponseCache {
    /// Configuration
    pub(super) config: CacheConfig,
    /// Installed journal store
    pub(super) store: RwLock<Option<JournalStore>>,
    /// Buffers for metadata and body streams
    pub(super) pool: Arc<dyn BufferPool>,
    /// Cache statistics
    pub(super) stats: Arc<CacheStats>,
}

impl ResponseCache {
    /// Create an uninstalled cache with configuration and a buffer pool
    pub fn new(config: CacheConfig, pool: Arc<dyn BufferPool>) -> Self {
        Self {
            config,
            store: RwLock::new(None),
            pool,
            stats: Arc::new(CacheStats::new()),
        }
    }

    /// Create an uninstalled cache with its own buffer pool
    pub fn with_config(config: CacheConfig) -> Self {
        let pool = Arc::new(SharedBufferPool::with_buffer_size(config.buffer_size));
        Self::new(config, pool)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Get cache statistics
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn buffer_pool(&self) -> &Arc<dyn BufferPool> {
        &self.pool
    }

    /// Total size of stored entries, 0 when not installed
    pub fn size(&self) -> u64 {
        self.store().map_or(0, |store| store.size())
    }

    /// Number of stored entries, 0 when not installed
    pub fn entry_count(&self) -> usize {
        self.store().map_or(0, |store| store.len())
    }

    /// Entries evicted since install
    pub fn evictions(&self) -> u64 {
        self.store().map_or(0, |store| store.evictions())
    }

    /// The installed store, or `NotInstalled`.
    pub(super) fn store(&self) -> Result<JournalStore> {
        self.read_slot().clone().ok_or(CacheError::NotInstalled)
    }

    pub(super) fn read_slot(&self) -> RwLockReadGuard<'_, Option<JournalStore>> {
        self.store.read().unwrap_or_else(|poisoned| {
            tracing::warn!(target: "respcache::cache", "store lock poisoned, continuing");
            poisoned.into_inner()
        })
    }

    pub(super) fn write_slot(&self) -> RwLockWriteGuard<'_, Option<JournalStore>> {
        self.store.write().unwrap_or_else(|poisoned| {
            tracing::warn!(target: "respcache::cache", "store lock poisoned, continuing");
            poisoned.into_inner()
        })
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("config", &self.config)
            .field("installed", &self.read_slot().is_some())
            .finish_non_exhaustive()
    }
}
