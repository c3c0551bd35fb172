//! Core `ResponseCacheBuilder` structure and build step
//!
//! Collects a [`CacheConfig`] and an optional buffer pool, then validates,
//! constructs and installs a [`ResponseCache`] in one call.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use respcache_engine::cache::{CacheConfig, ResponseCache};
use respcache_engine::error::Result;
use respcache_engine::io::{BufferPool, SharedBufferPool};

/// Fluent builder for an installed [`ResponseCache`]
#[derive(Clone)]
pub struct ResponseCacheBuilder {
    /// Configuration being built
    pub(crate) config: CacheConfig,
    /// Buffer pool shared with other components, if any
    pub(crate) pool: Option<Arc<dyn BufferPool>>,
    /// Debug logging enabled flag
    pub(crate) debug_enabled: bool,
}

impl ResponseCacheBuilder {
    /// Start building a cache stored in `directory`
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self::from_config(CacheConfig::new(directory))
    }

    /// Start from an existing configuration, such as a preset
    #[must_use]
    pub fn from_config(config: CacheConfig) -> Self {
        Self {
            config,
            pool: None,
            debug_enabled: false,
        }
    }

    /// Configuration as currently set
    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Validate the configuration, create the cache and install it.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for rejected settings, or the error raised
    /// while opening the cache directory.
    pub fn build(self) -> Result<ResponseCache> {
        self.config.validate()?;
        let pool = self.pool.unwrap_or_else(|| {
            Arc::new(SharedBufferPool::with_buffer_size(self.config.buffer_size))
        });
        let config = self.config;

        if self.debug_enabled {
            tracing::debug!(
                target: "respcache::builder",
                directory = %config.directory.display(),
                format_version = config.format_version,
                max_size_bytes = config.max_size_bytes,
                async_recovery = config.async_recovery,
                flavor = ?config.flavor,
                "building response cache"
            );
        }

        let cache = ResponseCache::new(config, pool);
        let config = cache.config();
        cache.install(
            &config.directory,
            config.format_version,
            config.max_size_bytes,
            config.async_recovery,
        )?;
        Ok(cache)
    }
}

impl fmt::Debug for ResponseCacheBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseCacheBuilder")
            .field("config", &self.config)
            .field("custom_pool", &self.pool.is_some())
            .field("debug_enabled", &self.debug_enabled)
            .finish()
    }
}
