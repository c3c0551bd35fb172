//! Installation and teardown

use std::path::PathBuf;

use super::ENTRY_STREAM_COUNT;
use super::core::ResponseCache;
use crate::error::{CacheError, Result};
use crate::journal::{JournalOptions, JournalStore};

impl ResponseCache {
    /// Opens (or creates) the cache in `directory`.
    ///
    /// A different `format_version` than the one on disk discards the old
    /// entries. Installing again replaces and closes the previous store.
    pub fn install(
        &self,
        directory: impl Into<PathBuf>,
        format_version: u32,
        max_size: u64,
        allow_async_recovery: bool,
    ) -> Result<()> {
        let directory = directory.into();
        let options = JournalOptions::new(format_version, ENTRY_STREAM_COUNT, max_size)
            .async_recovery(allow_async_recovery)
            .compaction_threshold(self.config.compaction_threshold);
        let store = JournalStore::open(&directory, options)?;

        let previous = self.write_slot().replace(store);
        if let Some(previous) = previous
            && let Err(e) = previous.close()
        {
            tracing::warn!(target: "respcache::cache", error = %e, "cannot close replaced cache store");
        }
        tracing::info!(
            target: "respcache::cache",
            directory = %directory.display(),
            format_version,
            max_size,
            "response cache installed"
        );
        Ok(())
    }

    /// Installs from the configuration, logging failures.
    pub fn on_install(&self) {
        let config = &self.config;
        let installed = config.validate().and_then(|()| {
            self.install(
                &config.directory,
                config.format_version,
                config.max_size_bytes,
                config.async_recovery,
            )
        });
        if let Err(e) = installed {
            tracing::error!(
                target: "respcache::cache",
                directory = %config.directory.display(),
                error = %e,
                "cannot install response cache"
            );
        }
    }

    /// Closes the cache, logging failures.
    pub fn on_teardown(&self) {
        if let Err(e) = self.close() {
            tracing::error!(target: "respcache::cache", error = %e, "cannot close response cache");
        }
    }

    /// Flushes and closes the store. Closing an uninstalled cache is a no-op.
    pub fn close(&self) -> Result<()> {
        let Some(store) = self.write_slot().take() else {
            return Ok(());
        };
        store.close()?;
        tracing::debug!(target: "respcache::cache", "response cache closed");
        Ok(())
    }

    /// Closes the store and removes the cache directory.
    pub fn delete(&self) -> Result<()> {
        let store = self.write_slot().take().ok_or(CacheError::NotInstalled)?;
        store.delete()?;
        tracing::info!(
            target: "respcache::cache",
            directory = %store.directory().display(),
            "response cache deleted"
        );
        Ok(())
    }

    pub fn is_installed(&self) -> bool {
        self.read_slot().is_some()
    }

    /// Changes the size limit of the installed store.
    pub fn set_max_size(&self, max_size: u64) -> Result<()> {
        self.store()?.set_max_size(max_size)
    }
}
