//! Cache operations for get, put and removal
//!
//! None of these return errors: problems are logged and reported as a miss,
//! a `None` writer or `false`.

use std::path::PathBuf;

use url::Url;

use super::super::cache_entry::CacheEntry;
use super::super::cache_key::CacheKey;
use super::super::cached_response::{CachedBody, CachedResponse};
use super::super::identity::{RequestIdentity, ResponseMeta};
use super::core::ResponseCache;
use super::writer::CacheWriter;
use super::{ENTRY_BODY, ENTRY_METADATA};
use crate::error::{CacheError, Result, malformed_entry};
use crate::io::PooledReader;
use crate::journal::JournalStore;
use crate::store::Snapshot;

impl ResponseCache {
    /// Get cached response if available and valid
    pub fn get(&self, request: &RequestIdentity) -> Option<CachedResponse> {
        let store = self.installed_store("get")?;
        let entry = CacheEntry::for_request(self.config.flavor, request);
        let key = entry.key().as_str();

        let Some(mut snapshot) = store.lookup(key) else {
            self.stats.record_miss();
            tracing::debug!(target: "respcache::cache", key, url = %request.url, "cache miss");
            return None;
        };

        let stored = match self.read_metadata(&mut snapshot) {
            Ok(stored) => stored,
            Err(e) => {
                self.stats.record_miss();
                tracing::warn!(target: "respcache::cache", key, error = %e, "unreadable cache entry");
                if self.config.remove_malformed_entries
                    && matches!(e, CacheError::MalformedEntry(_))
                {
                    drop(snapshot);
                    self.remove_key(&store, key);
                }
                return None;
            }
        };

        if stored.key().as_str() != key || !entry.matches(&stored) {
            self.stats.record_miss();
            tracing::debug!(target: "respcache::cache", key, url = %request.url, "stored entry does not match request");
            return None;
        }
        if !stored.can_be_used() {
            self.stats.record_miss();
            tracing::debug!(target: "respcache::cache", key, url = %request.url, "stored entry expired");
            return None;
        }

        let len = snapshot.len(ENTRY_BODY).unwrap_or(0);
        let Some(body) = snapshot.into_stream(ENTRY_BODY) else {
            self.stats.record_miss();
            return None;
        };
        self.stats.record_hit();
        tracing::trace!(target: "respcache::cache", key, url = %request.url, body_len = len, "cache hit");
        Some(stored.into_response(CachedBody::new(body, len, &self.pool)))
    }

    /// Starts storing a response.
    ///
    /// Returns a writer for the body, or `None` when the response may not be
    /// cached, another write for the same request is in progress, or the
    /// metadata cannot be written.
    pub fn put(&self, request: &RequestIdentity, response: &ResponseMeta) -> Option<CacheWriter> {
        let store = self.installed_store("put")?;
        let entry = CacheEntry::for_response(self.config.flavor, request, response);
        if !entry.can_be_cached() {
            tracing::debug!(
                target: "respcache::cache",
                method = %request.method,
                url = %request.url,
                status = response.status.as_u16(),
                "response not cacheable"
            );
            return None;
        }

        let editor = store.begin_edit(entry.key().as_str())?;
        let mut writer = CacheWriter::new(store, editor, std::sync::Arc::clone(&self.stats));
        if let Err(e) = writer.start(&entry, &self.pool) {
            tracing::warn!(
                target: "respcache::cache",
                key = %entry.key(),
                error = %e,
                "cannot write cache metadata"
            );
            return None;
        }
        Some(writer)
    }

    /// Removes the entry stored for a plain GET of `url`.
    pub fn delete_get_entry(&self, url: &str) -> bool {
        let Some(store) = self.installed_store("delete_get_entry") else {
            return false;
        };
        let Some(key) = get_key(url) else {
            return false;
        };
        self.remove_key(&store, key.as_str())
    }

    /// Whether a plain GET of `url` would find a stored entry.
    ///
    /// The stored metadata must decode and match the request. Freshness is
    /// not checked and recency is left unchanged.
    pub fn contains(&self, url: &str) -> bool {
        let Some(store) = self.installed_store("contains") else {
            return false;
        };
        let Some(url) = parse_url(url) else {
            return false;
        };
        let entry = CacheEntry::for_request(self.config.flavor, &RequestIdentity::get(url));
        let key = entry.key().as_str();
        let Some(mut snapshot) = store.peek(key) else {
            return false;
        };
        match self.read_metadata(&mut snapshot) {
            Ok(stored) => stored.key().as_str() == key && entry.matches(&stored),
            Err(e) => {
                tracing::debug!(target: "respcache::cache", key, error = %e, "unreadable cache entry");
                false
            }
        }
    }

    /// Path of the body file stored for a plain GET of `url`.
    pub fn local_path(&self, url: &str) -> Option<PathBuf> {
        let store = self.installed_store("local_path")?;
        let key = get_key(url)?;
        store.local_path(key.as_str(), ENTRY_BODY)
    }

    fn installed_store(&self, operation: &'static str) -> Option<JournalStore> {
        match self.store() {
            Ok(store) => Some(store),
            Err(e) => {
                tracing::error!(target: "respcache::cache", operation, error = %e, "response cache unavailable");
                None
            }
        }
    }

    fn read_metadata(&self, snapshot: &mut Snapshot) -> Result<CacheEntry> {
        match snapshot.stream(ENTRY_METADATA) {
            Some(file) => CacheEntry::read_from(PooledReader::new(file, &self.pool)),
            None => Err(malformed_entry("metadata stream unavailable")),
        }
    }

    fn remove_key(&self, store: &JournalStore, key: &str) -> bool {
        match store.remove(key) {
            Ok(removed) => removed,
            Err(e) => {
                tracing::warn!(target: "respcache::cache", key, error = %e, "cannot remove cache entry");
                false
            }
        }
    }
}

fn get_key(url: &str) -> Option<CacheKey> {
    parse_url(url).map(|url| CacheKey::for_get(&url))
}

fn parse_url(url: &str) -> Option<Url> {
    match Url::parse(url) {
        Ok(url) => Some(url),
        Err(e) => {
            let error = CacheError::from(e);
            tracing::error!(target: "respcache::cache", url, error = %error, "cannot derive cache key");
            None
        }
    }
}
