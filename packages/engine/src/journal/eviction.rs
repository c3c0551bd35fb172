//! Entry removal, LRU trimming and per-generation file handling

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::atomic::Ordering;

use super::index::Committed;
use super::record::Record;
use super::{Shared, State};
use crate::error::Result;
use crate::store::layout::{dirty_path, entry_path};

impl Shared {
    /// Drops the committed generation of `key` and logs a `REMOVE` record.
    ///
    /// Journal write failures are logged; the index change stands.
    pub(super) fn remove_locked(&self, state: &mut State, key: &str) -> Option<Committed> {
        let committed = state.index.take_committed(key)?;
        self.delete_generation_files(key, committed.generation);
        let remove = Record::Remove {
            key: key.to_string(),
        };
        if let Err(e) = self.append(state, &remove) {
            tracing::warn!(target: "respcache::journal", key, error = %e, "cannot record removal");
        }
        Some(committed)
    }

    /// Removes `key` to reclaim space.
    pub(super) fn evict(&self, state: &mut State, key: &str) -> bool {
        let Some(committed) = self.remove_locked(state, key) else {
            return false;
        };
        self.evictions.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            target: "respcache::journal",
            key,
            size = committed.size(),
            "evicted entry"
        );
        true
    }

    /// Evicts least recently used entries until the size limit holds.
    pub(super) fn trim_to_size(&self, state: &mut State) -> usize {
        let mut evicted = 0;
        while state.index.size() > state.max_size {
            let Some(key) = state.index.oldest_committed().map(str::to_string) else {
                break;
            };
            if !self.evict(state, &key) {
                break;
            }
            evicted += 1;
        }
        if evicted > 0 {
            tracing::debug!(
                target: "respcache::journal",
                evicted,
                size = state.index.size(),
                max_size = state.max_size,
                "trimmed cache to size"
            );
        }
        evicted
    }

    /// Ends an edit the store still tracks: removes its files and re-logs
    /// the committed generation, or `REMOVE` when there is none.
    pub(super) fn abort_locked(&self, state: &mut State, key: &str, generation: u64) {
        self.delete_generation_files(key, generation);
        state.index.end_edit(key);
        let record = match state.index.committed(key) {
            Some(committed) => Record::Clean {
                key: key.to_string(),
                generation: committed.generation,
                lengths: committed.lengths.clone(),
            },
            None => Record::Remove {
                key: key.to_string(),
            },
        };
        if let Err(e) = self.append(state, &record) {
            tracing::warn!(target: "respcache::journal", key, error = %e, "cannot record aborted edit");
        }
    }

    /// Whether `generation` is the edit the index has open for `key`.
    pub(super) fn owns_edit(&self, state: &State, key: &str, generation: u64) -> bool {
        state.phase == super::Phase::Ready
            && state.index.get(key).and_then(|entry| entry.editing) == Some(generation)
    }

    /// Renames every dirty stream of `generation` to its committed name.
    ///
    /// Returns the stream lengths. On failure the files already renamed are
    /// left for the caller's abort to delete.
    pub(super) fn publish_generation(&self, key: &str, generation: u64) -> Result<Vec<u64>> {
        (0..self.stream_count())
            .map(|stream| {
                let dirty = dirty_path(&self.directory, key, generation, stream);
                let clean = entry_path(&self.directory, key, generation, stream);
                fs::rename(&dirty, &clean)?;
                Ok(fs::metadata(&clean)?.len())
            })
            .collect()
    }

    /// Deletes the committed and dirty files of one generation.
    pub(super) fn delete_generation_files(&self, key: &str, generation: u64) {
        for stream in 0..self.stream_count() {
            remove_quietly(&entry_path(&self.directory, key, generation, stream));
            remove_quietly(&dirty_path(&self.directory, key, generation, stream));
        }
    }
}

fn remove_quietly(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(
                target: "respcache::io",
                path = %path.display(),
                error = %e,
                "cannot delete cache file"
            );
        }
    }
}
