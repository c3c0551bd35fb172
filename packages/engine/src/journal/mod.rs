//! Journal store: the durable index behind the disk cache
//!
//! The journal is an append-only text log of `DIRTY`, `CLEAN`, `REMOVE` and
//! `READ` records. Replaying it on open rebuilds an in-memory [`Index`] that
//! maps each key to its committed generation, stream lengths and recency.
//! One mutex guards the index, the journal writer and size accounting, so
//! commits, removals and evictions are serialized while snapshot reads and
//! editor writes proceed on their own file handles.
//!
//! - `record`: journal header and record lines
//! - `index`: key map, LRU order and size accounting
//! - `recovery`: replay, rebuild from the directory listing, garbage collection
//! - `compaction`: appends and journal rewrites
//! - `eviction`: removal and LRU trimming

mod compaction;
mod eviction;
pub(crate) mod index;
pub(crate) mod record;
mod recovery;

use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use self::index::{Committed, Index};
use self::record::{Header, Record};
use crate::error::{CacheError, Result, invalid_config};
use crate::store::layout::{self, entry_path, shard_dir, validate_key};
use crate::store::{Editor, Snapshot};

/// Rewrite the journal once this many records are redundant
pub const DEFAULT_COMPACTION_THRESHOLD: usize = 2000;

/// Settings for [`JournalStore::open`]
#[derive(Debug, Clone)]
pub struct JournalOptions {
    /// Version of the data stored in the entries; a mismatch wipes the cache
    pub app_version: u32,
    /// Number of streams per entry
    pub stream_count: usize,
    /// Upper bound for the sum of all committed stream lengths
    pub max_size: u64,
    /// Replay the journal on a background thread
    pub async_recovery: bool,
    /// Redundant record count that triggers a journal rewrite
    pub compaction_threshold: usize,
}

impl JournalOptions {
    #[must_use]
    pub fn new(app_version: u32, stream_count: usize, max_size: u64) -> Self {
        Self {
            app_version,
            stream_count,
            max_size,
            async_recovery: false,
            compaction_threshold: DEFAULT_COMPACTION_THRESHOLD,
        }
    }

    #[must_use]
    pub fn async_recovery(mut self, enabled: bool) -> Self {
        self.async_recovery = enabled;
        self
    }

    #[must_use]
    pub fn compaction_threshold(mut self, records: usize) -> Self {
        self.compaction_threshold = records;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.stream_count == 0 {
            return Err(invalid_config("stream_count must be greater than 0"));
        }
        if self.max_size == 0 {
            return Err(invalid_config("max_size must be greater than 0"));
        }
        Ok(())
    }
}

/// Result of a successful commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitSummary {
    pub key: String,
    pub generation: u64,
    pub lengths: Vec<u64>,
    /// False when the new generation was evicted by the commit itself
    pub retained: bool,
    /// Entries evicted to get back under the size limit
    pub evicted: usize,
}

impl CommitSummary {
    pub fn size(&self) -> u64 {
        self.lengths
            .iter()
            .fold(0, |total, &length| total.saturating_add(length))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Recovering,
    Ready,
    Closed,
}

pub(crate) struct State {
    pub(crate) phase: Phase,
    pub(crate) index: Index,
    pub(crate) writer: Option<BufWriter<File>>,
    pub(crate) max_size: u64,
    pub(crate) next_generation: u64,
    /// Records in the journal body since the last rewrite
    pub(crate) journal_records: usize,
}

pub(crate) struct Shared {
    directory: PathBuf,
    header: Header,
    compaction_threshold: usize,
    state: Mutex<State>,
    evictions: AtomicU64,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| {
            tracing::warn!(
                target: "respcache::journal",
                directory = %self.directory.display(),
                "journal lock poisoned, continuing with inner state"
            );
            poisoned.into_inner()
        })
    }

    /// Locks the state, finishing recovery first if it is still pending.
    fn ready(&self) -> Result<MutexGuard<'_, State>> {
        let mut state = self.lock();
        match state.phase {
            Phase::Ready => Ok(state),
            Phase::Closed => Err(CacheError::Closed),
            Phase::Recovering => {
                self.recover_or_reset(&mut state)?;
                Ok(state)
            }
        }
    }

    fn stream_count(&self) -> usize {
        self.header.stream_count
    }
}

/// Size-bounded, crash-safe store of multi-stream entries.
///
/// Cloning is cheap; every clone refers to the same journal.
#[derive(Clone)]
pub struct JournalStore {
    shared: Arc<Shared>,
}

impl JournalStore {
    /// Opens the store in `directory`, creating it if needed.
    ///
    /// A missing journal, or one written with another app version or stream
    /// count, starts an empty cache. A journal damaged in the middle is
    /// rebuilt from the files on disk; `CorruptJournal` is returned only when
    /// that scan fails too.
    pub fn open(directory: impl Into<PathBuf>, options: JournalOptions) -> Result<Self> {
        options.validate()?;
        let directory = directory.into();
        fs::create_dir_all(&directory)?;

        let shared = Arc::new(Shared {
            directory,
            header: Header {
                app_version: options.app_version,
                stream_count: options.stream_count,
            },
            compaction_threshold: options.compaction_threshold,
            state: Mutex::new(State {
                phase: Phase::Recovering,
                index: Index::new(),
                writer: None,
                max_size: options.max_size,
                next_generation: 1,
                journal_records: 0,
            }),
            evictions: AtomicU64::new(0),
        });

        if options.async_recovery {
            let background = Arc::clone(&shared);
            let spawned = thread::Builder::new()
                .name("respcache-recovery".to_string())
                .spawn(move || {
                    let mut state = background.lock();
                    if state.phase == Phase::Recovering
                        && let Err(e) = background.recover_or_reset(&mut state)
                    {
                        tracing::error!(
                            target: "respcache::journal",
                            directory = %background.directory.display(),
                            error = %e,
                            "background journal recovery failed"
                        );
                    }
                });
            if let Err(e) = spawned {
                tracing::warn!(
                    target: "respcache::journal",
                    error = %e,
                    "cannot spawn recovery thread, recovering inline"
                );
                let mut state = shared.lock();
                shared.recover_or_reset(&mut state)?;
            }
        } else {
            let mut state = shared.lock();
            shared.recover(&mut state)?;
        }

        Ok(Self { shared })
    }

    /// Returns a snapshot of the committed generation of `key`.
    ///
    /// Bumps the entry's recency. The snapshot's files stay readable even if
    /// the key is overwritten or evicted afterwards.
    pub fn lookup(&self, key: &str) -> Option<Snapshot> {
        self.open_snapshot(key, true)
    }

    /// Like [`lookup`](Self::lookup) but leaves recency and the journal alone.
    pub fn peek(&self, key: &str) -> Option<Snapshot> {
        self.open_snapshot(key, false)
    }

    fn open_snapshot(&self, key: &str, bump: bool) -> Option<Snapshot> {
        if validate_key(key).is_err() {
            tracing::debug!(target: "respcache::journal", key, "lookup with invalid key");
            return None;
        }
        let mut state = match self.shared.ready() {
            Ok(state) => state,
            Err(e) => {
                tracing::debug!(target: "respcache::journal", key, error = %e, "lookup on unavailable journal");
                return None;
            }
        };

        let committed = state.index.committed(key)?.clone();
        let mut streams = Vec::with_capacity(committed.lengths.len());
        for stream in 0..committed.lengths.len() {
            let path = entry_path(&self.shared.directory, key, committed.generation, stream);
            match File::open(&path) {
                Ok(file) => streams.push(file),
                Err(e) => {
                    tracing::warn!(
                        target: "respcache::journal",
                        key,
                        path = %path.display(),
                        error = %e,
                        "cache entry file unreadable, dropping entry"
                    );
                    self.shared.remove_locked(&mut state, key);
                    return None;
                }
            }
        }

        if bump {
            state.index.touch(key);
            let read = Record::Read {
                key: key.to_string(),
            };
            if let Err(e) = self.shared.append(&mut state, &read) {
                tracing::warn!(target: "respcache::journal", key, error = %e, "cannot record read");
            }
            self.shared.compact_if_needed(&mut state);
        }
        drop(state);

        Some(Snapshot::new(
            self.clone(),
            key.to_string(),
            committed.generation,
            streams,
            committed.lengths,
        ))
    }

    /// Opens an editor for `key`, or `None` while another editor for the key
    /// is open or the store is unavailable.
    pub fn begin_edit(&self, key: &str) -> Option<Editor> {
        match self.edit(key) {
            Ok(editor) => Some(editor),
            Err(CacheError::EditorInFlight(_)) => {
                tracing::debug!(target: "respcache::journal", key, "editor already in flight");
                None
            }
            Err(e) => {
                tracing::debug!(target: "respcache::journal", key, error = %e, "cannot open editor");
                None
            }
        }
    }

    /// Opens an editor for `key`.
    ///
    /// Fails with `EditorInFlight` while another editor for the key is open.
    pub fn edit(&self, key: &str) -> Result<Editor> {
        match self.open_editor(key, None)? {
            Some(editor) => Ok(editor),
            None => Err(CacheError::EditorInFlight(key.to_string())),
        }
    }

    /// Opens an editor only if `generation` is still the committed one.
    pub(crate) fn edit_generation(&self, key: &str, generation: u64) -> Result<Option<Editor>> {
        self.open_editor(key, Some(generation))
    }

    fn open_editor(&self, key: &str, expected: Option<u64>) -> Result<Option<Editor>> {
        validate_key(key)?;
        let mut state = self.shared.ready()?;

        if let Some(expected) = expected
            && state.index.committed(key).map(|c| c.generation) != Some(expected)
        {
            return Ok(None);
        }

        let generation = state.next_generation;
        if !state.index.begin_edit(key, generation) {
            return Err(CacheError::EditorInFlight(key.to_string()));
        }
        state.next_generation += 1;

        let dirty = Record::Dirty {
            key: key.to_string(),
            generation,
        };
        // DIRTY reaches the file before any stream data so a crash never
        // leaves unaccounted files behind.
        let started = self
            .shared
            .append(&mut state, &dirty)
            .and_then(|()| self.shared.flush_journal(&mut state))
            .and_then(|()| {
                fs::create_dir_all(shard_dir(&self.shared.directory, key)).map_err(CacheError::from)
            });
        if let Err(e) = started {
            state.index.end_edit(key);
            return Err(e);
        }

        tracing::trace!(target: "respcache::journal", key, generation, "editor opened");
        Ok(Some(Editor::new(
            self.clone(),
            key.to_string(),
            generation,
            self.shared.stream_count(),
        )))
    }

    /// Publishes the streams written by an editor as the new generation.
    pub(crate) fn commit_edit(
        &self,
        key: &str,
        generation: u64,
        written: &[bool],
    ) -> Result<CommitSummary> {
        let mut state = self.shared.lock();
        if !self.shared.owns_edit(&state, key, generation) {
            self.shared.delete_generation_files(key, generation);
            return Err(CacheError::Closed);
        }

        if let Some(stream) = written.iter().position(|done| !done) {
            self.shared.abort_locked(&mut state, key, generation);
            return Err(CacheError::IncompleteEdit {
                key: key.to_string(),
                stream,
            });
        }

        let lengths = match self.shared.publish_generation(key, generation) {
            Ok(lengths) => lengths,
            Err(e) => {
                self.shared.abort_locked(&mut state, key, generation);
                return Err(e);
            }
        };

        let clean = Record::Clean {
            key: key.to_string(),
            generation,
            lengths: lengths.clone(),
        };
        if let Err(e) = self.shared.append(&mut state, &clean) {
            self.shared.abort_locked(&mut state, key, generation);
            return Err(e);
        }

        let committed = Committed {
            generation,
            lengths: lengths.clone(),
        };
        let size = committed.size();
        if let Some(previous) = state.index.commit(key, committed) {
            self.shared.delete_generation_files(key, previous.generation);
        }

        let mut evicted = 0;
        if size > state.max_size && self.shared.evict(&mut state, key) {
            evicted += 1;
        }
        evicted += self.shared.trim_to_size(&mut state);
        let retained = state
            .index
            .committed(key)
            .is_some_and(|c| c.generation == generation);
        self.shared.compact_if_needed(&mut state);

        tracing::debug!(
            target: "respcache::journal",
            key,
            generation,
            size,
            retained,
            evicted,
            "entry committed"
        );
        Ok(CommitSummary {
            key: key.to_string(),
            generation,
            lengths,
            retained,
            evicted,
        })
    }

    /// Discards an editor's files, leaving the committed generation untouched.
    pub(crate) fn abort_edit(&self, key: &str, generation: u64) -> Result<()> {
        let mut state = self.shared.lock();
        if !self.shared.owns_edit(&state, key, generation) {
            self.shared.delete_generation_files(key, generation);
            return Ok(());
        }
        self.shared.abort_locked(&mut state, key, generation);
        tracing::trace!(target: "respcache::journal", key, generation, "editor aborted");
        Ok(())
    }

    /// Removes the committed generation of `key`.
    ///
    /// Returns whether anything was removed.
    pub fn remove(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        let mut state = self.shared.ready()?;
        let removed = self.shared.remove_locked(&mut state, key).is_some();
        if removed {
            self.shared.compact_if_needed(&mut state);
        }
        Ok(removed)
    }

    /// Whether `key` has a committed generation. Does not bump recency.
    pub fn contains(&self, key: &str) -> bool {
        validate_key(key).is_ok()
            && self
                .shared
                .ready()
                .is_ok_and(|state| state.index.committed(key).is_some())
    }

    /// Path of a committed stream file, for consumers that read it directly.
    pub fn local_path(&self, key: &str, stream: usize) -> Option<PathBuf> {
        if stream >= self.shared.stream_count() || validate_key(key).is_err() {
            return None;
        }
        let state = self.shared.ready().ok()?;
        let committed = state.index.committed(key)?;
        Some(entry_path(
            &self.shared.directory,
            key,
            committed.generation,
            stream,
        ))
    }

    /// Pushes buffered journal records to the file.
    pub fn flush(&self) -> Result<()> {
        let mut state = self.shared.ready()?;
        self.shared.flush_journal(&mut state)
    }

    /// Flushes and closes the journal. Later operations see a closed store.
    pub fn close(&self) -> Result<()> {
        let mut state = self.shared.lock();
        if state.phase == Phase::Closed {
            return Ok(());
        }
        let flushed = self.shared.flush_journal(&mut state);
        state.writer = None;
        state.phase = Phase::Closed;
        tracing::debug!(
            target: "respcache::journal",
            directory = %self.shared.directory.display(),
            "journal closed"
        );
        flushed
    }

    /// Closes the store and removes its directory with every entry.
    pub fn delete(&self) -> Result<()> {
        let closed = self.close();
        match fs::remove_dir_all(&self.shared.directory) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        closed
    }

    /// Total size of all committed entries.
    pub fn size(&self) -> u64 {
        self.shared.ready().map_or(0, |state| state.index.size())
    }

    pub fn max_size(&self) -> u64 {
        self.shared.lock().max_size
    }

    /// Changes the size limit, evicting immediately if needed.
    pub fn set_max_size(&self, max_size: u64) -> Result<()> {
        if max_size == 0 {
            return Err(invalid_config("max_size must be greater than 0"));
        }
        let mut state = self.shared.ready()?;
        state.max_size = max_size;
        self.shared.trim_to_size(&mut state);
        self.shared.compact_if_needed(&mut state);
        Ok(())
    }

    /// Number of committed entries.
    pub fn len(&self) -> usize {
        self.shared.ready().map_or(0, |state| state.index.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn directory(&self) -> &Path {
        &self.shared.directory
    }

    pub fn stream_count(&self) -> usize {
        self.shared.stream_count()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().phase == Phase::Closed
    }

    /// Entries evicted since the store was opened.
    pub fn evictions(&self) -> u64 {
        self.shared.evictions.load(Ordering::Relaxed)
    }

    /// Path of the journal file.
    pub fn journal_path(&self) -> PathBuf {
        self.shared.directory.join(layout::JOURNAL_FILE)
    }
}

impl std::fmt::Debug for JournalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JournalStore")
            .field("directory", &self.shared.directory)
            .field("stream_count", &self.shared.stream_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};

    use super::*;

    fn open(dir: &Path, max_size: u64) -> JournalStore {
        JournalStore::open(dir, JournalOptions::new(1, 2, max_size)).unwrap()
    }

    fn put(store: &JournalStore, key: &str, body: &[u8], meta: &[u8]) -> CommitSummary {
        let mut editor = store.edit(key).unwrap();
        editor.new_stream(0).unwrap().write_all(body).unwrap();
        editor.new_stream(1).unwrap().write_all(meta).unwrap();
        editor.commit().unwrap()
    }

    fn read(store: &JournalStore, key: &str, stream: usize) -> Option<Vec<u8>> {
        let mut snapshot = store.lookup(key)?;
        let mut out = Vec::new();
        snapshot.stream(stream)?.read_to_end(&mut out).unwrap();
        Some(out)
    }

    #[test]
    fn commit_then_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path(), 1024);
        let summary = put(&store, "k1", b"body", b"meta");
        assert!(summary.retained);
        assert_eq!(summary.lengths, vec![4, 4]);
        assert_eq!(store.size(), 8);
        assert_eq!(read(&store, "k1", 0).unwrap(), b"body");
        assert_eq!(read(&store, "k1", 1).unwrap(), b"meta");
    }

    #[test]
    fn second_editor_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path(), 1024);
        let editor = store.edit("k1").unwrap();
        assert!(matches!(store.edit("k1"), Err(CacheError::EditorInFlight(_))));
        editor.abort().unwrap();
        assert!(store.edit("k1").is_ok());
    }

    #[test]
    fn commit_requires_every_stream() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path(), 1024);
        let mut editor = store.edit("k1").unwrap();
        editor.new_stream(0).unwrap().write_all(b"body").unwrap();
        let err = editor.commit().unwrap_err();
        assert!(matches!(err, CacheError::IncompleteEdit { stream: 1, .. }));
        assert!(store.lookup("k1").is_none());
        assert!(store.edit("k1").is_ok());
    }

    #[test]
    fn dropped_editor_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path(), 1024);
        put(&store, "k1", b"old", b"m");
        {
            let mut editor = store.edit("k1").unwrap();
            editor.new_stream(0).unwrap().write_all(b"new").unwrap();
        }
        assert_eq!(read(&store, "k1", 0).unwrap(), b"old");
        assert!(store.edit("k1").is_ok());
    }

    #[test]
    fn remove_frees_space() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path(), 1024);
        put(&store, "k1", b"body", b"meta");
        assert!(store.remove("k1").unwrap());
        assert!(!store.remove("k1").unwrap());
        assert_eq!(store.size(), 0);
        assert!(store.local_path("k1", 0).is_none());
    }

    #[test]
    fn local_path_points_at_committed_stream() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path(), 1024);
        let summary = put(&store, "abc", b"body", b"meta");
        let path = store.local_path("abc", 0).unwrap();
        assert_eq!(path, entry_path(dir.path(), "abc", summary.generation, 0));
        assert_eq!(fs::read(path).unwrap(), b"body");
        assert!(store.local_path("abc", 2).is_none());
    }

    #[test]
    fn closed_store_refuses_work() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path(), 1024);
        put(&store, "k1", b"body", b"meta");
        store.close().unwrap();
        assert!(store.is_closed());
        assert!(store.lookup("k1").is_none());
        assert!(matches!(store.edit("k2"), Err(CacheError::Closed)));
        store.close().unwrap();
    }

    #[test]
    fn delete_removes_directory() {
        let dir = tempfile::tempdir().unwrap();
        let cache_dir = dir.path().join("cache");
        let store = open(&cache_dir, 1024);
        put(&store, "k1", b"body", b"meta");
        store.delete().unwrap();
        assert!(!cache_dir.exists());
    }

    #[test]
    fn invalid_options_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(JournalStore::open(dir.path(), JournalOptions::new(1, 0, 10)).is_err());
        assert!(JournalStore::open(dir.path(), JournalOptions::new(1, 2, 0)).is_err());
    }

    #[test]
    fn peek_leaves_recency_alone() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path(), 24);
        put(&store, "k1", b"body", b"meta");
        put(&store, "k2", b"body", b"meta");
        put(&store, "k3", b"body", b"meta");

        let mut snapshot = store.peek("k1").unwrap();
        let mut out = Vec::new();
        snapshot.stream(1).unwrap().read_to_end(&mut out).unwrap();
        assert_eq!(out, b"meta");

        put(&store, "k4", b"body", b"meta");
        assert!(!store.contains("k1"));
        assert!(store.contains("k2"));
        assert!(store.peek("k1").is_none());
    }
}
