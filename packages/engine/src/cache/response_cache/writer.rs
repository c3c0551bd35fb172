//! Streaming a response body into a cache entry
//!
//! ```text
//! NotStarted ──start──▶ EditorOpen ──commit──▶ Committed
//!      │                    │
//!      └──────abort─────────┴──abort/drop/error──▶ Aborted
//! ```

use std::fs::File;
use std::io::{self, Write};
use std::sync::Arc;

use super::super::cache_entry::CacheEntry;
use super::super::cache_stats::CacheStats;
use super::{ENTRY_BODY, ENTRY_METADATA};
use crate::error::Result;
use crate::io::{BufferPool, PooledWriter};
use crate::journal::{CommitSummary, JournalStore};
use crate::store::Editor;

/// Where a [`CacheWriter`] is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteState {
    /// Editor obtained, metadata not yet written
    NotStarted,
    /// Metadata written, accepting body bytes
    EditorOpen,
    Committed,
    Aborted,
}

impl WriteState {
    pub fn is_terminal(self) -> bool {
        matches!(self, WriteState::Committed | WriteState::Aborted)
    }
}

/// How a write ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Committed(CommitSummary),
    Aborted,
}

impl WriteOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, WriteOutcome::Committed(_))
    }
}

/// Body sink returned by [`ResponseCache::put`](super::ResponseCache::put).
///
/// Nothing becomes visible to readers until [`CacheWriter::commit`].
/// A failed write poisons the writer so the entry is aborted on commit;
/// dropping an unfinished writer aborts too.
pub struct CacheWriter {
    store: JournalStore,
    key: String,
    editor: Option<Editor>,
    body: Option<PooledWriter<File>>,
    state: WriteState,
    poisoned: bool,
    written: u64,
    stats: Arc<CacheStats>,
}

impl CacheWriter {
    pub(super) fn new(store: JournalStore, editor: Editor, stats: Arc<CacheStats>) -> Self {
        Self {
            store,
            key: editor.key().to_string(),
            editor: Some(editor),
            body: None,
            state: WriteState::NotStarted,
            poisoned: false,
            written: 0,
            stats,
        }
    }

    /// Writes the metadata stream and opens the body stream.
    pub(super) fn start(&mut self, entry: &CacheEntry, pool: &Arc<dyn BufferPool>) -> Result<()> {
        debug_assert_eq!(self.state, WriteState::NotStarted);
        let Some(editor) = self.editor.as_mut() else {
            return Err(crate::error::CacheError::Closed);
        };

        let mut metadata = PooledWriter::new(editor.new_stream(ENTRY_METADATA)?, pool);
        entry.write_to(&mut metadata)?;
        metadata.into_inner()?;

        let body = editor.new_stream(ENTRY_BODY)?;
        self.body = Some(PooledWriter::new(body, pool));
        self.state = WriteState::EditorOpen;
        Ok(())
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn state(&self) -> WriteState {
        self.state
    }

    /// Body bytes accepted so far
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Makes the entry visible, or aborts it if any write failed.
    pub fn commit(mut self) -> WriteOutcome {
        if self.state != WriteState::EditorOpen || self.poisoned {
            tracing::debug!(
                target: "respcache::cache",
                key = %self.key,
                state = ?self.state,
                poisoned = self.poisoned,
                "cache write cannot commit, aborting"
            );
            return self.abort_in_place();
        }

        if let Some(body) = self.body.take()
            && let Err(e) = body.into_inner()
        {
            tracing::warn!(target: "respcache::cache", key = %self.key, error = %e, "cannot flush cached body");
            return self.abort_in_place();
        }

        let Some(editor) = self.editor.take() else {
            return self.abort_in_place();
        };
        match editor.commit() {
            Ok(summary) => {
                self.state = WriteState::Committed;
                self.stats.record_write_success();
                if let Err(e) = self.store.flush() {
                    tracing::warn!(target: "respcache::cache", key = %self.key, error = %e, "cannot flush journal");
                }
                tracing::debug!(
                    target: "respcache::cache",
                    key = %self.key,
                    body_bytes = self.written,
                    retained = summary.retained,
                    evicted = summary.evicted,
                    "response cached"
                );
                WriteOutcome::Committed(summary)
            }
            Err(e) => {
                self.state = WriteState::Aborted;
                self.stats.record_write_abort();
                tracing::warn!(target: "respcache::cache", key = %self.key, error = %e, "cannot commit cache entry");
                WriteOutcome::Aborted
            }
        }
    }

    /// Discards the entry. A previously cached response stays in place.
    pub fn abort(mut self) -> WriteOutcome {
        self.abort_in_place()
    }

    fn abort_in_place(&mut self) -> WriteOutcome {
        if self.state.is_terminal() {
            return WriteOutcome::Aborted;
        }
        self.state = WriteState::Aborted;
        // Buffered bytes go to a file that is about to be deleted.
        drop(self.body.take());
        if let Some(editor) = self.editor.take()
            && let Err(e) = editor.abort()
        {
            tracing::warn!(target: "respcache::cache", key = %self.key, error = %e, "cannot abort cache entry");
        }
        self.stats.record_write_abort();
        tracing::debug!(target: "respcache::cache", key = %self.key, "cache write aborted");
        WriteOutcome::Aborted
    }

    fn poison(&mut self, e: io::Error) -> io::Error {
        if !self.poisoned {
            tracing::warn!(target: "respcache::cache", key = %self.key, error = %e, "cache body write failed");
        }
        self.poisoned = true;
        e
    }

    fn body_mut(&mut self) -> io::Result<&mut PooledWriter<File>> {
        if self.poisoned {
            return Err(io::Error::other("cache writer failed earlier"));
        }
        match self.state {
            WriteState::EditorOpen => self
                .body
                .as_mut()
                .ok_or_else(|| io::Error::other("cache writer has no body stream")),
            state => Err(io::Error::other(format!("cache writer is {state:?}"))),
        }
    }
}

impl Write for CacheWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let result = self.body_mut()?.write(buf);
        match result {
            Ok(n) => {
                self.written += n as u64;
                Ok(n)
            }
            Err(e) => Err(self.poison(e)),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        let result = self.body_mut()?.flush();
        result.map_err(|e| self.poison(e))
    }
}

impl Drop for CacheWriter {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            self.abort_in_place();
        }
    }
}

impl std::fmt::Debug for CacheWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheWriter")
            .field("key", &self.key)
            .field("state", &self.state)
            .field("written", &self.written)
            .finish_non_exhaustive()
    }
}
