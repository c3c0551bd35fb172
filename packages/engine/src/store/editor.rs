//! Write handle for one new generation of an entry

use std::fmt;
use std::fs::File;
use std::io;
use std::path::PathBuf;

use crate::error::Result;
use crate::journal::{CommitSummary, JournalStore};
use crate::store::layout::dirty_path;

/// Exclusive writer for a key.
///
/// Streams are written to temporary files that become visible only on
/// [`Editor::commit`]. Dropping an editor without committing aborts it.
pub struct Editor {
    store: JournalStore,
    key: String,
    generation: u64,
    written: Vec<bool>,
    finished: bool,
}

impl Editor {
    pub(crate) fn new(store: JournalStore, key: String, generation: u64, stream_count: usize) -> Self {
        Self {
            store,
            key,
            generation,
            written: vec![false; stream_count],
            finished: false,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Temporary path of `stream` while the edit is open.
    pub fn dirty_path(&self, stream: usize) -> PathBuf {
        dirty_path(self.store.directory(), &self.key, self.generation, stream)
    }

    /// Creates (or truncates) the file for `stream`.
    pub fn new_stream(&mut self, stream: usize) -> io::Result<File> {
        let Some(written) = self.written.get_mut(stream) else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("stream {stream} out of range"),
            ));
        };
        let file = File::create(dirty_path(
            self.store.directory(),
            &self.key,
            self.generation,
            stream,
        ))?;
        *written = true;
        Ok(file)
    }

    /// Publishes every stream as the entry's committed generation.
    ///
    /// Fails with `IncompleteEdit` if a stream was never created; the edit
    /// is aborted in that case.
    pub fn commit(mut self) -> Result<CommitSummary> {
        self.finished = true;
        self.store.commit_edit(&self.key, self.generation, &self.written)
    }

    /// Discards the written streams. The previous generation stays readable.
    pub fn abort(mut self) -> Result<()> {
        self.finished = true;
        self.store.abort_edit(&self.key, self.generation)
    }
}

impl Drop for Editor {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = self.store.abort_edit(&self.key, self.generation) {
            tracing::warn!(
                target: "respcache::store",
                key = %self.key,
                error = %e,
                "cannot abort dropped editor"
            );
        }
    }
}

impl fmt::Debug for Editor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Editor")
            .field("key", &self.key)
            .field("generation", &self.generation)
            .field("written", &self.written)
            .finish_non_exhaustive()
    }
}
