//! Read handle for one committed generation of an entry

use std::fmt;
use std::fs::File;

use crate::error::Result;
use crate::journal::JournalStore;
use crate::store::Editor;

/// Open files of a committed generation.
///
/// The files were opened while the journal lock was held, so they keep
/// reading the same bytes after the entry is overwritten, removed or evicted.
pub struct Snapshot {
    store: JournalStore,
    key: String,
    generation: u64,
    streams: Vec<Option<File>>,
    lengths: Vec<u64>,
}

impl Snapshot {
    pub(crate) fn new(
        store: JournalStore,
        key: String,
        generation: u64,
        streams: Vec<File>,
        lengths: Vec<u64>,
    ) -> Self {
        Self {
            store,
            key,
            generation,
            streams: streams.into_iter().map(Some).collect(),
            lengths,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Committed length of `stream`.
    pub fn len(&self, stream: usize) -> Option<u64> {
        self.lengths.get(stream).copied()
    }

    pub fn lengths(&self) -> &[u64] {
        &self.lengths
    }

    pub fn total_size(&self) -> u64 {
        self.lengths.iter().sum()
    }

    /// Borrows the open file of `stream`, unless it was taken.
    pub fn stream(&mut self, stream: usize) -> Option<&mut File> {
        self.streams.get_mut(stream)?.as_mut()
    }

    /// Takes ownership of the open file of `stream`.
    pub fn take_stream(&mut self, stream: usize) -> Option<File> {
        self.streams.get_mut(stream)?.take()
    }

    /// Consumes the snapshot, keeping only `stream`.
    pub fn into_stream(mut self, stream: usize) -> Option<File> {
        self.take_stream(stream)
    }

    /// Opens an editor for this key if this snapshot is still current.
    ///
    /// Returns `None` when a newer generation was committed or the entry was
    /// removed since the snapshot was taken.
    pub fn edit(&self) -> Result<Option<Editor>> {
        self.store.edit_generation(&self.key, self.generation)
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("key", &self.key)
            .field("generation", &self.generation)
            .field("lengths", &self.lengths)
            .finish_non_exhaustive()
    }
}
