//! Journal appends and rewrites

use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};

use super::recovery::{open_append, promote_backup};
use super::record::Record;
use super::{Phase, Shared, State};
use crate::error::{CacheError, Result};
use crate::store::layout::{JOURNAL_FILE, JOURNAL_FILE_BACKUP, JOURNAL_FILE_TMP};

impl Shared {
    /// Appends one record to the buffered journal writer.
    pub(super) fn append(&self, state: &mut State, record: &Record) -> Result<()> {
        let writer = state.writer.as_mut().ok_or(CacheError::Closed)?;
        writeln!(writer, "{record}")?;
        state.journal_records += 1;
        tracing::trace!(target: "respcache::journal", %record, "journal append");
        Ok(())
    }

    pub(super) fn flush_journal(&self, state: &mut State) -> Result<()> {
        if let Some(writer) = state.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    fn should_compact(&self, state: &State) -> bool {
        let live = state.index.len();
        let redundant = state.journal_records.saturating_sub(live);
        redundant >= self.compaction_threshold && redundant >= live
    }

    /// Rewrites the journal when redundant records dominate it.
    ///
    /// Failures are logged; the old journal stays in use.
    pub(super) fn compact_if_needed(&self, state: &mut State) {
        if !self.should_compact(state) {
            return;
        }
        if let Err(e) = self.rewrite_journal(state) {
            tracing::warn!(
                target: "respcache::journal",
                directory = %self.directory.display(),
                error = %e,
                "journal compaction failed"
            );
            if state.writer.is_none() {
                self.reopen_journal(state);
            }
        }
    }

    /// Resumes appending after a failed rewrite, restoring the old journal
    /// from its backup if it was already moved aside. Closes the store when
    /// no journal can be opened.
    pub(super) fn reopen_journal(&self, state: &mut State) {
        let journal = self.directory.join(JOURNAL_FILE);
        let reopened = promote_backup(&self.directory)
            .and_then(|()| open_append(&journal).map_err(CacheError::from));
        match reopened {
            Ok(writer) => state.writer = Some(writer),
            Err(e) => {
                state.phase = Phase::Closed;
                tracing::error!(
                    target: "respcache::journal",
                    path = %journal.display(),
                    error = %e,
                    "cannot reopen journal, closing store"
                );
            }
        }
    }

    /// Replaces the journal with one `CLEAN` line per committed entry, in LRU
    /// order, plus a `DIRTY` line per open editor.
    ///
    /// The new journal is written to `journal.tmp` and swapped in through
    /// `journal.bkp`, so a crash at any point leaves a complete journal.
    pub(super) fn rewrite_journal(&self, state: &mut State) -> Result<()> {
        if let Some(mut writer) = state.writer.take()
            && let Err(e) = writer.flush()
        {
            tracing::warn!(target: "respcache::journal", error = %e, "cannot flush journal before rewrite");
        }

        let tmp = self.directory.join(JOURNAL_FILE_TMP);
        let mut out = BufWriter::new(File::create(&tmp)?);
        self.header.write_to(&mut out)?;
        let mut records = 0;
        for (key, entry) in state.index.iter_lru() {
            if let Some(committed) = &entry.committed {
                let clean = Record::Clean {
                    key: key.to_string(),
                    generation: committed.generation,
                    lengths: committed.lengths.clone(),
                };
                writeln!(out, "{clean}")?;
                records += 1;
            }
            if let Some(generation) = entry.editing {
                let dirty = Record::Dirty {
                    key: key.to_string(),
                    generation,
                };
                writeln!(out, "{dirty}")?;
                records += 1;
            }
        }
        let file = out.into_inner().map_err(|e| CacheError::Io(e.into_error()))?;
        file.sync_all()?;
        drop(file);

        let journal = self.directory.join(JOURNAL_FILE);
        let backup = self.directory.join(JOURNAL_FILE_BACKUP);
        match fs::rename(&journal, &backup) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        fs::rename(&tmp, &journal)?;
        if let Err(e) = fs::remove_file(&backup)
            && e.kind() != ErrorKind::NotFound
        {
            tracing::warn!(target: "respcache::journal", error = %e, "cannot remove journal backup");
        }

        state.writer = Some(open_append(&journal)?);
        state.journal_records = records;
        tracing::debug!(
            target: "respcache::journal",
            directory = %self.directory.display(),
            records,
            "journal rewritten"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::super::{JournalOptions, JournalStore};
    use super::*;

    fn put(store: &JournalStore, key: &str) {
        let mut editor = store.edit(key).unwrap();
        editor.new_stream(0).unwrap().write_all(b"body").unwrap();
        editor.new_stream(1).unwrap().write_all(b"meta").unwrap();
        editor.commit().unwrap();
    }

    #[test]
    fn reads_trigger_compaction() {
        let dir = tempfile::tempdir().unwrap();
        let options = JournalOptions::new(1, 2, 1 << 20).compaction_threshold(10);
        let store = JournalStore::open(dir.path(), options).unwrap();
        for key in ["a1", "b2"] {
            put(&store, key);
        }
        for _ in 0..20 {
            assert!(store.lookup("a1").is_some());
        }
        store.flush().unwrap();

        let text = fs::read_to_string(dir.path().join(JOURNAL_FILE)).unwrap();
        let body: Vec<&str> = text.lines().skip(5).collect();
        assert!(body.len() < 12, "journal not compacted: {body:?}");
        assert!(!dir.path().join(JOURNAL_FILE_TMP).exists());
        assert!(!dir.path().join(JOURNAL_FILE_BACKUP).exists());

        drop(store);
        let store = JournalStore::open(dir.path(), JournalOptions::new(1, 2, 1 << 20)).unwrap();
        assert!(store.lookup("a1").is_some());
        assert!(store.lookup("b2").is_some());
    }

    #[test]
    fn interrupted_rewrite_restores_backup() {
        let dir = tempfile::tempdir().unwrap();
        let store = JournalStore::open(dir.path(), JournalOptions::new(1, 2, 1 << 20)).unwrap();
        put(&store, "a1");
        {
            // State left by a rewrite that failed after moving the journal aside.
            let mut state = store.shared.lock();
            state.writer = None;
            fs::rename(
                dir.path().join(JOURNAL_FILE),
                dir.path().join(JOURNAL_FILE_BACKUP),
            )
            .unwrap();
            store.shared.reopen_journal(&mut state);
            assert!(state.writer.is_some());
        }
        assert!(!store.is_closed());
        assert!(!dir.path().join(JOURNAL_FILE_BACKUP).exists());

        put(&store, "b2");
        store.close().unwrap();
        let store = JournalStore::open(dir.path(), JournalOptions::new(1, 2, 1 << 20)).unwrap();
        assert!(store.lookup("a1").is_some());
        assert!(store.lookup("b2").is_some());
    }

    #[test]
    fn unrecoverable_journal_closes_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = JournalStore::open(dir.path(), JournalOptions::new(1, 2, 1 << 20)).unwrap();
        put(&store, "a1");
        {
            let mut state = store.shared.lock();
            state.writer = None;
            fs::remove_file(dir.path().join(JOURNAL_FILE)).unwrap();
            store.shared.reopen_journal(&mut state);
        }
        assert!(store.is_closed());
        assert!(store.edit("b2").is_err());
    }
}
