//! Journal replay and startup recovery

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, ErrorKind};
use std::path::Path;
use std::time::SystemTime;

use hashbrown::{HashMap, HashSet};

use super::index::{Committed, Index};
use super::record::Record;
use super::{Phase, Shared, State};
use crate::error::{Result, corrupt_journal};
use crate::store::layout::{
    JOURNAL_FILE, JOURNAL_FILE_BACKUP, is_journal_name, is_shard_name, parse_entry_file_name,
};

const HEADER_LINES: usize = 5;

/// Index rebuilt from a journal or a directory listing
struct Loaded {
    index: Index,
    next_generation: u64,
    records: usize,
    needs_rewrite: bool,
}

enum Replay {
    /// No usable journal; start empty.
    Incompatible(String),
    Loaded(Loaded),
    /// A bad record followed by more records.
    Corrupt { line: usize, reason: String },
}

impl Shared {
    /// Loads the index from disk and marks the store ready.
    pub(super) fn recover(&self, state: &mut State) -> Result<()> {
        promote_backup(&self.directory)?;
        let journal = self.directory.join(JOURNAL_FILE);

        let replay = match File::open(&journal) {
            Ok(file) => self.replay(file)?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!(
                    target: "respcache::journal",
                    directory = %self.directory.display(),
                    "no journal, starting with an empty cache"
                );
                Replay::Loaded(Loaded {
                    index: Index::new(),
                    next_generation: 1,
                    records: 0,
                    needs_rewrite: true,
                })
            }
            Err(e) => return Err(e.into()),
        };

        let mut loaded = match replay {
            Replay::Incompatible(reason) => {
                tracing::info!(
                    target: "respcache::journal",
                    directory = %self.directory.display(),
                    reason,
                    "starting with an empty cache"
                );
                self.cold_start(state)?;
                state.phase = Phase::Ready;
                return Ok(());
            }
            Replay::Loaded(loaded) => loaded,
            Replay::Corrupt { line, reason } => {
                tracing::warn!(
                    target: "respcache::journal",
                    path = %journal.display(),
                    line,
                    reason,
                    "journal corrupted, rebuilding from entry files"
                );
                self.rebuild_from_listing().map_err(|e| {
                    corrupt_journal(&journal, line, format!("{reason}; directory scan failed: {e}"))
                })?
            }
        };

        if self.collect_garbage(&mut loaded.index)? {
            loaded.needs_rewrite = true;
        }

        state.index = loaded.index;
        state.next_generation = loaded.next_generation;
        state.journal_records = loaded.records;
        if loaded.needs_rewrite {
            self.rewrite_journal(state)?;
        } else {
            state.writer = Some(open_append(&journal)?);
        }
        state.phase = Phase::Ready;

        self.trim_to_size(state);
        tracing::debug!(
            target: "respcache::journal",
            directory = %self.directory.display(),
            entries = state.index.len(),
            size = state.index.size(),
            "journal recovered"
        );
        Ok(())
    }

    /// Recovers, falling back to an empty cache. Closes the store if even
    /// that fails.
    pub(super) fn recover_or_reset(&self, state: &mut State) -> Result<()> {
        let Err(e) = self.recover(state) else {
            return Ok(());
        };
        tracing::warn!(
            target: "respcache::journal",
            directory = %self.directory.display(),
            error = %e,
            "journal recovery failed, starting with an empty cache"
        );
        match self.cold_start(state) {
            Ok(()) => {
                state.phase = Phase::Ready;
                Ok(())
            }
            Err(reset) => {
                state.phase = Phase::Closed;
                state.writer = None;
                tracing::error!(
                    target: "respcache::journal",
                    directory = %self.directory.display(),
                    error = %reset,
                    "cannot reset cache directory, closing store"
                );
                Err(reset)
            }
        }
    }

    /// Removes the journal files and every shard directory, then writes a
    /// fresh journal. Other files in the directory are left alone.
    pub(super) fn cold_start(&self, state: &mut State) -> Result<()> {
        state.writer = None;
        fs::create_dir_all(&self.directory)?;
        for entry in fs::read_dir(&self.directory)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            let path = entry.path();
            let removed = if entry.file_type()?.is_dir() {
                if !is_shard_name(name) {
                    continue;
                }
                fs::remove_dir_all(&path)
            } else if is_journal_name(name) {
                fs::remove_file(&path)
            } else {
                continue;
            };
            match removed {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        state.index = Index::new();
        state.next_generation = 1;
        self.rewrite_journal(state)
    }

    fn replay(&self, file: File) -> Result<Replay> {
        let stream_count = self.stream_count();
        let mut reader = BufReader::new(file);
        let mut buf = Vec::new();

        let mut header = Vec::with_capacity(HEADER_LINES);
        for _ in 0..HEADER_LINES {
            buf.clear();
            reader.read_until(b'\n', &mut buf)?;
            let Some(line) = buf.strip_suffix(b"\n") else {
                return Ok(Replay::Incompatible("truncated header".to_string()));
            };
            header.push(String::from_utf8_lossy(line).into_owned());
        }
        let header: Vec<&str> = header.iter().map(String::as_str).collect();
        if let Err(reason) = self.header.check(&header) {
            return Ok(Replay::Incompatible(reason));
        }

        let mut index = Index::new();
        let mut max_generation = 0;
        let mut records = 0;
        let mut line_number = HEADER_LINES;
        let mut rejected: Option<(usize, String)> = None;
        let mut torn = false;

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            line_number += 1;
            if let Some((line, reason)) = rejected.take() {
                return Ok(Replay::Corrupt { line, reason });
            }
            // Only the last line can lack a newline: an interrupted append.
            let Some(line) = buf.strip_suffix(b"\n") else {
                torn = true;
                break;
            };
            let parsed = std::str::from_utf8(line)
                .map_err(|e| e.to_string())
                .and_then(|text| Record::parse(text, stream_count));
            match parsed {
                Ok(record) => {
                    max_generation = max_generation.max(apply(&mut index, record));
                    records += 1;
                }
                Err(reason) => rejected = Some((line_number, reason)),
            }
        }

        let pending = index.iter_lru().filter(|(_, e)| e.editing.is_some()).count();
        index.discard_edits();

        if torn || rejected.is_some() {
            tracing::debug!(
                target: "respcache::journal",
                line = line_number,
                "ignoring incomplete last journal record"
            );
        }

        Ok(Replay::Loaded(Loaded {
            index,
            next_generation: max_generation + 1,
            records,
            needs_rewrite: torn || rejected.is_some() || pending > 0,
        }))
    }

    /// Builds an index from the committed files found in shard directories.
    ///
    /// The newest generation with every stream present wins; recency follows
    /// file modification times.
    fn rebuild_from_listing(&self) -> std::io::Result<Loaded> {
        let stream_count = self.stream_count();
        let mut found: HashMap<String, BTreeMap<u64, Found>> = HashMap::new();
        let mut max_generation = 0;

        for shard in fs::read_dir(&self.directory)? {
            let shard = shard?;
            if !shard.file_type()?.is_dir() || !shard.file_name().to_str().is_some_and(is_shard_name) {
                continue;
            }
            for file in fs::read_dir(shard.path())? {
                let file = file?;
                let Some(name) = file.file_name().to_str().and_then(parse_entry_file_name) else {
                    continue;
                };
                max_generation = max_generation.max(name.generation);
                if name.dirty || name.stream >= stream_count {
                    continue;
                }
                let metadata = file.metadata()?;
                let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                let generation = found
                    .entry(name.key)
                    .or_default()
                    .entry(name.generation)
                    .or_insert_with(|| Found {
                        lengths: vec![None; stream_count],
                        modified,
                    });
                generation.lengths[name.stream] = Some(metadata.len());
                generation.modified = generation.modified.max(modified);
            }
        }

        let mut complete: Vec<(SystemTime, String, Committed)> = found
            .into_iter()
            .filter_map(|(key, generations)| {
                generations.into_iter().rev().find_map(|(generation, found)| {
                    let lengths: Option<Vec<u64>> = found.lengths.into_iter().collect();
                    lengths.map(|lengths| (found.modified, key.clone(), Committed { generation, lengths }))
                })
            })
            .collect();
        complete.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

        let mut index = Index::new();
        for (_, key, committed) in complete {
            index.commit(&key, committed);
        }
        tracing::info!(
            target: "respcache::journal",
            directory = %self.directory.display(),
            entries = index.len(),
            "rebuilt index from entry files"
        );
        Ok(Loaded {
            index,
            next_generation: max_generation + 1,
            records: 0,
            needs_rewrite: true,
        })
    }

    /// Deletes files the index does not account for and drops entries whose
    /// files are missing or have the wrong length.
    ///
    /// Returns whether the index changed.
    fn collect_garbage(&self, index: &mut Index) -> Result<bool> {
        let stream_count = self.stream_count();
        let mut present: HashSet<(String, usize)> = HashSet::new();

        for shard in fs::read_dir(&self.directory)? {
            let shard = shard?;
            if !shard.file_type()?.is_dir() || !shard.file_name().to_str().is_some_and(is_shard_name) {
                continue;
            }
            for file in fs::read_dir(shard.path())? {
                let file = file?;
                let path = file.path();
                let live = file
                    .file_name()
                    .to_str()
                    .and_then(parse_entry_file_name)
                    .filter(|name| !name.dirty && name.stream < stream_count)
                    .filter(|name| {
                        index.committed(&name.key).is_some_and(|committed| {
                            committed.generation == name.generation
                                && file
                                    .metadata()
                                    .is_ok_and(|m| m.len() == committed.lengths[name.stream])
                        })
                    });
                match live {
                    Some(name) => {
                        present.insert((name.key, name.stream));
                    }
                    None => {
                        tracing::trace!(target: "respcache::journal", path = %path.display(), "removing stray file");
                        if let Err(e) = fs::remove_file(&path)
                            && e.kind() != ErrorKind::NotFound
                        {
                            tracing::warn!(
                                target: "respcache::journal",
                                path = %path.display(),
                                error = %e,
                                "cannot remove stray file"
                            );
                        }
                    }
                }
            }
            // Succeeds only for empty shards.
            let _ = fs::remove_dir(shard.path());
        }

        let missing: Vec<(String, u64)> = index
            .iter_lru()
            .filter_map(|(key, entry)| {
                let committed = entry.committed.as_ref()?;
                (0..stream_count)
                    .any(|stream| !present.contains(&(key.to_string(), stream)))
                    .then(|| (key.to_string(), committed.generation))
            })
            .collect();
        for (key, generation) in &missing {
            tracing::warn!(target: "respcache::journal", key = key.as_str(), "entry files missing, dropping entry");
            index.remove(key);
            self.delete_generation_files(key, *generation);
        }
        Ok(!missing.is_empty())
    }
}

struct Found {
    lengths: Vec<Option<u64>>,
    modified: SystemTime,
}

/// Applies one replayed record, returning the generation it mentions.
fn apply(index: &mut Index, record: Record) -> u64 {
    match record {
        Record::Dirty { key, generation } => {
            // A second DIRTY without CLEAN replaces the abandoned edit.
            index.end_edit(&key);
            index.begin_edit(&key, generation);
            generation
        }
        Record::Clean {
            key,
            generation,
            lengths,
        } => {
            index.commit(&key, Committed { generation, lengths });
            generation
        }
        Record::Remove { key } => {
            index.remove(&key);
            0
        }
        Record::Read { key } => {
            index.touch(&key);
            0
        }
    }
}

/// Restores the backup left by an interrupted journal rewrite.
pub(super) fn promote_backup(directory: &Path) -> Result<()> {
    let backup = directory.join(JOURNAL_FILE_BACKUP);
    if !backup.exists() {
        return Ok(());
    }
    let journal = directory.join(JOURNAL_FILE);
    if journal.exists() {
        fs::remove_file(&backup)?;
    } else {
        tracing::debug!(target: "respcache::journal", "promoting journal backup");
        fs::rename(&backup, &journal)?;
    }
    Ok(())
}

pub(super) fn open_append(path: &Path) -> std::io::Result<BufWriter<File>> {
    OpenOptions::new().append(true).open(path).map(BufWriter::new)
}
