//! On-disk naming of journal and entry files
//!
//! Every committed generation of a key lives in
//! `<dir>/<key[0..2]>/<key>.<generation>.<stream>`; an editor writes the same
//! names with a `.tmp` suffix and renames them on commit.

use std::path::{Path, PathBuf};

use crate::error::{CacheError, Result};

pub const JOURNAL_FILE: &str = "journal";
pub const JOURNAL_FILE_TMP: &str = "journal.tmp";
pub const JOURNAL_FILE_BACKUP: &str = "journal.bkp";

/// Whether a top-level file name belongs to the journal.
pub fn is_journal_name(name: &str) -> bool {
    matches!(name, JOURNAL_FILE | JOURNAL_FILE_TMP | JOURNAL_FILE_BACKUP)
}

/// Longest key accepted by the store
pub const MAX_KEY_LEN: usize = 120;

const DIRTY_SUFFIX: &str = "tmp";
const SHARD_LEN: usize = 2;

/// Reject keys that cannot be embedded in file names and journal records.
pub fn validate_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && key
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-');
    if valid {
        Ok(())
    } else {
        Err(CacheError::InvalidKey(key.to_string()))
    }
}

/// Directory holding every file of `key`.
pub fn shard_dir(directory: &Path, key: &str) -> PathBuf {
    let end = key.len().min(SHARD_LEN);
    directory.join(&key[..end])
}

/// Whether a top-level directory name can be an entry shard.
pub fn is_shard_name(name: &str) -> bool {
    !name.is_empty() && name.len() <= SHARD_LEN && validate_key(name).is_ok()
}

pub fn entry_path(directory: &Path, key: &str, generation: u64, stream: usize) -> PathBuf {
    shard_dir(directory, key).join(format!("{key}.{generation}.{stream}"))
}

pub fn dirty_path(directory: &Path, key: &str, generation: u64, stream: usize) -> PathBuf {
    shard_dir(directory, key).join(format!("{key}.{generation}.{stream}.{DIRTY_SUFFIX}"))
}

/// Decoded name of a file found inside a shard directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryFileName {
    pub key: String,
    pub generation: u64,
    pub stream: usize,
    pub dirty: bool,
}

pub fn parse_entry_file_name(name: &str) -> Option<EntryFileName> {
    let mut parts = name.split('.');
    let key = parts.next()?;
    let generation = parts.next()?.parse().ok()?;
    let stream = parts.next()?.parse().ok()?;
    let dirty = match parts.next() {
        None => false,
        Some(DIRTY_SUFFIX) => true,
        Some(_) => return None,
    };
    if parts.next().is_some() || validate_key(key).is_err() {
        return None;
    }
    Some(EntryFileName {
        key: key.to_string(),
        generation,
        stream,
        dirty,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_validated() {
        assert!(validate_key("abc-123_x").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("ABC").is_err());
        assert!(validate_key("a b").is_err());
        assert!(validate_key("a.b").is_err());
        assert!(validate_key(&"a".repeat(MAX_KEY_LEN + 1)).is_err());
    }

    #[test]
    fn entries_are_sharded_by_key_prefix() {
        let dir = Path::new("/cache");
        assert_eq!(
            entry_path(dir, "abcdef", 7, 1),
            PathBuf::from("/cache/ab/abcdef.7.1")
        );
        assert_eq!(
            dirty_path(dir, "abcdef", 7, 0),
            PathBuf::from("/cache/ab/abcdef.7.0.tmp")
        );
        assert_eq!(shard_dir(dir, "k"), PathBuf::from("/cache/k"));
    }

    #[test]
    fn file_names_round_trip() {
        let clean = parse_entry_file_name("abcdef.7.1").unwrap();
        assert_eq!(clean.key, "abcdef");
        assert_eq!(clean.generation, 7);
        assert_eq!(clean.stream, 1);
        assert!(!clean.dirty);

        assert!(parse_entry_file_name("abcdef.7.0.tmp").unwrap().dirty);
        assert!(parse_entry_file_name("abcdef.x.0").is_none());
        assert!(parse_entry_file_name("abcdef.7.0.bak").is_none());
        assert!(parse_entry_file_name("journal").is_none());
    }

    #[test]
    fn journal_names_are_not_shards() {
        assert!(is_shard_name("ab"));
        assert!(!is_shard_name(JOURNAL_FILE));
        assert!(!is_shard_name(JOURNAL_FILE_BACKUP));
        assert!(is_journal_name(JOURNAL_FILE_TMP));
        assert!(!is_journal_name("journal.old"));
        assert!(!is_journal_name("ab"));
    }
}
