use std::path::Path;

use super::types::CacheError;

/// Creates a `CacheError` for a journal that cannot be replayed.
pub fn corrupt_journal(path: &Path, line: usize, reason: impl Into<String>) -> CacheError {
    CacheError::CorruptJournal {
        path: path.to_path_buf(),
        line,
        reason: reason.into(),
    }
}

/// Creates a `CacheError` for an undecodable metadata stream.
pub fn malformed_entry<E: std::fmt::Display>(e: E) -> CacheError {
    CacheError::MalformedEntry(e.to_string())
}

/// Creates a `CacheError` for a rejected configuration value.
pub fn invalid_config(reason: impl Into<String>) -> CacheError {
    CacheError::InvalidConfig(reason.into())
}
