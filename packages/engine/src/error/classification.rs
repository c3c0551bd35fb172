use std::io;

use super::types::CacheError;

impl CacheError {
    /// Returns true if the error came from the filesystem.
    #[must_use]
    pub fn is_io(&self) -> bool {
        matches!(self, CacheError::Io(_))
    }

    /// Returns true if the disk ran out of space while writing.
    #[must_use]
    pub fn is_storage_full(&self) -> bool {
        match self {
            CacheError::Io(e) => e.kind() == io::ErrorKind::StorageFull,
            _ => false,
        }
    }

    /// Returns true for errors that should be treated as a plain cache miss.
    #[must_use]
    pub fn is_miss(&self) -> bool {
        matches!(
            self,
            CacheError::MalformedEntry(_)
                | CacheError::EditorInFlight(_)
                | CacheError::InvalidKey(_)
                | CacheError::InvalidUrl(_)
                | CacheError::NotInstalled
                | CacheError::Closed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_entries_count_as_misses() {
        assert!(CacheError::MalformedEntry("eof".into()).is_miss());
        assert!(!CacheError::Io(io::Error::other("boom")).is_miss());
    }

    #[test]
    fn storage_full_is_detected() {
        let err = CacheError::from(io::Error::from(io::ErrorKind::StorageFull));
        assert!(err.is_io());
        assert!(err.is_storage_full());
    }
}
