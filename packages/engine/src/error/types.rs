use std::io;
use std::path::PathBuf;

/// A Result alias where the Err case is [`CacheError`].
pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors raised inside the cache core.
///
/// Only the lifecycle operations (`install`, `close`, `delete`) let these
/// escape to callers; the hot-path facade operations turn them into misses.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The facade was used before `install` or after teardown.
    #[error("response cache is not installed")]
    NotInstalled,

    /// The journal store was closed.
    #[error("cache journal is closed")]
    Closed,

    /// The journal could not be replayed and the directory could not be scanned.
    #[error("corrupt journal {path:?} at line {line}: {reason}")]
    CorruptJournal {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// A stored metadata stream could not be decoded.
    #[error("malformed cache entry: {0}")]
    MalformedEntry(String),

    /// Another editor is already writing this key.
    #[error("an editor is already in flight for key {0}")]
    EditorInFlight(String),

    /// An editor tried to commit without writing every stream.
    #[error("edit of key {key} did not create stream {stream}")]
    IncompleteEdit { key: String, stream: usize },

    /// The key contains characters that cannot be used in file names.
    #[error("invalid cache key {0:?}")]
    InvalidKey(String),

    /// Rejected configuration value.
    #[error("invalid cache configuration: {0}")]
    InvalidConfig(String),

    /// A URL passed to a facade operation could not be parsed.
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error(transparent)]
    Io(#[from] io::Error),
}
