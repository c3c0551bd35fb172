//! respcache prelude
//!
//! The types end users need to install a cache, store responses and read
//! them back.

// Facade and its configuration
pub use crate::cache::{
    CacheConfig, CacheStats, CacheWriter, CachedBody, CachedResponse, EntryFlavor, RequestIdentity,
    ResponseCache, ResponseMeta, StatsSnapshot, WriteOutcome, WriteState,
};

// Error types
pub use crate::error::{CacheError, Result};

// Buffer pooling
pub use crate::io::{BufferPool, SharedBufferPool};

// Lower-level storage
pub use crate::journal::{CommitSummary, JournalOptions, JournalStore};
pub use crate::store::{Editor, Snapshot};

// HTTP standard types from http crate
pub use ::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};

// URL handling
pub use url::Url;
