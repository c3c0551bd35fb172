//! Disk-backed HTTP response caching
//!
//! Responses are stored as two streams per entry (body and JSON metadata)
//! in a journal store, keyed by a SHA-256 digest of the request. Entries are
//! matched against incoming requests (method, URI and `Vary`) and checked
//! for freshness before they are served.

pub mod cache_config;
pub mod cache_entry;
pub mod cache_key;
pub mod cache_policy;
pub mod cache_stats;
pub mod cached_response;
pub mod entry_codec;
pub mod http_date;
pub mod identity;
pub mod response_cache;

// Re-export all public types and functions
pub use cache_config::CacheConfig;
pub use cache_entry::{CacheEntry, EntryFlavor};
pub use cache_key::CacheKey;
pub use cache_policy::CacheControl;
pub use cache_stats::{CacheStats, StatsSnapshot};
pub use cached_response::{CachedBody, CachedResponse};
pub use entry_codec::StoredMetadata;
pub use http_date::{HttpDateParseError, httpdate};
pub use identity::{RequestIdentity, ResponseMeta};
pub use response_cache::{
    CacheWriter, ENTRY_BODY, ENTRY_METADATA, ENTRY_STREAM_COUNT, ResponseCache, WriteOutcome,
    WriteState,
};
