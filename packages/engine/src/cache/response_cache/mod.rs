//! Response cache modules
//!
//! Disk-backed HTTP response cache built on the journal store.
//!
//! The functionality is organized into logical modules:
//!
//! - `core`: ResponseCache struct, construction and accessors
//! - `lifecycle`: install, teardown, close and delete
//! - `operations`: get, put, delete and path lookups
//! - `writer`: CacheWriter for streaming a response body into an entry

pub mod core;
pub mod lifecycle;
pub mod operations;
pub mod writer;

pub use core::ResponseCache;
pub use writer::{CacheWriter, WriteOutcome, WriteState};

/// Stream index of the response body
pub const ENTRY_BODY: usize = 0;
/// Stream index of the encoded metadata
pub const ENTRY_METADATA: usize = 1;
/// Streams per cache entry
pub const ENTRY_STREAM_COUNT: usize = 2;
