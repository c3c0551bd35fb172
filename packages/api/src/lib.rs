//! respcache public API
//!
//! Disk-resident LRU cache for HTTP responses with a fluent installation
//! builder. Responses are written atomically, evicted least recently used
//! first, and survive process restarts.
//!
//! ```no_run
//! use std::io::Write;
//!
//! use respcache::{RequestIdentity, ResponseMeta, StatusCode, HeaderMap};
//!
//! let cache = respcache::builder("/tmp/http-cache")
//!     .max_size(64 * 1024 * 1024)
//!     .async_recovery(true)
//!     .build()?;
//!
//! let request = RequestIdentity::parse_get("https://example.com/")?;
//! if let Some(mut writer) = cache.put(&request, &ResponseMeta::new(StatusCode::OK, HeaderMap::new())) {
//!     writer.write_all(b"<html></html>")?;
//!     writer.commit();
//! }
//! assert!(cache.contains("https://example.com/"));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![deny(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]

pub mod builder;

// Re-export all public API components
pub use builder::*;

// Re-export important types from the engine package
pub use respcache_engine::prelude::*;
pub use respcache_engine::{cache, error, io, journal, store};

// Crates appearing in the public API
pub use http;
pub use url;

/// Start building a response cache stored in `directory`
///
/// Shorthand for `ResponseCacheBuilder::new(directory)`
#[must_use]
pub fn builder(directory: impl Into<std::path::PathBuf>) -> ResponseCacheBuilder {
    ResponseCacheBuilder::new(directory)
}
