//! # respcache engine
//!
//! Disk-resident, size-bounded LRU cache for HTTP responses.
//!
//! ## Features
//!
//! - **Crash-safe journal** recording which entries exist, their generation,
//!   their stream sizes and their recency
//! - **Atomic commits**: entries are written to temporary files and renamed
//!   into place, so readers never see partial data
//! - **Strict LRU eviction** under a byte budget
//! - **Snapshot reads** that stay valid while entries are replaced or evicted
//! - **HTTP semantics** for cacheability, `Vary` matching and expiry
//! - **Pooled buffers** for every metadata and body stream
//!
//! ## Usage
//!
//! ```no_run
//! use std::io::{Read, Write};
//!
//! use respcache_engine::prelude::*;
//!
//! let cache = ResponseCache::with_config(CacheConfig::new("/tmp/http-cache"));
//! cache.install("/tmp/http-cache", 1, 10 * 1024 * 1024, false)?;
//!
//! let request = RequestIdentity::parse_get("https://example.com/logo.png")?;
//! let response = ResponseMeta::new(StatusCode::OK, HeaderMap::new());
//! if let Some(mut writer) = cache.put(&request, &response) {
//!     writer.write_all(b"...")?;
//!     writer.commit();
//! }
//!
//! if let Some(mut hit) = cache.get(&request) {
//!     let mut body = Vec::new();
//!     hit.body.read_to_end(&mut body)?;
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![deny(unsafe_code)]
#![warn(clippy::all)]

// Core modules
pub mod cache;
pub mod error;
pub mod io;
pub mod journal;
pub mod store;

// Prelude with canonical types
pub mod prelude;

// Essential public API - only what end users actually need
pub use crate::prelude::*;
