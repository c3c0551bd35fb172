//! Cache key generation and hashing for HTTP requests
//!
//! Provides CacheKey, a SHA-256 digest of the request method, URL and the
//! request headers that change the response a server hands out.

use std::fmt;

use http::{HeaderMap, Method};
use ring::digest;
use url::Url;

/// Request headers that take part in the key, lower-case and sorted
const KEY_HEADERS: &[&str] = &["authorization"];

/// Cache key for HTTP responses based on method, URL and headers
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Request URL
    pub url: String,
    /// HTTP method (GET, POST, etc.)
    pub method: Method,
    hash: String,
}

impl CacheKey {
    /// Create cache key from request components
    pub fn new(method: &Method, url: &Url, headers: &HeaderMap) -> Self {
        let mut ctx = digest::Context::new(&digest::SHA256);
        ctx.update(method.as_str().as_bytes());
        ctx.update(b"\0");
        ctx.update(url.as_str().as_bytes());
        ctx.update(b"\0");
        for name in KEY_HEADERS {
            for value in headers.get_all(*name) {
                ctx.update(name.as_bytes());
                ctx.update(b"=");
                ctx.update(value.as_bytes());
                ctx.update(b"\0");
            }
        }

        Self {
            url: url.as_str().to_string(),
            method: method.clone(),
            hash: hex::encode(ctx.finish()),
        }
    }

    /// Key of a plain GET without any key-relevant headers.
    pub fn for_get(url: &Url) -> Self {
        Self::new(&Method::GET, url, &HeaderMap::new())
    }

    /// Key read back from a metadata stream.
    pub(crate) fn from_stored(method: Method, url: String, hash: String) -> Self {
        Self { url, method, hash }
    }

    /// Hex digest used as the storage key
    pub fn as_str(&self) -> &str {
        &self.hash
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hash)
    }
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;

    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn key_is_stable_hex_sha256() {
        let a = CacheKey::for_get(&url("https://example.com/a?x=1"));
        let b = CacheKey::for_get(&url("https://example.com/a?x=1"));
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert!(a.as_str().bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)));
        assert_eq!(a.to_string(), a.as_str());
    }

    #[test]
    fn method_url_and_authorization_separate_keys() {
        let target = url("https://example.com/a");
        let get = CacheKey::for_get(&target);
        assert_ne!(get, CacheKey::new(&Method::HEAD, &target, &HeaderMap::new()));
        assert_ne!(get, CacheKey::for_get(&url("https://example.com/b")));

        let mut auth = HeaderMap::new();
        auth.insert("authorization", HeaderValue::from_static("Bearer t"));
        assert_ne!(get, CacheKey::new(&Method::GET, &target, &auth));
    }

    #[test]
    fn unrelated_headers_do_not_change_the_key() {
        let target = url("https://example.com/a");
        let mut headers = HeaderMap::new();
        headers.insert("accept", HeaderValue::from_static("text/html"));
        assert_eq!(
            CacheKey::new(&Method::GET, &target, &headers),
            CacheKey::for_get(&target)
        );
    }
}
