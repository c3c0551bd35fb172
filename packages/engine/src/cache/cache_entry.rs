//! Cache entry descriptors with matching and freshness rules
//!
//! A `CacheEntry` describes one request (and, when storing, its response).
//! It is built per operation and only its metadata form reaches the disk.

use std::io::{Read, Write};

use chrono::{DateTime, Utc};
use http::header::{ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use serde::{Deserialize, Serialize};

use super::cache_key::CacheKey;
use super::cache_policy::{self, CacheControl};
use super::cached_response::{CachedBody, CachedResponse};
use super::entry_codec::{FORMAT_TAG, StoredMetadata, header_map, header_pairs};
use super::http_date::httpdate;
use super::identity::{RequestIdentity, ResponseMeta};
use crate::error::{Result, malformed_entry};

/// Statuses an HTTP cache may store without explicit freshness
const CACHEABLE_STATUSES: [u16; 7] = [200, 203, 300, 301, 308, 404, 410];

/// Cacheability rules applied to entries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryFlavor {
    /// Standard HTTP caching: honours Cache-Control, Pragma and expiry
    #[default]
    Http,
    /// Stores successful GETs and serves them regardless of freshness
    Permanent,
}

/// Cached response descriptor with validators and expiry
#[derive(Debug, Clone)]
pub struct CacheEntry {
    flavor: EntryFlavor,
    key: CacheKey,
    method: Method,
    uri: String,
    request_headers: HeaderMap,
    status: Option<StatusCode>,
    response_headers: HeaderMap,
    /// ETag for validation
    etag: Option<String>,
    /// Last-Modified timestamp for validation
    last_modified: Option<DateTime<Utc>>,
    stored_at: Option<DateTime<Utc>>,
    /// Expiration time from Cache-Control or Expires headers
    expires_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    /// Describes a request about to be looked up.
    pub fn for_request(flavor: EntryFlavor, request: &RequestIdentity) -> Self {
        Self {
            flavor,
            key: CacheKey::new(&request.method, &request.url, &request.headers),
            method: request.method.clone(),
            uri: request.url.as_str().to_string(),
            request_headers: request.headers.clone(),
            status: None,
            response_headers: HeaderMap::new(),
            etag: None,
            last_modified: None,
            stored_at: None,
            expires_at: None,
        }
    }

    /// Describes a response about to be stored, received now.
    pub fn for_response(flavor: EntryFlavor, request: &RequestIdentity, response: &ResponseMeta) -> Self {
        Self::for_response_at(flavor, request, response, Utc::now())
    }

    pub fn for_response_at(
        flavor: EntryFlavor,
        request: &RequestIdentity,
        response: &ResponseMeta,
        now: DateTime<Utc>,
    ) -> Self {
        let headers = &response.headers;
        let etag = headers
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let last_modified = headers
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| httpdate::parse_http_date(s).ok());

        Self {
            status: Some(response.status),
            response_headers: headers.clone(),
            etag,
            last_modified,
            stored_at: Some(now),
            expires_at: cache_policy::expires_at(headers, now),
            ..Self::for_request(flavor, request)
        }
    }

    pub fn flavor(&self) -> EntryFlavor {
        self.flavor
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn response_headers(&self) -> &HeaderMap {
        &self.response_headers
    }

    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.last_modified
    }

    pub fn stored_at(&self) -> Option<DateTime<Utc>> {
        self.stored_at
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Writes the metadata stream for this entry.
    ///
    /// Only request headers named by the response's `Vary` are kept.
    pub fn write_to<W: Write>(&self, out: W) -> Result<()> {
        let status = self
            .status
            .ok_or_else(|| malformed_entry("entry has no response to store"))?;
        let vary = cache_policy::vary_names(&self.response_headers);
        let request_headers = header_pairs(&self.request_headers)
            .into_iter()
            .filter(|header| vary.iter().any(|name| *name == header.name))
            .collect();

        StoredMetadata {
            format: FORMAT_TAG.to_string(),
            flavor: self.flavor,
            key: self.key.as_str().to_string(),
            method: self.method.as_str().to_string(),
            uri: self.uri.clone(),
            request_headers,
            status: status.as_u16(),
            response_headers: header_pairs(&self.response_headers),
            etag: self.etag.clone(),
            last_modified: self.last_modified,
            stored_at: self.stored_at.unwrap_or_else(Utc::now),
            expires_at: self.expires_at,
        }
        .write_to(out)
    }

    /// Reads an entry back from its metadata stream.
    ///
    /// Truncated, unparsable or foreign data yields `MalformedEntry`.
    pub fn read_from<R: Read>(input: R) -> Result<Self> {
        let stored = StoredMetadata::read_from(input)?;
        let method = Method::from_bytes(stored.method.as_bytes()).map_err(malformed_entry)?;
        let status = StatusCode::from_u16(stored.status).map_err(malformed_entry)?;
        Ok(Self {
            flavor: stored.flavor,
            key: CacheKey::from_stored(method.clone(), stored.uri.clone(), stored.key),
            method,
            uri: stored.uri,
            request_headers: header_map(&stored.request_headers)?,
            status: Some(status),
            response_headers: header_map(&stored.response_headers)?,
            etag: stored.etag,
            last_modified: stored.last_modified,
            stored_at: Some(stored.stored_at),
            expires_at: stored.expires_at,
        })
    }

    /// Whether a stored entry answers this request.
    ///
    /// Method and URI must be equal, and every request header named by the
    /// stored response's `Vary` must carry the same values. `Vary: *` never
    /// matches.
    pub fn matches(&self, stored: &CacheEntry) -> bool {
        if self.method != stored.method || self.uri != stored.uri {
            return false;
        }
        cache_policy::vary_names(&stored.response_headers)
            .iter()
            .all(|name| {
                name != "*"
                    && self
                        .request_headers
                        .get_all(name.as_str())
                        .iter()
                        .eq(stored.request_headers.get_all(name.as_str()).iter())
            })
    }

    /// Whether this response may be written to the cache.
    pub fn can_be_cached(&self) -> bool {
        let Some(status) = self.status else {
            return false;
        };
        if self.method != Method::GET {
            return false;
        }
        let response = CacheControl::parse(&self.response_headers);
        match self.flavor {
            EntryFlavor::Http => {
                let request = CacheControl::parse(&self.request_headers);
                CACHEABLE_STATUSES.contains(&status.as_u16())
                    && !request.no_store
                    && !response.no_store
                    && !response.no_cache
                    && !response.private
                    && response.max_age != Some(0)
                    && !cache_policy::pragma_no_cache(&self.response_headers)
            }
            EntryFlavor::Permanent => status == StatusCode::OK && !response.no_store,
        }
    }

    /// Whether a stored entry may be served now.
    pub fn can_be_used(&self) -> bool {
        self.can_be_used_at(Utc::now())
    }

    pub fn can_be_used_at(&self, now: DateTime<Utc>) -> bool {
        match self.flavor {
            EntryFlavor::Http => self.expires_at.is_none_or(|expires| now < expires),
            EntryFlavor::Permanent => true,
        }
    }

    /// Conditional request headers for revalidating this entry.
    pub fn validation_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(etag) = self.etag.as_deref()
            && let Ok(value) = HeaderValue::from_str(etag)
        {
            headers.insert(IF_NONE_MATCH, value);
        }
        if let Some(last_modified) = self.last_modified
            && let Ok(value) = HeaderValue::from_str(&httpdate::fmt_http_date(last_modified))
        {
            headers.insert(IF_MODIFIED_SINCE, value);
        }
        headers
    }

    /// Combines a stored entry with its body stream.
    pub fn into_response(self, body: CachedBody) -> CachedResponse {
        CachedResponse {
            status: self.status.unwrap_or(StatusCode::OK),
            headers: self.response_headers,
            body,
            stored_at: self.stored_at,
            expires_at: self.expires_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use url::Url;

    use super::*;

    fn request(method: Method, url: &str, headers: &[(&'static str, &'static str)]) -> RequestIdentity {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.append(*name, HeaderValue::from_static(*value));
        }
        RequestIdentity::new(method, Url::parse(url).unwrap(), map)
    }

    fn response(status: u16, headers: &[(&'static str, &'static str)]) -> ResponseMeta {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.append(*name, HeaderValue::from_static(*value));
        }
        ResponseMeta::new(StatusCode::from_u16(status).unwrap(), map)
    }

    fn http(req: &RequestIdentity, resp: &ResponseMeta) -> CacheEntry {
        CacheEntry::for_response(EntryFlavor::Http, req, resp)
    }

    fn stored(entry: &CacheEntry) -> CacheEntry {
        let mut out = Vec::new();
        entry.write_to(&mut out).unwrap();
        CacheEntry::read_from(&out[..]).unwrap()
    }

    #[test]
    fn cacheability_follows_http_rules() {
        let get = request(Method::GET, "https://example.com/", &[]);
        assert!(http(&get, &response(200, &[])).can_be_cached());
        assert!(http(&get, &response(404, &[])).can_be_cached());
        assert!(!http(&get, &response(500, &[])).can_be_cached());
        assert!(!http(&get, &response(200, &[("cache-control", "no-store")])).can_be_cached());
        assert!(!http(&get, &response(200, &[("cache-control", "private")])).can_be_cached());
        assert!(!http(&get, &response(200, &[("cache-control", "max-age=0")])).can_be_cached());
        assert!(!http(&get, &response(200, &[("pragma", "no-cache")])).can_be_cached());

        let no_store = request(Method::GET, "https://example.com/", &[("cache-control", "no-store")]);
        assert!(!http(&no_store, &response(200, &[])).can_be_cached());

        let post = request(Method::POST, "https://example.com/", &[]);
        assert!(!http(&post, &response(200, &[])).can_be_cached());
    }

    #[test]
    fn permanent_flavor_ignores_freshness() {
        let get = request(Method::GET, "https://example.com/", &[]);
        let resp = response(200, &[("cache-control", "no-cache, max-age=0")]);
        let entry = CacheEntry::for_response(EntryFlavor::Permanent, &get, &resp);
        assert!(entry.can_be_cached());
        assert!(stored(&entry).can_be_used());
        assert!(!CacheEntry::for_response(EntryFlavor::Permanent, &get, &response(404, &[])).can_be_cached());
    }

    #[test]
    fn expiry_controls_usability() {
        let get = request(Method::GET, "https://example.com/", &[]);
        let now = Utc::now();
        let entry = CacheEntry::for_response_at(
            EntryFlavor::Http,
            &get,
            &response(200, &[("cache-control", "max-age=60")]),
            now,
        );
        assert!(entry.can_be_used_at(now + TimeDelta::seconds(59)));
        assert!(!entry.can_be_used_at(now + TimeDelta::seconds(61)));
        assert!(http(&get, &response(200, &[])).can_be_used());
    }

    #[test]
    fn matching_respects_method_uri_and_vary() {
        let gzip = request(Method::GET, "https://example.com/", &[("accept-encoding", "gzip")]);
        let resp = response(200, &[("vary", "Accept-Encoding")]);
        let entry = stored(&http(&gzip, &resp));

        assert!(CacheEntry::for_request(EntryFlavor::Http, &gzip).matches(&entry));
        let br = request(Method::GET, "https://example.com/", &[("accept-encoding", "br")]);
        assert!(!CacheEntry::for_request(EntryFlavor::Http, &br).matches(&entry));
        let other = request(Method::GET, "https://example.com/other", &[("accept-encoding", "gzip")]);
        assert!(!CacheEntry::for_request(EntryFlavor::Http, &other).matches(&entry));

        let star = stored(&http(&gzip, &response(200, &[("vary", "*")])));
        assert!(!CacheEntry::for_request(EntryFlavor::Http, &gzip).matches(&star));
    }

    #[test]
    fn stored_entry_keeps_validators() {
        let get = request(Method::GET, "https://example.com/", &[("accept", "text/html")]);
        let resp = response(
            200,
            &[
                ("etag", "\"abc\""),
                ("last-modified", "Wed, 21 Oct 2015 07:28:00 GMT"),
            ],
        );
        let entry = stored(&http(&get, &resp));
        assert_eq!(entry.etag(), Some("\"abc\""));
        assert_eq!(entry.key(), CacheEntry::for_request(EntryFlavor::Http, &get).key());

        let validation = entry.validation_headers();
        assert_eq!(validation[IF_NONE_MATCH], "\"abc\"");
        assert_eq!(validation[IF_MODIFIED_SINCE], "Wed, 21 Oct 2015 07:28:00 GMT");
    }

    #[test]
    fn request_only_entry_cannot_be_written() {
        let get = request(Method::GET, "https://example.com/", &[]);
        let entry = CacheEntry::for_request(EntryFlavor::Http, &get);
        assert!(!entry.can_be_cached());
        assert!(entry.write_to(Vec::new()).is_err());
    }
}
