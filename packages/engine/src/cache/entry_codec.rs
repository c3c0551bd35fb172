//! Metadata stream encoding
//!
//! Stream 1 of every entry holds one JSON document describing the request
//! and response the body belongs to.

use std::io::{Read, Write};

use chrono::{DateTime, Utc};
use http::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

use super::cache_entry::EntryFlavor;
use crate::error::{CacheError, Result, malformed_entry};

/// Tag written into every metadata document
pub const FORMAT_TAG: &str = "respcache/2";

/// Persisted form of a cache entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMetadata {
    pub format: String,
    pub flavor: EntryFlavor,
    /// Storage key the entry was written under
    pub key: String,
    pub method: String,
    pub uri: String,
    /// Request headers named by the response's `Vary`
    pub request_headers: Vec<StoredHeader>,
    pub status: u16,
    pub response_headers: Vec<StoredHeader>,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub stored_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl StoredMetadata {
    pub fn write_to<W: Write>(&self, out: W) -> Result<()> {
        serde_json::to_writer(out, self).map_err(|e| CacheError::Io(e.into()))
    }

    /// Decodes a metadata stream, rejecting truncated or foreign documents.
    pub fn read_from<R: Read>(input: R) -> Result<Self> {
        let metadata: Self = serde_json::from_reader(input).map_err(|e| {
            if e.is_io() {
                CacheError::Io(e.into())
            } else {
                malformed_entry(e)
            }
        })?;
        if metadata.format != FORMAT_TAG {
            return Err(malformed_entry(format!(
                "unknown metadata format {:?}",
                metadata.format
            )));
        }
        Ok(metadata)
    }
}

/// One header line.
///
/// Values that are not visible ASCII are kept hex encoded so their bytes
/// come back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredHeader {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub hex: bool,
}

impl StoredHeader {
    pub fn new(name: &HeaderName, value: &HeaderValue) -> Self {
        match value.to_str() {
            Ok(text) => Self {
                name: name.as_str().to_string(),
                value: text.to_string(),
                hex: false,
            },
            Err(_) => Self {
                name: name.as_str().to_string(),
                value: hex::encode(value.as_bytes()),
                hex: true,
            },
        }
    }

    fn to_header(&self) -> Result<(HeaderName, HeaderValue)> {
        let name = HeaderName::from_bytes(self.name.as_bytes()).map_err(malformed_entry)?;
        let value = if self.hex {
            let bytes = hex::decode(&self.value).map_err(malformed_entry)?;
            HeaderValue::from_bytes(&bytes).map_err(malformed_entry)?
        } else {
            HeaderValue::from_str(&self.value).map_err(malformed_entry)?
        };
        Ok((name, value))
    }
}

/// Flattens a header map into stored lines, keeping repeated names.
pub fn header_pairs(headers: &HeaderMap) -> Vec<StoredHeader> {
    headers
        .iter()
        .map(|(name, value)| StoredHeader::new(name, value))
        .collect()
}

/// Rebuilds a header map from stored lines.
pub fn header_map(pairs: &[StoredHeader]) -> Result<HeaderMap> {
    let mut headers = HeaderMap::with_capacity(pairs.len());
    for pair in pairs {
        let (name, value) = pair.to_header()?;
        headers.append(name, value);
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(name: &str, value: &str) -> StoredHeader {
        StoredHeader {
            name: name.to_string(),
            value: value.to_string(),
            hex: false,
        }
    }

    fn sample() -> StoredMetadata {
        StoredMetadata {
            format: FORMAT_TAG.to_string(),
            flavor: EntryFlavor::Http,
            key: "ab12".to_string(),
            method: "GET".to_string(),
            uri: "https://example.com/".to_string(),
            request_headers: vec![text("accept", "text/html")],
            status: 200,
            response_headers: vec![text("set-cookie", "a=1"), text("set-cookie", "b=2")],
            etag: Some("\"v1\"".into()),
            last_modified: None,
            stored_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            expires_at: None,
        }
    }

    #[test]
    fn metadata_survives_encoding() {
        let mut out = Vec::new();
        sample().write_to(&mut out).unwrap();
        assert_eq!(StoredMetadata::read_from(&out[..]).unwrap(), sample());
    }

    #[test]
    fn truncated_or_foreign_metadata_is_malformed() {
        let mut out = Vec::new();
        sample().write_to(&mut out).unwrap();
        let truncated = StoredMetadata::read_from(&out[..out.len() / 2]);
        assert!(matches!(truncated, Err(CacheError::MalformedEntry(_))));
        assert!(matches!(
            StoredMetadata::read_from(&b""[..]),
            Err(CacheError::MalformedEntry(_))
        ));

        let foreign = StoredMetadata {
            format: "other/9".into(),
            ..sample()
        };
        let mut out = Vec::new();
        foreign.write_to(&mut out).unwrap();
        assert!(matches!(
            StoredMetadata::read_from(&out[..]),
            Err(CacheError::MalformedEntry(_))
        ));
    }

    #[test]
    fn repeated_headers_are_kept() {
        let headers = header_map(&sample().response_headers).unwrap();
        assert_eq!(headers.get_all("set-cookie").iter().count(), 2);
        assert_eq!(header_pairs(&headers), sample().response_headers);
        assert!(header_map(&[text("bad name", "x")]).is_err());
    }

    #[test]
    fn opaque_header_bytes_are_preserved() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-disposition",
            HeaderValue::from_bytes(b"attachment; filename=caf\xe9.txt").unwrap(),
        );
        headers.insert("content-type", HeaderValue::from_static("text/plain"));

        let pairs = header_pairs(&headers);
        let metadata = StoredMetadata {
            response_headers: pairs,
            ..sample()
        };
        let mut out = Vec::new();
        metadata.write_to(&mut out).unwrap();
        let json = String::from_utf8(out.clone()).unwrap();
        assert!(json.contains("\"hex\":true"));
        assert_eq!(json.matches("\"hex\"").count(), 1);

        let decoded = StoredMetadata::read_from(&out[..]).unwrap();
        let restored = header_map(&decoded.response_headers).unwrap();
        assert_eq!(
            restored["content-disposition"].as_bytes(),
            b"attachment; filename=caf\xe9.txt"
        );
        assert_eq!(restored["content-type"], "text/plain");

        let broken = StoredHeader {
            hex: true,
            ..text("x-bad", "zz")
        };
        assert!(matches!(header_map(&[broken]), Err(CacheError::MalformedEntry(_))));
    }
}
