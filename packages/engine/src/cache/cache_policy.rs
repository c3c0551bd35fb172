//! Cache-Control, Pragma, Expires and Vary handling
//!
//! Just enough header interpretation to decide whether a response may be
//! stored and for how long it stays usable.

use chrono::{DateTime, TimeDelta, Utc};
use http::HeaderMap;
use http::header::{CACHE_CONTROL, DATE, EXPIRES, PRAGMA, VARY};

use super::http_date::httpdate;

/// Parsed `Cache-Control` directives
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheControl {
    pub no_store: bool,
    pub no_cache: bool,
    pub private: bool,
    pub public: bool,
    pub must_revalidate: bool,
    pub max_age: Option<u64>,
}

impl CacheControl {
    /// Collects the directives of every `Cache-Control` header line.
    pub fn parse(headers: &HeaderMap) -> Self {
        let mut control = Self::default();
        for value in headers.get_all(CACHE_CONTROL) {
            let Ok(value) = value.to_str() else {
                continue;
            };
            for directive in value.split(',') {
                let (name, argument) = match directive.split_once('=') {
                    Some((name, argument)) => (name, Some(argument.trim().trim_matches('"'))),
                    None => (directive, None),
                };
                match name.trim().to_ascii_lowercase().as_str() {
                    "no-store" => control.no_store = true,
                    "no-cache" => control.no_cache = true,
                    "private" => control.private = true,
                    "public" => control.public = true,
                    "must-revalidate" => control.must_revalidate = true,
                    "max-age" => {
                        // Unparsable max-age counts as already stale.
                        control.max_age = Some(argument.and_then(|a| a.parse().ok()).unwrap_or(0));
                    }
                    _ => {}
                }
            }
        }
        control
    }
}

/// Whether a `Pragma: no-cache` header is present.
pub fn pragma_no_cache(headers: &HeaderMap) -> bool {
    headers.get_all(PRAGMA).iter().any(|value| {
        value
            .to_str()
            .is_ok_and(|v| v.split(',').any(|d| d.trim().eq_ignore_ascii_case("no-cache")))
    })
}

/// When a response received at `now` stops being usable.
///
/// `max-age` wins over `Expires`; `Expires` is taken relative to the
/// response's `Date` so clock skew between server and client cancels out.
/// `None` means the response carries no expiry.
pub fn expires_at(headers: &HeaderMap, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if let Some(max_age) = CacheControl::parse(headers).max_age {
        let seconds = i64::try_from(max_age).unwrap_or(i64::MAX);
        let ttl = TimeDelta::try_seconds(seconds).unwrap_or(TimeDelta::MAX);
        return Some(now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC));
    }

    let expires = headers.get(EXPIRES)?.to_str().ok()?;
    let Ok(expires) = httpdate::parse_http_date(expires) else {
        // An invalid Expires value means already expired.
        return Some(now);
    };
    let date = headers
        .get(DATE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| httpdate::parse_http_date(value).ok());
    match date {
        Some(date) => Some(now.checked_add_signed(expires - date).unwrap_or(now)),
        None => Some(expires),
    }
}

/// Lower-case header names listed in `Vary`, including `*`.
pub fn vary_names(headers: &HeaderMap) -> Vec<String> {
    let mut names: Vec<String> = headers
        .get_all(VARY)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect();
    names.sort();
    names.dedup();
    names
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use http::HeaderValue;

    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_static(*value));
        }
        map
    }

    #[test]
    fn directives_are_case_insensitive_and_merged() {
        let control = CacheControl::parse(&headers(&[
            ("cache-control", "Public, MAX-AGE=\"60\""),
            ("cache-control", "no-cache"),
        ]));
        assert!(control.public);
        assert!(control.no_cache);
        assert!(!control.no_store);
        assert_eq!(control.max_age, Some(60));
    }

    #[test]
    fn pragma_no_cache_is_detected() {
        assert!(pragma_no_cache(&headers(&[("pragma", "No-Cache")])));
        assert!(!pragma_no_cache(&headers(&[("pragma", "x-other")])));
    }

    #[test]
    fn max_age_wins_over_expires() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let map = headers(&[
            ("cache-control", "max-age=10"),
            ("expires", "Wed, 21 Oct 2015 07:28:00 GMT"),
        ]);
        assert_eq!(expires_at(&map, now), Some(now + TimeDelta::seconds(10)));
    }

    #[test]
    fn expires_is_relative_to_date() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let map = headers(&[
            ("date", "Wed, 21 Oct 2015 07:28:00 GMT"),
            ("expires", "Wed, 21 Oct 2015 08:28:00 GMT"),
        ]);
        assert_eq!(expires_at(&map, now), Some(now + TimeDelta::hours(1)));
        assert_eq!(expires_at(&headers(&[("expires", "0")]), now), Some(now));
        assert_eq!(expires_at(&HeaderMap::new(), now), None);
    }

    #[test]
    fn vary_names_are_normalized() {
        let map = headers(&[("vary", "Accept-Encoding, accept"), ("vary", "ACCEPT")]);
        assert_eq!(vary_names(&map), ["accept", "accept-encoding"]);
    }
}
