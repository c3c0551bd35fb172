//! HTTP date parsing and formatting utilities
//!
//! Accepts the three RFC 7231 formats plus RFC 2822 as a fallback and always
//! formats as IMF-fixdate.

use chrono::{DateTime, NaiveDateTime, Utc};

/// HTTP date parsing error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HttpDateParseError {
    /// Date format was not recognized by any of the supported parsers
    #[error("unrecognized HTTP date format: {0}")]
    UnrecognizedFormat(String),
}

const IMF_FIXDATE: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// HTTP date parsing utilities
pub mod httpdate {
    use super::*;

    /// Parse an HTTP date following the RFC 7231 formats
    pub fn parse_http_date(date_str: &str) -> Result<DateTime<Utc>, HttpDateParseError> {
        let date_str = date_str.trim();

        // IMF-fixdate: "Sun, 06 Nov 1994 08:49:37 GMT"
        if let Ok(dt) = NaiveDateTime::parse_from_str(date_str, IMF_FIXDATE) {
            return Ok(dt.and_utc());
        }

        // RFC 850: "Sunday, 06-Nov-94 08:49:37 GMT"
        if let Ok(dt) = NaiveDateTime::parse_from_str(date_str, "%A, %d-%b-%y %H:%M:%S GMT") {
            return Ok(dt.and_utc());
        }

        // asctime: "Sun Nov  6 08:49:37 1994"
        if let Ok(dt) = NaiveDateTime::parse_from_str(date_str, "%a %b %e %H:%M:%S %Y") {
            return Ok(dt.and_utc());
        }

        if let Ok(dt) = DateTime::parse_from_rfc2822(date_str) {
            return Ok(dt.with_timezone(&Utc));
        }

        Err(HttpDateParseError::UnrecognizedFormat(date_str.to_string()))
    }

    /// Format a timestamp as an IMF-fixdate HTTP date
    pub fn fmt_http_date(time: DateTime<Utc>) -> String {
        time.format(IMF_FIXDATE).to_string()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::httpdate::{fmt_http_date, parse_http_date};

    #[test]
    fn all_rfc7231_formats_parse_to_the_same_instant() {
        let expected = chrono::Utc.with_ymd_and_hms(1994, 11, 6, 8, 49, 37).unwrap();
        assert_eq!(parse_http_date("Sun, 06 Nov 1994 08:49:37 GMT").unwrap(), expected);
        assert_eq!(parse_http_date("Sunday, 06-Nov-94 08:49:37 GMT").unwrap(), expected);
        assert_eq!(parse_http_date("Sun Nov  6 08:49:37 1994").unwrap(), expected);
    }

    #[test]
    fn formatting_uses_imf_fixdate() {
        let time = chrono::Utc.with_ymd_and_hms(2015, 10, 21, 7, 28, 0).unwrap();
        let text = fmt_http_date(time);
        assert_eq!(text, "Wed, 21 Oct 2015 07:28:00 GMT");
        assert_eq!(parse_http_date(&text).unwrap(), time);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_http_date("0").is_err());
        assert!(parse_http_date("yesterday").is_err());
    }
}
