//! HTTP date parsing for `Expires` headers

use chrono::{DateTime, NaiveDateTime, Utc};

/// HTTP date parsing error types
#[derive(Debug, Clone, thiserror::Error)]
pub enum HttpDateParseError {
    /// Date format was not recognized by any of the supported parsers
    #[error("Unrecognized HTTP date format: {0}")]
    UnrecognizedFormat(String),
}

/// Parse an HTTP date in any of the RFC 7231 formats.
///
/// 1. IMF-fixdate: `Sun, 06 Nov 1994 08:49:37 GMT`
/// 2. RFC 850: `Sunday, 06-Nov-94 08:49:37 GMT`
/// 3. asctime: `Sun Nov  6 08:49:37 1994`
pub fn parse_http_date(date_str: &str) -> Result<DateTime<Utc>, HttpDateParseError> {
    let trimmed = date_str.trim();

    if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, "%a, %d %b %Y %H:%M:%S GMT") {
        return Ok(dt.and_utc());
    }

    if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, "%A, %d-%b-%y %H:%M:%S GMT") {
        return Ok(dt.and_utc());
    }

    if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, "%a %b %e %H:%M:%S %Y") {
        return Ok(dt.and_utc());
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }

    Err(HttpDateParseError::UnrecognizedFormat(date_str.to_string()))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn parses_all_rfc7231_forms() {
        let expected = Utc.with_ymd_and_hms(1994, 11, 6, 8, 49, 37).single().expect("valid");
        assert_eq!(parse_http_date("Sun, 06 Nov 1994 08:49:37 GMT").ok(), Some(expected));
        assert_eq!(parse_http_date("Sunday, 06-Nov-94 08:49:37 GMT").ok(), Some(expected));
        assert_eq!(parse_http_date("Sun Nov  6 08:49:37 1994").ok(), Some(expected));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_http_date("yesterday").is_err());
        assert!(parse_http_date("0").is_err());
    }
}
