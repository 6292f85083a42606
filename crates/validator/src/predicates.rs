//! Predicates deciding whether a string is a valid instance of a dynamic kind

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

/// Maximum age of a RECENT_TIMESTAMP, inclusive
pub const RECENT_WINDOW_MS: i64 = 10_000;

// RFC 3986 appendix B; group 5 is the path component.
static URI_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(([^:/?#]+):)?(//([^/?#]*))?([^?#]*)(\?([^#]*))?(#(.*))?$")
        .expect("URI reference pattern is valid")
});

pub fn validate_timestamp(value: &str) -> bool {
    parse_rfc3339(value).is_some()
}

/// RFC 3339 date-time with an uppercase `T` separator and `Z` or numeric offset.
/// chrono alone also takes a space or lowercase `t`/`z`.
fn parse_rfc3339(value: &str) -> Option<DateTime<Utc>> {
    if value.as_bytes().get(10) != Some(&b'T') || value.ends_with('z') {
        return None;
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

/// RFC 3339 timestamp no later than `now` and no older than the recency window
pub fn validate_recent_timestamp(value: &str, now: DateTime<Utc>) -> bool {
    let Some(parsed) = parse_rfc3339(value) else {
        return false;
    };

    let age = now - parsed;
    age >= Duration::zero() && age <= Duration::milliseconds(RECENT_WINDOW_MS)
}

/// Any version or variant, in hyphenated, simple, braced or URN form
pub fn validate_uuid(value: &str) -> bool {
    Uuid::parse_str(value).is_ok()
}

/// Absolute URL with a scheme and a non-empty host
pub fn validate_url(value: &str) -> bool {
    match url::Url::parse(value) {
        Ok(parsed) => {
            !parsed.scheme().is_empty() && parsed.host_str().is_some_and(|host| !host.is_empty())
        }
        Err(_) => false,
    }
}

/// URI reference (absolute or relative) whose path component is non-empty
pub fn validate_uri_path(value: &str) -> bool {
    if value.chars().any(|c| c.is_ascii_control()) || !percent_escapes_valid(value) {
        return false;
    }

    URI_REFERENCE
        .captures(value)
        .and_then(|caps| caps.get(5))
        .is_some_and(|path| !path.as_str().is_empty())
}

/// Every `%` must start a `%XX` escape with two hex digits
fn percent_escapes_valid(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.iter().enumerate().all(|(i, b)| {
        *b != b'%'
            || matches!(
                (bytes.get(i + 1), bytes.get(i + 2)),
                (Some(h), Some(l)) if h.is_ascii_hexdigit() && l.is_ascii_hexdigit()
            )
    })
}
