//! Timestamp parsing and token expiry arithmetic.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};

/// Token lifetime assumed when the server does not supply a usable expiry.
pub const TOKEN_EXPIRY_MINUTES: i64 = 60;

/// Window before expiry in which a background refresh is started.
pub const REFRESH_THRESHOLD_MINUTES: i64 = 5;

/// Parse a timestamp as sent by the API.
///
/// Accepts RFC 3339 (`2026-01-31T12:00:00Z`, with any offset) and the
/// `YYYY-MM-DD HH:MM:SS` form produced by MySQL `DATETIME` columns, which is
/// read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Fresh expiry counted from `now`
pub fn default_expiry(now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::minutes(TOKEN_EXPIRY_MINUTES)
}

/// Use `raw` if it parses and lies strictly after `now`, otherwise a fresh expiry.
pub fn resolve_expiry(raw: Option<&str>, now: DateTime<Utc>) -> DateTime<Utc> {
    raw.and_then(parse_timestamp)
        .filter(|expiry| *expiry > now)
        .unwrap_or_else(|| default_expiry(now))
}

/// Serialized form written to the store
pub fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = DateTime::parse_from_rfc3339("2026-03-01T10:30:00Z")
            .unwrap()
            .with_timezone(&Utc);

        assert_eq!(parse_timestamp("2026-03-01T10:30:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2026-03-01T12:30:00+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2026-03-01 10:30:00"), Some(expected));
        assert_eq!(parse_timestamp("  "), None);
        assert_eq!(parse_timestamp("next tuesday"), None);
    }

    #[test]
    fn test_resolve_expiry_keeps_future_value() {
        let now = Utc::now();
        let future = now + Duration::minutes(90);
        assert_eq!(
            resolve_expiry(Some(format_timestamp(future).as_str()), now).timestamp(),
            future.timestamp()
        );
    }

    #[test]
    fn test_resolve_expiry_replaces_past_or_garbage() {
        let now = Utc::now();
        let past = format_timestamp(now - Duration::minutes(1));

        assert_eq!(resolve_expiry(Some(past.as_str()), now), default_expiry(now));
        assert_eq!(resolve_expiry(Some("garbage"), now), default_expiry(now));
        assert_eq!(resolve_expiry(None, now), default_expiry(now));
        // Exactly now is not strictly in the future
        assert_eq!(
            resolve_expiry(Some(format_timestamp(now).as_str()), now),
            default_expiry(now)
        );
    }
}
