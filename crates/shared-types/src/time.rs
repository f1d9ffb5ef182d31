//! # Timestamp Formats
//!
//! Windows travel as ISO-8601 strings with millisecond precision, canonical
//! documents carry reading timestamps at nanosecond precision. Both are UTC
//! with a `Z` suffix.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};

/// Timestamp type used throughout the workspace.
pub type Timestamp = DateTime<Utc>;

/// `2024-01-01T00:05:00.000Z`
pub fn format_millis(ts: &Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// `2024-01-01T00:05:00.000000000Z`
pub fn format_nanos(ts: &Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Truncate a timestamp to whole milliseconds.
pub fn truncate_millis(ts: Timestamp) -> Timestamp {
    ts.trunc_subsecs(3)
}

/// Last nanosecond of the millisecond holding `ts`.
pub fn end_of_millis(ts: Timestamp) -> Timestamp {
    let start = truncate_millis(ts);
    start
        .checked_add_signed(chrono::Duration::nanoseconds(999_999))
        .unwrap_or(start)
}

/// Parse any RFC 3339 timestamp into UTC.
pub fn parse_rfc3339(value: &str) -> Result<Timestamp, chrono::ParseError> {
    DateTime::parse_from_rfc3339(value).map(|ts| ts.with_timezone(&Utc))
}

/// Serde adapter writing timestamps in the millisecond window format.
pub mod serde_millis {
    use super::{format_millis, parse_rfc3339, Timestamp};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &Timestamp, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_millis(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Timestamp, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_rfc3339(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_millis() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 5, 0).unwrap();
        assert_eq!(format_millis(&ts), "2024-01-01T00:05:00.000Z");
    }

    #[test]
    fn test_format_nanos() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 1, 0).unwrap();
        assert_eq!(format_nanos(&ts), "2024-01-01T00:01:00.000000000Z");
    }

    #[test]
    fn test_parse_offset_normalizes_to_utc() {
        let ts = parse_rfc3339("2024-01-01T02:00:00+02:00").unwrap();
        assert_eq!(format_millis(&ts), "2024-01-01T00:00:00.000Z");
    }

    #[test]
    fn test_truncate_millis() {
        let ts = parse_rfc3339("2024-01-01T00:00:00.123456789Z").unwrap();
        assert_eq!(format_nanos(&truncate_millis(ts)), "2024-01-01T00:00:00.123000000Z");
    }

    #[test]
    fn test_end_of_millis() {
        let ts = parse_rfc3339("2024-01-01T00:05:00.000000500Z").unwrap();
        assert_eq!(format_nanos(&end_of_millis(ts)), "2024-01-01T00:05:00.000999999Z");
    }
}
