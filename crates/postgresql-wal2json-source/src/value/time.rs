//! Parsing of PostgreSQL date/time strings as rendered by wal2json.

use chrono::{DateTime, NaiveDateTime, Utc};

/// Parses a PostgreSQL TIMESTAMP (without time zone).
///
/// Supports:
/// - PostgreSQL wal2json: "2024-01-15 10:30:00", "1997-12-17 15:37:16.123456"
/// - ISO 8601 without zone: "2024-01-15T10:30:00"
pub fn parse_timestamp(s: &str) -> Result<NaiveDateTime, String> {
    let formats = [
        "%Y-%m-%d %H:%M:%S",    // 2024-01-15 10:30:00
        "%Y-%m-%d %H:%M:%S%.f", // With fractional seconds
        "%Y-%m-%dT%H:%M:%S",    // ISO 8601 without timezone
        "%Y-%m-%dT%H:%M:%S%.f", // ISO 8601 with fractional seconds, no timezone
    ];

    for format in formats {
        if let Ok(naive_dt) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(naive_dt);
        }
    }

    Err(format!("Unable to parse timestamp: {s}"))
}

/// Parses a PostgreSQL TIMESTAMPTZ to `DateTime<Utc>`.
///
/// Supports:
/// - ISO 8601: "2024-01-15T10:30:00+00:00", "1997-12-17T15:37:16Z"
/// - PostgreSQL wal2json: "2024-01-15 10:30:00+00", "2024-01-15 10:30:00.123456+05:30"
pub fn parse_timestamptz(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = s.parse::<DateTime<Utc>>() {
        return Ok(dt);
    }

    // Normalize short timezone offset like +00 or -08 to +00:00 or -08:00
    let normalized = if s.len() > 3 {
        let tz_start = s.len() - 3;
        match s.as_bytes()[tz_start] {
            b'+' | b'-' => format!("{s}:00"),
            _ => s.to_string(),
        }
    } else {
        s.to_string()
    };

    let formats = [
        "%Y-%m-%d %H:%M:%S%:z",    // 2024-01-15 10:30:00+00:00
        "%Y-%m-%d %H:%M:%S%z",     // 2024-01-15 10:30:00+0000
        "%Y-%m-%d %H:%M:%S%.f%:z", // With fractional seconds
        "%Y-%m-%d %H:%M:%S%.f%z",  // With fractional seconds
    ];

    for format in formats {
        if let Ok(dt) = DateTime::parse_from_str(&normalized, format) {
            return Ok(dt.with_timezone(&Utc));
        }
    }

    Err(format!("Unable to parse timestamptz: {s}"))
}
