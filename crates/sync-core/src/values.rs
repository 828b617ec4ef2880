//! Scalar value representation shared by the decoder, bulk loader and apply engine.
//!
//! Columns are modelled as a closed tagged union rather than an open dynamic
//! value so that mapping a change onto a target column is checked against a
//! [`ColumnKind`] instead of being discovered at statement execution time.

use chrono::{DateTime, NaiveDateTime, Utc};
use std::fmt;
use uuid::Uuid;

/// The kind of scalar a column holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnKind {
    /// `boolean`
    Boolean,
    /// Any of the signed integer types (`smallint`, `integer`, `bigint`)
    Integer,
    /// Character types (`text`, `varchar(n)`, `char(n)`)
    Text,
    /// `uuid`
    Uuid,
    /// `timestamp without time zone`
    Timestamp,
    /// `timestamp with time zone`
    TimestampTz,
}

impl ColumnKind {
    /// Maps a PostgreSQL type name, as rendered by wal2json or `format_type`,
    /// onto a column kind.
    ///
    /// Returns `None` for types without a dedicated kind; callers keep those
    /// values as text.
    pub fn from_source_type(source_type: &str) -> Option<Self> {
        let source_type = source_type.trim();
        match source_type {
            "smallint" | "int2" | "integer" | "int" | "int4" | "bigint" | "int8" | "serial"
            | "bigserial" => Some(Self::Integer),
            "text" | "name" => Some(Self::Text),
            "uuid" => Some(Self::Uuid),
            "boolean" | "bool" => Some(Self::Boolean),
            "timestamp" | "timestamp without time zone" => Some(Self::Timestamp),
            "timestamptz" | "timestamp with time zone" => Some(Self::TimestampTz),
            s if s.starts_with("character varying")
                || s.starts_with("varchar")
                || s.starts_with("character")
                || s.starts_with("char") =>
            {
                Some(Self::Text)
            }
            // Precision-qualified timestamps, e.g. "timestamp(3) without time zone"
            s if s.starts_with("timestamp(") && s.ends_with(" with time zone") => {
                Some(Self::TimestampTz)
            }
            s if s.starts_with("timestamp(") => Some(Self::Timestamp),
            _ => None,
        }
    }

    /// Short lowercase name used in log lines and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Text => "text",
            Self::Uuid => "uuid",
            Self::Timestamp => "timestamp",
            Self::TimestampTz => "timestamptz",
        }
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single, possibly null, column value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ColumnValue {
    /// SQL NULL
    Null,
    /// Boolean value
    Boolean(bool),
    /// Signed integer, widened to 64 bits
    Integer(i64),
    /// Character data
    Text(String),
    /// UUID value
    Uuid(Uuid),
    /// Timestamp without time zone
    Timestamp(NaiveDateTime),
    /// Timestamp with time zone, normalised to UTC
    TimestampTz(DateTime<Utc>),
}

impl ColumnValue {
    /// Create a text value.
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// The kind of this value, or `None` for NULL.
    pub fn kind(&self) -> Option<ColumnKind> {
        match self {
            Self::Null => None,
            Self::Boolean(_) => Some(ColumnKind::Boolean),
            Self::Integer(_) => Some(ColumnKind::Integer),
            Self::Text(_) => Some(ColumnKind::Text),
            Self::Uuid(_) => Some(ColumnKind::Uuid),
            Self::Timestamp(_) => Some(ColumnKind::Timestamp),
            Self::TimestampTz(_) => Some(ColumnKind::TimestampTz),
        }
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Try to get this value as a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get this value as an i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to get this value as a string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get this value as a UUID.
    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            Self::Uuid(u) => Some(*u),
            _ => None,
        }
    }

    /// Try to get this value as a naive timestamp.
    ///
    /// Zoned timestamps are converted to their UTC wall-clock time.
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Self::Timestamp(ts) => Some(*ts),
            Self::TimestampTz(ts) => Some(ts.naive_utc()),
            _ => None,
        }
    }
}

impl fmt::Display for ColumnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Text(s) => write!(f, "{s:?}"),
            Self::Uuid(u) => write!(f, "{u}"),
            Self::Timestamp(ts) => write!(f, "{ts}"),
            Self::TimestampTz(ts) => write!(f, "{}", ts.to_rfc3339()),
        }
    }
}

impl From<i64> for ColumnValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for ColumnValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<bool> for ColumnValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<&str> for ColumnValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ColumnValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Uuid> for ColumnValue {
    fn from(value: Uuid) -> Self {
        Self::Uuid(value)
    }
}

impl From<NaiveDateTime> for ColumnValue {
    fn from(value: NaiveDateTime) -> Self {
        Self::Timestamp(value)
    }
}

impl From<DateTime<Utc>> for ColumnValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::TimestampTz(value)
    }
}

impl<T: Into<ColumnValue>> From<Option<T>> for ColumnValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_wal2json_type_names() {
        assert_eq!(
            ColumnKind::from_source_type("integer"),
            Some(ColumnKind::Integer)
        );
        assert_eq!(
            ColumnKind::from_source_type("character varying(100)"),
            Some(ColumnKind::Text)
        );
        assert_eq!(ColumnKind::from_source_type("uuid"), Some(ColumnKind::Uuid));
        assert_eq!(
            ColumnKind::from_source_type("timestamp without time zone"),
            Some(ColumnKind::Timestamp)
        );
        assert_eq!(
            ColumnKind::from_source_type("timestamp with time zone"),
            Some(ColumnKind::TimestampTz)
        );
        assert_eq!(
            ColumnKind::from_source_type("timestamp(3) without time zone"),
            Some(ColumnKind::Timestamp)
        );
        assert_eq!(ColumnKind::from_source_type("jsonb"), None);
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(ColumnValue::from(None::<i32>), ColumnValue::Null);
        assert_eq!(ColumnValue::from(Some(5i32)), ColumnValue::Integer(5));
    }

    #[test]
    fn test_zoned_timestamp_as_naive() {
        let zoned = "2024-01-15T10:30:00Z".parse::<DateTime<Utc>>().unwrap();
        let value = ColumnValue::from(zoned);
        assert_eq!(value.as_timestamp(), Some(zoned.naive_utc()));
        assert_eq!(value.kind(), Some(ColumnKind::TimestampTz));
    }
}
