//! Decoder for wal2json format-version 2 records.
//!
//! Each row returned by `pg_logical_slot_get_changes` with
//! `'format-version', '2'` is one JSON document describing one change:
//!
//! ```json
//! {
//!   "action": "U",
//!   "timestamp": "2024-01-15 10:30:00.123456+00",
//!   "schema": "public",
//!   "table": "person",
//!   "columns": [{"name": "id", "type": "integer", "value": 1}, ...],
//!   "identity": [{"name": "id", "type": "integer", "value": 1}]
//! }
//! ```

use serde::Deserialize;
use sync_core::{ChangeAction, ChangeEvent, Column, ColumnKind, ColumnValue};
use tracing::debug;

use crate::error::DecodeError;
use crate::value::time::{parse_timestamp, parse_timestamptz};

/// Raw wal2json v2 document.
#[derive(Debug, Deserialize)]
struct Wal2JsonRecord {
    action: String,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    schema: Option<String>,
    #[serde(default)]
    table: Option<String>,
    #[serde(default)]
    columns: Vec<Wal2JsonColumn>,
    #[serde(default)]
    identity: Vec<Wal2JsonColumn>,
}

/// Raw wal2json v2 column entry.
#[derive(Debug, Deserialize)]
struct Wal2JsonColumn {
    name: String,
    #[serde(rename = "type")]
    type_name: String,
    #[serde(default)]
    value: serde_json::Value,
}

/// Decodes one wal2json record into a [`ChangeEvent`].
///
/// Records for every table are decoded; filtering by table is the caller's
/// job. Transaction markers (`B`/`C`) and any other action are rejected with
/// [`DecodeError::UnknownAction`].
pub fn decode(raw: &[u8]) -> Result<ChangeEvent, DecodeError> {
    let record: Wal2JsonRecord = serde_json::from_slice(raw)?;

    let action = ChangeAction::from_code(&record.action)
        .ok_or_else(|| DecodeError::UnknownAction(record.action.clone()))?;

    let table = record.table.ok_or(DecodeError::MissingField("table"))?;
    let schema = record.schema.unwrap_or_else(|| "public".to_string());

    let timestamp = record.timestamp.as_deref().and_then(|ts| {
        parse_timestamptz(ts)
            .map_err(|e| debug!("Ignoring unparseable commit timestamp: {e}"))
            .ok()
    });

    let columns = record
        .columns
        .into_iter()
        .map(convert_column)
        .collect::<Result<Vec<_>, _>>()?;
    let identity = record
        .identity
        .into_iter()
        .map(convert_column)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ChangeEvent {
        action,
        timestamp,
        schema,
        table,
        columns,
        identity,
    })
}

fn convert_column(column: Wal2JsonColumn) -> Result<Column, DecodeError> {
    let value = convert_value(&column.name, &column.type_name, &column.value)?;
    Ok(Column {
        name: column.name,
        source_type: column.type_name,
        value,
    })
}

/// Converts a wal2json column value based on its PostgreSQL type name.
fn convert_value(
    column: &str,
    type_name: &str,
    value: &serde_json::Value,
) -> Result<ColumnValue, DecodeError> {
    if value.is_null() {
        return Ok(ColumnValue::Null);
    }

    let invalid = |reason: String| DecodeError::InvalidValue {
        column: column.to_string(),
        source_type: type_name.to_string(),
        value: value.to_string(),
        reason,
    };

    let Some(kind) = ColumnKind::from_source_type(type_name) else {
        // Default fallback to text
        return Ok(match value.as_str() {
            Some(s) => ColumnValue::Text(s.to_string()),
            None => ColumnValue::Text(value.to_string()),
        });
    };

    match kind {
        ColumnKind::Integer => value
            .as_i64()
            .map(ColumnValue::Integer)
            .ok_or_else(|| invalid("expected an integer".to_string())),
        ColumnKind::Boolean => value
            .as_bool()
            .map(ColumnValue::Boolean)
            .ok_or_else(|| invalid("expected a boolean".to_string())),
        ColumnKind::Text => value
            .as_str()
            .map(|s| ColumnValue::Text(s.to_string()))
            .ok_or_else(|| invalid("expected a string".to_string())),
        ColumnKind::Uuid => {
            let s = value
                .as_str()
                .ok_or_else(|| invalid("expected a string".to_string()))?;
            uuid::Uuid::parse_str(s)
                .map(ColumnValue::Uuid)
                .map_err(|e| invalid(e.to_string()))
        }
        ColumnKind::Timestamp => {
            let s = value
                .as_str()
                .ok_or_else(|| invalid("expected a string".to_string()))?;
            parse_timestamp(s).map(ColumnValue::Timestamp).map_err(invalid)
        }
        ColumnKind::TimestampTz => {
            let s = value
                .as_str()
                .ok_or_else(|| invalid("expected a string".to_string()))?;
            parse_timestamptz(s)
                .map(ColumnValue::TimestampTz)
                .map_err(invalid)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    const UID: &str = "7c9e6679-7425-40de-944b-e07fc1f90ae7";

    fn insert_record() -> String {
        format!(
            r#"{{"action":"I","timestamp":"2024-01-15 10:30:00.123456+00","schema":"public","table":"person","columns":[{{"name":"id","type":"integer","value":3}},{{"name":"name","type":"character varying(100)","value":"Carol"}},{{"name":"uid","type":"uuid","value":"{UID}"}},{{"name":"score","type":"integer","value":9}},{{"name":"created_at","type":"timestamp without time zone","value":"2024-01-15 10:30:00.123456"}}]}}"#
        )
    }

    #[test]
    fn test_decode_insert() {
        let event = decode(insert_record().as_bytes()).unwrap();

        assert_eq!(event.action, ChangeAction::Insert);
        assert_eq!(event.schema, "public");
        assert_eq!(event.table, "person");
        assert_eq!(event.columns.len(), 5);
        assert!(event.identity.is_empty());
        assert!(event.timestamp.is_some());

        let row = event.new_values();
        assert_eq!(row.get("id"), Some(&ColumnValue::Integer(3)));
        assert_eq!(row.get("name"), Some(&ColumnValue::text("Carol")));
        assert_eq!(
            row.get("uid"),
            Some(&ColumnValue::Uuid(uuid::Uuid::parse_str(UID).unwrap()))
        );
        assert_eq!(
            row.get("created_at"),
            Some(&ColumnValue::Timestamp(
                NaiveDateTime::parse_from_str("2024-01-15 10:30:00.123456", "%Y-%m-%d %H:%M:%S%.f")
                    .unwrap()
            ))
        );
        assert_eq!(
            event.column("name").map(|c| c.source_type.as_str()),
            Some("character varying(100)")
        );
    }

    #[test]
    fn test_decode_update_with_identity() {
        let raw = r#"{"action":"U","schema":"public","table":"person",
            "columns":[{"name":"id","type":"integer","value":1},{"name":"score","type":"integer","value":30}],
            "identity":[{"name":"id","type":"integer","value":1}]}"#;
        let event = decode(raw.as_bytes()).unwrap();

        assert_eq!(event.action, ChangeAction::Update);
        assert_eq!(event.timestamp, None);
        assert_eq!(
            event.identity_column("id").map(|c| &c.value),
            Some(&ColumnValue::Integer(1))
        );
        assert_eq!(
            event.column("score").map(|c| &c.value),
            Some(&ColumnValue::Integer(30))
        );
    }

    #[test]
    fn test_decode_delete_identity_only() {
        let raw = r#"{"action":"D","schema":"public","table":"person","identity":[{"name":"id","type":"integer","value":999}]}"#;
        let event = decode(raw.as_bytes()).unwrap();

        assert_eq!(event.action, ChangeAction::Delete);
        assert!(event.columns.is_empty());
        assert_eq!(
            event.identity_values().get("id"),
            Some(&ColumnValue::Integer(999))
        );
    }

    #[test]
    fn test_decode_null_value() {
        let raw = r#"{"action":"I","schema":"public","table":"person","columns":[{"name":"created_at","type":"timestamp without time zone","value":null}]}"#;
        let event = decode(raw.as_bytes()).unwrap();
        assert_eq!(event.columns[0].value, ColumnValue::Null);
    }

    #[test]
    fn test_decode_unknown_type_falls_back_to_text() {
        let raw = r#"{"action":"I","schema":"public","table":"other","columns":[{"name":"payload","type":"jsonb","value":"{\"a\": 1}"},{"name":"ratio","type":"numeric","value":1.5}]}"#;
        let event = decode(raw.as_bytes()).unwrap();
        assert_eq!(event.columns[0].value, ColumnValue::text("{\"a\": 1}"));
        assert_eq!(event.columns[1].value, ColumnValue::text("1.5"));
    }

    #[test]
    fn test_decode_rejects_invalid_json() {
        assert!(matches!(
            decode(b"{not json"),
            Err(DecodeError::Json(_))
        ));
    }

    #[test]
    fn test_decode_rejects_missing_action() {
        let raw = r#"{"schema":"public","table":"person","columns":[]}"#;
        assert!(matches!(decode(raw.as_bytes()), Err(DecodeError::Json(_))));
    }

    #[test]
    fn test_decode_rejects_transaction_markers() {
        let raw = r#"{"action":"B"}"#;
        match decode(raw.as_bytes()) {
            Err(DecodeError::UnknownAction(action)) => assert_eq!(action, "B"),
            other => panic!("Expected UnknownAction, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_rejects_missing_table() {
        let raw = r#"{"action":"I","schema":"public","columns":[]}"#;
        assert!(matches!(
            decode(raw.as_bytes()),
            Err(DecodeError::MissingField("table"))
        ));
    }

    #[test]
    fn test_decode_rejects_mistyped_value() {
        let raw = r#"{"action":"I","schema":"public","table":"person","columns":[{"name":"score","type":"integer","value":"nine"}]}"#;
        match decode(raw.as_bytes()) {
            Err(DecodeError::InvalidValue { column, .. }) => assert_eq!(column, "score"),
            other => panic!("Expected InvalidValue, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_rejects_bad_uuid() {
        let raw = r#"{"action":"I","schema":"public","table":"person","columns":[{"name":"uid","type":"uuid","value":"not-a-uuid"}]}"#;
        assert!(matches!(
            decode(raw.as_bytes()),
            Err(DecodeError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_decode_defaults_missing_schema_to_public() {
        let raw = r#"{"action":"D","table":"person","identity":[{"name":"id","type":"integer","value":1}]}"#;
        assert_eq!(decode(raw.as_bytes()).unwrap().schema, "public");
    }
}
