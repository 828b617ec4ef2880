//! Typed view of the replicated `person` row.

use chrono::NaiveDateTime;
use uuid::Uuid;

use crate::row::Row;
use crate::values::{ColumnKind, ColumnValue};

/// Error converting a [`Row`] into a typed record.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RowError {
    /// A required column is absent or NULL
    #[error("Column '{0}' is missing or NULL")]
    MissingField(&'static str),

    /// A column holds a value of the wrong kind
    #[error("Column '{field}' expected {expected}, found {found}")]
    TypeMismatch {
        field: &'static str,
        expected: ColumnKind,
        found: String,
    },

    /// An integer does not fit the column's range
    #[error("Column '{field}' value {value} is out of range")]
    OutOfRange { field: &'static str, value: i64 },
}

/// A row of the `person` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonRow {
    pub id: i32,
    pub name: String,
    pub uid: Uuid,
    pub score: i32,
    pub created_at: Option<NaiveDateTime>,
}

impl TryFrom<&Row> for PersonRow {
    type Error = RowError;

    fn try_from(row: &Row) -> Result<Self, Self::Error> {
        Ok(Self {
            id: int_field(row, "id")?,
            name: required(row, "name")?
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| mismatch(row, "name", ColumnKind::Text))?,
            uid: required(row, "uid")?
                .as_uuid()
                .ok_or_else(|| mismatch(row, "uid", ColumnKind::Uuid))?,
            score: int_field(row, "score")?,
            created_at: match row.get("created_at") {
                None | Some(ColumnValue::Null) => None,
                Some(value) => Some(
                    value
                        .as_timestamp()
                        .ok_or_else(|| mismatch(row, "created_at", ColumnKind::Timestamp))?,
                ),
            },
        })
    }
}

impl From<&PersonRow> for Row {
    fn from(person: &PersonRow) -> Self {
        Row::new()
            .with("id", person.id)
            .with("name", person.name.as_str())
            .with("uid", person.uid)
            .with("score", person.score)
            .with("created_at", person.created_at)
    }
}

fn required<'a>(row: &'a Row, field: &'static str) -> Result<&'a ColumnValue, RowError> {
    match row.get(field) {
        Some(value) if !value.is_null() => Ok(value),
        _ => Err(RowError::MissingField(field)),
    }
}

fn int_field(row: &Row, field: &'static str) -> Result<i32, RowError> {
    let value = required(row, field)?
        .as_i64()
        .ok_or_else(|| mismatch(row, field, ColumnKind::Integer))?;
    i32::try_from(value).map_err(|_| RowError::OutOfRange { field, value })
}

fn mismatch(row: &Row, field: &'static str, expected: ColumnKind) -> RowError {
    RowError::TypeMismatch {
        field,
        expected,
        found: row
            .get(field)
            .and_then(ColumnValue::kind)
            .map(|k| k.to_string())
            .unwrap_or_else(|| "null".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> PersonRow {
        PersonRow {
            id: 1,
            name: "Alice".to_string(),
            uid: Uuid::new_v4(),
            score: 3,
            created_at: NaiveDateTime::parse_from_str("2024-01-15 10:30:00", "%Y-%m-%d %H:%M:%S")
                .ok(),
        }
    }

    #[test]
    fn test_row_conversion_preserves_fields() {
        let person = alice();
        let row = Row::from(&person);
        assert_eq!(PersonRow::try_from(&row), Ok(person));
    }

    #[test]
    fn test_missing_name_is_reported() {
        let row = Row::new().with("id", 1).with("uid", Uuid::new_v4()).with("score", 1);
        assert_eq!(
            PersonRow::try_from(&row),
            Err(RowError::MissingField("name"))
        );
    }

    #[test]
    fn test_score_of_wrong_kind_is_reported() {
        let row = Row::from(&alice()).with("score", "high");
        assert!(matches!(
            PersonRow::try_from(&row),
            Err(RowError::TypeMismatch { field: "score", .. })
        ));
    }

    #[test]
    fn test_out_of_range_id() {
        let row = Row::from(&alice()).with("id", i64::MAX);
        assert!(matches!(
            PersonRow::try_from(&row),
            Err(RowError::OutOfRange { field: "id", .. })
        ));
    }
}
