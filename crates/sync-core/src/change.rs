//! Decoded change events.

use chrono::{DateTime, Utc};
use std::fmt;

use crate::row::Row;
use crate::schema::TableSchema;
use crate::values::ColumnValue;

/// The row-level operation a change event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeAction {
    /// A new row
    Insert,
    /// New values for an existing row
    Update,
    /// Removal of a row
    Delete,
}

impl ChangeAction {
    /// Parse the single-letter wal2json action code.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "I" => Some(Self::Insert),
            "U" => Some(Self::Update),
            "D" => Some(Self::Delete),
            _ => None,
        }
    }

    /// The single-letter wal2json action code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Insert => "I",
            Self::Update => "U",
            Self::Delete => "D",
        }
    }
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Insert => write!(f, "Insert"),
            Self::Update => write!(f, "Update"),
            Self::Delete => write!(f, "Delete"),
        }
    }
}

/// One column of a change event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Column name
    pub name: String,
    /// Source type tag as emitted by the decoding plugin (e.g. `character varying(100)`)
    pub source_type: String,
    /// Decoded value
    pub value: ColumnValue,
}

impl Column {
    /// Create a column.
    pub fn new(
        name: impl Into<String>,
        source_type: impl Into<String>,
        value: impl Into<ColumnValue>,
    ) -> Self {
        Self {
            name: name.into(),
            source_type: source_type.into(),
            value: value.into(),
        }
    }
}

/// A typed row-level change read from the replication slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Operation
    pub action: ChangeAction,
    /// Commit time attached by the source, for observability only
    pub timestamp: Option<DateTime<Utc>>,
    /// Source schema name
    pub schema: String,
    /// Source table name
    pub table: String,
    /// New values (Insert/Update)
    pub columns: Vec<Column>,
    /// Old key values sufficient to locate the row (Update/Delete)
    pub identity: Vec<Column>,
}

impl ChangeEvent {
    /// Create an event with no columns.
    pub fn new(action: ChangeAction, schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            action,
            timestamp: None,
            schema: schema.into(),
            table: table.into(),
            columns: Vec::new(),
            identity: Vec::new(),
        }
    }

    /// Builder-style: append a new-value column.
    pub fn with_column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Builder-style: append an identity column.
    pub fn with_identity(mut self, column: Column) -> Self {
        self.identity.push(column);
        self
    }

    /// Look up a new-value column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Look up an identity column by name.
    pub fn identity_column(&self, name: &str) -> Option<&Column> {
        self.identity.iter().find(|c| c.name == name)
    }

    /// New values as a row.
    pub fn new_values(&self) -> Row {
        columns_to_row(&self.columns)
    }

    /// Identity values as a row.
    pub fn identity_values(&self) -> Row {
        columns_to_row(&self.identity)
    }

    /// Whether this event belongs to the given table.
    pub fn is_for(&self, schema: &TableSchema) -> bool {
        schema.matches(&self.schema, &self.table)
    }
}

fn columns_to_row(columns: &[Column]) -> Row {
    columns
        .iter()
        .map(|c| (c.name.clone(), c.value.clone()))
        .collect()
}
