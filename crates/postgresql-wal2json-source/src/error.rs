//! Error types for the source side of replication.

use thiserror::Error;

/// Errors raised while managing the replication slot.
///
/// Every variant is fatal at startup: without a slot in a known position no
/// change stream can be established.
#[derive(Error, Debug)]
pub enum SlotError {
    /// The slot name is not a valid PostgreSQL replication slot name.
    #[error("Invalid replication slot name '{0}': only lower case letters, numbers and underscores are allowed (max 63 characters)")]
    InvalidName(String),

    /// Checking `pg_replication_slots` failed.
    #[error("Failed to check for existing replication slot '{slot}': {source}")]
    Check {
        slot: String,
        #[source]
        source: tokio_postgres::Error,
    },

    /// Dropping a pre-existing slot failed.
    #[error("Failed to drop existing replication slot '{slot}': {source}")]
    Drop {
        slot: String,
        #[source]
        source: tokio_postgres::Error,
    },

    /// Creating the slot failed.
    #[error("Failed to create replication slot '{slot}' with plugin '{plugin}': {source}")]
    Create {
        slot: String,
        plugin: String,
        #[source]
        source: tokio_postgres::Error,
    },
}

/// Errors raised while reading from the source store.
#[derive(Error, Debug)]
pub enum SourceError {
    /// PostgreSQL connection or query error.
    #[error("PostgreSQL error: {0}")]
    PostgreSQL(#[from] tokio_postgres::Error),

    /// A source column could not be read as the kind the table descriptor declares.
    #[error("Failed to read column '{column}' as {kind}: {reason}")]
    Column {
        column: String,
        kind: sync_core::ColumnKind,
        reason: String,
    },

    /// The source could not be read for a reason other than a query error.
    #[error("Source unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised while decoding one wal2json record.
///
/// A decode error affects only the record it was raised for.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The record is not valid JSON or does not have the wal2json shape.
    #[error("Failed to parse wal2json record: {0}")]
    Json(#[from] serde_json::Error),

    /// The record carries an action other than I, U or D.
    #[error("Unknown action type: {0}")]
    UnknownAction(String),

    /// A required field is absent.
    #[error("Missing '{0}' field")]
    MissingField(&'static str),

    /// A column value does not match its declared type.
    #[error("Column '{column}' of type '{source_type}' has invalid value {value}: {reason}")]
    InvalidValue {
        column: String,
        source_type: String,
        value: String,
        reason: String,
    },
}
