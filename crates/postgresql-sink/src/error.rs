//! Error types for target-side writes.

use sync_core::ChangeAction;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApplyError {
    /// PostgreSQL connection or statement error.
    #[error("PostgreSQL error: {0}")]
    PostgreSQL(#[from] tokio_postgres::Error),

    /// The event carries no usable primary key in either `identity` or `columns`.
    #[error("{action} change for {table} carries no primary key value for '{column}'")]
    MissingPrimaryKey {
        action: ChangeAction,
        table: String,
        column: String,
    },

    /// An insert or update carries no column the table knows about.
    #[error("{action} change for {table} has no columns to write")]
    NoColumns { action: ChangeAction, table: String },

    /// An update would move a row onto a key another row already holds.
    #[error("Duplicate key {key} in {table}")]
    DuplicateKey { table: String, key: String },

    /// The event belongs to a different table than the sink writes to.
    #[error("Change for {found} cannot be applied to {expected}")]
    TableMismatch { expected: String, found: String },

    /// The target could not be reached in time or refused the write.
    #[error("Target unavailable: {0}")]
    Unavailable(String),
}
