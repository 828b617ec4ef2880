//! ChangeSink trait definition.

use async_trait::async_trait;
use sync_core::{ChangeEvent, Row, TableSchema};

use crate::error::ApplyError;

/// Trait for writing to the replication target.
///
/// The bulk loader and the poller are written against this trait so that
/// they can run against [`crate::MemorySink`] in tests and
/// [`crate::PostgreSQLSink`] in production.
#[async_trait]
pub trait ChangeSink: Send + Sync {
    /// Descriptor of the table this sink writes to.
    fn schema(&self) -> &TableSchema;

    /// Creates the target table if it does not exist.
    async fn ensure_table(&self) -> Result<(), ApplyError>;

    /// Inserts a batch of rows, skipping any whose primary key already exists.
    ///
    /// Returns the number of rows actually inserted.
    async fn write_rows(&self, rows: &[Row]) -> Result<u64, ApplyError>;

    /// Applies one change, keyed by primary key.
    ///
    /// - Insert: upsert, overwriting the non-key fields present in the event
    /// - Update: overwrite the fields present on the row located by key
    /// - Delete: remove the row located by key; a missing row is not an error
    ///
    /// Returns the number of rows affected.
    async fn apply_change(&self, change: &ChangeEvent) -> Result<u64, ApplyError>;

    /// Cancels a statement still running on the server.
    async fn cancel(&self) -> Result<(), ApplyError> {
        Ok(())
    }

    /// Moves the key sequence past the largest key present.
    ///
    /// Returns the next value the sequence will hand out, or `None` when the
    /// key is not backed by a sequence.
    async fn resync_sequence(&self) -> Result<Option<i64>, ApplyError>;

    /// Number of rows currently in the table.
    async fn count_rows(&self) -> Result<i64, ApplyError>;
}
