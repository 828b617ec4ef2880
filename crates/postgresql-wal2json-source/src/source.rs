//! Traits the replicator reads through.
//!
//! [`ChangeSource`] is implemented by [`crate::Slot`] and [`SnapshotSource`]
//! by [`crate::SnapshotReader`]; the in-memory doubles in `testing` implement
//! both so the replication pipeline can be exercised without a server.

use async_trait::async_trait;
use futures::stream::BoxStream;
use sync_core::Row;

use crate::error::SourceError;

/// One undecoded record drained from the slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChange {
    /// WAL position of the record, in `X/Y` text form
    pub lsn: String,
    /// wal2json document
    pub data: String,
}

impl RawChange {
    pub fn new(lsn: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            lsn: lsn.into(),
            data: data.into(),
        }
    }
}

/// Destructive reader of pending changes.
#[async_trait]
pub trait ChangeSource: Send + Sync {
    /// Returns every change pending on the slot, in commit order, and removes
    /// them from the slot. An empty vector means nothing was pending.
    async fn consume_pending_changes(&self) -> Result<Vec<RawChange>, SourceError>;

    /// Cancels a consume call still running on the server.
    ///
    /// A cancelled consume rolls back, leaving its changes on the slot.
    async fn cancel(&self) -> Result<(), SourceError> {
        Ok(())
    }

    /// Name of the slot the changes come from.
    fn slot_name(&self) -> &str;
}

/// Reader of the source table's current contents.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Streams every row of the table, ordered by primary key.
    async fn read_rows(&self) -> Result<BoxStream<'_, Result<Row, SourceError>>, SourceError>;
}
