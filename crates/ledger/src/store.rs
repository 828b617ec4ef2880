//! Ledger storage trait.

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::entry::LedgerEntry;

/// Trait for ledger storage backends.
///
/// Entries follow an append / pending / ack protocol: an appended entry is
/// returned by `pending` until it is acknowledged.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Durably record an entry.
    async fn append(&self, entry: &LedgerEntry) -> Result<()>;

    /// All unacknowledged entries, oldest first.
    async fn pending(&self) -> Result<Vec<LedgerEntry>>;

    /// Remove an entry. Acknowledging an unknown id is not an error.
    async fn ack(&self, id: Uuid) -> Result<()>;

    /// Whether appended entries survive. `false` means failures are lost.
    fn is_durable(&self) -> bool {
        true
    }
}
