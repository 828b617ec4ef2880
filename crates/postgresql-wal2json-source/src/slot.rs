//! Logical replication slot management over a regular SQL connection.
//!
//! The slot is created with the wal2json output plugin and drained with the
//! destructive `pg_logical_slot_get_changes` function: once a batch has been
//! returned, the server will not return those changes again.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_postgres::{Client as PgClient, NoTls};
use tracing::{debug, info, warn};

use crate::error::{SlotError, SourceError};
use crate::source::{ChangeSource, RawChange};

/// Maximum length of a replication slot name (NAMEDATALEN - 1).
const MAX_SLOT_NAME_LEN: usize = 63;

/// Checks that `name` is acceptable as a replication slot name.
///
/// PostgreSQL only allows lower case letters, numbers and the underscore.
pub fn validate_slot_name(name: &str) -> Result<(), SlotError> {
    let valid = !name.is_empty()
        && name.len() <= MAX_SLOT_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(SlotError::InvalidName(name.to_string()))
    }
}

/// Client for managing logical replication slots.
pub struct Client {
    pg_client: Arc<PgClient>,
}

impl Client {
    pub fn new(pg_client: PgClient) -> Self {
        Self {
            pg_client: Arc::new(pg_client),
        }
    }

    /// Wraps an already shared connection.
    pub fn from_shared(pg_client: Arc<PgClient>) -> Self {
        Self { pg_client }
    }

    /// Returns whether a slot with this name exists on the server.
    pub async fn slot_exists(&self, slot_name: &str) -> Result<bool, SlotError> {
        let row = self
            .pg_client
            .query_opt(
                "SELECT 1 FROM pg_replication_slots WHERE slot_name = $1",
                &[&slot_name],
            )
            .await
            .map_err(|source| SlotError::Check {
                slot: slot_name.to_string(),
                source,
            })?;
        Ok(row.is_some())
    }

    /// Drops the slot, discarding any changes it still holds.
    pub async fn drop_slot(&self, slot_name: &str) -> Result<(), SlotError> {
        validate_slot_name(slot_name)?;
        self.pg_client
            .execute("SELECT pg_drop_replication_slot($1)", &[&slot_name])
            .await
            .map_err(|source| SlotError::Drop {
                slot: slot_name.to_string(),
                source,
            })?;
        info!("Dropped replication slot '{slot_name}'");
        Ok(())
    }

    /// Creates a logical slot with the given output plugin.
    pub async fn create_slot(&self, slot_name: &str, plugin: &str) -> Result<(), SlotError> {
        validate_slot_name(slot_name)?;
        let row = self
            .pg_client
            .query_one(
                "SELECT lsn::text FROM pg_create_logical_replication_slot($1, $2)",
                &[&slot_name, &plugin],
            )
            .await
            .map_err(|source| SlotError::Create {
                slot: slot_name.to_string(),
                plugin: plugin.to_string(),
                source,
            })?;
        let lsn: Option<String> = row.get(0);
        info!(
            "Created replication slot '{slot_name}' with plugin '{plugin}' at LSN {}",
            lsn.as_deref().unwrap_or("unknown")
        );
        Ok(())
    }

    /// Makes sure a freshly created slot exists.
    ///
    /// A slot left over from an earlier run is dropped first, so the returned
    /// slot only holds changes committed after this call.
    pub async fn ensure_slot(&self, slot_name: &str, plugin: &str) -> Result<Slot, SlotError> {
        validate_slot_name(slot_name)?;

        if self.slot_exists(slot_name).await? {
            warn!("Replication slot '{slot_name}' already exists, dropping it");
            self.drop_slot(slot_name).await?;
        }
        self.create_slot(slot_name, plugin).await?;

        Ok(self.slot(slot_name, plugin))
    }

    /// Returns a handle to an existing slot without touching the server.
    pub fn slot(&self, slot_name: &str, plugin: &str) -> Slot {
        Slot {
            pg_client: self.pg_client.clone(),
            name: slot_name.to_string(),
            plugin: plugin.to_string(),
        }
    }
}

/// Handle to a logical replication slot.
#[derive(Clone)]
pub struct Slot {
    pg_client: Arc<PgClient>,
    name: String,
    plugin: String,
}

impl Slot {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    /// Bytes of WAL the server retains for this slot, i.e. how far behind
    /// the current WAL position its confirmed flush position is.
    ///
    /// Returns `None` when the slot no longer exists.
    pub async fn retained_wal_bytes(&self) -> Result<Option<i64>, SourceError> {
        let row = self
            .pg_client
            .query_opt(
                "SELECT pg_wal_lsn_diff(pg_current_wal_lsn(), confirmed_flush_lsn)::bigint \
                 FROM pg_replication_slots WHERE slot_name = $1",
                &[&self.name],
            )
            .await?;
        Ok(row.and_then(|r| r.get::<_, Option<i64>>(0)))
    }
}

#[async_trait]
impl ChangeSource for Slot {
    async fn consume_pending_changes(&self) -> Result<Vec<RawChange>, SourceError> {
        let rows = self
            .pg_client
            .query(
                "SELECT lsn::text, data FROM pg_logical_slot_get_changes($1, NULL, NULL, \
                 'format-version', '2', \
                 'include-timestamp', 'true', \
                 'include-transaction', 'false')",
                &[&self.name],
            )
            .await?;

        let changes: Vec<RawChange> = rows
            .iter()
            .map(|row| RawChange {
                lsn: row.get(0),
                data: row.get(1),
            })
            .collect();

        debug!(
            "Consumed {} change(s) from slot '{}'",
            changes.len(),
            self.name
        );
        Ok(changes)
    }

    async fn cancel(&self) -> Result<(), SourceError> {
        self.pg_client.cancel_token().cancel_query(NoTls).await?;
        warn!("Sent cancel request for the running query on slot '{}'", self.name);
        Ok(())
    }

    fn slot_name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_slot_name() {
        assert!(validate_slot_name("migration_slot").is_ok());
        assert!(validate_slot_name("slot_2").is_ok());
        assert!(validate_slot_name(&"a".repeat(63)).is_ok());

        assert!(validate_slot_name("").is_err());
        assert!(validate_slot_name("Migration").is_err());
        assert!(validate_slot_name("my-slot").is_err());
        assert!(validate_slot_name("slot'; DROP TABLE person; --").is_err());
        assert!(validate_slot_name(&"a".repeat(64)).is_err());
    }
}
