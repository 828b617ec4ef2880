//! Source side of pg-replicator.
//!
//! Reads a PostgreSQL table and its change stream using regular SQL
//! connections and the wal2json output plugin:
//!
//! - [`Client`] / [`Slot`] - create, drop and drain a logical replication slot
//! - [`SnapshotReader`] - stream the table's current rows for the bulk load
//! - [`wal2json::decode`] - turn one wal2json v2 document into a [`sync_core::ChangeEvent`]
//!
//! ```ignore
//! use postgresql_wal2json_source::{ChangeSource, Client};
//!
//! let client = Client::new(pg_client);
//! let slot = client.ensure_slot("migration_slot", "wal2json").await?;
//! for raw in slot.consume_pending_changes().await? {
//!     let event = postgresql_wal2json_source::wal2json::decode(raw.data.as_bytes())?;
//! }
//! ```

pub mod error;
mod slot;
mod snapshot;
mod source;
pub mod value;
pub mod wal2json;

// Make testing module available for integration tests
#[doc(hidden)]
pub mod testing;

pub use error::{DecodeError, SlotError, SourceError};
pub use slot::{validate_slot_name, Client, Slot};
pub use snapshot::SnapshotReader;
pub use source::{ChangeSource, RawChange, SnapshotSource};
