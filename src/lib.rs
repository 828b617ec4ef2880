//! pg-replicator
//!
//! Replicates one PostgreSQL table into another PostgreSQL database without
//! built-in logical replication: a bulk copy of the existing rows followed by
//! a loop that drains a wal2json logical decoding slot and applies each change
//! idempotently by primary key.
//!
//! ```text
//! source ──slot──> poller ──decode──> apply ──> target
//!    └──snapshot──> bulk loader ──────────────────┘
//! ```

pub mod bulk_load;
pub mod config;
pub mod connect;
pub mod monitor;
pub mod poller;
pub mod replicator;

#[doc(hidden)]
pub mod testing;

pub use bulk_load::{BulkLoadReport, BulkLoader};
pub use config::{parse_duration, ReplicatorConfig, RunArgs};
pub use poller::{replay_ledger, Poller, ReplayStats, RunSummary, TickStats};

// Re-export the workspace crates for consumers of the library
pub use ledger;
pub use postgresql_sink;
pub use postgresql_wal2json_source;
pub use sync_core;
