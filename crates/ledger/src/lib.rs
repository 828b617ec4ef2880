//! Failure ledger for pg-replicator
//!
//! Consuming from a logical replication slot is destructive: a change that
//! fails to decode or apply after it was consumed will never be delivered
//! again. The ledger keeps such changes so they can be inspected and
//! replayed.
//!
//! # Architecture
//!
//! - `LedgerEntry` - one failed change with its raw record and error
//! - `LedgerStore` - append / pending / ack storage protocol
//! - `Ledger` - cloneable front-end used by the replication loop
//!
//! ## Storage Backends
//!
//! - `FilesystemStore` - Stores each entry as a JSON file
//! - `NullStore` - Stores nothing; failures are logged and lost

mod entry;
mod filesystem;
mod manager;
pub mod store;


pub use entry::{parse_lsn, FailureStage, LedgerEntry};
pub use filesystem::FilesystemStore;
pub use manager::{Ledger, NullStore};
pub use store::LedgerStore;
