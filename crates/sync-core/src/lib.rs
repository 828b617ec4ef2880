//! Core types for pg-replicator.
//!
//! This crate provides the types shared by every stage of the replication
//! pipeline:
//!
//! - [`ColumnValue`] / [`ColumnKind`] - Scalar values as a closed tagged union
//! - [`Column`] / [`ChangeEvent`] - Decoded row-level changes
//! - [`Row`] - Column-name keyed rows moved by the bulk loader
//! - [`TableSchema`] - Descriptor of the replicated table
//! - [`PersonRow`] - Typed view of the built-in `person` table
//!
//! # Architecture
//!
//! ```text
//! sync-core (this crate)
//!    │
//!    ├─── postgresql-wal2json-source  (slot, snapshot reads, wal2json decoding)
//!    ├─── postgresql-sink             (bulk writes and change apply)
//!    └─── ledger                      (records consumed-but-failed changes)
//! ```

pub mod change;
pub mod person;
pub mod row;
pub mod schema;
pub mod values;

pub use change::{ChangeAction, ChangeEvent, Column};
pub use person::{PersonRow, RowError};
pub use row::Row;
pub use schema::{quote_ident, FieldDefinition, SchemaError, TableSchema};
pub use values::{ColumnKind, ColumnValue};
