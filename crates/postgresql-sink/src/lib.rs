//! Target side of pg-replicator.
//!
//! Provides the [`ChangeSink`] abstraction over the replication target and
//! its two implementations:
//!
//! - [`PostgreSQLSink`] - writes to a PostgreSQL table
//! - [`MemorySink`] - keeps the table in memory, for tests
//!
//! Both translate a change through [`plan::plan`] into a single keyed
//! [`plan::Mutation`], so an event is applied the same way regardless of
//! the target.

pub mod error;
mod memory;
mod param;
pub mod plan;
mod postgres;
pub mod sql;
mod traits;

pub use error::ApplyError;
pub use memory::MemorySink;
pub use param::PgParam;
pub use postgres::PostgreSQLSink;
pub use traits::ChangeSink;

/// Default number of rows per bulk INSERT.
pub const DEFAULT_BATCH_SIZE: usize = 100;
