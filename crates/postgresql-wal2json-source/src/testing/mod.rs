//! Test support: a wal2json-enabled PostgreSQL container and in-memory sources.

pub mod container;
pub mod memory;
