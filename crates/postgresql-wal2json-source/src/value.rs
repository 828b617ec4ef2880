//! Conversions of PostgreSQL textual values.

pub mod time;
