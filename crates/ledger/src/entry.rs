//! Ledger entry types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The pipeline stage at which a consumed change failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    /// The wal2json record could not be decoded.
    ///
    /// Replaying such an entry fails again unless the decoder changes, but the
    /// raw record is kept for inspection.
    Decode,

    /// The decoded change could not be applied to the target.
    Apply,
}

impl FailureStage {
    pub fn as_str(&self) -> &str {
        match self {
            FailureStage::Decode => "decode",
            FailureStage::Apply => "apply",
        }
    }
}

impl std::fmt::Display for FailureStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One consumed-but-failed change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Unique id, used to acknowledge the entry
    pub id: Uuid,
    /// When the failure was recorded
    pub recorded_at: DateTime<Utc>,
    /// Slot the change was consumed from
    pub slot: String,
    /// WAL position of the change
    pub lsn: String,
    /// Where it failed
    pub stage: FailureStage,
    /// The undecoded wal2json document
    pub raw: String,
    /// Rendered error chain
    pub error: String,
}

impl LedgerEntry {
    pub fn new(
        slot: impl Into<String>,
        lsn: impl Into<String>,
        stage: FailureStage,
        raw: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            recorded_at: Utc::now(),
            slot: slot.into(),
            lsn: lsn.into(),
            stage,
            raw: raw.into(),
            error: error.into(),
        }
    }

    /// The LSN as a 64-bit WAL position, if it is in `X/Y` hex form.
    pub fn wal_position(&self) -> Option<u64> {
        parse_lsn(&self.lsn)
    }
}

/// Parses a PostgreSQL LSN such as `16/B374D848`.
pub fn parse_lsn(lsn: &str) -> Option<u64> {
    let (hi, lo) = lsn.split_once('/')?;
    let hi = u32::from_str_radix(hi, 16).ok()?;
    let lo = u32::from_str_radix(lo, 16).ok()?;
    Some((u64::from(hi) << 32) | u64::from(lo))
}
