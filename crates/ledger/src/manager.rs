//! Ledger front-end used by the replication loop.

use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use crate::{FailureStage, FilesystemStore, LedgerEntry, LedgerStore};

/// Store that keeps nothing.
///
/// Used when no ledger directory is configured: every failed change is
/// logged and then lost, since the slot will not return it again.
pub struct NullStore;

#[async_trait]
impl LedgerStore for NullStore {
    async fn append(&self, entry: &LedgerEntry) -> Result<()> {
        tracing::warn!(
            "No failure ledger configured; {} failure at {} on slot '{}' is permanently lost",
            entry.stage,
            entry.lsn,
            entry.slot
        );
        Ok(())
    }

    async fn pending(&self) -> Result<Vec<LedgerEntry>> {
        Ok(Vec::new())
    }

    async fn ack(&self, _id: Uuid) -> Result<()> {
        Ok(())
    }

    fn is_durable(&self) -> bool {
        false
    }
}

/// Records changes that were consumed from the slot but not applied.
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn LedgerStore>,
}

impl Ledger {
    pub fn new(store: impl LedgerStore + 'static) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    /// A ledger that loses everything.
    pub fn null() -> Self {
        Self::new(NullStore)
    }

    /// A ledger writing JSON files under `dir`.
    pub fn filesystem(dir: impl Into<PathBuf>) -> Self {
        Self::new(FilesystemStore::new(dir))
    }

    /// `filesystem(dir)` when a directory is given, `null()` otherwise.
    pub fn from_dir(dir: Option<PathBuf>) -> Self {
        match dir {
            Some(dir) => Self::filesystem(dir),
            None => Self::null(),
        }
    }

    pub fn is_durable(&self) -> bool {
        self.store.is_durable()
    }

    /// Records a failure and returns the stored entry.
    pub async fn record(
        &self,
        slot: &str,
        lsn: &str,
        stage: FailureStage,
        raw: &str,
        error: &anyhow::Error,
    ) -> Result<LedgerEntry> {
        let entry = LedgerEntry::new(slot, lsn, stage, raw, format!("{error:#}"));
        self.store.append(&entry).await?;
        Ok(entry)
    }

    pub async fn pending(&self) -> Result<Vec<LedgerEntry>> {
        self.store.pending().await
    }

    pub async fn ack(&self, entry: &LedgerEntry) -> Result<()> {
        self.store.ack(entry.id).await
    }
}
