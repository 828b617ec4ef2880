//! Filesystem-based ledger storage implementation.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::entry::LedgerEntry;
use crate::store::LedgerStore;

/// Filesystem implementation of LedgerStore trait.
///
/// Stores each entry as a JSON file in a directory. Files are written to a
/// temporary name and renamed into place, so a crash never leaves a
/// half-written entry behind.
pub struct FilesystemStore {
    dir: PathBuf,
}

impl FilesystemStore {
    /// Create a new FilesystemStore with the given directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Get the directory path.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("failure_{id}.json"))
    }
}

#[async_trait]
impl LedgerStore for FilesystemStore {
    async fn append(&self, entry: &LedgerEntry) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create ledger directory {}", self.dir.display()))?;

        let path = self.entry_path(entry.id);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(entry)?)?;
        std::fs::rename(&tmp, &path)?;

        tracing::info!(
            "Recorded {} failure at {} to {}",
            entry.stage,
            entry.lsn,
            path.display()
        );
        Ok(())
    }

    async fn pending(&self) -> Result<Vec<LedgerEntry>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for dirent in std::fs::read_dir(&self.dir)? {
            let path = dirent?.path();
            let is_entry = path
                .file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.starts_with("failure_") && name.ends_with(".json"))
                .unwrap_or(false);
            if !is_entry {
                continue;
            }

            let content = std::fs::read_to_string(&path)?;
            let entry: LedgerEntry = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse ledger entry {}", path.display()))?;
            entries.push(entry);
        }

        entries.sort_by(|a, b| {
            a.recorded_at
                .cmp(&b.recorded_at)
                .then_with(|| a.wal_position().cmp(&b.wal_position()))
                .then_with(|| a.lsn.cmp(&b.lsn))
        });
        Ok(entries)
    }

    async fn ack(&self, id: Uuid) -> Result<()> {
        match std::fs::remove_file(self.entry_path(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
