//! Initial copy of the source table into the target.

use anyhow::{Context, Result};
use futures::TryStreamExt;
use postgresql_sink::ChangeSink;
use postgresql_wal2json_source::SnapshotSource;
use std::fmt;
use sync_core::Row;
use tracing::{debug, info, warn};

/// Outcome of a bulk load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkLoadReport {
    /// Rows read from the source
    pub rows_read: u64,
    /// Rows newly written to the target
    pub rows_inserted: u64,
    /// INSERT statements issued
    pub batches: u64,
}

impl BulkLoadReport {
    /// Rows that were already present in the target.
    pub fn rows_skipped(&self) -> u64 {
        self.rows_read.saturating_sub(self.rows_inserted)
    }
}

impl fmt::Display for BulkLoadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} row(s) read, {} inserted, {} already present, {} batch(es)",
            self.rows_read,
            self.rows_inserted,
            self.rows_skipped(),
            self.batches
        )
    }
}

/// Copies every row of the source table into the target in fixed-size batches.
///
/// Rows whose key already exists in the target are left untouched, so the
/// load can be re-run after a failure.
pub struct BulkLoader<'a, S: ?Sized, K: ?Sized> {
    source: &'a S,
    sink: &'a K,
    batch_size: usize,
}

impl<'a, S, K> BulkLoader<'a, S, K>
where
    S: SnapshotSource + ?Sized,
    K: ChangeSink + ?Sized,
{
    pub fn new(source: &'a S, sink: &'a K, batch_size: usize) -> Self {
        Self {
            source,
            sink,
            batch_size: batch_size.max(1),
        }
    }

    /// Runs the load and resynchronises the target's key sequence.
    pub async fn load_all(&self) -> Result<BulkLoadReport> {
        let table = self.sink.schema().qualified_name();
        info!("Starting bulk load into {table}");

        let mut report = BulkLoadReport::default();
        let mut rows = self
            .source
            .read_rows()
            .await
            .context("Failed to start reading source rows")?;
        let mut batch: Vec<Row> = Vec::with_capacity(self.batch_size);

        while let Some(row) = rows
            .try_next()
            .await
            .context("Failed to read source row")?
        {
            report.rows_read += 1;
            batch.push(row);
            if batch.len() >= self.batch_size {
                self.flush(&mut batch, &mut report).await?;
            }
        }
        self.flush(&mut batch, &mut report).await?;

        match self.sink.resync_sequence().await {
            Ok(Some(next)) => debug!("Key sequence of {table} resumes at {next}"),
            Ok(None) => debug!("{table} has no key sequence to resynchronise"),
            Err(e) => warn!("Failed to resynchronise key sequence of {table}: {e}"),
        }

        info!("Bulk load into {table} completed: {report}");
        Ok(report)
    }

    async fn flush(&self, batch: &mut Vec<Row>, report: &mut BulkLoadReport) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let inserted = self
            .sink
            .write_rows(batch)
            .await
            .with_context(|| format!("Failed to write batch of {} row(s)", batch.len()))?;
        report.rows_inserted += inserted;
        report.batches += 1;
        debug!(
            "Batch {}: inserted {inserted} of {} row(s), {} read so far",
            report.batches,
            batch.len(),
            report.rows_read
        );
        batch.clear();
        Ok(())
    }
}
