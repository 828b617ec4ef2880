//! In-memory implementation of [`ChangeSink`].

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use sync_core::{ChangeEvent, ColumnValue, Row, TableSchema};
use tokio::sync::Mutex;

use crate::error::ApplyError;
use crate::plan::{plan, Mutation};

/// A table held in memory, keyed by primary key.
///
/// Applies changes with the same semantics as [`crate::PostgreSQLSink`].
/// Individual calls to `apply_change` can be made to fail to exercise the
/// poller's failure handling.
pub struct MemorySink {
    schema: TableSchema,
    rows: Mutex<BTreeMap<Vec<ColumnValue>, Row>>,
    fail_next: AtomicUsize,
}

impl MemorySink {
    pub fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            rows: Mutex::new(BTreeMap::new()),
            fail_next: AtomicUsize::new(0),
        }
    }

    /// Makes the next `n` calls to `apply_change` fail.
    pub fn fail_next_applies(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// All rows in primary key order.
    pub async fn rows(&self) -> Vec<Row> {
        self.rows.lock().await.values().cloned().collect()
    }

    /// The row with the given single-column key.
    pub async fn get(&self, key: impl Into<ColumnValue>) -> Option<Row> {
        self.rows.lock().await.get(&vec![key.into()]).cloned()
    }

    fn key(&self, row: &Row) -> Result<Vec<ColumnValue>, ApplyError> {
        row.primary_key(&self.schema)
            .ok_or_else(|| ApplyError::MissingPrimaryKey {
                action: sync_core::ChangeAction::Insert,
                table: self.schema.qualified_name(),
                column: self.schema.primary_key.join(", "),
            })
    }

    fn injected_failure(&self) -> bool {
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl crate::ChangeSink for MemorySink {
    fn schema(&self) -> &TableSchema {
        &self.schema
    }

    async fn ensure_table(&self) -> Result<(), ApplyError> {
        Ok(())
    }

    async fn write_rows(&self, rows: &[Row]) -> Result<u64, ApplyError> {
        let mut table = self.rows.lock().await;
        let mut inserted = 0;
        for row in rows {
            let key = self.key(row)?;
            if !table.contains_key(&key) {
                table.insert(key, row.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn apply_change(&self, change: &ChangeEvent) -> Result<u64, ApplyError> {
        let mutation = plan(&self.schema, change)?;
        if self.injected_failure() {
            return Err(ApplyError::Unavailable("injected apply failure".to_string()));
        }

        let mut table = self.rows.lock().await;
        match mutation {
            Mutation::Upsert { row } => {
                let key = self.key(&row)?;
                table.entry(key).or_default().merge(&row);
                Ok(1)
            }
            Mutation::Update { key, values } => {
                let old_key = self.key(&key)?;
                let Some(existing) = table.get(&old_key) else {
                    return Ok(0);
                };
                let mut updated = existing.clone();
                updated.merge(&values);
                let new_key = self.key(&updated)?;
                if new_key != old_key && table.contains_key(&new_key) {
                    return Err(ApplyError::DuplicateKey {
                        table: self.schema.qualified_name(),
                        key: format!("{new_key:?}"),
                    });
                }
                table.remove(&old_key);
                table.insert(new_key, updated);
                Ok(1)
            }
            Mutation::Delete { key } => {
                let key = self.key(&key)?;
                Ok(table.remove(&key).map_or(0, |_| 1))
            }
        }
    }

    async fn resync_sequence(&self) -> Result<Option<i64>, ApplyError> {
        let table = self.rows.lock().await;
        let max = table
            .keys()
            .filter_map(|k| k.first().and_then(ColumnValue::as_i64))
            .max()
            .unwrap_or(0);
        Ok(Some(max + 1))
    }

    async fn count_rows(&self) -> Result<i64, ApplyError> {
        Ok(self.rows.lock().await.len() as i64)
    }
}
