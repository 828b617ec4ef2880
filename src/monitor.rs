//! Row count and slot lag reporting.

use anyhow::{anyhow, Result};
use postgresql_sink::{sql, ChangeSink};
use postgresql_wal2json_source::Slot;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_postgres::Client;
use tracing::{info, warn};

/// One observation of source and target.
///
/// A field is `None` when its query failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorReport {
    pub source_rows: Option<i64>,
    pub target_rows: Option<i64>,
    /// WAL retained by the slot, in bytes
    pub lag_bytes: Option<i64>,
}

impl MonitorReport {
    /// Whether both counts are known and equal.
    pub fn counts_match(&self) -> bool {
        matches!((self.source_rows, self.target_rows), (Some(s), Some(t)) if s == t)
    }
}

fn or_unknown(value: Option<i64>) -> String {
    value.map_or_else(|| "?".to_string(), |v| v.to_string())
}

impl fmt::Display for MonitorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "source rows={} target rows={} slot lag={} bytes",
            or_unknown(self.source_rows),
            or_unknown(self.target_rows),
            or_unknown(self.lag_bytes)
        )
    }
}

pub struct Monitor {
    source: Arc<Client>,
    target: Arc<dyn ChangeSink>,
    slot: Slot,
    io_timeout: Duration,
}

impl Monitor {
    pub fn new(
        source: Arc<Client>,
        target: Arc<dyn ChangeSink>,
        slot: Slot,
        io_timeout: Duration,
    ) -> Self {
        Self {
            source,
            target,
            slot,
            io_timeout,
        }
    }

    /// Queries both stores and logs the result. Failed queries are logged
    /// and left out of the report.
    pub async fn report(&self) -> MonitorReport {
        let count_sql = sql::count_rows(self.target.schema());
        let source_rows = self.bounded("source row count", async {
            let row = self.source.query_one(&count_sql, &[]).await?;
            Ok::<_, anyhow::Error>(row.get::<_, i64>(0))
        });
        let target_rows = self.bounded("target row count", async {
            Ok::<_, anyhow::Error>(self.target.count_rows().await?)
        });
        let lag_bytes = self.bounded("slot lag", async {
            Ok::<_, anyhow::Error>(self.slot.retained_wal_bytes().await?)
        });

        let report = MonitorReport {
            source_rows: source_rows.await,
            target_rows: target_rows.await,
            lag_bytes: lag_bytes.await.flatten(),
        };

        if report.counts_match() {
            info!("Monitor: {report}");
        } else {
            warn!("Monitor: {report} (counts differ)");
        }
        report
    }

    async fn bounded<T>(&self, what: &str, query: impl Future<Output = Result<T>>) -> Option<T> {
        let result = tokio::time::timeout(self.io_timeout, query)
            .await
            .unwrap_or_else(|_| Err(anyhow!("timed out after {:?}", self.io_timeout)));
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Monitor failed to query {what}: {e:#}");
                None
            }
        }
    }
}
