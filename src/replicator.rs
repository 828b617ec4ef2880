//! Startup orchestration: connect, prepare both stores, bulk load, poll.

use anyhow::{Context, Result};
use ledger::Ledger;
use postgresql_sink::{ChangeSink, PostgreSQLSink};
use postgresql_wal2json_source::{Client as SlotClient, SnapshotReader};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::bulk_load::BulkLoader;
use crate::config::ReplicatorConfig;
use crate::connect::{connect, set_statement_timeout};
use crate::monitor::Monitor;
use crate::poller::{Poller, RunSummary};

/// Returns a receiver that fires once on Ctrl+C.
pub fn setup_shutdown_handler() -> broadcast::Receiver<()> {
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received interrupt signal (Ctrl+C)");
                let _ = shutdown_tx.send(());
            }
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {e}");
                // Keep the sender alive so receivers do not see a closed channel.
                let _sender = shutdown_tx;
                std::future::pending::<()>().await;
            }
        }
    });

    shutdown_rx
}

/// Runs a full replication: slot, bulk load, then the polling loop until
/// `shutdown` fires.
///
/// Any failure before the loop starts is fatal. The slot is created before
/// the bulk load reads the source, so writes racing with the snapshot are
/// delivered through the slot as well and absorbed by the idempotent apply.
pub async fn run(
    config: &ReplicatorConfig,
    shutdown: broadcast::Receiver<()>,
) -> Result<RunSummary> {
    let table = config.table.qualified_name();
    info!("Starting replication of {table}");

    let source = connect(&config.source, "source", config.io_timeout).await?;
    let target = connect(&config.target, "target", config.io_timeout).await?;
    set_statement_timeout(&target, "target", config.io_timeout).await?;

    source
        .batch_execute(&config.table.create_table_sql())
        .await
        .with_context(|| format!("Failed to ensure source table {table} exists"))?;
    let sink = Arc::new(PostgreSQLSink::new(target, config.table.clone()));
    sink.ensure_table()
        .await
        .with_context(|| format!("Failed to ensure target table {table} exists"))?;

    let slot = SlotClient::from_shared(source.clone())
        .ensure_slot(&config.slot_name, &config.plugin)
        .await
        .context("Failed to set up replication slot")?;

    if config.skip_bulk_load {
        info!("Skipping bulk load");
    } else {
        let reader = SnapshotReader::new(source.clone(), config.table.clone());
        BulkLoader::new(&reader, sink.as_ref(), config.batch_size)
            .load_all()
            .await
            .context("Bulk load failed")?;
    }
    // Set after the bulk load so a long snapshot scan is not aborted.
    set_statement_timeout(&source, "source", config.io_timeout).await?;

    let ledger = Ledger::from_dir(config.ledger_dir.clone());
    if !ledger.is_durable() {
        warn!("No --ledger-dir configured; changes that fail after being consumed will be lost");
    }

    let monitor = config.monitor.then(|| {
        Monitor::new(
            source.clone(),
            sink.clone() as Arc<dyn ChangeSink>,
            slot.clone(),
            config.io_timeout,
        )
    });

    let poller = Poller::new(Arc::new(slot), sink, ledger, config.io_timeout)
        .with_ledger_retry(config.ledger_retry);
    let summary = poller
        .run(config.tick_interval, shutdown, monitor.as_ref())
        .await?;

    info!("Replication of {table} stopped: {summary}");
    Ok(summary)
}
