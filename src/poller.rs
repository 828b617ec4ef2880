//! Steady-state replication loop.
//!
//! Every tick drains the slot and pushes each record through decode, table
//! filter and apply, in the order the slot emitted them. Draining the slot
//! is destructive: a record that fails after it was consumed is only kept if
//! the [`Ledger`] is durable.

use anyhow::{anyhow, bail, Context, Result};
use ledger::{FailureStage, Ledger};
use postgresql_sink::ChangeSink;
use postgresql_wal2json_source::{wal2json, ChangeSource, RawChange};
use std::fmt;
use std::ops::AddAssign;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::monitor::Monitor;

/// Extra client-side wait past `io_timeout`, so the server-side
/// `statement_timeout` normally fires first and rolls the statement back.
const CANCEL_GRACE: Duration = Duration::from_secs(2);

/// Counters for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    /// Records drained from the slot
    pub received: usize,
    /// Records applied to the target
    pub applied: usize,
    /// Records for other tables
    pub skipped: usize,
    /// Records that failed to decode or apply
    pub failed: usize,
}

impl AddAssign for TickStats {
    fn add_assign(&mut self, other: Self) {
        self.received += other.received;
        self.applied += other.applied;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

impl fmt::Display for TickStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "received={} applied={} skipped={} failed={}",
            self.received, self.applied, self.skipped, self.failed
        )
    }
}

/// Totals over a whole run of the loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    pub failed_ticks: u64,
    pub totals: TickStats,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} tick(s), {} failed, {}",
            self.ticks, self.failed_ticks, self.totals
        )
    }
}

/// Outcome of a ledger replay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Entries applied (or found to be for another table) and acknowledged
    pub resolved: usize,
    /// Entries that failed again and stay in the ledger
    pub remaining: usize,
}

enum Outcome {
    Applied,
    Skipped,
}

struct Failure {
    stage: FailureStage,
    error: anyhow::Error,
}

/// Decodes one wal2json record and applies it to `sink`.
async fn process<K: ChangeSink + ?Sized>(
    sink: &K,
    io_timeout: Duration,
    data: &str,
) -> Result<Outcome, Failure> {
    let event = wal2json::decode(data.as_bytes()).map_err(|e| Failure {
        stage: FailureStage::Decode,
        error: e.into(),
    })?;

    if !event.is_for(sink.schema()) {
        debug!(
            "Skipping {} change for {}.{}",
            event.action, event.schema, event.table
        );
        return Ok(Outcome::Skipped);
    }

    let applied = match timeout(io_timeout + CANCEL_GRACE, sink.apply_change(&event)).await {
        Ok(result) => result.map_err(anyhow::Error::from),
        Err(_) => {
            if let Err(e) = sink.cancel().await {
                warn!("Failed to cancel timed out {} change: {e}", event.action);
            }
            Err(anyhow!(
                "Timed out after {io_timeout:?} applying {} change",
                event.action
            ))
        }
    };
    let affected = applied.map_err(|error| Failure {
        stage: FailureStage::Apply,
        error,
    })?;

    debug!(
        "Applied {} change to {}.{} ({affected} row(s))",
        event.action, event.schema, event.table
    );
    Ok(Outcome::Applied)
}

/// Retries every pending ledger entry against `sink`, oldest first.
///
/// Entries that now apply, or that belong to another table, are
/// acknowledged and removed. The rest stay for a later attempt.
pub async fn replay_ledger<K: ChangeSink + ?Sized>(
    ledger: &Ledger,
    sink: &K,
    io_timeout: Duration,
) -> Result<ReplayStats> {
    let entries = ledger.pending().await.context("Failed to list ledger entries")?;
    let mut stats = ReplayStats::default();

    for entry in entries {
        match process(sink, io_timeout, &entry.raw).await {
            Ok(_) => {
                ledger
                    .ack(&entry)
                    .await
                    .with_context(|| format!("Failed to acknowledge ledger entry {}", entry.id))?;
                info!("Replayed ledger entry {} (LSN {})", entry.id, entry.lsn);
                stats.resolved += 1;
            }
            Err(failure) => {
                debug!(
                    "Ledger entry {} still fails at {} stage: {:#}",
                    entry.id, failure.stage, failure.error
                );
                stats.remaining += 1;
            }
        }
    }
    Ok(stats)
}

/// Drains a change source into a sink on a fixed interval.
pub struct Poller<C: ?Sized, K: ?Sized> {
    source: Arc<C>,
    sink: Arc<K>,
    ledger: Ledger,
    io_timeout: Duration,
    ledger_retry: bool,
}

impl<C, K> Poller<C, K>
where
    C: ChangeSource + ?Sized,
    K: ChangeSink + ?Sized,
{
    pub fn new(source: Arc<C>, sink: Arc<K>, ledger: Ledger, io_timeout: Duration) -> Self {
        Self {
            source,
            sink,
            ledger,
            io_timeout,
            ledger_retry: false,
        }
    }

    /// Replays the ledger at the start of every tick.
    pub fn with_ledger_retry(mut self, enabled: bool) -> Self {
        self.ledger_retry = enabled;
        self
    }

    /// Runs one poll cycle.
    ///
    /// Returns an error only when the slot could not be drained; failures of
    /// individual records are counted in the returned stats.
    pub async fn tick(&self) -> Result<TickStats> {
        if self.ledger_retry {
            match replay_ledger(&self.ledger, self.sink.as_ref(), self.io_timeout).await {
                Ok(replay) if replay.resolved > 0 || replay.remaining > 0 => info!(
                    "Ledger replay: {} resolved, {} remaining",
                    replay.resolved, replay.remaining
                ),
                Ok(_) => {}
                Err(e) => warn!("Ledger replay failed: {e:#}"),
            }
        }

        let consumed = timeout(
            self.io_timeout + CANCEL_GRACE,
            self.source.consume_pending_changes(),
        )
        .await;
        let Ok(consumed) = consumed else {
            // The slot only advances if the read commits, so cancel it.
            if let Err(e) = self.source.cancel().await {
                warn!(
                    "Failed to cancel read on slot '{}': {e}",
                    self.source.slot_name()
                );
            }
            bail!(
                "Timed out after {:?} consuming slot '{}'",
                self.io_timeout,
                self.source.slot_name()
            );
        };
        let changes = consumed.with_context(|| {
            format!(
                "Failed to consume changes from slot '{}'",
                self.source.slot_name()
            )
        })?;

        let mut stats = TickStats {
            received: changes.len(),
            ..Default::default()
        };
        for raw in &changes {
            match process(self.sink.as_ref(), self.io_timeout, &raw.data).await {
                Ok(Outcome::Applied) => stats.applied += 1,
                Ok(Outcome::Skipped) => stats.skipped += 1,
                Err(failure) => {
                    stats.failed += 1;
                    self.record_failure(raw, failure).await;
                }
            }
        }
        Ok(stats)
    }

    async fn record_failure(&self, raw: &RawChange, failure: Failure) {
        error!(
            "Failed to {} change at LSN {}: {:#}",
            failure.stage, raw.lsn, failure.error
        );
        if let Err(e) = self
            .ledger
            .record(
                self.source.slot_name(),
                &raw.lsn,
                failure.stage,
                &raw.data,
                &failure.error,
            )
            .await
        {
            error!(
                "Failed to record change at LSN {} in the ledger, it is lost: {e:#}",
                raw.lsn
            );
        }
    }

    /// Ticks every `interval` until a shutdown signal arrives.
    ///
    /// The signal is only observed between ticks, so a tick in progress
    /// always finishes. A slow tick delays the next one instead of causing a
    /// burst.
    pub async fn run(
        &self,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
        monitor: Option<&Monitor>,
    ) -> Result<RunSummary> {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut summary = RunSummary::default();

        info!(
            "Polling slot '{}' every {interval:?} (Press Ctrl+C to stop)",
            self.source.slot_name()
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    info!("Received shutdown signal, stopping replication loop");
                    break;
                }
                _ = ticker.tick() => {}
            }

            summary.ticks += 1;
            match self.tick().await {
                Ok(stats) => {
                    if stats.received > 0 {
                        info!("Tick {}: {stats}", summary.ticks);
                    } else {
                        debug!("Tick {}: no pending changes", summary.ticks);
                    }
                    summary.totals += stats;
                }
                Err(e) => {
                    summary.failed_ticks += 1;
                    warn!("Tick {} failed: {e:#}", summary.ticks);
                }
            }

            if let Some(monitor) = monitor {
                monitor.report().await;
            }
        }

        Ok(summary)
    }
}
