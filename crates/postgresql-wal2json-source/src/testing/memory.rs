//! In-memory source doubles.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use sync_core::Row;
use tokio::sync::Mutex;

use crate::error::SourceError;
use crate::source::{ChangeSource, RawChange, SnapshotSource};

enum Step {
    Batch(Vec<RawChange>),
    Failure,
    Stall,
}

/// A slot and table held in memory.
///
/// Each call to `consume_pending_changes` takes one queued step, mirroring a
/// destructive read. A queued failure makes that call return an error. A
/// queued stall takes the following batch and never returns: unless
/// [`ChangeSource::cancel`] is called, that batch is gone, as it would be
/// when a `pg_logical_slot_get_changes` call is abandoned but completes on
/// the server.
#[derive(Default)]
pub struct MemorySource {
    slot_name: String,
    steps: Mutex<VecDeque<Step>>,
    in_flight: Mutex<Option<Vec<RawChange>>>,
    rows: Vec<Row>,
    consumed: AtomicUsize,
    cancelled: AtomicUsize,
    queued: AtomicUsize,
}

impl MemorySource {
    pub fn new(slot_name: &str) -> Self {
        Self {
            slot_name: slot_name.to_string(),
            ..Default::default()
        }
    }

    /// Sets the rows returned by the snapshot read.
    pub fn with_rows(mut self, rows: Vec<Row>) -> Self {
        self.rows = rows;
        self
    }

    /// Queues a batch of wal2json documents for the next consume call.
    pub async fn push_batch<I, S>(&self, documents: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let position = self.queued.fetch_add(1, Ordering::SeqCst) + 1;
        let batch = documents
            .into_iter()
            .enumerate()
            .map(|(i, data)| RawChange::new(format!("0/{:X}", position * 0x1000 + i), data))
            .collect();
        self.steps.lock().await.push_back(Step::Batch(batch));
    }

    /// Makes the next consume call fail.
    pub async fn push_failure(&self) {
        self.steps.lock().await.push_back(Step::Failure);
    }

    /// Makes the next consume call take the following batch and hang.
    pub async fn push_stall(&self) {
        self.steps.lock().await.push_back(Step::Stall);
    }

    /// Number of consume calls made so far.
    pub fn consume_calls(&self) -> usize {
        self.consumed.load(Ordering::SeqCst)
    }

    /// Number of cancel calls made so far.
    pub fn cancel_calls(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Steps not yet consumed.
    pub async fn pending_batches(&self) -> usize {
        self.steps.lock().await.len()
    }
}

#[async_trait]
impl ChangeSource for MemorySource {
    async fn consume_pending_changes(&self) -> Result<Vec<RawChange>, SourceError> {
        self.consumed.fetch_add(1, Ordering::SeqCst);
        let mut steps = self.steps.lock().await;
        match steps.pop_front() {
            Some(Step::Batch(batch)) => Ok(batch),
            Some(Step::Failure) => Err(SourceError::Unavailable(
                "injected consume failure".to_string(),
            )),
            Some(Step::Stall) => {
                let taken = match steps.pop_front() {
                    Some(Step::Batch(batch)) => batch,
                    Some(other) => {
                        steps.push_front(other);
                        Vec::new()
                    }
                    None => Vec::new(),
                };
                drop(steps);
                *self.in_flight.lock().await = Some(taken);
                std::future::pending().await
            }
            None => Ok(Vec::new()),
        }
    }

    async fn cancel(&self) -> Result<(), SourceError> {
        self.cancelled.fetch_add(1, Ordering::SeqCst);
        let taken = self.in_flight.lock().await.take();
        if let Some(batch) = taken {
            self.steps.lock().await.push_front(Step::Batch(batch));
        }
        Ok(())
    }

    fn slot_name(&self) -> &str {
        &self.slot_name
    }
}

#[async_trait]
impl SnapshotSource for MemorySource {
    async fn read_rows(&self) -> Result<BoxStream<'_, Result<Row, SourceError>>, SourceError> {
        Ok(stream::iter(self.rows.iter().cloned().map(Ok)).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_batches_are_consumed_once() {
        let source = MemorySource::new("slot");
        source.push_batch(["a", "b"]).await;

        let first = source.consume_pending_changes().await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].data, "a");

        assert!(source.consume_pending_changes().await.unwrap().is_empty());
        assert_eq!(source.consume_calls(), 2);
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let source = MemorySource::new("slot");
        source.push_failure().await;
        source.push_batch(["a"]).await;

        assert!(source.consume_pending_changes().await.is_err());
        assert_eq!(source.consume_pending_changes().await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_stall_loses_the_batch() {
        let source = MemorySource::new("slot");
        source.push_stall().await;
        source.push_batch(["a"]).await;

        let stalled = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            source.consume_pending_changes(),
        )
        .await;
        assert!(stalled.is_err());

        assert!(source.consume_pending_changes().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_stall_keeps_the_batch() {
        let source = MemorySource::new("slot");
        source.push_stall().await;
        source.push_batch(["a"]).await;

        let stalled = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            source.consume_pending_changes(),
        )
        .await;
        assert!(stalled.is_err());
        source.cancel().await.unwrap();

        let batch = source.consume_pending_changes().await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].data, "a");
        assert_eq!(source.cancel_calls(), 1);
    }
}
