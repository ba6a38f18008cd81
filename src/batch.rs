//! Per-item processing queue
//!
//! Items are processed in submission order. Each item moves through
//! `pending -> processing -> completed | failed` and every transition is
//! published on a broadcast channel. A failing item never aborts the batch.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Lifecycle of a queued item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ItemStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ItemStatus::Completed | ItemStatus::Failed)
    }
}

/// One unit of work in a [`BatchQueue`]
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub id: Uuid,
    pub name: String,
    pub mime_type: String,
    pub input: Vec<u8>,
    pub status: ItemStatus,
    pub output: Option<Vec<u8>>,
    pub error: Option<String>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// A status transition published while the queue runs
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusUpdate {
    pub id: Uuid,
    pub name: String,
    pub status: ItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Counts after a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Work applied to each queued item
#[async_trait]
pub trait ItemProcessor: Send + Sync {
    /// Produce the output bytes for `item`
    async fn process(&self, item: &BatchItem) -> Result<Vec<u8>>;
}

/// Ordered queue of items sharing one operation
pub struct BatchQueue {
    items: Vec<BatchItem>,
    events: broadcast::Sender<StatusUpdate>,
}

impl BatchQueue {
    pub fn new() -> Self {
        Self::with_event_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// Create a queue whose status channel buffers `capacity` updates per subscriber
    pub fn with_event_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            items: Vec::new(),
            events,
        }
    }

    /// Append an item in `pending` state and return its id
    pub fn submit(
        &mut self,
        name: impl Into<String>,
        mime_type: impl Into<String>,
        input: Vec<u8>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.items.push(BatchItem {
            id,
            name: name.into(),
            mime_type: mime_type.into(),
            input,
            status: ItemStatus::Pending,
            output: None,
            error: None,
            finished_at: None,
        });
        id
    }

    /// Receive every status transition from now on
    pub fn subscribe(&self) -> broadcast::Receiver<StatusUpdate> {
        self.events.subscribe()
    }

    pub fn items(&self) -> &[BatchItem] {
        &self.items
    }

    pub fn get(&self, id: Uuid) -> Option<&BatchItem> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Completed items in submission order
    pub fn completed(&self) -> impl Iterator<Item = &BatchItem> {
        self.items
            .iter()
            .filter(|item| item.status == ItemStatus::Completed)
    }

    pub fn summary(&self) -> BatchSummary {
        let mut summary = BatchSummary {
            total: self.items.len(),
            ..BatchSummary::default()
        };
        for item in &self.items {
            match item.status {
                ItemStatus::Completed => summary.completed += 1,
                ItemStatus::Failed => summary.failed += 1,
                _ => {}
            }
        }
        summary
    }

    /// Process every item that is not yet completed, one at a time.
    ///
    /// An item only starts once its predecessor is terminal. Running again
    /// retries the failed items and leaves completed ones untouched.
    pub async fn run(&mut self, processor: &dyn ItemProcessor) -> BatchSummary {
        for index in 0..self.items.len() {
            if self.items[index].status == ItemStatus::Completed {
                continue;
            }

            self.mark_processing(index);
            let outcome = processor.process(&self.items[index]).await;
            self.finish(index, outcome);
        }

        let summary = self.summary();
        tracing::info!(
            total = summary.total,
            completed = summary.completed,
            failed = summary.failed,
            "Batch run finished"
        );
        summary
    }

    /// Process pending and failed items with up to `limit` in flight.
    ///
    /// Outcomes are collected by item id and written back in submission order,
    /// so the final state does not depend on completion order. With a limit of
    /// one this is the same as [`BatchQueue::run`].
    pub async fn run_concurrent(
        &mut self,
        processor: Arc<dyn ItemProcessor>,
        limit: usize,
    ) -> BatchSummary {
        if limit <= 1 {
            return self.run(processor.as_ref()).await;
        }

        let jobs: Vec<BatchItem> = self
            .items
            .iter()
            .filter(|item| item.status != ItemStatus::Completed)
            .cloned()
            .collect();

        let events = self.events.clone();
        let mut outcomes: HashMap<Uuid, Result<Vec<u8>>> = stream::iter(jobs)
            .map(|item| {
                let processor = Arc::clone(&processor);
                let events = events.clone();
                async move {
                    let _ = events.send(StatusUpdate {
                        id: item.id,
                        name: item.name.clone(),
                        status: ItemStatus::Processing,
                        error: None,
                    });
                    let outcome = processor.process(&item).await;
                    let (status, error) = match &outcome {
                        Ok(_) => (ItemStatus::Completed, None),
                        Err(e) => (ItemStatus::Failed, Some(e.client_message())),
                    };
                    let _ = events.send(StatusUpdate {
                        id: item.id,
                        name: item.name.clone(),
                        status,
                        error,
                    });
                    (item.id, outcome)
                }
            })
            .buffer_unordered(limit)
            .collect()
            .await;

        for item in &mut self.items {
            if let Some(outcome) = outcomes.remove(&item.id) {
                apply_outcome(item, outcome);
            }
        }

        let summary = self.summary();
        tracing::info!(
            total = summary.total,
            completed = summary.completed,
            failed = summary.failed,
            limit,
            "Concurrent batch run finished"
        );
        summary
    }

    fn mark_processing(&mut self, index: usize) {
        let item = &mut self.items[index];
        item.status = ItemStatus::Processing;
        item.error = None;
        tracing::debug!(id = %item.id, name = %item.name, "Processing item");
        self.publish(index);
    }

    fn finish(&mut self, index: usize, outcome: Result<Vec<u8>>) {
        apply_outcome(&mut self.items[index], outcome);
        self.publish(index);
    }

    fn publish(&self, index: usize) {
        let item = &self.items[index];
        // No subscribers is fine
        let _ = self.events.send(StatusUpdate {
            id: item.id,
            name: item.name.clone(),
            status: item.status,
            error: item.error.clone(),
        });
    }
}

impl Default for BatchQueue {
    fn default() -> Self {
        Self::new()
    }
}

fn apply_outcome(item: &mut BatchItem, outcome: Result<Vec<u8>>) {
    match outcome {
        Ok(output) => {
            item.status = ItemStatus::Completed;
            item.output = Some(output);
            item.error = None;
            tracing::debug!(id = %item.id, name = %item.name, "Item completed");
        }
        Err(e) => {
            tracing::warn!(id = %item.id, name = %item.name, error = %e, "Item failed");
            item.status = ItemStatus::Failed;
            item.output = None;
            item.error = Some(e.client_message());
        }
    }
    item.finished_at = Some(Utc::now());
}
