//! Chunked, bounded-concurrency metadata fetching.
//!
//! Ids are split into fixed-size batches; each batch is one upstream request,
//! retried under a [`RetryPolicy`]. At most `max_workers` batches are in flight
//! and new batches are only pulled as slots free up. A batch that ultimately
//! fails degrades to one [`FetchResult::Failed`] per id without affecting its
//! siblings.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use brandsafe_core::config::FetchConfig;
use brandsafe_core::models::{ItemKind, RawRecord};
use futures::stream::{self, Stream, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::retry::{BatchOutcome, RetryPolicy};
use crate::traits::{FetchBatch, MetadataSource, Retryable};

/// Tuning for a [`ChunkedFetcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    pub batch_size: usize,
    pub max_workers: usize,
    pub retry: RetryPolicy,
    /// Upper bound on a single request attempt.
    pub request_timeout: Duration,
}

impl FetchOptions {
    pub fn from_config(config: &FetchConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            max_workers: config.max_workers.max(1),
            retry: RetryPolicy::from_config(config),
            request_timeout: config.request_timeout(),
        }
    }
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self::from_config(&brandsafe_core::config::AuditConfig::default().fetch)
    }
}

/// Per-id outcome of a fetch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FetchResult {
    Fetched(RawRecord),
    /// The batch succeeded but the source had nothing for this id.
    Missing { item_id: String },
    /// The batch failed permanently or ran out of retries.
    Failed {
        item_id: String,
        attempts: u32,
        reason: String,
    },
    /// The batch was never submitted because the run was cancelled.
    Cancelled { item_id: String },
}

impl FetchResult {
    pub fn item_id(&self) -> &str {
        match self {
            Self::Fetched(record) => &record.item_id,
            Self::Missing { item_id }
            | Self::Failed { item_id, .. }
            | Self::Cancelled { item_id } => item_id,
        }
    }
}

/// A single attempt's failure: either the source's error or our timeout.
#[derive(Debug)]
enum AttemptError<E> {
    Source(E),
    Timeout(Duration),
}

impl<E: fmt::Display> fmt::Display for AttemptError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source(e) => write!(f, "{e}"),
            Self::Timeout(after) => write!(f, "request timed out after {after:?}"),
        }
    }
}

impl<E: Retryable> Retryable for AttemptError<E> {
    fn is_transient(&self) -> bool {
        match self {
            Self::Source(e) => e.is_transient(),
            Self::Timeout(_) => true,
        }
    }
}

/// Fetches item metadata in batches through a [`MetadataSource`].
pub struct ChunkedFetcher<S> {
    source: Arc<S>,
    options: FetchOptions,
}

impl<S: MetadataSource> ChunkedFetcher<S> {
    pub fn new(source: Arc<S>, options: FetchOptions) -> Self {
        Self { source, options }
    }

    pub fn options(&self) -> &FetchOptions {
        &self.options
    }

    /// Number of batches `count` ids will be split into.
    pub fn batch_count(&self, count: usize) -> usize {
        count.div_ceil(self.options.batch_size.max(1))
    }

    /// Fetch every id, yielding exactly one [`FetchResult`] per input id.
    ///
    /// Results arrive in batch completion order; within a batch they follow
    /// input order.
    pub fn fetch<'a>(
        &'a self,
        kind: ItemKind,
        ids: &[String],
        cancel: &'a CancellationToken,
    ) -> impl Stream<Item = FetchResult> + 'a {
        let batches = FetchBatch::partition(kind, ids, self.options.batch_size);
        tracing::info!(
            kind = %kind,
            ids = ids.len(),
            batches = batches.len(),
            max_workers = self.options.max_workers,
            "Starting fetch"
        );

        stream::iter(batches)
            .map(move |batch| self.run_batch(batch, cancel))
            .buffer_unordered(self.options.max_workers.max(1))
            .flat_map(stream::iter)
    }

    async fn run_batch(&self, batch: FetchBatch, cancel: &CancellationToken) -> Vec<FetchResult> {
        if cancel.is_cancelled() {
            tracing::debug!(batch = batch.index, "Run cancelled, skipping batch");
            return batch
                .ids
                .into_iter()
                .map(|item_id| FetchResult::Cancelled { item_id })
                .collect();
        }

        let label = format!("{} batch {}", batch.kind, batch.index);
        let timeout = self.options.request_timeout;
        let outcome = self
            .options
            .retry
            .run(&label, cancel, |_| {
                let source = Arc::clone(&self.source);
                let batch = &batch;
                async move {
                    match tokio::time::timeout(timeout, source.fetch_batch(batch)).await {
                        Ok(Ok(records)) => Ok(records),
                        Ok(Err(e)) => Err(AttemptError::Source(e)),
                        Err(_) => Err(AttemptError::Timeout(timeout)),
                    }
                }
            })
            .await;

        match outcome {
            BatchOutcome::Success { value, attempts } => {
                tracing::debug!(
                    batch = batch.index,
                    records = value.len(),
                    attempts,
                    "Batch fetched"
                );
                resolve(batch.ids, value)
            }
            BatchOutcome::Exhausted { attempts, reason } => {
                tracing::error!(
                    batch = batch.index,
                    ids = batch.ids.len(),
                    attempts,
                    %reason,
                    "Batch failed after retries"
                );
                fail_all(batch.ids, attempts, &reason)
            }
            BatchOutcome::Rejected { attempts, reason } => {
                tracing::error!(
                    batch = batch.index,
                    ids = batch.ids.len(),
                    %reason,
                    "Batch rejected by source"
                );
                fail_all(batch.ids, attempts, &reason)
            }
        }
    }
}

/// Pair requested ids with returned records, in request order.
fn resolve(ids: Vec<String>, records: Vec<RawRecord>) -> Vec<FetchResult> {
    let mut by_id: HashMap<String, RawRecord> = records
        .into_iter()
        .map(|r| (r.item_id.clone(), r))
        .collect();

    let results: Vec<FetchResult> = ids
        .into_iter()
        .map(|item_id| match by_id.remove(&item_id) {
            Some(record) => FetchResult::Fetched(record),
            None => FetchResult::Missing { item_id },
        })
        .collect();

    if !by_id.is_empty() {
        tracing::debug!(unexpected = by_id.len(), "Source returned unrequested ids");
    }
    results
}

fn fail_all(ids: Vec<String>, attempts: u32, reason: &str) -> Vec<FetchResult> {
    ids.into_iter()
        .map(|item_id| FetchResult::Failed {
            item_id,
            attempts,
            reason: reason.to_string(),
        })
        .collect()
}
