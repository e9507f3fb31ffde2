//! Trait definitions for upstream metadata sources.
//!
//! The fetcher only talks to a source through [`MetadataSource`], so the YouTube
//! client and test doubles are interchangeable.

use std::future::Future;

use brandsafe_core::models::{ItemKind, RawRecord};

/// Classifies an error as worth retrying.
pub trait Retryable {
    /// Network errors, timeouts, rate limiting and upstream 5xx are transient.
    fn is_transient(&self) -> bool;
}

/// One upstream request worth of ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchBatch {
    /// 0-based position of the batch in the run.
    pub index: usize,
    pub kind: ItemKind,
    pub ids: Vec<String>,
}

impl FetchBatch {
    /// Split `ids` into ordered batches of at most `batch_size`.
    pub fn partition(kind: ItemKind, ids: &[String], batch_size: usize) -> Vec<FetchBatch> {
        ids.chunks(batch_size.max(1))
            .enumerate()
            .map(|(index, chunk)| FetchBatch {
                index,
                kind,
                ids: chunk.to_vec(),
            })
            .collect()
    }
}

/// A bulk metadata API.
pub trait MetadataSource: Send + Sync {
    type Error: std::error::Error + Retryable + Send + Sync + 'static;

    /// Fetch records for every id in the batch with a single request.
    ///
    /// Ids the source does not know are simply absent from the result.
    fn fetch_batch(
        &self,
        batch: &FetchBatch,
    ) -> impl Future<Output = Result<Vec<RawRecord>, Self::Error>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("id{i}")).collect()
    }

    #[test]
    fn partition_sizes() {
        let batches = FetchBatch::partition(ItemKind::Video, &ids(120), 50);
        let sizes: Vec<usize> = batches.iter().map(|b| b.ids.len()).collect();
        assert_eq!(sizes, vec![50, 50, 20]);
        assert_eq!(batches[2].index, 2);
        assert_eq!(batches[1].ids[0], "id50");
    }

    #[test]
    fn partition_empty() {
        assert!(FetchBatch::partition(ItemKind::Channel, &[], 50).is_empty());
    }
}
