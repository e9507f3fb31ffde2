use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use brandsafe_core::models::{ItemKind, ItemScore};

/// Lifecycle of an audit run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Pending,
    Fetching,
    Scoring,
    Done,
    /// Finished, but some ids could not be fetched or scored.
    DoneWithFailures,
}

impl RunState {
    /// Whether `next` is a legal successor of `self`.
    pub fn can_advance_to(self, next: RunState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Fetching)
                | (Self::Fetching, Self::Scoring)
                | (Self::Scoring, Self::Done | Self::DoneWithFailures)
                // A finished orchestrator can start the next run.
                | (Self::Done | Self::DoneWithFailures, Self::Pending)
        )
    }

    pub fn is_finished(self) -> bool {
        matches!(self, Self::Done | Self::DoneWithFailures)
    }
}

/// An id that produced no score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub item_id: String,
    pub kind: ItemKind,
    /// Request attempts spent on the id's batch; 0 if it was never requested.
    pub attempts: u32,
    pub reason: String,
    /// The batch was skipped because the run was cancelled.
    #[serde(default)]
    pub cancelled: bool,
}

/// Per-run counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub ids_requested: usize,
    pub batches: usize,
    pub fetched: usize,
    pub scored: usize,
    pub failed: usize,
    pub missing: usize,
    pub cancelled: usize,
    pub keyword_hits: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub elapsed_ms: i64,
}

/// Result of one audit run.
///
/// `scores` holds item-level scores sorted by id. `channels` holds channel
/// rollups and is empty for a video audit. Ids in `failures` and `missing`
/// never appear in `scores`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReport {
    pub state: RunState,
    pub scores: Vec<ItemScore>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub channels: Vec<ItemScore>,
    pub failures: Vec<ItemFailure>,
    /// Ids the source returned no record for.
    pub missing: Vec<String>,
    pub stats: RunStats,
}

impl AuditReport {
    pub fn score(&self, item_id: &str) -> Option<&ItemScore> {
        self.scores.iter().find(|s| s.item_id == item_id)
    }

    pub fn channel(&self, channel_id: &str) -> Option<&ItemScore> {
        self.channels.iter().find(|s| s.item_id == channel_id)
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}
