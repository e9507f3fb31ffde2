//! Destinations for finished scores.

use std::collections::BTreeMap;
use std::sync::Mutex;

use brandsafe_core::models::ItemScore;

#[derive(Debug, thiserror::Error)]
#[error("sink error: {0}")]
pub struct SinkError(pub String);

/// Accepts scores keyed by item id. Re-submitting an id replaces the stored score.
pub trait ScoreSink: Send + Sync {
    fn upsert(&self, score: &ItemScore) -> Result<(), SinkError>;
}

/// Keeps scores in memory, ordered by id.
#[derive(Debug, Default)]
pub struct MemorySink {
    scores: Mutex<BTreeMap<String, ItemScore>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, item_id: &str) -> Option<ItemScore> {
        self.scores.lock().ok()?.get(item_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.scores.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every stored score, ordered by id.
    pub fn snapshot(&self) -> Vec<ItemScore> {
        self.scores
            .lock()
            .map(|s| s.values().cloned().collect())
            .unwrap_or_default()
    }
}

impl ScoreSink for MemorySink {
    fn upsert(&self, score: &ItemScore) -> Result<(), SinkError> {
        let mut scores = self
            .scores
            .lock()
            .map_err(|_| SinkError("memory sink lock poisoned".into()))?;
        scores.insert(score.item_id.clone(), score.clone());
        Ok(())
    }
}
