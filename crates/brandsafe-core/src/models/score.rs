use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::keyword::{CategoryId, ExcludedCategories, Keyword};

/// Score every item starts from before keyword hits are subtracted.
pub const BASE_SCORE: i64 = 100;

/// Accumulated hits for one keyword within an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordHit {
    pub category: CategoryId,
    /// The raw keyword as authored in the keyword store.
    pub keyword: String,
    /// Negative score of a single occurrence.
    pub severity: i32,
    pub hit_count: u32,
    pub negative_score_accumulated: i64,
}

/// Brand safety score for a single video or an aggregated channel.
///
/// `overall_score` has no floor and may go negative; use [`ItemScore::display_score`]
/// for a presentation value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemScore {
    pub item_id: String,
    pub overall_score: i64,
    /// Per-category deltas; always zero or negative.
    pub category_scores: BTreeMap<CategoryId, i64>,
    /// Keyed by the normalized keyword form.
    pub keyword_hits: BTreeMap<String, KeywordHit>,
    /// Normalized keywords that lowered the overall score.
    pub hit_keywords: BTreeSet<String>,
    /// Number of scanned items folded into this score.
    pub items_scored: u32,
}

impl ItemScore {
    /// A fresh score for one item with no hits.
    pub fn new(item_id: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            overall_score: BASE_SCORE,
            category_scores: BTreeMap::new(),
            keyword_hits: BTreeMap::new(),
            hit_keywords: BTreeSet::new(),
            items_scored: 1,
        }
    }

    /// Fold one keyword occurrence into the score.
    pub(crate) fn record_hit(
        &mut self,
        normalized: &str,
        keyword: &Keyword,
        excluded: &ExcludedCategories,
    ) {
        let score = i64::from(keyword.negative_score);

        let hit = self
            .keyword_hits
            .entry(normalized.to_string())
            .or_insert_with(|| KeywordHit {
                category: keyword.category.clone(),
                keyword: keyword.word.clone(),
                severity: keyword.negative_score,
                hit_count: 0,
                negative_score_accumulated: 0,
            });
        hit.hit_count += 1;
        hit.negative_score_accumulated += score;

        *self
            .category_scores
            .entry(keyword.category.clone())
            .or_insert(0) -= score;

        if !excluded.contains(&keyword.category) {
            self.overall_score -= score;
            self.hit_keywords.insert(normalized.to_string());
        }
    }

    /// Add another score's accumulators into this one.
    ///
    /// Leaves `overall_score` and `hit_keywords` stale; call [`ItemScore::recompute`].
    pub(crate) fn absorb(&mut self, other: &ItemScore) {
        for (category, delta) in &other.category_scores {
            *self.category_scores.entry(category.clone()).or_insert(0) += delta;
        }
        for (word, hit) in &other.keyword_hits {
            self.keyword_hits
                .entry(word.clone())
                .and_modify(|existing| {
                    existing.hit_count += hit.hit_count;
                    existing.negative_score_accumulated += hit.negative_score_accumulated;
                })
                .or_insert_with(|| hit.clone());
        }
        self.items_scored += other.items_scored;
    }

    /// Rebuild `overall_score` and `hit_keywords` from the accumulators, honoring
    /// `excluded`.
    pub fn recompute(&mut self, excluded: &ExcludedCategories) {
        let penalty: i64 = self
            .category_scores
            .iter()
            .filter(|(category, _)| !excluded.contains(category))
            .map(|(_, delta)| *delta)
            .sum();
        self.overall_score = BASE_SCORE + penalty;
        self.hit_keywords = self
            .keyword_hits
            .iter()
            .filter(|(_, hit)| !excluded.contains(&hit.category))
            .map(|(word, _)| word.clone())
            .collect();
    }

    /// Overall score clamped to `[0, 100]`.
    pub fn display_score(&self) -> u8 {
        self.overall_score.clamp(0, BASE_SCORE) as u8
    }

    /// Total keyword occurrences across all categories.
    pub fn total_hits(&self) -> u64 {
        self.keyword_hits
            .values()
            .map(|h| u64::from(h.hit_count))
            .sum()
    }

    /// Per category, how many distinct keywords of each severity were hit.
    pub fn severity_counts(&self) -> BTreeMap<CategoryId, BTreeMap<i32, u32>> {
        let mut counts: BTreeMap<CategoryId, BTreeMap<i32, u32>> = BTreeMap::new();
        for hit in self.keyword_hits.values() {
            *counts
                .entry(hit.category.clone())
                .or_default()
                .entry(hit.severity)
                .or_insert(0) += 1;
        }
        counts
    }
}
