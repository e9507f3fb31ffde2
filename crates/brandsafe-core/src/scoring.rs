//! Keyword hit accumulation and channel rollup.

use tracing::trace;

use crate::keywords::{CompiledKeywordSet, KeywordCatalog};
use crate::models::{ExcludedCategories, ItemMetadata, ItemScore};
use crate::normalize::{extract_text, normalize_word};

/// Scan `text` once with the compiled pattern and fold every hit into a fresh score.
///
/// Pure and deterministic: the same inputs always produce an identical [`ItemScore`].
pub fn score(
    item_id: &str,
    text: &str,
    keywords: &CompiledKeywordSet,
    excluded: &ExcludedCategories,
) -> ItemScore {
    let mut result = ItemScore::new(item_id);
    for m in keywords.pattern().find_iter(text) {
        match keywords.resolve(m.as_str()) {
            Some(keyword) => result.record_hit(&normalize_word(m.as_str()), keyword, excluded),
            None => trace!(item = item_id, word = m.as_str(), "Match without keyword entry"),
        }
    }
    result
}

/// Extract the scan text from `item` and score it against its language's keyword set.
pub fn score_item(
    item: &ItemMetadata,
    catalog: &KeywordCatalog,
    excluded: &ExcludedCategories,
) -> ItemScore {
    let text = extract_text(item);
    let keywords = catalog.for_language(item.language.as_deref());
    score(&item.item_id, &text, keywords, excluded)
}

/// Sum item scores into one channel score.
///
/// Category and keyword accumulators are added up and the overall score is
/// recomputed from the summed non-excluded categories, so any partition of the
/// inputs rolls up to the same result.
pub fn rollup_channel_score(
    channel_id: &str,
    scores: &[ItemScore],
    excluded: &ExcludedCategories,
) -> ItemScore {
    let mut channel = ItemScore::new(channel_id);
    channel.items_scored = 0;
    for item in scores {
        channel.absorb(item);
    }
    channel.recompute(excluded);
    channel
}
