//! Text normalization for keyword matching.
//!
//! Two separate normalizations live here:
//! - keyword normalization, which collapses punctuation variants of a keyword
//!   (`"t-h-i-r-d"` and `"third"`) onto one lookup key;
//! - scan text extraction, which turns an item's metadata fields into the single
//!   lowercase blob the compiled keyword pattern runs over.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::ItemMetadata;

static NON_WORD_RUN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\W+").expect("static pattern is valid")
});

// ── Keyword normalization ─────────────────────────────────────────────

/// Lowercase a keyword and drop every non-alphanumeric character.
///
/// Idempotent: `normalize_word(&normalize_word(w)) == normalize_word(w)`.
pub fn normalize_word(word: &str) -> String {
    word.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

// ── Scan text extraction ──────────────────────────────────────────────

/// Build the scannable text for an item.
///
/// Joins title, description, tags and transcript with newlines, then collapses
/// runs of non-word characters to a single space, lowercases and trims.
/// Keywords containing punctuation will not survive this step, so the keyword
/// list must only contain forms that do.
pub fn extract_text(item: &ItemMetadata) -> String {
    let tags = item.tags.join(" ");
    let parts = [
        item.title.as_deref().unwrap_or_default(),
        item.description.as_deref().unwrap_or_default(),
        tags.as_str(),
        item.transcript.as_deref().unwrap_or_default(),
    ];
    normalize_text(&parts.join("\n"))
}

/// Collapse non-word runs to a space, lowercase and trim arbitrary text.
pub fn normalize_text(text: &str) -> String {
    NON_WORD_RUN
        .replace_all(text, " ")
        .to_lowercase()
        .trim()
        .to_string()
}
