//! Keyword loading, de-duplication and pattern compilation.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use regex::{Regex, RegexBuilder};
use tracing::{debug, warn};

use crate::error::CoreError;
use crate::models::{Keyword, UNIVERSAL_LANGUAGE};
use crate::normalize::normalize_word;

/// Compiled alternations over tens of thousands of keywords exceed the regex
/// crate's default size limit.
const PATTERN_SIZE_LIMIT: usize = 256 * 1024 * 1024;

/// Read keyword store rows from a JSON array file.
pub fn load_file(path: &Path) -> Result<Vec<Keyword>, CoreError> {
    let content = std::fs::read_to_string(path)?;
    let keywords: Vec<Keyword> = serde_json::from_str(&content)
        .map_err(|e| CoreError::Parse(format!("{}: {e}", path.display())))?;
    debug!(path = %path.display(), count = keywords.len(), "Read keyword file");
    Ok(keywords)
}

/// De-duplicate keywords by `(word, language)`, case-insensitively, keeping the
/// first occurrence and preserving input order.
pub fn unique(keywords: &[Keyword]) -> Vec<Keyword> {
    let mut seen = HashSet::new();
    keywords
        .iter()
        .filter(|kw| seen.insert((kw.word.to_lowercase(), kw.language.to_lowercase())))
        .cloned()
        .collect()
}

/// Drop rows that must never match: soft-deleted, non-positive score, or a word
/// that normalizes to nothing.
fn active(keywords: &[Keyword]) -> Vec<Keyword> {
    keywords
        .iter()
        .filter(|kw| {
            if kw.deleted {
                debug!(word = %kw.word, "Skipping soft-deleted keyword");
                return false;
            }
            if kw.negative_score < 1 {
                warn!(
                    word = %kw.word,
                    score = kw.negative_score,
                    "Skipping keyword with non-positive score"
                );
                return false;
            }
            if normalize_word(&kw.word).is_empty() {
                warn!(word = %kw.word, "Skipping keyword with no word characters");
                return false;
            }
            true
        })
        .cloned()
        .collect()
}

/// Immutable keyword lookup table plus the single alternation pattern that scans for it.
#[derive(Debug, Clone)]
pub struct CompiledKeywordSet {
    keywords: Vec<Keyword>,
    /// Lowercased raw word to its first-loaded keyword.
    by_raw: HashMap<String, Keyword>,
    by_normalized: HashMap<String, Vec<Keyword>>,
    pattern: Regex,
}

impl CompiledKeywordSet {
    /// Filter, de-duplicate and compile a keyword list.
    pub fn load(keywords: &[Keyword]) -> Result<Self, CoreError> {
        let keywords = unique(&active(keywords));
        if keywords.is_empty() {
            return Err(CoreError::EmptyKeywordSet);
        }

        let mut by_raw: HashMap<String, Keyword> = HashMap::new();
        let mut by_normalized: HashMap<String, Vec<Keyword>> = HashMap::new();
        for kw in &keywords {
            by_raw
                .entry(kw.word.to_lowercase())
                .or_insert_with(|| kw.clone());
            by_normalized
                .entry(normalize_word(&kw.word))
                .or_default()
                .push(kw.clone());
        }

        let pattern = compile(&keywords)?;
        debug!(
            keywords = keywords.len(),
            normalized = by_normalized.len(),
            "Compiled keyword set"
        );

        Ok(Self {
            keywords,
            by_raw,
            by_normalized,
            pattern,
        })
    }

    /// The compiled alternation.
    pub fn pattern(&self) -> &Regex {
        &self.pattern
    }

    /// Keyword charged for a pattern match.
    ///
    /// The keyword whose raw word equals the match (ignoring case) wins. Otherwise
    /// the match falls back to the first keyword sharing its normalized form.
    pub fn resolve(&self, matched: &str) -> Option<&Keyword> {
        self.by_raw
            .get(&matched.to_lowercase())
            .or_else(|| self.lookup(&normalize_word(matched)))
    }

    /// First-loaded keyword with the given normalized form.
    ///
    /// When several raw keywords share a normalized form the first loaded one wins.
    pub fn lookup(&self, normalized: &str) -> Option<&Keyword> {
        self.by_normalized.get(normalized).and_then(|v| v.first())
    }

    /// The first raw keyword that normalizes to `normalized`.
    pub fn find_original(&self, normalized: &str) -> Option<&str> {
        self.lookup(normalized).map(|kw| kw.word.as_str())
    }

    /// Every raw keyword sharing the normalized form.
    pub fn variants(&self, normalized: &str) -> &[Keyword] {
        self.by_normalized
            .get(normalized)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Active keywords in load order.
    pub fn keywords(&self) -> &[Keyword] {
        &self.keywords
    }

    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }
}

/// Build `(\bw1\b|\bw2\b|...)` over the raw keyword strings.
fn compile(keywords: &[Keyword]) -> Result<Regex, CoreError> {
    let mut seen = HashSet::new();
    let alternatives: Vec<String> = keywords
        .iter()
        .filter(|kw| seen.insert(kw.word.to_lowercase()))
        .map(|kw| format!(r"\b{}\b", regex::escape(&kw.word)))
        .collect();

    let pattern = RegexBuilder::new(&format!("({})", alternatives.join("|")))
        .case_insensitive(true)
        .size_limit(PATTERN_SIZE_LIMIT)
        .dfa_size_limit(PATTERN_SIZE_LIMIT)
        .build()?;
    Ok(pattern)
}

/// Compiled keyword sets per language.
///
/// Each language set holds that language's keywords plus the universal ones.
/// Unknown or absent languages resolve to the set of every keyword.
#[derive(Debug, Clone)]
pub struct KeywordCatalog {
    by_language: BTreeMap<String, CompiledKeywordSet>,
    all: CompiledKeywordSet,
}

impl KeywordCatalog {
    pub fn load(keywords: &[Keyword]) -> Result<Self, CoreError> {
        let keywords = active(keywords);
        let all = CompiledKeywordSet::load(&keywords)?;

        let languages: HashSet<String> = keywords
            .iter()
            .map(|kw| kw.language.to_lowercase())
            .filter(|lang| lang != UNIVERSAL_LANGUAGE)
            .collect();

        let mut by_language = BTreeMap::new();
        for lang in languages {
            let subset: Vec<Keyword> = keywords
                .iter()
                .filter(|kw| {
                    let kw_lang = kw.language.to_lowercase();
                    kw_lang == lang || kw_lang == UNIVERSAL_LANGUAGE
                })
                .cloned()
                .collect();
            by_language.insert(lang, CompiledKeywordSet::load(&subset)?);
        }

        debug!(
            languages = by_language.len(),
            keywords = all.len(),
            "Loaded keyword catalog"
        );
        Ok(Self { by_language, all })
    }

    /// Set to scan an item in `language` with.
    pub fn for_language(&self, language: Option<&str>) -> &CompiledKeywordSet {
        language
            .map(str::to_lowercase)
            .and_then(|lang| self.by_language.get(&lang))
            .unwrap_or(&self.all)
    }

    /// The fallback set containing every active keyword.
    pub fn all(&self) -> &CompiledKeywordSet {
        &self.all
    }

    /// Language codes with a dedicated set.
    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.by_language.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kw(word: &str, category: &str, score: i32) -> Keyword {
        Keyword::new(word, category, "en", score)
    }

    #[test]
    fn boundary_matching() {
        let set = CompiledKeywordSet::load(&[kw("cat", "1", 1)]).unwrap();
        assert!(set.pattern().is_match("the cat sat"));
        assert!(!set.pattern().is_match("the category list"));
        assert!(set.pattern().is_match("CAT"));
    }

    #[test]
    fn punctuation_variants_share_entry() {
        let set =
            CompiledKeywordSet::load(&[kw("third", "B", 1), kw("t-h-i-r-d", "B", 1)]).unwrap();
        assert_eq!(set.variants("third").len(), 2);
        assert_eq!(set.find_original("third"), Some("third"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn resolve_prefers_exact_raw_word() {
        let set =
            CompiledKeywordSet::load(&[kw("t-h-i-r-d", "B", 2), kw("third", "B", 1)]).unwrap();
        assert_eq!(set.resolve("Third").map(|k| k.negative_score), Some(1));
        assert_eq!(set.resolve("T-H-I-R-D").map(|k| k.word.as_str()), Some("t-h-i-r-d"));
        assert_eq!(set.resolve("t.h.i.r.d").map(|k| k.word.as_str()), Some("t-h-i-r-d"));
        assert!(set.resolve("fourth").is_none());
    }

    #[test]
    fn punctuated_keyword_escaped() {
        let set = CompiledKeywordSet::load(&[kw("a.b", "1", 1)]).unwrap();
        assert!(set.pattern().is_match("x a.b y"));
        assert!(!set.pattern().is_match("x acb y"));
    }

    #[test]
    fn unique_keeps_first_seen() {
        let list = vec![
            kw("Gore", "violence", 3),
            kw("blood", "violence", 2),
            kw("gore", "violence", 5),
            Keyword::new("gore", "violence", "es", 1),
        ];
        let deduped = unique(&list);
        assert_eq!(deduped.len(), 3);
        assert_eq!(deduped[0].word, "Gore");
        assert_eq!(deduped[0].negative_score, 3);
        assert_eq!(deduped[1].word, "blood");
        assert_eq!(deduped[2].language, "es");
    }

    #[test]
    fn empty_set_rejected() {
        match CompiledKeywordSet::load(&[]) {
            Err(CoreError::EmptyKeywordSet) => {}
            other => panic!("Expected EmptyKeywordSet, got {other:?}"),
        }
    }

    #[test]
    fn skips_inactive_keywords() {
        let mut deleted = kw("gone", "1", 2);
        deleted.deleted = true;
        let set =
            CompiledKeywordSet::load(&[deleted, kw("zero", "1", 0), kw("!!!", "1", 1), kw("ok", "1", 1)])
                .unwrap();
        assert_eq!(set.len(), 1);
        assert!(set.lookup("gone").is_none());
        assert!(set.lookup("zero").is_none());
        assert!(set.lookup("ok").is_some());
    }

    #[test]
    fn only_inactive_keywords_is_empty() {
        let result = CompiledKeywordSet::load(&[kw("zero", "1", 0), kw("neg", "1", -2)]);
        assert!(matches!(result, Err(CoreError::EmptyKeywordSet)));
    }

    #[test]
    fn rebuild_is_deterministic() {
        let list = vec![kw("alpha", "1", 1), kw("beta", "2", 2), kw("gamma", "1", 3)];
        let a = CompiledKeywordSet::load(&list).unwrap();
        let b = CompiledKeywordSet::load(&list).unwrap();
        assert_eq!(a.pattern().as_str(), b.pattern().as_str());
        assert_eq!(a.keywords(), b.keywords());
    }

    #[test]
    fn catalog_selects_language() {
        let list = vec![
            Keyword::new("hola", "1", "es", 1),
            Keyword::new("hello", "1", "en", 1),
            Keyword::new("lol", "2", UNIVERSAL_LANGUAGE, 1),
        ];
        let catalog = KeywordCatalog::load(&list).unwrap();

        let es = catalog.for_language(Some("ES"));
        assert!(es.lookup("hola").is_some());
        assert!(es.lookup("lol").is_some());
        assert!(es.lookup("hello").is_none());

        let fallback = catalog.for_language(Some("fr"));
        assert_eq!(fallback.len(), 3);
        assert_eq!(catalog.for_language(None).len(), 3);

        let langs: Vec<&str> = catalog.languages().collect();
        assert_eq!(langs, vec!["en", "es"]);
    }

    #[test]
    fn reads_keyword_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keywords.json");
        std::fs::write(
            &path,
            r#"[
                {"name": "gore", "category": "violence", "language": "en", "negative_score": 3},
                {"name": "old", "category": "violence", "negative_score": 1, "deleted": true}
            ]"#,
        )
        .unwrap();

        let keywords = load_file(&path).unwrap();
        assert_eq!(keywords.len(), 2);
        assert!(keywords[1].deleted);
        assert_eq!(CompiledKeywordSet::load(&keywords).unwrap().len(), 1);
    }

    #[test]
    fn malformed_keyword_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keywords.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(load_file(&path), Err(CoreError::Parse(_))));
    }

    #[test]
    fn catalog_rejects_empty() {
        assert!(matches!(
            KeywordCatalog::load(&[]),
            Err(CoreError::EmptyKeywordSet)
        ));
    }
}
