use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Language code for keywords that apply regardless of detected language.
pub const UNIVERSAL_LANGUAGE: &str = "un";

/// Opaque brand safety category identifier (e.g. "violence", "4").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryId(String);

impl CategoryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CategoryId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for CategoryId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single row from the keyword store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyword {
    #[serde(rename = "name", alias = "word")]
    pub word: String,
    pub category: CategoryId,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(rename = "negative_score", alias = "severity")]
    pub negative_score: i32,
    /// Soft-deleted rows stay in the store for audit history but never match.
    #[serde(default)]
    pub deleted: bool,
}

fn default_language() -> String {
    UNIVERSAL_LANGUAGE.to_string()
}

impl Keyword {
    pub fn new(
        word: impl Into<String>,
        category: impl Into<CategoryId>,
        language: impl Into<String>,
        negative_score: i32,
    ) -> Self {
        Self {
            word: word.into(),
            category: category.into(),
            language: language.into(),
            negative_score,
            deleted: false,
        }
    }
}

/// Categories whose hits are tallied but never lower the overall score.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExcludedCategories(BTreeSet<CategoryId>);

impl ExcludedCategories {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn contains(&self, category: &CategoryId) -> bool {
        self.0.contains(category)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CategoryId> {
        self.0.iter()
    }
}

impl<C: Into<CategoryId>> FromIterator<C> for ExcludedCategories {
    fn from_iter<I: IntoIterator<Item = C>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}
