mod item;
mod keyword;
mod score;

pub use item::{ItemKind, ItemMetadata, RawRecord};
pub use keyword::{CategoryId, ExcludedCategories, Keyword, UNIVERSAL_LANGUAGE};
pub use score::{ItemScore, KeywordHit, BASE_SCORE};
