use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("keyword set is empty, nothing to scan for")]
    EmptyKeywordSet,

    #[error("keyword pattern failed to compile: {0}")]
    Pattern(#[from] regex::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
