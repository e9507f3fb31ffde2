use thiserror::Error;

use crate::traits::Retryable;

/// Errors from the YouTube Data API client.
#[derive(Debug, Error)]
pub enum YoutubeError {
    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    #[error("rate limited")]
    RateLimited,

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("config error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for YoutubeError {
    /// Strip the request URL so it never reaches logs or reports.
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.without_url())
    }
}

impl Retryable for YoutubeError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => !(e.is_builder() || e.is_decode() || e.is_redirect()),
            Self::RateLimited => true,
            Self::Api { status, .. } => *status >= 500,
            Self::Url(_) | Self::Config(_) | Self::Parse(_) => false,
        }
    }
}
