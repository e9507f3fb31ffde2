use reqwest::{Client, StatusCode};
use tracing::{debug, warn};
use url::Url;

use brandsafe_core::config::SourceConfig;
use brandsafe_core::models::{ItemKind, RawRecord};

use super::error::YoutubeError;
use super::types::{into_record, ErrorResponse, ListResponse};
use crate::traits::{FetchBatch, MetadataSource};

const API_KEY_HEADER: &str = "X-goog-api-key";

/// YouTube Data API v3 client for the `videos` and `channels` list endpoints.
pub struct YoutubeClient {
    api_key: String,
    base_url: String,
    http: Client,
}

impl YoutubeClient {
    pub fn new(api_key: impl Into<String>, base_url: &str) -> Result<Self, YoutubeError> {
        // Reject a malformed base URL at construction.
        Url::parse(base_url)?;
        Ok(Self {
            api_key: api_key.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            http: Client::new(),
        })
    }

    /// Build a client from config, reading the API key from the configured
    /// environment variable.
    pub fn from_config(config: &SourceConfig) -> Result<Self, YoutubeError> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            YoutubeError::Config(format!(
                "environment variable {} is not set",
                config.api_key_env
            ))
        })?;
        Self::new(api_key, &config.base_url)
    }

    fn list_url(&self, kind: ItemKind, ids: &[String]) -> Result<Url, YoutubeError> {
        let mut url = Url::parse(&format!("{}/{}", self.base_url, kind.resource()))?;
        url.query_pairs_mut()
            .append_pair("part", "snippet")
            .append_pair("id", &ids.join(","))
            .append_pair("maxResults", &ids.len().to_string());
        Ok(url)
    }

    /// Check the HTTP response for errors and return the body text on failure.
    async fn check_response(resp: reqwest::Response) -> Result<reqwest::Response, YoutubeError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!("YouTube API rate limited");
            return Err(YoutubeError::RateLimited);
        }
        let body = resp.text().await.unwrap_or_default();
        // YouTube reports throttling as 403 (sometimes 400) with a reason code.
        if matches!(status, StatusCode::FORBIDDEN | StatusCode::BAD_REQUEST) {
            let parsed: ErrorResponse = serde_json::from_str(&body).unwrap_or_default();
            if parsed.is_rate_limited() {
                warn!(status = status.as_u16(), "YouTube API rate limited");
                return Err(YoutubeError::RateLimited);
            }
        }
        let status = status.as_u16();
        warn!(status, "YouTube API error");
        Err(YoutubeError::Api {
            status,
            message: body,
        })
    }
}

impl MetadataSource for YoutubeClient {
    type Error = YoutubeError;

    async fn fetch_batch(&self, batch: &FetchBatch) -> Result<Vec<RawRecord>, YoutubeError> {
        let url = self.list_url(batch.kind, &batch.ids)?;
        debug!(
            batch = batch.index,
            kind = %batch.kind,
            ids = batch.ids.len(),
            "Requesting YouTube metadata"
        );

        let resp = self
            .http
            .get(url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;
        let resp = Self::check_response(resp).await?;
        let body = resp.text().await?;
        let list: ListResponse =
            serde_json::from_str(&body).map_err(|e| YoutubeError::Parse(e.to_string()))?;

        let items = list.into_items();
        let total = items.len();
        let records: Vec<RawRecord> = items.into_iter().filter_map(into_record).collect();
        if records.len() < total {
            warn!(
                batch = batch.index,
                dropped = total - records.len(),
                "Dropped YouTube resources without an id"
            );
        }
        Ok(records)
    }
}
