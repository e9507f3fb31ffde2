//! Response shapes of the YouTube Data API v3 list endpoints.

use serde::Deserialize;
use serde_json::{Map, Value};

use brandsafe_core::models::RawRecord;

/// A list response: the standard `{"items": [...]}` envelope, or a bare array
/// as served by mirrors and fixtures.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ListResponse {
    Bare(Vec<Value>),
    Envelope {
        #[serde(default)]
        items: Vec<Value>,
    },
}

impl ListResponse {
    pub fn into_items(self) -> Vec<Value> {
        match self {
            Self::Bare(items) | Self::Envelope { items } => items,
        }
    }
}

/// Error envelope of a non-2xx response: `{"error": {"errors": [{"reason": ..}]}}`.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub error: ErrorBody,
}

#[derive(Debug, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub errors: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub reason: String,
}

impl ErrorResponse {
    /// Whether any error reason is one YouTube uses for short-term throttling.
    /// `quotaExceeded` is a daily limit and does not count.
    pub fn is_rate_limited(&self) -> bool {
        self.error
            .errors
            .iter()
            .any(|e| matches!(e.reason.as_str(), "rateLimitExceeded" | "userRateLimitExceeded"))
    }
}

/// Flatten one API resource into a [`RawRecord`].
///
/// `snippet` fields are lifted to the top level; other top-level fields (for
/// example an attached `transcript`) are kept unless the snippet already has them.
/// Returns `None` for resources without a string `id`.
pub fn into_record(item: Value) -> Option<RawRecord> {
    let Value::Object(mut object) = item else {
        return None;
    };
    let id = match object.remove("id") {
        Some(Value::String(id)) => id,
        _ => return None,
    };

    let mut fields = match object.remove("snippet") {
        Some(Value::Object(snippet)) => snippet,
        _ => Map::new(),
    };
    for (key, value) in object {
        fields.entry(key).or_insert(value);
    }

    Some(RawRecord::new(id, fields))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_and_bare_array() {
        let envelope: ListResponse =
            serde_json::from_value(json!({"kind": "youtube#videoListResponse", "items": [{"id": "a"}]}))
                .unwrap();
        assert_eq!(envelope.into_items().len(), 1);

        let bare: ListResponse = serde_json::from_value(json!([{"id": "a"}, {"id": "b"}])).unwrap();
        assert_eq!(bare.into_items().len(), 2);

        let empty: ListResponse = serde_json::from_value(json!({"kind": "x"})).unwrap();
        assert!(empty.into_items().is_empty());
    }

    #[test]
    fn snippet_is_flattened() {
        let record = into_record(json!({
            "id": "vid1",
            "snippet": {"title": "Hello", "tags": ["x"], "channelId": "UC1"},
            "transcript": "spoken words",
            "title": "ignored"
        }))
        .unwrap();
        assert_eq!(record.item_id, "vid1");
        assert_eq!(record.fields["title"], "Hello");
        assert_eq!(record.fields["transcript"], "spoken words");
        assert_eq!(record.fields["channelId"], "UC1");
    }

    #[test]
    fn error_reasons() {
        let throttled: ErrorResponse = serde_json::from_value(json!({
            "error": {"code": 403, "errors": [{"domain": "usageLimits", "reason": "userRateLimitExceeded"}]}
        }))
        .unwrap();
        assert!(throttled.is_rate_limited());

        let quota: ErrorResponse = serde_json::from_value(json!({
            "error": {"code": 403, "errors": [{"reason": "quotaExceeded"}]}
        }))
        .unwrap();
        assert!(!quota.is_rate_limited());

        let bare: ErrorResponse = serde_json::from_value(json!({})).unwrap();
        assert!(!bare.is_rate_limited());
    }

    #[test]
    fn record_without_id_is_dropped() {
        assert!(into_record(json!({"snippet": {"title": "x"}})).is_none());
        assert!(into_record(json!({"id": {"videoId": "x"}})).is_none());
        assert!(into_record(json!("nope")).is_none());
    }
}
