use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;

/// Kind of item being audited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Video,
    Channel,
}

impl ItemKind {
    /// Resource path segment used by the upstream API.
    pub fn resource(self) -> &'static str {
        match self {
            Self::Video => "videos",
            Self::Channel => "channels",
        }
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Channel => write!(f, "channel"),
        }
    }
}

/// An untyped per-item record as returned by the metadata source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub item_id: String,
    pub fields: Map<String, Value>,
}

impl RawRecord {
    pub fn new(item_id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            item_id: item_id.into(),
            fields,
        }
    }
}

/// Text-bearing metadata extracted from a [`RawRecord`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMetadata {
    pub item_id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    /// Spoken text, read from a `transcript` field the source attached to the record.
    pub transcript: Option<String>,
    pub language: Option<String>,
    pub channel_id: Option<String>,
}

impl ItemMetadata {
    /// Convert raw fields into typed metadata.
    ///
    /// Absent or null fields become `None`/empty. A field holding the wrong JSON
    /// type is a contract violation by the source and is rejected.
    pub fn from_record(record: &RawRecord) -> Result<Self, CoreError> {
        let fields = &record.fields;
        Ok(Self {
            item_id: record.item_id.clone(),
            title: optional_str(fields, "title")?,
            description: optional_str(fields, "description")?,
            tags: tags(fields)?,
            transcript: optional_str(fields, "transcript")?,
            language: first_str(fields, &["defaultLanguage", "language", "lang_code"])?,
            channel_id: first_str(fields, &["channelId", "channel_id"])?,
        })
    }
}

fn optional_str(fields: &Map<String, Value>, key: &str) -> Result<Option<String>, CoreError> {
    match fields.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(CoreError::Parse(format!(
            "field `{key}` must be a string, got {other}"
        ))),
    }
}

fn first_str(fields: &Map<String, Value>, keys: &[&str]) -> Result<Option<String>, CoreError> {
    for key in keys {
        if let Some(s) = optional_str(fields, key)? {
            return Ok(Some(s));
        }
    }
    Ok(None)
}

/// Tags arrive either as a JSON array of strings or as one comma-joined string.
fn tags(fields: &Map<String, Value>) -> Result<Vec<String>, CoreError> {
    match fields.get("tags") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(s)) => Ok(s
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => Ok(s.clone()),
                other => Err(CoreError::Parse(format!(
                    "tag must be a string, got {other}"
                ))),
            })
            .collect(),
        Some(other) => Err(CoreError::Parse(format!(
            "field `tags` must be a list or string, got {other}"
        ))),
    }
}
