//! Catalog Data Types
//!
//! Records as they live in the store and travel over the API, plus the
//! request/response DTOs used by the HTTP handlers.

use crate::error::CatalogError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Store-assigned identifier of a record.
///
/// Wrapper around a UUID v4 string. Doubles as the object id inside the search index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl RecordId {
    /// Generates a new random UUID v4-based RecordId.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the id is a single printable token, as every issued id is.
    pub fn is_well_formed(&self) -> bool {
        !self.0.is_empty()
            && !self
                .0
                .chars()
                .any(|c| c.is_whitespace() || c.is_control() || c == '"')
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Named text attributes of a record, kept in insertion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Fields(IndexMap<String, String>);

impl Fields {
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    /// Builds fields from a JSON request body.
    ///
    /// The caller-supplied `id` is dropped, scalars are rendered as text and
    /// `null` values are skipped. Nested values are rejected.
    pub fn from_json(body: serde_json::Value) -> Result<Self, CatalogError> {
        let serde_json::Value::Object(map) = body else {
            return Err(CatalogError::Validation(
                "record body must be a JSON object".to_string(),
            ));
        };

        let mut fields = Fields::new();
        for (name, value) in map {
            if name == "id" {
                continue;
            }
            let text = match value {
                serde_json::Value::Null => continue,
                serde_json::Value::String(s) => s,
                serde_json::Value::Bool(b) => b.to_string(),
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
                    return Err(CatalogError::Validation(format!(
                        "field '{}' must be a text value",
                        name
                    )));
                }
            };
            fields.insert(name, text);
        }
        Ok(fields)
    }

    /// Adds or replaces a field, keeping its original position on replace.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Text submitted to the search index: non-blank values joined by a space, in field order.
    pub fn indexed_text(&self) -> String {
        self.0
            .values()
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// One catalog entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Record {
    pub id: RecordId,
    #[serde(flatten)]
    pub fields: Fields,
}

/// Paging window for index queries. `None` falls back to the coordinator defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct Page {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// Snapshot of the store together with the aggregated index match count.
#[derive(Debug, Clone)]
pub struct Listing {
    pub count: u64,
    pub items: Vec<Record>,
    /// Records whose count lookup failed and were left out of `count`.
    pub failed_counts: usize,
}

/// What the API layer does when a create reaches the store but not the index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreatePolicy {
    /// Keep the record and answer with it alongside the failure.
    #[default]
    Report,
    /// Remove the stored record again before answering.
    Compensate,
}

// --- HTTP DTOs ---

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct SuggestParams {
    pub suggest: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListResponse {
    pub count: u64,
    pub items: Vec<Record>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
    /// Present when the record was stored even though the request failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<Record>,
}
