//! Search Index Capability
//!
//! The coordinator only ever talks to a search engine through [`IndexClient`].
//! Implementations must be safe to share across concurrent requests; if the
//! underlying wire protocol cannot interleave commands, the adapter serializes
//! access internally.

use crate::catalog::types::RecordId;
use crate::error::IndexError;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Index partition every operation is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    pub collection: String,
    pub bucket: String,
    /// ISO 639-3 language hint for ingest and query. `None` lets the engine guess.
    pub locale: Option<String>,
}

impl Namespace {
    pub fn new(collection: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            bucket: bucket.into(),
            locale: None,
        }
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }
}

#[async_trait]
pub trait IndexClient: Send + Sync {
    /// Submits `text` under `id`. Calling it again for the same id appends terms.
    async fn ingest(&self, ns: &Namespace, id: &RecordId, text: &str) -> Result<(), IndexError>;

    /// Ids matching `text`, in relevance order. No match is an empty vector.
    async fn query(
        &self,
        ns: &Namespace,
        text: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<RecordId>, IndexError>;

    /// Word completions for `prefix`.
    async fn suggest(
        &self,
        ns: &Namespace,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<String>, IndexError>;

    /// Approximate number of indexed terms held for `id`.
    async fn count(&self, ns: &Namespace, id: &RecordId) -> Result<u64, IndexError>;

    /// Drops everything indexed under `id`.
    async fn remove(&self, ns: &Namespace, id: &RecordId) -> Result<(), IndexError>;

    /// Releases connections. Further calls may fail with `Unavailable`.
    async fn close(&self) -> Result<(), IndexError>;
}
