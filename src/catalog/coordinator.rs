//! Synchronization Coordinator
//!
//! Runs every catalog operation against the record store and the search index
//! in a fixed order, so that the window in which the two disagree is bounded
//! and visible to the caller.
//!
//! Per-id consistency states and the operations moving between them:
//!
//! ```text
//! absent --create(store)--> store-only --create(index)--> indexed
//! indexed --delete(store)--> store-removed-index-stale --delete(index)--> absent
//! ```
//!
//! A failed index step leaves the id in `store-only` or `store-removed-index-stale`.
//! Neither is repaired automatically: create reports a partial failure carrying the
//! record, and the query path drops ids the store no longer knows.

use super::types::{Fields, Listing, Page, Record, RecordId};
use crate::error::{CatalogError, IndexError, SyncOperation};
use crate::search::client::{IndexClient, Namespace};
use crate::storage::memory::RecordStore;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Paging and timeout knobs for the coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub default_limit: usize,
    pub max_limit: usize,
    pub suggest_limit: usize,
    /// Sonic refuses suggestion limits above its `suggest_limit_maximum` (20 by default).
    pub max_suggest_limit: usize,
    /// Upper bound for any single index round-trip.
    pub index_timeout: Duration,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_limit: 100,
            suggest_limit: 10,
            max_suggest_limit: 20,
            index_timeout: Duration::from_secs(3),
        }
    }
}

pub struct SyncCoordinator {
    store: Arc<RecordStore>,
    index: Arc<dyn IndexClient>,
    namespace: Namespace,
    settings: CoordinatorSettings,
}

impl SyncCoordinator {
    pub fn new(
        store: Arc<RecordStore>,
        index: Arc<dyn IndexClient>,
        namespace: Namespace,
        settings: CoordinatorSettings,
    ) -> Self {
        Self {
            store,
            index,
            namespace,
            settings,
        }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Stores the record, then indexes its text.
    ///
    /// On an index failure the record stays stored and comes back inside
    /// [`CatalogError::PartialFailure`]; see [`Self::rollback_create`].
    pub async fn create(&self, fields: Fields) -> Result<Record, CatalogError> {
        let text = fields.indexed_text();
        if text.is_empty() {
            return Err(CatalogError::Validation(
                "record has no text to index".to_string(),
            ));
        }

        let record = self.store.create(fields);

        match self
            .bounded(self.index.ingest(&self.namespace, &record.id, &text))
            .await
        {
            Ok(()) => {
                tracing::info!("Created record {}", record.id);
                Ok(record)
            }
            Err(e) => {
                tracing::error!("Record {} stored but not indexed: {}", record.id, e);
                Err(CatalogError::partial(SyncOperation::Create, record, e))
            }
        }
    }

    /// Compensation for a partial create: removes the stored record without touching the index.
    pub fn rollback_create(&self, id: &RecordId) -> bool {
        let removed = self.store.delete(id).is_some();
        if removed {
            tracing::warn!("Rolled back unindexed record {}", id);
        }
        removed
    }

    pub fn get(&self, id: &RecordId) -> Result<Record, CatalogError> {
        self.store
            .get(id)
            .ok_or_else(|| CatalogError::NotFound(id.clone()))
    }

    /// Full-text search hydrated from the store, in the index's relevance order.
    ///
    /// Ids the store does not know are dropped: they are entries whose record was
    /// deleted while the index still lags behind. The result may therefore be
    /// shorter than the limit.
    pub async fn query(&self, text: &str, page: Page) -> Result<Vec<Record>, CatalogError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(CatalogError::Validation(
                "query text must not be empty".to_string(),
            ));
        }
        let limit = self.resolve_limit(
            page.limit,
            self.settings.default_limit,
            self.settings.max_limit,
        )?;
        let offset = page.offset.unwrap_or(0);

        let ids = self
            .bounded(self.index.query(&self.namespace, text, limit, offset))
            .await?;

        let total = ids.len();
        let records: Vec<Record> = ids
            .into_iter()
            .filter_map(|id| {
                let record = self.store.get(&id);
                if record.is_none() {
                    tracing::warn!("Dropping stale index entry {} from results", id);
                }
                record
            })
            .collect();

        tracing::debug!(
            "Query '{}' matched {} ids, {} hydrated",
            text,
            total,
            records.len()
        );
        Ok(records)
    }

    pub async fn suggest(
        &self,
        prefix: &str,
        limit: Option<usize>,
    ) -> Result<Vec<String>, CatalogError> {
        let prefix = prefix.trim();
        if prefix.is_empty() {
            return Err(CatalogError::Validation(
                "suggestion prefix must not be empty".to_string(),
            ));
        }
        let limit = self.resolve_limit(
            limit,
            self.settings.suggest_limit,
            self.settings.max_suggest_limit,
        )?;

        Ok(self
            .bounded(self.index.suggest(&self.namespace, prefix, limit))
            .await?)
    }

    /// Every stored record plus the sum of their index counts.
    ///
    /// One index round-trip per record. A failed count is logged and left out of
    /// the total; it never aborts the listing.
    pub async fn list_with_count(&self) -> Listing {
        let items = self.store.list();
        let mut count = 0u64;
        let mut failed_counts = 0usize;

        for record in &items {
            match self
                .bounded(self.index.count(&self.namespace, &record.id))
                .await
            {
                Ok(n) => count += n,
                Err(e) => {
                    failed_counts += 1;
                    tracing::warn!("Count for {} failed: {}", record.id, e);
                }
            }
        }

        Listing {
            count,
            items,
            failed_counts,
        }
    }

    /// Removes the record from the store, then its entry from the index.
    ///
    /// When the index step fails the store removal stands and the error is a
    /// [`CatalogError::PartialFailure`] carrying the removed record.
    ///
    /// Ids that could never have been issued (whitespace, control characters)
    /// are answered with NotFound without reaching the index.
    pub async fn delete(&self, id: &RecordId) -> Result<Record, CatalogError> {
        if !id.is_well_formed() {
            tracing::debug!("Rejecting malformed record id {:?}", id.as_str());
            return Err(CatalogError::NotFound(id.clone()));
        }

        let Some(record) = self.store.delete(id) else {
            // Nothing stored, but a stale index entry may still linger from an earlier failure.
            if let Err(e) = self.bounded(self.index.remove(&self.namespace, id)).await {
                tracing::debug!("Cleanup remove for unknown id {}: {}", id, e);
            }
            return Err(CatalogError::NotFound(id.clone()));
        };

        match self.bounded(self.index.remove(&self.namespace, id)).await {
            Ok(()) => {
                tracing::info!("Deleted record {}", id);
                Ok(record)
            }
            Err(IndexError::NotFound(_)) => {
                tracing::info!("Deleted record {} (was not indexed)", id);
                Ok(record)
            }
            Err(e) => {
                tracing::error!("Record {} deleted but index entry remains: {}", id, e);
                Err(CatalogError::partial(SyncOperation::Delete, record, e))
            }
        }
    }

    /// Releases the index connections.
    pub async fn close(&self) {
        if let Err(e) = self.index.close().await {
            tracing::warn!("Failed to close index client: {}", e);
        }
    }

    fn resolve_limit(
        &self,
        requested: Option<usize>,
        default: usize,
        cap: usize,
    ) -> Result<usize, CatalogError> {
        match requested {
            Some(0) => Err(CatalogError::Validation(
                "limit must be greater than zero".to_string(),
            )),
            Some(n) => Ok(n.min(cap)),
            None => Ok(default.min(cap)),
        }
    }

    /// Applies the per-call timeout. Elapsing counts as the index being unavailable.
    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, IndexError>>,
    ) -> Result<T, IndexError> {
        match tokio::time::timeout(self.settings.index_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(IndexError::Unavailable(format!(
                "no answer within {:?}",
                self.settings.index_timeout
            ))),
        }
    }
}
