//! Error Taxonomy
//!
//! Two layers of errors flow through the service:
//! - [`IndexError`] is what an [`IndexClient`](crate::search::client::IndexClient)
//!   returns when the search engine misbehaves.
//! - [`CatalogError`] is what the coordinator hands back to the API layer. It keeps
//!   index failures distinguishable and carries the stored record on a partial failure.

use crate::catalog::types::{Record, RecordId};
use std::fmt;
use thiserror::Error;

/// Failure reported by the search engine boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IndexError {
    /// Engine unreachable, connection dropped, protocol violated or call timed out.
    #[error("search index unavailable: {0}")]
    Unavailable(String),

    /// Engine answered but refused the command.
    #[error("search index rejected the request: {0}")]
    Rejected(String),

    /// Nothing is indexed under the object id.
    #[error("object not indexed: {0}")]
    NotFound(String),
}

/// Mutation that was split across the record store and the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOperation {
    Create,
    Delete,
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncOperation::Create => f.write_str("create"),
            SyncOperation::Delete => f.write_str("delete"),
        }
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("record not found: {0}")]
    NotFound(RecordId),

    #[error("search index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("search index rejected the request: {0}")]
    IndexRejected(String),

    /// The store mutation went through, the paired index mutation did not.
    #[error("{operation} of record {} reached the store but not the search index: {source}", .record.id)]
    PartialFailure {
        operation: SyncOperation,
        record: Box<Record>,
        #[source]
        source: IndexError,
    },
}

impl CatalogError {
    /// Short machine-readable name used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            CatalogError::Validation(_) => "validation",
            CatalogError::NotFound(_) => "not_found",
            CatalogError::IndexUnavailable(_) => "index_unavailable",
            CatalogError::IndexRejected(_) => "index_rejected",
            CatalogError::PartialFailure { .. } => "partial_failure",
        }
    }

    pub(crate) fn partial(operation: SyncOperation, record: Record, source: IndexError) -> Self {
        CatalogError::PartialFailure {
            operation,
            record: Box::new(record),
            source,
        }
    }
}

impl From<IndexError> for CatalogError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::Unavailable(msg) => CatalogError::IndexUnavailable(msg),
            IndexError::Rejected(msg) => CatalogError::IndexRejected(msg),
            // Read paths never ask the engine about a single object, so a stray
            // NotFound means the engine state is not what we expect.
            IndexError::NotFound(id) => {
                CatalogError::IndexRejected(format!("unexpected missing object {}", id))
            }
        }
    }
}
