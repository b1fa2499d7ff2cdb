use super::coordinator::SyncCoordinator;
use super::types::*;
use crate::error::{CatalogError, SyncOperation};

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Extension, Path, Query};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;

/// Builds the catalog API for one entity name, e.g. `car` gives `/car`, `/car/:id` and `/cars`.
pub fn routes(coordinator: Arc<SyncCoordinator>, entity: &str, policy: CreatePolicy) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route(
            &format!("/{}", entity),
            get(handle_search).post(handle_create),
        )
        .route(&format!("/{}/suggests", entity), get(handle_suggest))
        .route(
            &format!("/{}/:id", entity),
            get(handle_get).delete(handle_delete),
        )
        .route(&format!("/{}s", entity), get(handle_list))
        .layer(Extension(coordinator))
        .layer(Extension(policy))
}

impl IntoResponse for CatalogError {
    fn into_response(self) -> Response {
        let status = match &self {
            CatalogError::Validation(_) => StatusCode::BAD_REQUEST,
            CatalogError::NotFound(_) => StatusCode::NOT_FOUND,
            CatalogError::IndexRejected(_) => StatusCode::BAD_GATEWAY,
            CatalogError::IndexUnavailable(_) | CatalogError::PartialFailure { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        };
        let record = match &self {
            CatalogError::PartialFailure { record, .. } => Some(record.as_ref().clone()),
            _ => None,
        };

        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
                kind: self.kind().to_string(),
                record,
            }),
        )
            .into_response()
    }
}

pub async fn handle_health() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            message: "ok".to_string(),
        }),
    )
}

pub async fn handle_create(
    Extension(coordinator): Extension<Arc<SyncCoordinator>>,
    Extension(policy): Extension<CreatePolicy>,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<(StatusCode, Json<Record>), CatalogError> {
    let Json(body) = body.map_err(|e| CatalogError::Validation(e.body_text()))?;
    let fields = Fields::from_json(body)?;

    match coordinator.create(fields).await {
        Ok(record) => Ok((StatusCode::CREATED, Json(record))),
        Err(CatalogError::PartialFailure { record, source, .. })
            if policy == CreatePolicy::Compensate =>
        {
            coordinator.rollback_create(&record.id);
            Err(source.into())
        }
        Err(e) => Err(e),
    }
}

pub async fn handle_search(
    Extension(coordinator): Extension<Arc<SyncCoordinator>>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<Vec<Record>>, CatalogError> {
    let Query(params) = params.map_err(|e| CatalogError::Validation(e.body_text()))?;
    let Some(q) = params.q else {
        return Err(CatalogError::Validation(
            "query param q is required".to_string(),
        ));
    };

    let page = Page {
        limit: params.limit,
        offset: params.offset,
    };
    let records = coordinator.query(&q, page).await?;
    Ok(Json(records))
}

pub async fn handle_suggest(
    Extension(coordinator): Extension<Arc<SyncCoordinator>>,
    params: Result<Query<SuggestParams>, QueryRejection>,
) -> Result<Json<Vec<String>>, CatalogError> {
    let Query(params) = params.map_err(|e| CatalogError::Validation(e.body_text()))?;
    let Some(prefix) = params.suggest else {
        return Err(CatalogError::Validation(
            "query param suggest is required".to_string(),
        ));
    };

    let words = coordinator.suggest(&prefix, params.limit).await?;
    Ok(Json(words))
}

pub async fn handle_get(
    Extension(coordinator): Extension<Arc<SyncCoordinator>>,
    Path(id): Path<String>,
) -> Result<Json<Record>, CatalogError> {
    coordinator.get(&RecordId(id)).map(Json)
}

pub async fn handle_list(
    Extension(coordinator): Extension<Arc<SyncCoordinator>>,
) -> Json<ListResponse> {
    let listing = coordinator.list_with_count().await;
    if listing.failed_counts > 0 {
        tracing::warn!(
            "Listing count excludes {} record(s) whose count failed",
            listing.failed_counts
        );
    }

    Json(ListResponse {
        count: listing.count,
        items: listing.items,
    })
}

pub async fn handle_delete(
    Extension(coordinator): Extension<Arc<SyncCoordinator>>,
    Path(id): Path<String>,
) -> Result<StatusCode, CatalogError> {
    match coordinator.delete(&RecordId(id)).await {
        Ok(_) => Ok(StatusCode::NO_CONTENT),
        // The authoritative copy is gone; the stale index entry is filtered out by queries.
        Err(CatalogError::PartialFailure {
            operation: SyncOperation::Delete,
            record,
            source,
        }) => {
            tracing::warn!("Delete of {} left a stale index entry: {}", record.id, source);
            Ok(StatusCode::NO_CONTENT)
        }
        Err(e) => Err(e),
    }
}
