//! HTTP request handlers for the web server.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use super::{AppState, SourceSummary};
use crate::error::{PipelineError, ServiceError};
use crate::models::Record;

const THROTTLED_MESSAGE: &str = "Too many requests, please try again later.";
const ACQUISITION_FAILED_MESSAGE: &str = "ფასების წამოღება ვერ მოხერხდა";

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        match self {
            ServiceError::Throttled { retry_after } => (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, retry_after_secs(retry_after).to_string())],
                error_body(THROTTLED_MESSAGE),
            )
                .into_response(),
            ServiceError::Pipeline(err @ PipelineError::UnknownSource(_)) => {
                (StatusCode::NOT_FOUND, error_body(&err.to_string())).into_response()
            }
            ServiceError::Pipeline(PipelineError::Acquisition { .. }) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_body(ACQUISITION_FAILED_MESSAGE),
            )
                .into_response(),
        }
    }
}

fn error_body(message: &str) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "error": message }))
}

/// Whole seconds, rounded up so clients never retry early.
fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs();
    if retry_after.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

/// Records for one source.
pub async fn source_products(
    State(state): State<AppState>,
    Path(source_id): Path<String>,
) -> Result<Json<Arc<Vec<Record>>>, ServiceError> {
    let records = state.pipeline.resolve(&source_id).await?;
    Ok(Json(records))
}

#[derive(Debug, Serialize)]
pub struct StoreProduct {
    pub store: String,
    pub product: Record,
}

#[derive(Debug, Serialize)]
pub struct ProductFeed {
    pub products: Vec<StoreProduct>,
    pub errors: BTreeMap<String, String>,
}

/// Records from every source, tagged with their store.
pub async fn all_products(State(state): State<AppState>) -> Json<ProductFeed> {
    let mut feed = ProductFeed {
        products: Vec::new(),
        errors: BTreeMap::new(),
    };

    for (source_id, result) in state.pipeline.resolve_all().await {
        match result {
            Ok(records) => feed.products.extend(records.iter().map(|record| StoreProduct {
                store: source_id.clone(),
                product: record.clone(),
            })),
            Err(_) => {
                feed.errors
                    .insert(source_id, ACQUISITION_FAILED_MESSAGE.to_string());
            }
        }
    }

    Json(feed)
}

pub async fn list_sources(State(state): State<AppState>) -> Json<Arc<Vec<SourceSummary>>> {
    Json(state.sources.clone())
}

/// Liveness plus a snapshot of what the cache holds.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let cache = state.pipeline.cache();
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime": state.started_at.elapsed().as_secs_f64(),
        "cache": {
            "keys": cache.keys(),
            "fetchedAt": cache.fetched_at(),
            "stats": cache.stats(),
        },
    }))
}
