//! Indexer API handlers.

use std::sync::Arc;
use std::time::Instant;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use tracing::warn;

use acquirer_core::searcher::IndexerInfo;
use acquirer_core::{AcquisitionError, SearchResult};

use super::handlers::{not_configured, ErrorResponse};
use crate::state::AppState;

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchResult>,
    pub duration_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct IndexerStatusResponse {
    pub backend: String,
    pub configured: bool,
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub indexers_count: usize,
    pub indexers_enabled: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct IndexersResponse {
    pub indexers: Vec<IndexerInfo>,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/v1/search
///
/// Raw search through the indexer aggregator.
pub async fn search(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, impl IntoResponse> {
    let started = Instant::now();

    match state.coordinator().search(&body.query).await {
        Ok(results) => Ok(Json(SearchResponse {
            query: body.query,
            results,
            duration_ms: started.elapsed().as_millis() as u64,
        })),
        Err(AcquisitionError::NotConfigured(what)) => Err(not_configured(what)),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )),
    }
}

/// GET /api/v1/indexer/status
///
/// Aggregator status and indexer counts.
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<IndexerStatusResponse> {
    let Some(searcher) = state.coordinator().searcher() else {
        return Json(IndexerStatusResponse {
            backend: "none".to_string(),
            configured: false,
            connected: false,
            version: None,
            indexers_count: 0,
            indexers_enabled: 0,
            error: None,
        });
    };

    let mut response = IndexerStatusResponse {
        backend: searcher.name().to_string(),
        configured: true,
        connected: false,
        version: None,
        indexers_count: 0,
        indexers_enabled: 0,
        error: None,
    };

    match searcher.system_status().await {
        Ok(status) => {
            response.connected = true;
            response.version = Some(status.version);
        }
        Err(e) => {
            warn!(error = %e, "Indexer status check failed");
            response.error = Some(e.to_string());
            return Json(response);
        }
    }

    match searcher.list_indexers().await {
        Ok(indexers) => {
            response.indexers_count = indexers.len();
            response.indexers_enabled = indexers.iter().filter(|i| i.enabled).count();
        }
        Err(e) => response.error = Some(e.to_string()),
    }

    Json(response)
}

/// GET /api/v1/indexer/indexers
///
/// List the indexers configured in the aggregator.
pub async fn list_indexers(
    State(state): State<Arc<AppState>>,
) -> Result<Json<IndexersResponse>, impl IntoResponse> {
    let searcher = match state.coordinator().searcher() {
        Some(s) => s,
        None => return Err(not_configured("Indexer")),
    };

    match searcher.list_indexers().await {
        Ok(indexers) => Ok(Json(IndexersResponse { indexers })),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )),
    }
}
