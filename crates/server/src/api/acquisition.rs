//! Acquisition API handlers.
//!
//! Operation outcomes are returned as `{ok, message}` bodies with status 200;
//! a dependency missing from the configuration yields 503.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use acquirer_core::{AcquisitionSnapshot, OpResult, QueueRequest, UpdateOptions};

use super::handlers::{not_configured, ErrorResponse};
use crate::state::AppState;

type ApiError = (StatusCode, Json<ErrorResponse>);

#[derive(Debug, Deserialize)]
pub struct TitleRequest {
    pub title_id: String,
    pub version: u64,
}

#[derive(Debug, Serialize)]
pub struct StateResponse {
    pub scheduled: bool,
    #[serde(flatten)]
    pub snapshot: AcquisitionSnapshot,
}

fn require_client(state: &AppState) -> Result<(), ApiError> {
    state
        .coordinator()
        .downloader()
        .map(|_| ())
        .ok_or_else(|| not_configured("Torrent client"))
}

fn require_indexer(state: &AppState) -> Result<(), ApiError> {
    state
        .coordinator()
        .searcher()
        .map(|_| ())
        .ok_or_else(|| not_configured("Indexer"))
}

fn bad_request(message: &str) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
}

/// POST /api/v1/acquisition/queue
///
/// Queue one download chosen by the user.
pub async fn queue(
    State(state): State<Arc<AppState>>,
    Json(body): Json<QueueRequest>,
) -> Result<Json<OpResult>, ApiError> {
    require_client(&state)?;
    Ok(Json(state.coordinator().queue(body).await))
}

/// POST /api/v1/acquisition/manual
///
/// Search for and queue one title's update now.
pub async fn manual(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TitleRequest>,
) -> Result<Json<OpResult>, ApiError> {
    require_client(&state)?;
    require_indexer(&state)?;
    if body.title_id.trim().is_empty() {
        return Err(bad_request("title_id is required"));
    }

    let result = state
        .coordinator()
        .run_manual(body.title_id.trim(), body.version)
        .await;
    Ok(Json(result))
}

/// POST /api/v1/acquisition/options
///
/// Every acceptable search result for one title's update, best first.
pub async fn options(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TitleRequest>,
) -> Result<Json<UpdateOptions>, ApiError> {
    require_indexer(&state)?;
    if body.title_id.trim().is_empty() {
        return Err(bad_request("title_id is required"));
    }

    let options = state
        .coordinator()
        .search_update_options(body.title_id.trim(), body.version)
        .await;
    Ok(Json(options))
}

/// POST /api/v1/acquisition/check-completed
///
/// Reconcile completed torrents now.
pub async fn check_completed(
    State(state): State<Arc<AppState>>,
) -> Result<Json<OpResult>, ApiError> {
    require_client(&state)?;
    Ok(Json(state.coordinator().check_completed().await))
}

/// POST /api/v1/acquisition/run
///
/// Start a full run in the background.
pub async fn run(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<OpResult>), ApiError> {
    require_client(&state)?;

    let coordinator = Arc::clone(state.coordinator());
    if coordinator.state().running {
        return Ok((
            StatusCode::OK,
            Json(OpResult::ok("Acquisition already running")),
        ));
    }

    tokio::spawn(async move {
        let result = coordinator.trigger_run().await;
        if result.ok {
            info!(message = %result.message, "Triggered acquisition run finished");
        } else {
            warn!(message = %result.message, "Triggered acquisition run failed");
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(OpResult::ok("Acquisition run started")),
    ))
}

/// GET /api/v1/acquisition/state
pub async fn get_state(State(state): State<Arc<AppState>>) -> Json<StateResponse> {
    let coordinator = state.coordinator();
    Json(StateResponse {
        scheduled: coordinator.is_scheduled(),
        snapshot: coordinator.state(),
    })
}
