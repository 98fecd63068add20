use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::{acquisition, handlers, middleware::metrics_middleware, searcher};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health, config and metrics
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/metrics", get(handlers::metrics))
        // Indexer (read-only, indexers configured in the aggregator)
        .route("/search", post(searcher::search))
        .route("/indexer/status", get(searcher::get_status))
        .route("/indexer/indexers", get(searcher::list_indexers))
        // Torrent client
        .route("/torrent-client/test", get(handlers::test_torrent_client))
        // Acquisition
        .route("/acquisition/queue", post(acquisition::queue))
        .route("/acquisition/manual", post(acquisition::manual))
        .route("/acquisition/options", post(acquisition::options))
        .route(
            "/acquisition/check-completed",
            post(acquisition::check_completed),
        )
        .route("/acquisition/run", post(acquisition::run))
        .route("/acquisition/state", get(acquisition::get_state))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
}
