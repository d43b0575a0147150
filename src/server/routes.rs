use axum::{
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::*;
use crate::store::StorageEngine;

pub fn create_router(engine: StorageEngine, sync_budget: Duration) -> Router {
    let state = AppState::new(engine, sync_budget);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Sync surface
        .route("/api/v1/sync/unsynced", get(sync_down))
        .route("/api/v1/sync/data", post(sync_up))
        .route("/api/v1/sync/chunked", post(sync_down_chunked))
        // Status
        .route(
            "/api/v1/sync/status",
            get(get_sync_status).put(update_sync_status),
        )
        .route(
            "/api/v1/sync/background/status",
            get(get_background_status).put(update_background_status),
        )
        // Metrics
        .route("/api/v1/sync/metrics", get(get_recent_metrics))
        // Queue
        .route("/api/v1/sync/queue", post(enqueue_item))
        .route("/api/v1/sync/queue/pending", get(get_pending_items))
        .route("/api/v1/sync/queue/conflicts", get(get_conflict_items))
        .route("/api/v1/sync/queue/{id}/complete", post(complete_item))
        .route("/api/v1/sync/queue/{id}/fail", post(fail_item))
        .route("/api/v1/sync/queue/{id}/retry", post(retry_item))
        .route("/api/v1/sync/queue/cleanup", post(cleanup_completed))
        // Health
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state)
}
