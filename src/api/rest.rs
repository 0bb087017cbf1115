// =============================================================================
// REST Endpoints — Axum 0.7
// =============================================================================
//
// /health and /metrics serve operational state straight from the aggregator;
// /stats adds pipeline internals; the /recent endpoints read from the
// persistence sink and return empty lists when the sink is disabled.
//
// CORS is configured permissively for development; tighten `allowed_origins`
// in production.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};

use crate::app_state::AppState;

// =============================================================================
// Router construction
// =============================================================================

/// Build the full router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/stats", get(stats))
        .route("/alerts/recent", get(recent_alerts))
        .route("/transactions/recent", get(recent_transactions))
        .route("/ws/alerts", get(crate::api::ws::alerts_ws_handler))
        .route("/ws/metrics", get(crate::api::ws::metrics_ws_handler))
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Handlers
// =============================================================================

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.build_health())
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.metrics.sync_response())
}

async fn stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.build_stats())
}

#[derive(Deserialize)]
struct LimitQuery {
    limit: Option<i64>,
}

async fn recent_alerts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> impl IntoResponse {
    Json(state.sink.recent_alerts(query.limit).await)
}

async fn recent_transactions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> impl IntoResponse {
    Json(state.sink.recent_transactions(query.limit).await)
}
