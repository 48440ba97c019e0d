use axum::{
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::services::{MaintenanceService, RatingService, RecommendService};

pub mod admin;
pub mod ratings;
pub mod recommendations;

/// Shared application state: the services the edge delegates to
#[derive(Clone)]
pub struct AppState {
    pub recommend: Arc<RecommendService>,
    pub maintenance: Arc<MaintenanceService>,
    pub ratings: Arc<RatingService>,
}

/// Creates the application router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes())
        .fallback(handler_404)
        .layer(middleware::from_fn(
            crate::middleware::request_id_middleware,
        ))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}

/// API routes under /api/v1
fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/recommendations", post(recommendations::recommend))
        .route("/recommendations/explain", get(recommendations::explain))
        .route("/ratings", post(ratings::upsert))
        .route("/admin/similarity/summary", get(admin::summary))
        .route("/admin/similarity/pending", get(admin::pending))
        .route("/admin/similarity/remap-missing", post(admin::remap_missing))
        .route("/admin/similarity/rebuild", post(admin::rebuild))
}

/// Health check endpoint
async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

/// 404 handler for unknown routes
async fn handler_404() -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "Route not found" })),
    )
}
