//! Router

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::AppState;
use crate::handlers;

/// Build the service router over shared state
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/ads/user_ads", get(handlers::list_user_ads))
        .route("/watch/{ad_id}/start_view", post(handlers::start_view))
        .route("/watch/{ad_id}/complete_view", post(handlers::complete_view))
        .route("/view/{ad_id}/start_view", post(handlers::third_party_start))
        .route(
            "/view/{ad_id}/complete_view",
            post(handlers::third_party_complete),
        )
        .route("/third-party-ads", get(handlers::third_party_ads))
        .route("/earnings", get(handlers::earnings))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
