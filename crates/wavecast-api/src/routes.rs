//! API routes

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::handlers::{campaigns, health, webhooks};
use crate::state::AppState;

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    let health_routes = Router::new()
        .route("/", get(health::health))
        .route("/live", get(health::liveness))
        .route("/ready", get(health::readiness));

    let campaign_routes = Router::new()
        .route("/", get(campaigns::list_campaigns))
        .route("/", post(campaigns::create_campaign))
        .route("/:campaign_id", get(campaigns::get_campaign))
        .route("/:campaign_id/stats", get(campaigns::get_campaign_stats))
        .route("/:campaign_id/execute", post(campaigns::execute_campaign))
        .route("/:campaign_id/soft", delete(campaigns::delete_campaign))
        .route("/:campaign_id/restore", post(campaigns::restore_campaign))
        .route("/:campaign_id/permanent", delete(campaigns::purge_campaign));

    let webhook_routes = Router::new()
        .route("/channel", get(webhooks::verify_subscription))
        .route("/channel", post(webhooks::receive_events));

    Router::new()
        .nest("/health", health_routes)
        .nest("/api/v1/campaigns", campaign_routes)
        .nest("/webhooks", webhook_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
