//! API Router configuration

use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the main API router
pub fn create_router(state: AppState, enable_cors: bool) -> Router {
    let api_routes = Router::new()
        // Health
        .route("/health", get(handlers::health_check))
        // Documents
        .route("/documents", get(handlers::list_documents))
        .route("/documents/:id/content", post(handlers::put_content))
        .route(
            "/documents/:id/workflow",
            get(handlers::get_workflow_status).post(handlers::initiate_workflow),
        )
        .route("/documents/:id/workflow/retire", post(handlers::retire_workflow))
        .route(
            "/documents/:id/steps/:step/actions",
            post(handlers::act_on_step),
        )
        .route("/documents/:id/steps/:step/expire", post(handlers::expire_step))
        // Integrity
        .route("/documents/:id/audit", get(handlers::get_audit_trail))
        .route("/documents/:id/verify", get(handlers::verify_integrity))
        .route(
            "/documents/:id/integrity/clear",
            post(handlers::clear_integrity_flag),
        )
        // Anchors
        .route(
            "/documents/:id/anchors",
            get(handlers::list_anchors).post(handlers::anchor_document),
        )
        .route(
            "/documents/:id/anchors/:anchor/confirm",
            post(handlers::confirm_anchor),
        )
        // Maintenance
        .route("/reconcile", post(handlers::reconcile));

    let router = Router::new()
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http());

    let router = if enable_cors {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    };

    router.with_state(state)
}
