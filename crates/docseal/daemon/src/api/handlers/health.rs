//! Health and maintenance handlers

use crate::api::state::AppState;
use axum::{extract::State, Json};
use docseal_service::ReconcileReport;
use serde::Serialize;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub status: String,
    pub version: String,
    pub uptime: String,
    pub documents: usize,
    pub anchor_policy: docseal_service::AnchorPolicy,
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthCheckResponse> {
    Json(HealthCheckResponse {
        status: "healthy".to_string(),
        version: state.version.clone(),
        uptime: state.uptime(),
        documents: state.service.documents().len(),
        anchor_policy: state.service.policy(),
    })
}

/// Run one reconciliation pass now
pub async fn reconcile(State(state): State<AppState>) -> Json<ReconcileReport> {
    Json(state.service.reconcile().await)
}
