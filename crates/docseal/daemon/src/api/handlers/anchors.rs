//! Anchor handlers

use crate::api::state::AppState;
use crate::error::ApiResult;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use docseal_service::{AnchorId, AnchorReference, DocumentId};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ConfirmResponse {
    pub anchor_id: AnchorId,
    pub confirmed: bool,
}

/// Anchor the document's current ledger head
pub async fn anchor_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<(StatusCode, Json<AnchorReference>)> {
    let reference = state.service.anchor_document(&DocumentId::new(id)).await?;
    Ok((StatusCode::ACCEPTED, Json(reference)))
}

pub async fn list_anchors(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<AnchorReference>>> {
    let anchors = state.service.list_anchors(&DocumentId::new(id)).await?;
    Ok(Json(anchors))
}

/// Poll the anchoring service for one anchor
pub async fn confirm_anchor(
    State(state): State<AppState>,
    Path((id, anchor)): Path<(String, String)>,
) -> ApiResult<Json<ConfirmResponse>> {
    let anchor_id = AnchorId::new(anchor);
    let confirmed = state
        .service
        .confirm_anchor(&DocumentId::new(id), &anchor_id)
        .await?;
    Ok(Json(ConfirmResponse {
        anchor_id,
        confirmed,
    }))
}
