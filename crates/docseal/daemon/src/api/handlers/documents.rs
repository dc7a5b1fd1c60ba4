//! Document content, audit trail and integrity handlers

use crate::api::state::AppState;
use crate::error::{ApiError, ApiResult};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use docseal_service::{AuditRecord, DocumentId, VerificationResult};
use serde::{Deserialize, Serialize};

/// Request body for registering document content
#[derive(Debug, Deserialize)]
pub struct PutContentRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct DocumentVersionResponse {
    pub document_id: DocumentId,
    pub content_digest: String,
    pub version: u64,
}

#[derive(Debug, Serialize)]
pub struct ClearFlagResponse {
    pub document_id: DocumentId,
    pub cleared: bool,
}

/// List documents that have had a workflow
pub async fn list_documents(State(state): State<AppState>) -> Json<Vec<DocumentId>> {
    let mut documents = state.service.documents();
    documents.sort();
    Json(documents)
}

/// Register or update a document's content
pub async fn put_content(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<PutContentRequest>,
) -> ApiResult<(StatusCode, Json<DocumentVersionResponse>)> {
    if id.trim().is_empty() {
        return Err(ApiError::BadRequest("document id is empty".into()));
    }
    let version = state
        .service
        .put_content(DocumentId::new(id), request.content.as_bytes());
    Ok((
        StatusCode::CREATED,
        Json(DocumentVersionResponse {
            document_id: version.document_id,
            content_digest: version.content_digest.to_hex(),
            version: version.version,
        }),
    ))
}

/// Full audit trail, ascending by sequence
pub async fn get_audit_trail(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<AuditRecord>>> {
    let records = state.service.get_audit_trail(&DocumentId::new(id)).await?;
    Ok(Json(records))
}

/// Replay the chain and compare it against the latest confirmed anchor
pub async fn verify_integrity(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<VerificationResult>> {
    let result = state.service.verify_integrity(&DocumentId::new(id)).await?;
    Ok(Json(result))
}

/// Operator override for a flagged document
pub async fn clear_integrity_flag(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<ClearFlagResponse> {
    let document_id = DocumentId::new(id);
    let cleared = state.service.clear_integrity_flag(&document_id);
    Json(ClearFlagResponse {
        document_id,
        cleared,
    })
}
