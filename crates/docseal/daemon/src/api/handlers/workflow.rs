//! Workflow handlers

use crate::api::state::AppState;
use crate::error::ApiResult;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use docseal_service::{
    ActRequest, ActorId, DocumentId, InitiateRequest, StepAction, StepId, TransitionReceipt,
    WorkflowStatusReport,
};
use serde::Deserialize;

/// Body of a step action; the step comes from the path
#[derive(Debug, Deserialize)]
pub struct StepActionRequest {
    pub actor: ActorId,
    #[serde(flatten)]
    pub action: StepAction,
}

#[derive(Debug, Deserialize)]
pub struct RetireRequest {
    pub actor: ActorId,
}

/// Start a workflow on a registered document
pub async fn initiate_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<InitiateRequest>,
) -> ApiResult<(StatusCode, Json<WorkflowStatusReport>)> {
    let (plan, initiator) = request.into_plan(DocumentId::new(id));
    let report = state.service.initiate_workflow(plan, initiator).await?;
    Ok((StatusCode::CREATED, Json(report)))
}

pub async fn get_workflow_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<WorkflowStatusReport>> {
    let report = state.service.get_workflow_status(&DocumentId::new(id)).await?;
    Ok(Json(report))
}

/// Sign, approve or reject a step
pub async fn act_on_step(
    State(state): State<AppState>,
    Path((id, step)): Path<(String, String)>,
    Json(request): Json<StepActionRequest>,
) -> ApiResult<Json<TransitionReceipt>> {
    let request = ActRequest {
        step_id: StepId::new(step),
        actor: request.actor,
        action: request.action,
    };
    let receipt = state
        .service
        .act_on_step(&DocumentId::new(id), request)
        .await?;
    Ok(Json(receipt))
}

pub async fn expire_step(
    State(state): State<AppState>,
    Path((id, step)): Path<(String, String)>,
) -> ApiResult<Json<TransitionReceipt>> {
    let receipt = state
        .service
        .expire_step(&DocumentId::new(id), StepId::new(step))
        .await?;
    Ok(Json(receipt))
}

/// Retire a finished workflow so a new plan version can start
pub async fn retire_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<RetireRequest>,
) -> ApiResult<Json<WorkflowStatusReport>> {
    let report = state
        .service
        .retire(&DocumentId::new(id), request.actor)
        .await?;
    Ok(Json(report))
}
