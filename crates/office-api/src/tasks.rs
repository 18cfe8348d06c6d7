//! Task handlers. Every mutation answers with the task and its status history.

use crate::error::{ApiError, ApiJson, ApiPath};
use crate::server::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::Utc;
use office_types::*;
use serde_json::{json, Value};
use std::sync::Arc;

type Shared = State<Arc<AppState>>;
type Actor = Extension<ActorContext>;

pub async fn create(
    State(state): Shared,
    Extension(actor): Actor,
    ApiJson(req): ApiJson<CreateTaskRequest>,
) -> Result<(StatusCode, Json<TaskWithHistory>), ApiError> {
    let task = state.engine.create(req, &actor).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn list(
    State(state): Shared,
    Extension(actor): Actor,
) -> Result<Json<ListResponse<TaskSummary>>, ApiError> {
    let items = state.engine.list(&actor, Utc::now()).await?;
    Ok(Json(ListResponse { items }))
}

pub async fn get_one(
    State(state): Shared,
    ApiPath(id): ApiPath<TaskId>,
) -> Result<Json<TaskDetail>, ApiError> {
    Ok(Json(state.engine.get(id, Utc::now()).await?))
}

pub async fn update(
    State(state): Shared,
    Extension(actor): Actor,
    ApiPath(id): ApiPath<TaskId>,
    ApiJson(req): ApiJson<UpdateTaskRequest>,
) -> Result<Json<TaskWithHistory>, ApiError> {
    Ok(Json(state.engine.update(id, req, &actor).await?))
}

pub async fn remove(
    State(state): Shared,
    Extension(actor): Actor,
    ApiPath(id): ApiPath<TaskId>,
) -> Result<Json<Value>, ApiError> {
    state.engine.delete(id, &actor).await?;
    Ok(Json(json!({ "message": "Task deleted successfully" })))
}

pub async fn assign(
    State(state): Shared,
    Extension(actor): Actor,
    ApiPath(id): ApiPath<TaskId>,
    ApiJson(req): ApiJson<AssignTaskRequest>,
) -> Result<Json<TaskWithHistory>, ApiError> {
    Ok(Json(state.engine.assign(id, req.assigned_to, &actor).await?))
}

pub async fn update_status(
    State(state): Shared,
    Extension(actor): Actor,
    ApiPath(id): ApiPath<TaskId>,
    ApiJson(req): ApiJson<UpdateStatusRequest>,
) -> Result<Json<TaskWithHistory>, ApiError> {
    let task = state
        .engine
        .update_status(id, req.status, req.notes.as_deref(), &actor)
        .await?;
    Ok(Json(task))
}

pub async fn update_processing(
    State(state): Shared,
    Extension(actor): Actor,
    ApiPath(id): ApiPath<TaskId>,
    ApiJson(req): ApiJson<UpdateProcessingRequest>,
) -> Result<Json<TaskWithHistory>, ApiError> {
    let task = state
        .engine
        .update_processing_content(id, &req.processing_content, &req.processing_notes, &actor)
        .await?;
    Ok(Json(task))
}

pub async fn submit_review(
    State(state): Shared,
    Extension(actor): Actor,
    ApiPath(id): ApiPath<TaskId>,
) -> Result<Json<TaskWithHistory>, ApiError> {
    Ok(Json(state.engine.submit_for_review(id, &actor).await?))
}

pub async fn forward(
    State(state): Shared,
    Extension(actor): Actor,
    ApiPath(id): ApiPath<TaskId>,
    ApiJson(req): ApiJson<ForwardTaskRequest>,
) -> Result<Json<TaskWithHistory>, ApiError> {
    let task = state
        .engine
        .forward(id, req.assigned_to, req.comment.as_deref(), &actor)
        .await?;
    Ok(Json(task))
}

pub async fn delegate(
    State(state): Shared,
    Extension(actor): Actor,
    ApiPath(id): ApiPath<TaskId>,
    ApiJson(req): ApiJson<DelegateTaskRequest>,
) -> Result<Json<TaskWithHistory>, ApiError> {
    let task = state
        .engine
        .delegate(id, req.assigned_to, req.notes.as_deref(), &actor)
        .await?;
    Ok(Json(task))
}

pub async fn history(
    State(state): Shared,
    ApiPath(id): ApiPath<TaskId>,
) -> Result<Json<ListResponse<StatusHistory>>, ApiError> {
    let items = state.engine.history(id).await?;
    Ok(Json(ListResponse { items }))
}

pub async fn workflow(
    State(state): Shared,
    ApiPath(id): ApiPath<TaskId>,
) -> Result<Json<TaskWorkflow>, ApiError> {
    Ok(Json(state.engine.workflow(id).await?))
}

pub async fn comments(
    State(state): Shared,
    ApiPath(id): ApiPath<TaskId>,
) -> Result<Json<ListResponse<Comment>>, ApiError> {
    let items = state.engine.comments(id).await?;
    Ok(Json(ListResponse { items }))
}

pub async fn add_comment(
    State(state): Shared,
    Extension(actor): Actor,
    ApiPath(id): ApiPath<TaskId>,
    ApiJson(req): ApiJson<CommentRequest>,
) -> Result<(StatusCode, Json<Comment>), ApiError> {
    let comment = state.engine.add_comment(id, &req.content, &actor).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}
