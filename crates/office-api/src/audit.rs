//! Audit read endpoints, CSV export and retention cleanup.

use crate::error::{ApiError, ApiPath, ApiQuery};
use crate::server::AppState;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use chrono::Utc;
use office_audit::export::write_csv;
use office_audit::{Activity, MIN_RETENTION_DAYS};
use office_types::*;
use std::sync::Arc;

type Shared = State<Arc<AppState>>;

fn require_role(actor: &ActorContext, allowed: &[Role]) -> Result<(), ApiError> {
    if allowed.contains(&actor.role) {
        Ok(())
    } else {
        Err(ApiError::forbidden(format!(
            "role {} may not read the audit trail",
            actor.role
        )))
    }
}

const READERS: &[Role] = &[Role::Admin, Role::TeamLeader];
const TRAIL_READERS: &[Role] = &[Role::Admin, Role::TeamLeader, Role::Deputy];

pub async fn logs(
    State(state): Shared,
    Extension(actor): Extension<ActorContext>,
    ApiQuery(q): ApiQuery<AuditQuery>,
) -> Result<Json<AuditPage>, ApiError> {
    require_role(&actor, READERS)?;
    Ok(Json(state.audit.query(&q.filter(), q.page, q.limit).await?))
}

pub async fn user_activity(
    State(state): Shared,
    Extension(actor): Extension<ActorContext>,
    ApiPath(user_id): ApiPath<UserId>,
    ApiQuery(q): ApiQuery<DateRangeQuery>,
) -> Result<Json<UserActivity>, ApiError> {
    require_role(&actor, READERS)?;
    let (start, end) = q.range(Utc::now());
    Ok(Json(state.audit.user_activity(user_id, start, end).await?))
}

pub async fn trail(
    State(state): Shared,
    Extension(actor): Extension<ActorContext>,
    ApiPath((entity_type, entity_id)): ApiPath<(AuditEntityType, u64)>,
) -> Result<Json<ListResponse<AuditLog>>, ApiError> {
    require_role(&actor, TRAIL_READERS)?;
    let items = state.audit.entity_trail(entity_type, entity_id).await?;
    Ok(Json(ListResponse { items }))
}

pub async fn summary(
    State(state): Shared,
    Extension(actor): Extension<ActorContext>,
    ApiQuery(q): ApiQuery<DateRangeQuery>,
) -> Result<Json<ListResponse<EntitySummary>>, ApiError> {
    require_role(&actor, READERS)?;
    let entity_type = q
        .entity_type
        .ok_or_else(|| ApiError::bad_request("entity_type is required"))?;
    let (start, end) = q.range(Utc::now());
    let items = state.audit.entity_summary(entity_type, start, end).await?;
    Ok(Json(ListResponse { items }))
}

pub async fn statistics(
    State(state): Shared,
    Extension(actor): Extension<ActorContext>,
    ApiQuery(q): ApiQuery<DateRangeQuery>,
) -> Result<Json<SystemStatistics>, ApiError> {
    require_role(&actor, &[Role::Admin])?;
    let (start, end) = q.range(Utc::now());
    Ok(Json(state.audit.statistics(start, end).await?))
}

pub async fn export(
    State(state): Shared,
    Extension(actor): Extension<ActorContext>,
    ApiQuery(q): ApiQuery<AuditQuery>,
) -> Result<Response, ApiError> {
    require_role(&actor, READERS)?;
    let rows = state.audit.export(&q.filter()).await?;
    let csv = write_csv(&rows)?;
    let filename = format!(
        "attachment; filename=audit_logs_{}.csv",
        Utc::now().format("%Y-%m-%d_%H-%M-%S")
    );
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (header::CONTENT_DISPOSITION, filename),
        ],
        csv,
    )
        .into_response())
}

pub async fn cleanup(
    State(state): Shared,
    Extension(actor): Extension<ActorContext>,
    ApiQuery(q): ApiQuery<CleanupQuery>,
) -> Result<Json<CleanupResponse>, ApiError> {
    if actor.role != Role::Admin {
        return Err(ApiError::forbidden(
            "only administrators can clean up audit logs",
        ));
    }
    let days = q.days.unwrap_or(state.default_retention_days);
    if days < MIN_RETENTION_DAYS {
        return Err(ApiError::bad_request(format!(
            "days must be at least {}",
            MIN_RETENTION_DAYS
        )));
    }

    let deleted = state.audit.cleanup(days).await?;
    let activity = Activity::new(AuditAction::SystemConfig, AuditEntityType::System)
        .description(format!("Cleaned up audit logs older than {} days", days))
        .with_metadata_json(serde_json::json!({ "days_to_keep": days, "deleted": deleted }));
    if let Err(e) = state.audit.log_activity(Some(&actor), activity).await {
        tracing::warn!(error = %e, "failed to record audit cleanup");
    }
    tracing::info!(days, deleted, "audit logs cleaned up");

    Ok(Json(CleanupResponse {
        message: format!("Successfully cleaned up audit logs older than {} days", days),
        deleted,
        days_to_keep: days,
    }))
}
