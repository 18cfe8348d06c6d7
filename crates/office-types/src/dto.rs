//! Request and response DTOs for the task and audit HTTP surface.

use crate::{
    AuditAction, AuditEntityType, AuditFilter, Comment, DeadlineType, DocumentId, RemainingTime,
    StatusHistory, Task, TaskId, TaskStatus, TaskType, UserId,
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Create-task request. `deadline` is parsed with [`crate::parse_deadline`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    pub description: String,
    #[serde(default)]
    pub deadline: Option<String>,
    #[serde(default)]
    pub deadline_type: Option<DeadlineType>,
    #[serde(default)]
    pub assigned_to: Option<UserId>,
    #[serde(default)]
    pub linked_document: Option<DocumentId>,
    #[serde(default)]
    pub task_type: Option<TaskType>,
    #[serde(default)]
    pub processing_content: Option<String>,
    #[serde(default)]
    pub processing_notes: Option<String>,
}

/// Partial edit; absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateTaskRequest {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub deadline: Option<String>,
    #[serde(default)]
    pub deadline_type: Option<DeadlineType>,
    #[serde(default)]
    pub assigned_to: Option<UserId>,
    #[serde(default)]
    pub linked_document: Option<DocumentId>,
    #[serde(default)]
    pub task_type: Option<TaskType>,
    #[serde(default)]
    pub processing_content: Option<String>,
    #[serde(default)]
    pub processing_notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignTaskRequest {
    pub assigned_to: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardTaskRequest {
    pub assigned_to: UserId,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegateTaskRequest {
    pub assigned_to: UserId,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: TaskStatus,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateProcessingRequest {
    pub processing_content: String,
    #[serde(default)]
    pub processing_notes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentRequest {
    pub content: String,
}

/// Task with its status history, returned by every task mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskWithHistory {
    #[serde(flatten)]
    pub task: Task,
    pub status_history: Vec<StatusHistory>,
}

/// Full task view for GET /tasks/{id}.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDetail {
    #[serde(flatten)]
    pub task: Task,
    pub status_history: Vec<StatusHistory>,
    pub comments: Vec<Comment>,
    pub remaining_time: RemainingTime,
}

/// Task list entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSummary {
    #[serde(flatten)]
    pub task: Task,
    pub remaining_time: RemainingTime,
}

/// One stage of the four-step task pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStage {
    /// 1-based.
    pub index: usize,
    pub status: TaskStatus,
    pub completed: bool,
    pub current: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entered_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entered_by: Option<UserId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskWorkflow {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub stages: Vec<WorkflowStage>,
    /// Percentage of completed stages, 0..=100.
    pub progress: u32,
    /// 1-based index of the current stage.
    pub current_stage: usize,
}

/// Query string accepted by the audit read endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditQuery {
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub action: Option<AuditAction>,
    #[serde(default)]
    pub entity_type: Option<AuditEntityType>,
    #[serde(default)]
    pub entity_id: Option<u64>,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
}

impl AuditQuery {
    /// Build the store filter. `end_date` covers the whole day.
    pub fn filter(&self) -> AuditFilter {
        AuditFilter {
            user_id: self.user_id,
            action: self.action,
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            success: self.success,
            start: self.start_date.map(start_of_day),
            end: self.end_date.map(end_of_day),
            ip_address: self.ip_address.clone().filter(|s| !s.is_empty()),
        }
    }
}

/// Date range query (`start_date`, `end_date` as `YYYY-MM-DD`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DateRangeQuery {
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub entity_type: Option<AuditEntityType>,
}

impl DateRangeQuery {
    /// Resolve to a concrete range: from the Unix epoch and up to the end of `now`'s day by default.
    pub fn range(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = self.start_date.map(start_of_day).unwrap_or_default();
        let end = end_of_day(self.end_date.unwrap_or_else(|| now.date_naive()));
        (start, end)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanupQuery {
    #[serde(default)]
    pub days: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupResponse {
    pub message: String,
    pub deleted: u64,
    pub days_to_keep: u32,
}

/// Uniform error body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
}

pub fn start_of_day(d: NaiveDate) -> DateTime<Utc> {
    d.and_time(NaiveTime::MIN).and_utc()
}

/// Last representable instant of the day (23:59:59.999999999).
pub fn end_of_day(d: NaiveDate) -> DateTime<Utc> {
    let t = NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999).unwrap_or(NaiveTime::MIN);
    d.and_time(t).and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audit_query_end_date_covers_whole_day() {
        let q = AuditQuery {
            start_date: NaiveDate::from_ymd_opt(2025, 1, 1),
            end_date: NaiveDate::from_ymd_opt(2025, 1, 31),
            ip_address: Some(String::new()),
            ..Default::default()
        };
        let f = q.filter();
        assert_eq!(f.start.unwrap().to_rfc3339(), "2025-01-01T00:00:00+00:00");
        assert_eq!(f.end.unwrap().to_rfc3339(), "2025-01-31T23:59:59.999999999+00:00");
        assert_eq!(f.ip_address, None);
    }

    #[test]
    fn end_of_day_includes_the_final_fractional_second() {
        let day = NaiveDate::from_ymd_opt(2025, 1, 31).unwrap();
        let late = day
            .and_time(NaiveTime::from_hms_milli_opt(23, 59, 59, 500).unwrap())
            .and_utc();
        assert!(late <= end_of_day(day));
        assert!(end_of_day(day) < start_of_day(day.succ_opt().unwrap()));
    }

    #[test]
    fn create_request_rejects_unknown_task_type() {
        let body = serde_json::json!({"description": "x", "task_type": "recurring"});
        assert!(serde_json::from_value::<CreateTaskRequest>(body).is_err());
    }
}
