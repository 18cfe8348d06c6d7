//! Repository and directory traits, plus the error types crossing them.

use crate::{
    AuditFilter, AuditLog, Comment, DocumentId, DocumentInfo, DocumentKind, Role, StatusHistory,
    Task, TaskId, User, UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Which tasks a listing may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskScope {
    All,
    AssignedTo(UserId),
    AssignedOrCreatedBy(UserId),
}

impl TaskScope {
    /// Visibility of task listings for a role.
    pub fn for_role(role: Role, user_id: UserId) -> Self {
        match role {
            Role::Admin | Role::Secretary => TaskScope::All,
            Role::TeamLeader | Role::Deputy => TaskScope::AssignedOrCreatedBy(user_id),
            Role::Officer => TaskScope::AssignedTo(user_id),
        }
    }

    pub fn includes(&self, task: &Task) -> bool {
        match *self {
            TaskScope::All => true,
            TaskScope::AssignedTo(u) => task.is_assignee(u),
            TaskScope::AssignedOrCreatedBy(u) => task.is_assignee(u) || task.is_creator(u),
        }
    }
}

/// Task aggregate persistence. Soft-deleted tasks are invisible to every read.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a new task (its `id` is assigned here) together with its
    /// creation history row, atomically. Returns the stored task.
    async fn create_task(&self, task: Task, initial: StatusHistory) -> Result<Task, StoreError>;

    async fn get_task(&self, id: TaskId) -> Result<Option<Task>, StoreError>;

    /// Overwrite the task row and append the optional history row and
    /// comment in one transaction, provided the stored row still carries
    /// `expected_updated_at`. `NotFound` if the task is gone, `Conflict` if
    /// another write landed since it was read.
    async fn save_transition(
        &self,
        task: &Task,
        expected_updated_at: DateTime<Utc>,
        history: Option<StatusHistory>,
        comment: Option<Comment>,
    ) -> Result<(), StoreError>;

    /// Newest first.
    async fn list_tasks(&self, scope: TaskScope) -> Result<Vec<Task>, StoreError>;

    /// Tasks whose `created_at` falls within `[start, end]`, newest first.
    async fn tasks_created_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Task>, StoreError>;

    /// Ordered by `created_at`, then `id`.
    async fn status_history(&self, task_id: TaskId) -> Result<Vec<StatusHistory>, StoreError>;

    async fn add_comment(&self, comment: Comment) -> Result<Comment, StoreError>;

    /// Live comments, oldest first.
    async fn comments(&self, task_id: TaskId) -> Result<Vec<Comment>, StoreError>;

    /// Soft-delete the task's comments, then the task.
    async fn soft_delete(&self, task_id: TaskId, at: DateTime<Utc>) -> Result<(), StoreError>;
}

/// Append-only audit log persistence.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Append one row; `id` is assigned here.
    async fn append(&self, entry: AuditLog) -> Result<AuditLog, StoreError>;

    /// Matching rows newest first (id breaks ties), skipping `offset` and
    /// returning at most `limit`. Second value is the total match count.
    async fn query(
        &self,
        filter: &AuditFilter,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<AuditLog>, u64), StoreError>;

    /// Every matching row, oldest first.
    async fn scan(&self, filter: &AuditFilter) -> Result<Vec<AuditLog>, StoreError>;

    /// Delete rows with `timestamp < cutoff`; returns how many were removed.
    async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// Read-only view of the user directory.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_user(&self, id: UserId) -> Result<Option<User>, DirectoryError>;

    /// Any active user holding `role`.
    async fn find_active_by_role(&self, role: Role) -> Result<Option<User>, DirectoryError>;
}

/// Read-only view of the document registry.
#[async_trait]
pub trait DocumentDirectory: Send + Sync {
    /// Whether an incoming document with this id exists.
    async fn document_exists(&self, id: DocumentId) -> Result<bool, DirectoryError>;

    /// Documents of `kind` created within `[start, end]`, newest first.
    async fn list_documents(
        &self,
        kind: DocumentKind,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DocumentInfo>, DirectoryError>;
}

/// Task or audit store error.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("store error: {0}")]
    Other(String),
}

/// User or document directory error.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("directory error: {0}")]
    Other(String),
}

/// Task lifecycle engine error.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Authorization(String),
    #[error("{0}")]
    InvalidState(String),
    #[error("{0}")]
    Conflict(String),
    #[error("no reviewer available for task {0}")]
    ReviewerNotFound(TaskId),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DeadlineType, TaskStatus, TaskType};

    fn task(created_by: UserId, assigned_to: Option<UserId>) -> Task {
        let now = Utc::now();
        Task {
            id: 1,
            description: "d".into(),
            deadline: None,
            deadline_type: DeadlineType::Specific,
            status: TaskStatus::NotStarted,
            task_type: TaskType::Independent,
            assigned_to,
            created_by,
            linked_document: None,
            processing_content: String::new(),
            processing_notes: String::new(),
            completion_date: None,
            report_file: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[test]
    fn list_visibility_by_role() {
        let t = task(1, Some(2));
        assert!(TaskScope::for_role(Role::Secretary, 9).includes(&t));
        assert!(TaskScope::for_role(Role::Admin, 9).includes(&t));
        assert!(TaskScope::for_role(Role::TeamLeader, 1).includes(&t));
        assert!(TaskScope::for_role(Role::Deputy, 2).includes(&t));
        assert!(!TaskScope::for_role(Role::Deputy, 9).includes(&t));
        assert!(TaskScope::for_role(Role::Officer, 2).includes(&t));
        assert!(!TaskScope::for_role(Role::Officer, 1).includes(&t));
    }
}
