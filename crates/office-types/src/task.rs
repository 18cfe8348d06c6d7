//! Task aggregate, status history, comments, users and documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type TaskId = u64;
pub type UserId = u64;
pub type DocumentId = u64;

/// Error returned when a string does not name a variant of a closed enum.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

string_enum! {
    /// Role of a user in the office hierarchy.
    pub enum Role ("role") {
        Admin => "admin",
        TeamLeader => "team_leader",
        Deputy => "deputy",
        Secretary => "secretary",
        Officer => "officer",
    }
}

string_enum! {
    /// Task status. `received` is accepted on input as a legacy name for `not_started`.
    pub enum TaskStatus ("task status") {
        NotStarted => "not_started" | "received",
        Processing => "processing",
        Review => "review",
        Completed => "completed",
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        TaskStatus::NotStarted
    }
}

impl TaskStatus {
    /// 0-based position in the review pipeline.
    pub fn stage_index(self) -> usize {
        match self {
            TaskStatus::NotStarted => 0,
            TaskStatus::Processing => 1,
            TaskStatus::Review => 2,
            TaskStatus::Completed => 3,
        }
    }
}

string_enum! {
    pub enum TaskType ("task type") {
        DocumentLinked => "document_linked",
        Independent => "independent",
    }
}

string_enum! {
    /// How the deadline recurs.
    pub enum DeadlineType ("deadline type") {
        Specific => "specific",
        Monthly => "monthly",
        Quarterly => "quarterly",
        Yearly => "yearly",
    }
}

impl Default for DeadlineType {
    fn default() -> Self {
        DeadlineType::Specific
    }
}

/// A unit of work, optionally linked to an incoming document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deadline_type: DeadlineType,
    #[serde(default)]
    pub status: TaskStatus,
    pub task_type: TaskType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<UserId>,
    pub created_by: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linked_document: Option<DocumentId>,
    #[serde(default)]
    pub processing_content: String,
    #[serde(default)]
    pub processing_notes: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_file: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn is_assignee(&self, user_id: UserId) -> bool {
        self.assigned_to == Some(user_id)
    }

    pub fn is_creator(&self, user_id: UserId) -> bool {
        self.created_by == user_id
    }
}

/// One status-change record. `old_status` is `None` for the creation row and
/// serializes as `""`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusHistory {
    pub id: u64,
    pub task_id: TaskId,
    #[serde(with = "blank_status")]
    pub old_status: Option<TaskStatus>,
    pub new_status: TaskStatus,
    pub changed_by: UserId,
    #[serde(default)]
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

impl StatusHistory {
    /// Unsaved row; the store assigns `id` and `task_id` where needed.
    pub fn new(
        old_status: Option<TaskStatus>,
        new_status: TaskStatus,
        changed_by: UserId,
        notes: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            task_id: 0,
            old_status,
            new_status,
            changed_by,
            notes: notes.into(),
            created_at,
        }
    }
}

mod blank_status {
    use super::TaskStatus;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<TaskStatus>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(value.map(TaskStatus::as_str).unwrap_or(""))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<TaskStatus>, D::Error> {
        let raw = String::deserialize(d)?;
        if raw.is_empty() {
            return Ok(None);
        }
        raw.parse().map(Some).map_err(serde::de::Error::custom)
    }
}

/// Free-text comment attached to a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: u64,
    pub task_id: TaskId,
    pub user_id: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Comment {
    pub fn new(task_id: TaskId, user_id: UserId, content: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            task_id,
            user_id,
            content: content.into(),
            created_at,
            deleted_at: None,
        }
    }
}

/// Directory entry for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub role: Role,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// Who is performing a request, resolved once per request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorContext {
    pub user_id: UserId,
    pub role: Role,
    #[serde(default)]
    pub ip_address: String,
    #[serde(default)]
    pub user_agent: String,
}

impl ActorContext {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self {
            user_id,
            role,
            ip_address: String::new(),
            user_agent: String::new(),
        }
    }
}

string_enum! {
    pub enum DocumentKind ("document kind") {
        Incoming => "incoming",
        Outgoing => "outgoing",
    }
}

/// Document summary as exposed by the document directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub id: DocumentId,
    pub kind: DocumentKind,
    pub number: String,
    pub summary: String,
    pub status: String,
    pub created_by: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processor: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
