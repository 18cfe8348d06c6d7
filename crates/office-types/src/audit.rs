//! Audit trail types: actions, entity types, log rows, filters and read models.

use crate::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

string_enum! {
    /// Closed set of auditable actions.
    pub enum AuditAction ("audit action") {
        DocumentCreate => "document_create",
        DocumentUpdate => "document_update",
        DocumentDelete => "document_delete",
        DocumentForward => "document_forward",
        DocumentAssign => "document_assign",
        DocumentProcess => "document_process",
        DocumentComplete => "document_complete",
        TaskCreate => "task_create",
        TaskUpdate => "task_update",
        TaskDelete => "task_delete",
        TaskAssign => "task_assign",
        TaskForward => "task_forward",
        TaskDelegate => "task_delegate",
        TaskStart => "task_start",
        TaskComplete => "task_complete",
        UserLogin => "user_login",
        UserLogout => "user_logout",
        UserCreate => "user_create",
        UserUpdate => "user_update",
        UserDelete => "user_delete",
        UserActivate => "user_activate",
        UserDeactivate => "user_deactivate",
        SystemConfig => "system_config",
        FileUpload => "file_upload",
        FileDownload => "file_download",
        FileDelete => "file_delete",
        ReportGenerate => "report_generate",
        ReportExport => "report_export",
    }
}

impl AuditAction {
    pub fn is_document_action(self) -> bool {
        self.as_str().starts_with("document_")
    }

    pub fn is_task_action(self) -> bool {
        self.as_str().starts_with("task_")
    }
}

string_enum! {
    pub enum AuditEntityType ("entity type") {
        Task => "task",
        IncomingDocument => "incoming_document",
        OutgoingDocument => "outgoing_document",
        User => "user",
        File => "file",
        System => "system",
        Report => "report",
    }
}

/// One immutable audit row. Payload fields hold serialized JSON text and may be empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: u64,
    pub user_id: UserId,
    pub action: AuditAction,
    pub entity_type: AuditEntityType,
    pub entity_id: u64,
    #[serde(default)]
    pub ip_address: String,
    #[serde(default)]
    pub user_agent: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub old_values: String,
    #[serde(default)]
    pub new_values: String,
    #[serde(default)]
    pub metadata: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Milliseconds.
    pub duration: u64,
    pub timestamp: DateTime<Utc>,
}

/// AND-combined filter for audit queries. `None` fields match everything;
/// the time range is inclusive on both ends.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditFilter {
    pub user_id: Option<UserId>,
    pub action: Option<AuditAction>,
    pub entity_type: Option<AuditEntityType>,
    pub entity_id: Option<u64>,
    pub success: Option<bool>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub ip_address: Option<String>,
}

impl AuditFilter {
    pub fn for_entity(entity_type: AuditEntityType, entity_id: u64) -> Self {
        Self {
            entity_type: Some(entity_type),
            entity_id: Some(entity_id),
            ..Default::default()
        }
    }

    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
            ..Default::default()
        }
    }

    pub fn matches(&self, log: &AuditLog) -> bool {
        self.user_id.map_or(true, |v| log.user_id == v)
            && self.action.map_or(true, |v| log.action == v)
            && self.entity_type.map_or(true, |v| log.entity_type == v)
            && self.entity_id.map_or(true, |v| log.entity_id == v)
            && self.success.map_or(true, |v| log.success == v)
            && self.start.map_or(true, |v| log.timestamp >= v)
            && self.end.map_or(true, |v| log.timestamp <= v)
            && self
                .ip_address
                .as_deref()
                .map_or(true, |v| log.ip_address == v)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub current_page: u32,
    pub total_pages: u32,
    pub total_items: u64,
    pub items_per_page: u32,
}

impl Pagination {
    pub fn new(page: u32, limit: u32, total_items: u64) -> Self {
        let limit = limit.max(1);
        let total_pages = total_items.div_ceil(u64::from(limit)) as u32;
        Self {
            current_page: page,
            total_pages,
            total_items,
            items_per_page: limit,
        }
    }
}

/// A page of audit rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditPage {
    pub items: Vec<AuditLog>,
    pub pagination: Pagination,
}

/// Per-user activity rollup over a time range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserActivity {
    pub user_id: UserId,
    pub user_name: String,
    pub role: crate::Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<DateTime<Utc>>,
    pub total_actions: u64,
    pub document_actions: u64,
    pub task_actions: u64,
    pub login_count: u64,
    pub failed_actions: u64,
}

/// One row of an entity-type summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySummary {
    pub entity_type: AuditEntityType,
    pub entity_id: u64,
    pub label: String,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    pub status: String,
    pub total_activities: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<DateTime<Utc>>,
    pub processing_hours: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionCount {
    pub action: AuditAction,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityTypeCount {
    pub entity_type: AuditEntityType,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCount {
    pub user_id: UserId,
    pub user_name: String,
    pub count: u64,
}

/// System-wide audit statistics over a time range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStatistics {
    pub total_activities: u64,
    pub action_statistics: Vec<ActionCount>,
    pub entity_statistics: Vec<EntityTypeCount>,
    pub user_statistics: Vec<UserCount>,
    pub failed_activities: u64,
    /// Milliseconds, averaged over rows with a non-zero duration.
    pub average_processing_time: f64,
}
