//! AuditService: write path (structured, failed, timed) and read path.

use crate::export::ExportRow;
use crate::{Activity, AuditError};
use chrono::{DateTime, Duration, Utc};
use office_types::*;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Default retention horizon in days.
pub const DEFAULT_RETENTION_DAYS: u32 = 365;
/// Shortest retention horizon cleanup accepts.
pub const MIN_RETENTION_DAYS: u32 = 30;
/// Row cap for a single export.
pub const EXPORT_LIMIT: u32 = 10_000;

const DEFAULT_PAGE_SIZE: u32 = 20;
const MAX_PAGE_SIZE: u32 = 100;
const TOP_USERS: usize = 10;

pub struct AuditService {
    store: Arc<dyn AuditStore + Send + Sync>,
    users: Arc<dyn UserDirectory + Send + Sync>,
    tasks: Arc<dyn TaskStore + Send + Sync>,
    documents: Arc<dyn DocumentDirectory + Send + Sync>,
}

impl AuditService {
    pub fn new(
        store: Arc<dyn AuditStore + Send + Sync>,
        users: Arc<dyn UserDirectory + Send + Sync>,
        tasks: Arc<dyn TaskStore + Send + Sync>,
        documents: Arc<dyn DocumentDirectory + Send + Sync>,
    ) -> Self {
        Self {
            store,
            users,
            tasks,
            documents,
        }
    }

    fn entry(actor: &ActorContext, activity: Activity) -> AuditLog {
        let json_text = |v: Option<serde_json::Value>| v.map(|v| v.to_string()).unwrap_or_default();
        AuditLog {
            id: 0,
            user_id: actor.user_id,
            action: activity.action,
            entity_type: activity.entity_type,
            entity_id: activity.entity_id,
            ip_address: actor.ip_address.clone(),
            user_agent: actor.user_agent.clone(),
            description: activity.description,
            old_values: json_text(activity.old_values),
            new_values: json_text(activity.new_values),
            metadata: json_text(activity.metadata),
            success: true,
            error_message: None,
            duration: 0,
            timestamp: Utc::now(),
        }
    }

    async fn append(&self, log: AuditLog) -> Result<AuditLog, AuditError> {
        let log = self.store.append(log).await?;
        debug!(
            audit_id = log.id,
            action = %log.action,
            entity_type = %log.entity_type,
            entity_id = log.entity_id,
            success = log.success,
            "audit row written"
        );
        Ok(log)
    }

    /// Record a successful activity with its payloads.
    pub async fn log_activity(
        &self,
        actor: Option<&ActorContext>,
        activity: Activity,
    ) -> Result<AuditLog, AuditError> {
        let actor = actor.ok_or(AuditError::MissingActor)?;
        self.append(Self::entry(actor, activity)).await
    }

    /// Record a failed activity. Only metadata is kept from the payloads.
    pub async fn log_failed_activity(
        &self,
        actor: Option<&ActorContext>,
        activity: Activity,
        error_message: impl Into<String>,
    ) -> Result<AuditLog, AuditError> {
        let actor = actor.ok_or(AuditError::MissingActor)?;
        let mut log = Self::entry(actor, activity);
        log.old_values.clear();
        log.new_values.clear();
        log.success = false;
        log.error_message = Some(error_message.into());
        self.append(log).await
    }

    /// Record a successful activity along with how long it took.
    pub async fn log_with_duration(
        &self,
        actor: Option<&ActorContext>,
        activity: Activity,
        elapsed: std::time::Duration,
    ) -> Result<AuditLog, AuditError> {
        let actor = actor.ok_or(AuditError::MissingActor)?;
        let mut log = Self::entry(actor, activity);
        log.duration = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self.append(log).await
    }

    /// Filtered page, newest first. `page < 1` becomes 1; `limit` outside 1..=100 becomes 20.
    pub async fn query(
        &self,
        filter: &AuditFilter,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> Result<AuditPage, AuditError> {
        let page = page.filter(|p| *p >= 1).unwrap_or(1);
        let limit = limit
            .filter(|l| (1..=MAX_PAGE_SIZE).contains(l))
            .unwrap_or(DEFAULT_PAGE_SIZE);
        let offset = (page as usize - 1) * limit as usize;
        let (items, total) = self.store.query(filter, offset, limit as usize).await?;
        Ok(AuditPage {
            items,
            pagination: Pagination::new(page, limit, total),
        })
    }

    /// Rollup of one user's rows within `[start, end]`.
    pub async fn user_activity(
        &self,
        user_id: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<UserActivity, AuditError> {
        let user = self
            .users
            .get_user(user_id)
            .await?
            .ok_or_else(|| AuditError::NotFound(format!("user {} not found", user_id)))?;
        let filter = AuditFilter {
            user_id: Some(user_id),
            ..AuditFilter::between(start, end)
        };
        let rows = self.store.scan(&filter).await?;
        let count = |pred: fn(&AuditLog) -> bool| rows.iter().filter(|r| pred(r)).count() as u64;
        Ok(UserActivity {
            user_id,
            user_name: user.name,
            role: user.role,
            last_activity: rows.last().map(|r| r.timestamp),
            total_actions: rows.len() as u64,
            document_actions: count(|r| r.action.is_document_action()),
            task_actions: count(|r| r.action.is_task_action()),
            login_count: count(|r| r.action == AuditAction::UserLogin),
            failed_actions: count(|r| !r.success),
        })
    }

    /// Every row for one entity, oldest first.
    pub async fn entity_trail(
        &self,
        entity_type: AuditEntityType,
        entity_id: u64,
    ) -> Result<Vec<AuditLog>, AuditError> {
        Ok(self
            .store
            .scan(&AuditFilter::for_entity(entity_type, entity_id))
            .await?)
    }

    /// One row per entity created in `[start, end]`, newest first.
    pub async fn entity_summary(
        &self,
        entity_type: AuditEntityType,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<EntitySummary>, AuditError> {
        self.entity_summary_at(entity_type, start, end, Utc::now())
            .await
    }

    /// As [`Self::entity_summary`], with open tasks measured up to `now`.
    pub async fn entity_summary_at(
        &self,
        entity_type: AuditEntityType,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<EntitySummary>, AuditError> {
        let kind = match entity_type {
            AuditEntityType::Task => None,
            AuditEntityType::IncomingDocument => Some(DocumentKind::Incoming),
            AuditEntityType::OutgoingDocument => Some(DocumentKind::Outgoing),
            other => {
                return Err(AuditError::Validation(format!(
                    "no summary available for entity type {}",
                    other
                )))
            }
        };

        let activity = self.activity_by_entity(entity_type).await?;
        let mut names = NameCache::new(self.users.as_ref());
        let mut out = Vec::new();

        match kind {
            None => {
                for task in self.tasks.tasks_created_between(start, end).await? {
                    let (total, last) = activity.get(&task.id).copied().unwrap_or((0, None));
                    let finished = task.completion_date.unwrap_or(now);
                    out.push(EntitySummary {
                        entity_type,
                        entity_id: task.id,
                        label: task.description.clone(),
                        created_at: task.created_at,
                        created_by: names.name(task.created_by).await?,
                        owner: names.optional_name(task.assigned_to).await?,
                        status: task.status.to_string(),
                        total_activities: total,
                        last_activity: last,
                        processing_hours: hours_between(task.created_at, finished),
                        deadline: task.deadline,
                        completed_at: task.completion_date,
                    });
                }
            }
            Some(kind) => {
                for doc in self.documents.list_documents(kind, start, end).await? {
                    let (total, last) = activity.get(&doc.id).copied().unwrap_or((0, None));
                    out.push(EntitySummary {
                        entity_type,
                        entity_id: doc.id,
                        label: doc.number.clone(),
                        created_at: doc.created_at,
                        created_by: names.name(doc.created_by).await?,
                        owner: names.optional_name(doc.processor).await?,
                        status: doc.status.clone(),
                        total_activities: total,
                        last_activity: last,
                        processing_hours: hours_between(doc.created_at, doc.updated_at),
                        deadline: None,
                        completed_at: None,
                    });
                }
            }
        }
        Ok(out)
    }

    /// entity id -> (row count, latest timestamp).
    async fn activity_by_entity(
        &self,
        entity_type: AuditEntityType,
    ) -> Result<HashMap<u64, (u64, Option<DateTime<Utc>>)>, AuditError> {
        let filter = AuditFilter {
            entity_type: Some(entity_type),
            ..Default::default()
        };
        let mut map: HashMap<u64, (u64, Option<DateTime<Utc>>)> = HashMap::new();
        for row in self.store.scan(&filter).await? {
            let slot = map.entry(row.entity_id).or_insert((0, None));
            slot.0 += 1;
            slot.1 = Some(slot.1.map_or(row.timestamp, |t| t.max(row.timestamp)));
        }
        Ok(map)
    }

    /// System-wide counts over `[start, end]`.
    pub async fn statistics(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<SystemStatistics, AuditError> {
        let rows = self.store.scan(&AuditFilter::between(start, end)).await?;

        let mut by_action: HashMap<AuditAction, u64> = HashMap::new();
        let mut by_entity: HashMap<AuditEntityType, u64> = HashMap::new();
        let mut by_user: HashMap<UserId, u64> = HashMap::new();
        let mut failed = 0u64;
        let (mut timed, mut total_ms) = (0u64, 0u64);
        for r in &rows {
            *by_action.entry(r.action).or_default() += 1;
            *by_entity.entry(r.entity_type).or_default() += 1;
            *by_user.entry(r.user_id).or_default() += 1;
            if !r.success {
                failed += 1;
            }
            if r.duration > 0 {
                timed += 1;
                total_ms = total_ms.saturating_add(r.duration);
            }
        }

        let mut action_statistics: Vec<ActionCount> = by_action
            .into_iter()
            .map(|(action, count)| ActionCount { action, count })
            .collect();
        action_statistics.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then(a.action.as_str().cmp(b.action.as_str()))
        });

        let mut entity_statistics: Vec<EntityTypeCount> = by_entity
            .into_iter()
            .map(|(entity_type, count)| EntityTypeCount { entity_type, count })
            .collect();
        entity_statistics.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then(a.entity_type.as_str().cmp(b.entity_type.as_str()))
        });

        let mut top: Vec<(UserId, u64)> = by_user.into_iter().collect();
        top.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        top.truncate(TOP_USERS);
        let mut names = NameCache::new(self.users.as_ref());
        let mut user_statistics = Vec::with_capacity(top.len());
        for (user_id, count) in top {
            user_statistics.push(UserCount {
                user_id,
                user_name: names.name(user_id).await?,
                count,
            });
        }

        Ok(SystemStatistics {
            total_activities: rows.len() as u64,
            action_statistics,
            entity_statistics,
            user_statistics,
            failed_activities: failed,
            average_processing_time: if timed == 0 {
                0.0
            } else {
                total_ms as f64 / timed as f64
            },
        })
    }

    /// Delete rows older than `days_to_keep` days. Returns how many were removed.
    pub async fn cleanup(&self, days_to_keep: u32) -> Result<u64, AuditError> {
        self.cleanup_at(days_to_keep, Utc::now()).await
    }

    /// Delete rows with `timestamp < now - days_to_keep`. A horizon reaching
    /// past the earliest representable instant deletes nothing.
    pub async fn cleanup_at(&self, days_to_keep: u32, now: DateTime<Utc>) -> Result<u64, AuditError> {
        let cutoff = Duration::try_days(i64::from(days_to_keep))
            .and_then(|horizon| now.checked_sub_signed(horizon))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let deleted = self.store.delete_before(cutoff).await?;
        debug!(days_to_keep, deleted, "audit cleanup");
        Ok(deleted)
    }

    /// First [`EXPORT_LIMIT`] matching rows, newest first, with actor names resolved.
    pub async fn export(&self, filter: &AuditFilter) -> Result<Vec<ExportRow>, AuditError> {
        let (rows, _) = self.store.query(filter, 0, EXPORT_LIMIT as usize).await?;
        let mut names = NameCache::new(self.users.as_ref());
        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            let user = names.name(r.user_id).await?;
            out.push(ExportRow::from_log(&r, user));
        }
        Ok(out)
    }
}

fn hours_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_seconds().max(0) as f64 / 3600.0
}

/// Memoized user-name lookups for rollups touching many rows.
struct NameCache<'a> {
    users: &'a (dyn UserDirectory + Send + Sync),
    names: HashMap<UserId, String>,
}

impl<'a> NameCache<'a> {
    fn new(users: &'a (dyn UserDirectory + Send + Sync)) -> Self {
        Self {
            users,
            names: HashMap::new(),
        }
    }

    /// Directory name, or `user <id>` for users no longer known.
    async fn name(&mut self, id: UserId) -> Result<String, AuditError> {
        if let Some(n) = self.names.get(&id) {
            return Ok(n.clone());
        }
        let name = self
            .users
            .get_user(id)
            .await?
            .map(|u| u.name)
            .unwrap_or_else(|| format!("user {}", id));
        self.names.insert(id, name.clone());
        Ok(name)
    }

    async fn optional_name(&mut self, id: Option<UserId>) -> Result<Option<String>, AuditError> {
        match id {
            Some(id) => self.name(id).await.map(Some),
            None => Ok(None),
        }
    }
}
