//! In-memory task and audit stores.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use office_types::{
    AuditFilter, AuditLog, AuditStore, Comment, StatusHistory, StoreError, Task, TaskId, TaskScope,
    TaskStore,
};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Tasks, history and comments behind one lock, so a transition is a single write guard.
#[derive(Default)]
struct TaskTables {
    tasks: BTreeMap<TaskId, Task>,
    history: Vec<StatusHistory>,
    comments: Vec<Comment>,
    next_task_id: u64,
    next_history_id: u64,
    next_comment_id: u64,
}

impl TaskTables {
    fn live_task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(&id).filter(|t| t.deleted_at.is_none())
    }

    fn push_history(&mut self, task_id: TaskId, mut row: StatusHistory) {
        self.next_history_id += 1;
        row.id = self.next_history_id;
        row.task_id = task_id;
        self.history.push(row);
    }

    fn push_comment(&mut self, mut comment: Comment) -> Comment {
        self.next_comment_id += 1;
        comment.id = self.next_comment_id;
        self.comments.push(comment.clone());
        comment
    }
}

/// In-memory implementation of TaskStore.
pub struct InMemoryTaskStore {
    inner: RwLock<TaskTables>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(TaskTables::default()),
        }
    }
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

fn newest_first(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create_task(&self, mut task: Task, initial: StatusHistory) -> Result<Task, StoreError> {
        let mut t = self.inner.write().await;
        t.next_task_id += 1;
        task.id = t.next_task_id;
        t.tasks.insert(task.id, task.clone());
        t.push_history(task.id, initial);
        Ok(task)
    }

    async fn get_task(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        Ok(self.inner.read().await.live_task(id).cloned())
    }

    async fn save_transition(
        &self,
        task: &Task,
        expected_updated_at: DateTime<Utc>,
        history: Option<StatusHistory>,
        comment: Option<Comment>,
    ) -> Result<(), StoreError> {
        let mut t = self.inner.write().await;
        match t.live_task(task.id) {
            None => return Err(StoreError::NotFound(format!("task {}", task.id))),
            Some(live) if live.updated_at != expected_updated_at => {
                return Err(StoreError::Conflict(format!("task {} was modified concurrently", task.id)))
            }
            Some(_) => {}
        }
        t.tasks.insert(task.id, task.clone());
        if let Some(row) = history {
            t.push_history(task.id, row);
        }
        if let Some(comment) = comment {
            t.push_comment(comment);
        }
        Ok(())
    }

    async fn list_tasks(&self, scope: TaskScope) -> Result<Vec<Task>, StoreError> {
        let t = self.inner.read().await;
        let mut out: Vec<Task> = t
            .tasks
            .values()
            .filter(|task| task.deleted_at.is_none() && scope.includes(task))
            .cloned()
            .collect();
        newest_first(&mut out);
        Ok(out)
    }

    async fn tasks_created_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Task>, StoreError> {
        let t = self.inner.read().await;
        let mut out: Vec<Task> = t
            .tasks
            .values()
            .filter(|task| {
                task.deleted_at.is_none() && task.created_at >= start && task.created_at <= end
            })
            .cloned()
            .collect();
        newest_first(&mut out);
        Ok(out)
    }

    async fn status_history(&self, task_id: TaskId) -> Result<Vec<StatusHistory>, StoreError> {
        let t = self.inner.read().await;
        let mut rows: Vec<StatusHistory> = t
            .history
            .iter()
            .filter(|h| h.task_id == task_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn add_comment(&self, comment: Comment) -> Result<Comment, StoreError> {
        let mut t = self.inner.write().await;
        if t.live_task(comment.task_id).is_none() {
            return Err(StoreError::NotFound(format!("task {}", comment.task_id)));
        }
        Ok(t.push_comment(comment))
    }

    async fn comments(&self, task_id: TaskId) -> Result<Vec<Comment>, StoreError> {
        let t = self.inner.read().await;
        Ok(t.comments
            .iter()
            .filter(|c| c.task_id == task_id && c.deleted_at.is_none())
            .cloned()
            .collect())
    }

    async fn soft_delete(&self, task_id: TaskId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut t = self.inner.write().await;
        if t.live_task(task_id).is_none() {
            return Err(StoreError::NotFound(format!("task {}", task_id)));
        }
        for c in t
            .comments
            .iter_mut()
            .filter(|c| c.task_id == task_id && c.deleted_at.is_none())
        {
            c.deleted_at = Some(at);
        }
        if let Some(task) = t.tasks.get_mut(&task_id) {
            task.deleted_at = Some(at);
        }
        Ok(())
    }
}

#[derive(Default)]
struct AuditTable {
    rows: Vec<AuditLog>,
    next_id: u64,
}

/// In-memory implementation of AuditStore.
pub struct InMemoryAuditStore {
    inner: RwLock<AuditTable>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(AuditTable::default()),
        }
    }

    /// Number of stored rows.
    pub async fn len(&self) -> usize {
        self.inner.read().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for InMemoryAuditStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn append(&self, mut entry: AuditLog) -> Result<AuditLog, StoreError> {
        let mut t = self.inner.write().await;
        t.next_id += 1;
        entry.id = t.next_id;
        t.rows.push(entry.clone());
        Ok(entry)
    }

    async fn query(
        &self,
        filter: &AuditFilter,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<AuditLog>, u64), StoreError> {
        let t = self.inner.read().await;
        let mut hits: Vec<&AuditLog> = t.rows.iter().filter(|r| filter.matches(r)).collect();
        hits.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        let total = hits.len() as u64;
        let page = hits.into_iter().skip(offset).take(limit).cloned().collect();
        Ok((page, total))
    }

    async fn scan(&self, filter: &AuditFilter) -> Result<Vec<AuditLog>, StoreError> {
        let t = self.inner.read().await;
        let mut hits: Vec<AuditLog> = t.rows.iter().filter(|r| filter.matches(r)).cloned().collect();
        hits.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
        Ok(hits)
    }

    async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut t = self.inner.write().await;
        let before = t.rows.len();
        t.rows.retain(|r| r.timestamp >= cutoff);
        Ok((before - t.rows.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use office_types::{AuditAction, AuditEntityType, DeadlineType, TaskStatus, TaskType};

    fn task(created_by: u64, assigned_to: Option<u64>, created_at: DateTime<Utc>) -> Task {
        Task {
            id: 0,
            description: "Review budget".into(),
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
            created_at,
            updated_at: created_at,
            deleted_at: None,
        }
    }

    fn log(action: AuditAction, ts: DateTime<Utc>) -> AuditLog {
        AuditLog {
            id: 0,
            user_id: 1,
            action,
            entity_type: AuditEntityType::Task,
            entity_id: 1,
            ip_address: String::new(),
            user_agent: String::new(),
            description: String::new(),
            old_values: String::new(),
            new_values: String::new(),
            metadata: String::new(),
            success: true,
            error_message: None,
            duration: 0,
            timestamp: ts,
        }
    }

    #[tokio::test]
    async fn create_assigns_ids_and_writes_creation_history() {
        let store = InMemoryTaskStore::new();
        let now = Utc::now();
        let a = store
            .create_task(
                task(1, None, now),
                StatusHistory::new(None, TaskStatus::NotStarted, 1, "Task created", now),
            )
            .await
            .unwrap();
        let b = store
            .create_task(
                task(1, None, now),
                StatusHistory::new(None, TaskStatus::NotStarted, 1, "Task created", now),
            )
            .await
            .unwrap();
        assert_eq!((a.id, b.id), (1, 2));
        let history = store.status_history(a.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].task_id, a.id);
        assert_eq!(history[0].old_status, None);
    }

    #[tokio::test]
    async fn history_is_ordered_by_time_then_id() {
        let store = InMemoryTaskStore::new();
        let now = Utc::now();
        let mut t = store
            .create_task(
                task(1, None, now),
                StatusHistory::new(None, TaskStatus::NotStarted, 1, "", now),
            )
            .await
            .unwrap();
        t.status = TaskStatus::Processing;
        let later = now + Duration::seconds(5);
        store
            .save_transition(
                &t,
                t.updated_at,
                Some(StatusHistory::new(
                    Some(TaskStatus::NotStarted),
                    TaskStatus::Processing,
                    2,
                    "",
                    later,
                )),
                None,
            )
            .await
            .unwrap();
        // Same timestamp as the creation row: id decides.
        store
            .save_transition(
                &t,
                t.updated_at,
                Some(StatusHistory::new(
                    Some(TaskStatus::Processing),
                    TaskStatus::Processing,
                    2,
                    "",
                    now,
                )),
                None,
            )
            .await
            .unwrap();
        let ids: Vec<u64> = store
            .status_history(t.id)
            .await
            .unwrap()
            .iter()
            .map(|h| h.id)
            .collect();
        assert_eq!(ids, vec![1, 3, 2]);
    }

    #[tokio::test]
    async fn stale_transition_is_a_conflict() {
        let store = InMemoryTaskStore::new();
        let now = Utc::now();
        let read = store
            .create_task(
                task(1, None, now),
                StatusHistory::new(None, TaskStatus::NotStarted, 1, "", now),
            )
            .await
            .unwrap();

        let mut first = read.clone();
        first.status = TaskStatus::Processing;
        first.updated_at = now + Duration::seconds(1);
        store.save_transition(&first, read.updated_at, None, None).await.unwrap();

        let mut second = read.clone();
        second.status = TaskStatus::Completed;
        second.updated_at = now + Duration::seconds(2);
        let history = StatusHistory::new(
            Some(TaskStatus::NotStarted),
            TaskStatus::Completed,
            2,
            "",
            second.updated_at,
        );
        assert!(matches!(
            store.save_transition(&second, read.updated_at, Some(history), None).await,
            Err(StoreError::Conflict(_))
        ));
        let stored = store.get_task(read.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Processing);
        assert_eq!(store.status_history(read.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn soft_delete_hides_task_and_comments() {
        let store = InMemoryTaskStore::new();
        let now = Utc::now();
        let t = store
            .create_task(
                task(1, Some(2), now),
                StatusHistory::new(None, TaskStatus::NotStarted, 1, "", now),
            )
            .await
            .unwrap();
        store
            .add_comment(Comment::new(t.id, 2, "on it", now))
            .await
            .unwrap();
        store.soft_delete(t.id, now).await.unwrap();
        assert!(store.get_task(t.id).await.unwrap().is_none());
        assert!(store.comments(t.id).await.unwrap().is_empty());
        assert!(store.list_tasks(TaskScope::All).await.unwrap().is_empty());
        assert!(matches!(
            store.soft_delete(t.id, now).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn list_tasks_respects_scope() {
        let store = InMemoryTaskStore::new();
        let now = Utc::now();
        for (creator, assignee) in [(1, Some(5)), (2, Some(5)), (2, Some(6))] {
            store
                .create_task(
                    task(creator, assignee, now),
                    StatusHistory::new(None, TaskStatus::NotStarted, creator, "", now),
                )
                .await
                .unwrap();
        }
        assert_eq!(store.list_tasks(TaskScope::All).await.unwrap().len(), 3);
        assert_eq!(
            store.list_tasks(TaskScope::AssignedTo(5)).await.unwrap().len(),
            2
        );
        let mine = store
            .list_tasks(TaskScope::AssignedOrCreatedBy(2))
            .await
            .unwrap();
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].id, 3);
    }

    #[tokio::test]
    async fn audit_query_pages_newest_first() {
        let store = InMemoryAuditStore::new();
        let base = Utc::now();
        for i in 0..5 {
            store
                .append(log(AuditAction::TaskUpdate, base + Duration::seconds(i)))
                .await
                .unwrap();
        }
        store
            .append(log(AuditAction::TaskCreate, base))
            .await
            .unwrap();
        let (page, total) = store.query(&AuditFilter::default(), 0, 2).await.unwrap();
        assert_eq!(total, 6);
        assert_eq!(page.iter().map(|r| r.id).collect::<Vec<_>>(), vec![5, 4]);

        let filter = AuditFilter {
            action: Some(AuditAction::TaskUpdate),
            ..Default::default()
        };
        let (page, total) = store.query(&filter, 4, 10).await.unwrap();
        assert_eq!(total, 5);
        assert_eq!(page.len(), 1);

        let asc = store.scan(&AuditFilter::default()).await.unwrap();
        assert_eq!(asc.first().map(|r| r.id), Some(1));
    }

    #[tokio::test]
    async fn delete_before_is_strict() {
        let store = InMemoryAuditStore::new();
        let cutoff = Utc::now();
        store.append(log(AuditAction::TaskCreate, cutoff - Duration::seconds(1))).await.unwrap();
        store.append(log(AuditAction::TaskCreate, cutoff)).await.unwrap();
        store.append(log(AuditAction::TaskCreate, cutoff + Duration::seconds(1))).await.unwrap();
        assert_eq!(store.delete_before(cutoff).await.unwrap(), 1);
        assert_eq!(store.len().await, 2);
    }
}
