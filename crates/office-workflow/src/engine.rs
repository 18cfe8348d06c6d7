//! TaskEngine: the task lifecycle state machine over injected stores.

use crate::policy::{authorize, authorize_role, delegation_targets, Operation, Relationship};
use chrono::{DateTime, Utc};
use office_types::*;
use std::sync::Arc;
use tracing::info;

/// Orchestrates task mutations. Each operation evaluates the policy table
/// once, then writes the task row and its history row in one store call.
pub struct TaskEngine {
    tasks: Arc<dyn TaskStore + Send + Sync>,
    users: Arc<dyn UserDirectory + Send + Sync>,
    documents: Arc<dyn DocumentDirectory + Send + Sync>,
}

impl TaskEngine {
    pub fn new(
        tasks: Arc<dyn TaskStore + Send + Sync>,
        users: Arc<dyn UserDirectory + Send + Sync>,
        documents: Arc<dyn DocumentDirectory + Send + Sync>,
    ) -> Self {
        Self {
            tasks,
            users,
            documents,
        }
    }

    async fn load(&self, id: TaskId) -> Result<Task, WorkflowError> {
        self.tasks
            .get_task(id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("task {} not found", id)))
    }

    async fn require_user(&self, id: UserId) -> Result<User, WorkflowError> {
        self.users
            .get_user(id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("user {} not found", id)))
    }

    async fn require_document(&self, id: DocumentId) -> Result<(), WorkflowError> {
        if self.documents.document_exists(id).await? {
            Ok(())
        } else {
            Err(WorkflowError::NotFound(format!("document {} not found", id)))
        }
    }

    async fn display_name(&self, id: Option<UserId>) -> Result<String, WorkflowError> {
        let Some(id) = id else {
            return Ok("unassigned".to_string());
        };
        Ok(self
            .users
            .get_user(id)
            .await?
            .map(|u| u.name)
            .unwrap_or_else(|| format!("user {}", id)))
    }

    async fn with_history(&self, task: Task) -> Result<TaskWithHistory, WorkflowError> {
        let status_history = self.tasks.status_history(task.id).await?;
        Ok(TaskWithHistory {
            task,
            status_history,
        })
    }

    /// Write `task` back if it still matches the version read at `seen`.
    async fn persist(
        &self,
        task: Task,
        seen: DateTime<Utc>,
        history: Option<StatusHistory>,
        comment: Option<Comment>,
    ) -> Result<TaskWithHistory, WorkflowError> {
        self.tasks
            .save_transition(&task, seen, history, comment)
            .await
            .map_err(|e| match e {
                StoreError::NotFound(what) => WorkflowError::NotFound(format!("{} not found", what)),
                StoreError::Conflict(what) => WorkflowError::Conflict(what),
                other => other.into(),
            })?;
        self.with_history(task).await
    }

    /// Create a task in `not_started`, recording the `"" → not_started` history row.
    pub async fn create(
        &self,
        req: CreateTaskRequest,
        actor: &ActorContext,
    ) -> Result<TaskWithHistory, WorkflowError> {
        authorize(Operation::Create, actor.role, Relationship::default())?;

        let description = req.description.trim();
        if description.is_empty() {
            return Err(WorkflowError::Validation("description is required".to_string()));
        }
        let deadline = parse_optional_deadline(req.deadline.as_deref())?;
        let task_type = req.task_type.unwrap_or(if req.linked_document.is_some() {
            TaskType::DocumentLinked
        } else {
            TaskType::Independent
        });
        if task_type == TaskType::DocumentLinked && req.linked_document.is_none() {
            return Err(WorkflowError::Validation(
                "a document_linked task requires linked_document".to_string(),
            ));
        }
        if let Some(doc) = req.linked_document {
            self.require_document(doc).await?;
        }
        if let Some(user) = req.assigned_to {
            self.require_user(user).await?;
        }

        let now = Utc::now();
        let task = Task {
            id: 0,
            description: description.to_string(),
            deadline,
            deadline_type: req.deadline_type.unwrap_or_default(),
            status: TaskStatus::NotStarted,
            task_type,
            assigned_to: req.assigned_to,
            created_by: actor.user_id,
            linked_document: req.linked_document,
            processing_content: req.processing_content.unwrap_or_default(),
            processing_notes: req.processing_notes.unwrap_or_default(),
            completion_date: None,
            report_file: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        let initial = StatusHistory::new(None, TaskStatus::NotStarted, actor.user_id, "Task created", now);
        let task = self.tasks.create_task(task, initial).await?;
        info!(task_id = task.id, created_by = actor.user_id, "task created");
        self.with_history(task).await
    }

    /// Assign a task. A `not_started` task moves to `processing`; otherwise no history row.
    pub async fn assign(
        &self,
        id: TaskId,
        assignee: UserId,
        actor: &ActorContext,
    ) -> Result<TaskWithHistory, WorkflowError> {
        let mut task = self.load(id).await?;
        let seen = task.updated_at;
        authorize(Operation::Assign, actor.role, Relationship::of(&task, actor.user_id))?;
        let user = self.require_user(assignee).await?;

        let now = Utc::now();
        task.assigned_to = Some(user.id);
        task.updated_at = now;
        let history = if task.status == TaskStatus::NotStarted {
            task.status = TaskStatus::Processing;
            Some(StatusHistory::new(
                Some(TaskStatus::NotStarted),
                TaskStatus::Processing,
                actor.user_id,
                format!("Task assigned to {}", user.name),
                now,
            ))
        } else {
            None
        };
        info!(task_id = id, assignee, by = actor.user_id, "task assigned");
        self.persist(task, seen, history, None).await
    }

    /// Reassign without a status change, leaving a transfer comment.
    pub async fn forward(
        &self,
        id: TaskId,
        new_assignee: UserId,
        comment: Option<&str>,
        actor: &ActorContext,
    ) -> Result<TaskWithHistory, WorkflowError> {
        let mut task = self.load(id).await?;
        let seen = task.updated_at;
        authorize(Operation::Forward, actor.role, Relationship::of(&task, actor.user_id))?;
        let current = task.assigned_to.ok_or_else(|| {
            WorkflowError::InvalidState(format!("task {} has no assignee to forward from", id))
        })?;
        let from = self.require_user(current).await?;
        let to = self.require_user(new_assignee).await?;

        let mut text = format!("Forwarded task from {} to {}", from.name, to.name);
        if let Some(note) = comment.map(str::trim).filter(|c| !c.is_empty()) {
            text.push_str(". Note: ");
            text.push_str(note);
        }

        let now = Utc::now();
        task.assigned_to = Some(to.id);
        task.updated_at = now;
        let history = StatusHistory::new(Some(task.status), task.status, actor.user_id, text.clone(), now);
        let comment = Comment::new(task.id, actor.user_id, text, now);
        info!(task_id = id, from = from.id, to = to.id, "task forwarded");
        self.persist(task, seen, Some(history), Some(comment)).await
    }

    /// Hand the task down the hierarchy. Status is unchanged.
    pub async fn delegate(
        &self,
        id: TaskId,
        new_assignee: UserId,
        notes: Option<&str>,
        actor: &ActorContext,
    ) -> Result<TaskWithHistory, WorkflowError> {
        let mut task = self.load(id).await?;
        let seen = task.updated_at;
        authorize(Operation::Delegate, actor.role, Relationship::of(&task, actor.user_id))?;
        let target = self.require_user(new_assignee).await?;
        if !delegation_targets(actor.role).contains(&target.role) {
            return Err(WorkflowError::Authorization(format!(
                "role {} may not delegate to role {}",
                actor.role, target.role
            )));
        }

        let from = self.display_name(task.assigned_to).await?;
        let mut text = format!("Delegated task from {} to {}", from, target.name);
        if let Some(note) = notes.map(str::trim).filter(|n| !n.is_empty()) {
            text.push_str(". Note: ");
            text.push_str(note);
        }

        let now = Utc::now();
        task.assigned_to = Some(target.id);
        task.updated_at = now;
        let history = StatusHistory::new(Some(task.status), task.status, actor.user_id, text, now);
        info!(task_id = id, to = target.id, by = actor.user_id, "task delegated");
        self.persist(task, seen, Some(history), None).await
    }

    /// Officer hands a processing task to a reviewer.
    pub async fn submit_for_review(
        &self,
        id: TaskId,
        actor: &ActorContext,
    ) -> Result<TaskWithHistory, WorkflowError> {
        let mut task = self.load(id).await?;
        let seen = task.updated_at;
        authorize_role(Operation::SubmitForReview, actor.role)?;
        if task.status != TaskStatus::Processing {
            return Err(WorkflowError::InvalidState(format!(
                "only processing tasks can be submitted for review (task {} is {})",
                id, task.status
            )));
        }
        authorize(
            Operation::SubmitForReview,
            actor.role,
            Relationship::of(&task, actor.user_id),
        )?;
        let reviewer = self.resolve_reviewer(&task).await?;

        let now = Utc::now();
        task.status = TaskStatus::Review;
        task.assigned_to = Some(reviewer.id);
        task.updated_at = now;
        let history = StatusHistory::new(
            Some(TaskStatus::Processing),
            TaskStatus::Review,
            actor.user_id,
            format!("Submitted for review to {}", reviewer.name),
            now,
        );
        info!(task_id = id, reviewer = reviewer.id, "task submitted for review");
        self.persist(task, seen, Some(history), None).await
    }

    /// Creator if they lead a team, else any active team leader, else any active deputy.
    async fn resolve_reviewer(&self, task: &Task) -> Result<User, WorkflowError> {
        if let Some(creator) = self.users.get_user(task.created_by).await? {
            if matches!(creator.role, Role::TeamLeader | Role::Deputy) {
                return Ok(creator);
            }
        }
        for role in [Role::TeamLeader, Role::Deputy] {
            if let Some(user) = self.users.find_active_by_role(role).await? {
                return Ok(user);
            }
        }
        Err(WorkflowError::ReviewerNotFound(task.id))
    }

    /// Set the status directly. No transition graph; always records history.
    pub async fn update_status(
        &self,
        id: TaskId,
        status: TaskStatus,
        notes: Option<&str>,
        actor: &ActorContext,
    ) -> Result<TaskWithHistory, WorkflowError> {
        let mut task = self.load(id).await?;
        let seen = task.updated_at;
        authorize(Operation::UpdateStatus, actor.role, Relationship::of(&task, actor.user_id))?;
        if task.assigned_to.is_none() && status != TaskStatus::NotStarted {
            return Err(WorkflowError::InvalidState(format!(
                "task {} must be assigned before it can move to {}",
                id, status
            )));
        }

        let now = Utc::now();
        let old = task.status;
        task.status = status;
        if status == TaskStatus::Completed {
            task.completion_date.get_or_insert(now);
        } else {
            task.completion_date = None;
        }
        task.updated_at = now;
        let notes = notes
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Status changed from {} to {}", old, status));
        let history = StatusHistory::new(Some(old), status, actor.user_id, notes, now);
        info!(task_id = id, from = %old, to = %status, by = actor.user_id, "task status updated");
        self.persist(task, seen, Some(history), None).await
    }

    /// Assignee records how the task is being handled.
    pub async fn update_processing_content(
        &self,
        id: TaskId,
        content: &str,
        notes: &str,
        actor: &ActorContext,
    ) -> Result<TaskWithHistory, WorkflowError> {
        let mut task = self.load(id).await?;
        let seen = task.updated_at;
        authorize(
            Operation::UpdateProcessingContent,
            actor.role,
            Relationship::of(&task, actor.user_id),
        )?;

        let now = Utc::now();
        task.processing_content = content.to_string();
        task.processing_notes = notes.to_string();
        task.updated_at = now;
        let history = StatusHistory::new(
            Some(task.status),
            task.status,
            actor.user_id,
            "Updated processing content",
            now,
        );
        self.persist(task, seen, Some(history), None).await
    }

    /// General edit of task fields. Status is never changed here.
    pub async fn update(
        &self,
        id: TaskId,
        req: UpdateTaskRequest,
        actor: &ActorContext,
    ) -> Result<TaskWithHistory, WorkflowError> {
        let mut task = self.load(id).await?;
        let seen = task.updated_at;
        authorize(Operation::Update, actor.role, Relationship::of(&task, actor.user_id))?;

        if let Some(description) = req.description.as_deref() {
            let description = description.trim();
            if description.is_empty() {
                return Err(WorkflowError::Validation("description is required".to_string()));
            }
            task.description = description.to_string();
        }
        if let Some(raw) = req.deadline.as_deref() {
            task.deadline = parse_optional_deadline(Some(raw))?;
        }
        if let Some(deadline_type) = req.deadline_type {
            task.deadline_type = deadline_type;
        }
        if let Some(doc) = req.linked_document {
            self.require_document(doc).await?;
            task.linked_document = Some(doc);
        }
        if let Some(task_type) = req.task_type {
            task.task_type = task_type;
        }
        if task.task_type == TaskType::DocumentLinked && task.linked_document.is_none() {
            return Err(WorkflowError::Validation(
                "a document_linked task requires linked_document".to_string(),
            ));
        }
        if let Some(user) = req.assigned_to {
            self.require_user(user).await?;
            task.assigned_to = Some(user);
        }
        if let Some(content) = req.processing_content {
            task.processing_content = content;
        }
        if let Some(notes) = req.processing_notes {
            task.processing_notes = notes;
        }

        let now = Utc::now();
        task.updated_at = now;
        let history = StatusHistory::new(
            Some(task.status),
            task.status,
            actor.user_id,
            "Updated task details",
            now,
        );
        self.persist(task, seen, Some(history), None).await
    }

    /// Soft-delete a task and its comments. Completed tasks are kept.
    pub async fn delete(&self, id: TaskId, actor: &ActorContext) -> Result<(), WorkflowError> {
        let task = self.load(id).await?;
        authorize(Operation::Delete, actor.role, Relationship::of(&task, actor.user_id))?;
        if task.status == TaskStatus::Completed {
            return Err(WorkflowError::InvalidState(
                "completed tasks cannot be deleted".to_string(),
            ));
        }
        self.tasks.soft_delete(id, Utc::now()).await?;
        info!(task_id = id, by = actor.user_id, "task deleted");
        Ok(())
    }

    pub async fn add_comment(
        &self,
        id: TaskId,
        content: &str,
        actor: &ActorContext,
    ) -> Result<Comment, WorkflowError> {
        let task = self.load(id).await?;
        authorize(Operation::Comment, actor.role, Relationship::of(&task, actor.user_id))?;
        let content = content.trim();
        if content.is_empty() {
            return Err(WorkflowError::Validation("comment content is required".to_string()));
        }
        let comment = Comment::new(id, actor.user_id, content, Utc::now());
        Ok(self.tasks.add_comment(comment).await?)
    }

    pub async fn comments(&self, id: TaskId) -> Result<Vec<Comment>, WorkflowError> {
        self.load(id).await?;
        Ok(self.tasks.comments(id).await?)
    }

    pub async fn history(&self, id: TaskId) -> Result<Vec<StatusHistory>, WorkflowError> {
        self.load(id).await?;
        Ok(self.tasks.status_history(id).await?)
    }

    /// Task with history, comments and remaining time as of `now`.
    pub async fn get(&self, id: TaskId, now: DateTime<Utc>) -> Result<TaskDetail, WorkflowError> {
        let task = self.load(id).await?;
        let status_history = self.tasks.status_history(id).await?;
        let comments = self.tasks.comments(id).await?;
        let remaining_time = remaining_time(task.deadline, now);
        Ok(TaskDetail {
            task,
            status_history,
            comments,
            remaining_time,
        })
    }

    /// Tasks visible to the actor, newest first.
    pub async fn list(
        &self,
        actor: &ActorContext,
        now: DateTime<Utc>,
    ) -> Result<Vec<TaskSummary>, WorkflowError> {
        let scope = TaskScope::for_role(actor.role, actor.user_id);
        Ok(self
            .tasks
            .list_tasks(scope)
            .await?
            .into_iter()
            .map(|task| {
                let remaining_time = remaining_time(task.deadline, now);
                TaskSummary {
                    task,
                    remaining_time,
                }
            })
            .collect())
    }

    pub async fn workflow(&self, id: TaskId) -> Result<TaskWorkflow, WorkflowError> {
        let task = self.load(id).await?;
        let history = self.tasks.status_history(id).await?;
        Ok(build_workflow(&task, &history))
    }
}

fn parse_optional_deadline(raw: Option<&str>) -> Result<Option<DateTime<Utc>>, WorkflowError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(raw) => parse_deadline(raw)
            .map(Some)
            .ok_or_else(|| WorkflowError::Validation(format!("invalid deadline format: {}", raw))),
    }
}

/// Four-stage pipeline view. The first stage is complete once the task exists.
fn build_workflow(task: &Task, history: &[StatusHistory]) -> TaskWorkflow {
    let current = task.status.stage_index();
    let done = task.status == TaskStatus::Completed;
    let stages: Vec<WorkflowStage> = TaskStatus::ALL
        .iter()
        .enumerate()
        .map(|(i, &status)| {
            let entered = history
                .iter()
                .find(|h| h.new_status == status && h.old_status != Some(status));
            WorkflowStage {
                index: i + 1,
                status,
                completed: i == 0 || i < current || done,
                current: i == current,
                entered_at: entered.map(|h| h.created_at),
                entered_by: entered.map(|h| h.changed_by),
            }
        })
        .collect();
    let completed = stages.iter().filter(|s| s.completed).count() as u32;
    TaskWorkflow {
        task_id: task.id,
        status: task.status,
        progress: completed * 100 / stages.len().max(1) as u32,
        current_stage: current + 1,
        stages,
    }
}
