//! Authorization policy table: operation × role × relationship-to-task.

use office_types::{Role, Task, UserId, WorkflowError};

/// Lifecycle operations subject to authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
    Assign,
    Forward,
    Delegate,
    SubmitForReview,
    UpdateStatus,
    UpdateProcessingContent,
    Delete,
    Comment,
}

impl Operation {
    fn verb(self) -> &'static str {
        match self {
            Operation::Create => "create tasks",
            Operation::Update => "update this task",
            Operation::Assign => "assign tasks",
            Operation::Forward => "forward tasks",
            Operation::Delegate => "delegate this task",
            Operation::SubmitForReview => "submit this task for review",
            Operation::UpdateStatus => "change the status of this task",
            Operation::UpdateProcessingContent => "update processing content of this task",
            Operation::Delete => "delete this task",
            Operation::Comment => "comment on this task",
        }
    }
}

/// How the actor relates to the task being acted on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Relationship {
    pub is_creator: bool,
    pub is_assignee: bool,
}

impl Relationship {
    pub fn of(task: &Task, user_id: UserId) -> Self {
        Self {
            is_creator: task.is_creator(user_id),
            is_assignee: task.is_assignee(user_id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Requirement {
    Any,
    Creator,
    Assignee,
    CreatorOrAssignee,
}

impl Requirement {
    fn satisfied_by(self, rel: Relationship) -> bool {
        match self {
            Requirement::Any => true,
            Requirement::Creator => rel.is_creator,
            Requirement::Assignee => rel.is_assignee,
            Requirement::CreatorOrAssignee => rel.is_creator || rel.is_assignee,
        }
    }
}

use Operation as Op;
use Requirement as Req;
use Role::*;

/// Allow-list. A (operation, role) pair absent from the table is denied.
const RULES: &[(Operation, Role, Requirement)] = &[
    (Op::Create, Secretary, Req::Any),
    (Op::Create, TeamLeader, Req::Any),
    (Op::Update, Secretary, Req::Any),
    (Op::Update, TeamLeader, Req::CreatorOrAssignee),
    (Op::Assign, TeamLeader, Req::Any),
    (Op::Assign, Deputy, Req::Any),
    (Op::Forward, TeamLeader, Req::Any),
    (Op::Forward, Deputy, Req::Any),
    (Op::Delegate, TeamLeader, Req::CreatorOrAssignee),
    (Op::Delegate, Deputy, Req::CreatorOrAssignee),
    (Op::SubmitForReview, Officer, Req::Assignee),
    (Op::UpdateStatus, Admin, Req::Any),
    (Op::UpdateStatus, TeamLeader, Req::Any),
    (Op::UpdateStatus, Deputy, Req::Any),
    (Op::UpdateStatus, Secretary, Req::Any),
    (Op::UpdateStatus, Officer, Req::Any),
    (Op::UpdateProcessingContent, Admin, Req::Assignee),
    (Op::UpdateProcessingContent, TeamLeader, Req::Assignee),
    (Op::UpdateProcessingContent, Deputy, Req::Assignee),
    (Op::UpdateProcessingContent, Secretary, Req::Assignee),
    (Op::UpdateProcessingContent, Officer, Req::Assignee),
    (Op::Delete, Secretary, Req::Any),
    (Op::Delete, TeamLeader, Req::Creator),
    (Op::Comment, Admin, Req::Any),
    (Op::Comment, TeamLeader, Req::Any),
    (Op::Comment, Deputy, Req::Any),
    (Op::Comment, Secretary, Req::Any),
    (Op::Comment, Officer, Req::Any),
];

/// Evaluate the policy table once for an operation.
pub fn authorize(op: Operation, role: Role, rel: Relationship) -> Result<(), WorkflowError> {
    let rule = RULES.iter().find(|(o, r, _)| *o == op && *r == role);
    match rule {
        None => Err(WorkflowError::Authorization(format!(
            "role {} may not {}",
            role,
            op.verb()
        ))),
        Some((_, _, req)) if !req.satisfied_by(rel) => Err(WorkflowError::Authorization(
            format!("only the {} may {}", req_label(*req), op.verb()),
        )),
        Some(_) => Ok(()),
    }
}

/// Role-only half of [`authorize`], for operations that must report task
/// state before the actor's relationship to the task.
pub fn authorize_role(op: Operation, role: Role) -> Result<(), WorkflowError> {
    if RULES.iter().any(|(o, r, _)| *o == op && *r == role) {
        Ok(())
    } else {
        Err(WorkflowError::Authorization(format!(
            "role {} may not {}",
            role,
            op.verb()
        )))
    }
}

fn req_label(req: Requirement) -> &'static str {
    match req {
        Req::Any => "holder of this role",
        Req::Creator => "task creator",
        Req::Assignee => "current assignee",
        Req::CreatorOrAssignee => "task creator or current assignee",
    }
}

/// Roles a delegator of `role` may hand a task to.
pub fn delegation_targets(role: Role) -> &'static [Role] {
    match role {
        TeamLeader => &[Deputy, Officer],
        Deputy => &[Officer],
        Admin | Secretary | Officer => &[],
    }
}
