use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::history::{ApprovalHistoryItem, WorkflowAction};
use crate::domain::rule::LevelKind;
use crate::domain::workflow::{ApprovalWorkflow, LevelStatus, WorkflowStatus};
use crate::errors::DomainError;
use crate::notify::NotificationKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestedAction {
    Approve,
    Reject,
    RequestChanges,
    Cancel,
    Resubmit,
}

impl RequestedAction {
    pub fn as_history_action(&self) -> WorkflowAction {
        match self {
            Self::Approve => WorkflowAction::Approve,
            Self::Reject => WorkflowAction::Reject,
            Self::RequestChanges => WorkflowAction::RequestChanges,
            Self::Cancel => WorkflowAction::Cancel,
            Self::Resubmit => WorkflowAction::Submit,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionCommand {
    pub actor: String,
    pub action: RequestedAction,
    pub comments: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueuedNotification {
    pub recipient: String,
    pub kind: NotificationKind,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TransitionOutcome {
    pub workflow: ApprovalWorkflow,
    pub notifications: Vec<QueuedNotification>,
}

/// The state machine proper: a pure function from (workflow, command) to the
/// next aggregate state. Persistence and delivery stay with the engine; this
/// function decides legality, rewrites levels, recomputes the workflow
/// status from them, and appends the history entry.
pub fn apply(
    workflow: &ApprovalWorkflow,
    cmd: &ActionCommand,
    now: DateTime<Utc>,
) -> Result<TransitionOutcome, DomainError> {
    if workflow.is_terminal() {
        return Err(DomainError::TerminalState {
            workflow_id: workflow.id.clone(),
            status: workflow.status,
        });
    }

    match cmd.action {
        RequestedAction::Approve | RequestedAction::Reject | RequestedAction::RequestChanges => {
            apply_decision(workflow, cmd, now)
        }
        RequestedAction::Cancel => apply_cancel(workflow, cmd, now),
        RequestedAction::Resubmit => apply_resubmit(workflow, cmd, now),
    }
}

fn apply_decision(
    workflow: &ApprovalWorkflow,
    cmd: &ActionCommand,
    now: DateTime<Utc>,
) -> Result<TransitionOutcome, DomainError> {
    let Some(current) = workflow.current_level() else {
        // No current level while non-terminal means the workflow is waiting
        // on the submitter, not on an approver.
        return Err(DomainError::InvalidAction {
            status: workflow.status,
            action: cmd.action.as_history_action(),
        });
    };

    if current.approver.as_deref() != Some(cmd.actor.as_str()) {
        return Err(DomainError::UnauthorizedActor {
            workflow_id: workflow.id.clone(),
            actor: cmd.actor.clone(),
        });
    }

    let comments = cmd.comments.as_deref().map(str::trim).filter(|value| !value.is_empty());
    if comments.is_none()
        && matches!(cmd.action, RequestedAction::Reject | RequestedAction::RequestChanges)
    {
        return Err(DomainError::MissingComments { action: cmd.action.as_history_action() });
    }

    let acted_kind = current.kind;
    let previous_status = workflow.status;
    let mut updated = workflow.clone();
    let mut notifications = Vec::new();

    {
        let level = updated
            .level_mut(acted_kind)
            .ok_or_else(|| DomainError::InvariantViolation("current level vanished".into()))?;
        level.is_current = false;
        level.comments = comments.map(str::to_string);
        match cmd.action {
            RequestedAction::Approve => {
                level.status = LevelStatus::Approved;
                level.approved_at = Some(now);
            }
            RequestedAction::Reject => level.status = LevelStatus::Rejected,
            // The level stays pending; nobody can act until resubmission.
            RequestedAction::RequestChanges => {}
            RequestedAction::Cancel | RequestedAction::Resubmit => unreachable!(),
        }
    }

    updated.status = match cmd.action {
        RequestedAction::Approve => match updated.next_pending_level(acted_kind) {
            Some(next_kind) => {
                let next = updated
                    .level_mut(next_kind)
                    .ok_or_else(|| DomainError::InvariantViolation("next level vanished".into()))?;
                next.is_current = true;
                if let Some(approver) = next.approver.clone() {
                    notifications.push(QueuedNotification {
                        recipient: approver,
                        kind: NotificationKind::ApprovalRequested,
                    });
                }
                updated.last_level_entered_at = now;
                WorkflowStatus::LevelApproved(acted_kind)
            }
            None => {
                notifications.push(QueuedNotification {
                    recipient: updated.order.submitted_by.clone(),
                    kind: NotificationKind::FinalApproved,
                });
                WorkflowStatus::FinalApproved
            }
        },
        RequestedAction::Reject => {
            notifications.push(QueuedNotification {
                recipient: updated.order.submitted_by.clone(),
                kind: NotificationKind::Rejected,
            });
            WorkflowStatus::Rejected
        }
        RequestedAction::RequestChanges => {
            notifications.push(QueuedNotification {
                recipient: updated.order.submitted_by.clone(),
                kind: NotificationKind::ChangesRequested,
            });
            WorkflowStatus::ChangesRequested
        }
        RequestedAction::Cancel | RequestedAction::Resubmit => unreachable!(),
    };

    finish(updated, cmd, Some(acted_kind), previous_status, now, notifications)
}

fn apply_cancel(
    workflow: &ApprovalWorkflow,
    cmd: &ActionCommand,
    now: DateTime<Utc>,
) -> Result<TransitionOutcome, DomainError> {
    if cmd.actor != workflow.order.submitted_by {
        return Err(DomainError::UnauthorizedActor {
            workflow_id: workflow.id.clone(),
            actor: cmd.actor.clone(),
        });
    }

    let previous_status = workflow.status;
    let acted_kind = workflow.current_level().map(|level| level.kind);
    let pending_approver = workflow.current_level().and_then(|level| level.approver.clone());

    let mut updated = workflow.clone();
    for level in &mut updated.levels {
        level.is_current = false;
    }
    updated.status = WorkflowStatus::Cancelled;

    let notifications = pending_approver
        .map(|approver| {
            vec![QueuedNotification { recipient: approver, kind: NotificationKind::Cancelled }]
        })
        .unwrap_or_default();

    finish(updated, cmd, acted_kind, previous_status, now, notifications)
}

fn apply_resubmit(
    workflow: &ApprovalWorkflow,
    cmd: &ActionCommand,
    now: DateTime<Utc>,
) -> Result<TransitionOutcome, DomainError> {
    if workflow.status != WorkflowStatus::ChangesRequested {
        return Err(DomainError::InvalidAction {
            status: workflow.status,
            action: WorkflowAction::Submit,
        });
    }
    if cmd.actor != workflow.order.submitted_by {
        return Err(DomainError::UnauthorizedActor {
            workflow_id: workflow.id.clone(),
            actor: cmd.actor.clone(),
        });
    }

    let previous_status = workflow.status;
    let mut updated = workflow.clone();

    // Fresh pass through the same aggregate: the level layout frozen at
    // build time is restored, the history is retained.
    let mut first_required: Option<LevelKind> = None;
    for level in &mut updated.levels {
        level.is_current = false;
        level.approved_at = None;
        level.comments = None;
        if level.is_required {
            level.status = LevelStatus::Pending;
            first_required.get_or_insert(level.kind);
        }
    }
    let Some(first_required) = first_required else {
        return Err(DomainError::InvariantViolation(format!(
            "workflow {} has no required levels to resubmit into",
            workflow.id.0
        )));
    };
    if let Some(level) = updated.level_mut(first_required) {
        level.is_current = true;
    }

    updated.status = WorkflowStatus::PendingApproval;
    updated.escalation_count = 0;
    updated.last_escalated_at = None;
    updated.submitted_at = now;
    updated.last_level_entered_at = now;

    let notifications = updated
        .level(first_required)
        .and_then(|level| level.approver.clone())
        .map(|approver| {
            vec![QueuedNotification {
                recipient: approver,
                kind: NotificationKind::ApprovalRequested,
            }]
        })
        .unwrap_or_default();

    finish(updated, cmd, Some(first_required), previous_status, now, notifications)
}

fn finish(
    mut updated: ApprovalWorkflow,
    cmd: &ActionCommand,
    level: Option<LevelKind>,
    previous_status: WorkflowStatus,
    now: DateTime<Utc>,
    notifications: Vec<QueuedNotification>,
) -> Result<TransitionOutcome, DomainError> {
    let entry = ApprovalHistoryItem::chained(
        updated.history.last(),
        updated.id.clone(),
        level,
        cmd.action.as_history_action(),
        cmd.actor.clone(),
        cmd.comments.as_deref().map(str::trim).filter(|value| !value.is_empty()).map(String::from),
        previous_status,
        updated.status,
        updated.order.amount,
        now,
    );
    updated.history.push(entry);
    updated.updated_at = now;
    updated.check_invariants()?;

    Ok(TransitionOutcome { workflow: updated, notifications })
}
