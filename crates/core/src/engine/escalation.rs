use chrono::{DateTime, Duration, Utc};

use crate::domain::history::{ApprovalHistoryItem, WorkflowAction};
use crate::domain::workflow::{ApprovalWorkflow, WorkflowId};
use crate::errors::DomainError;

pub const SWEEP_ACTOR: &str = "escalation-sweep";

/// Overdue means the workflow has sat on its current level longer than the
/// rule's escalation window. The clock restarts whenever a level is entered.
pub fn is_overdue(workflow: &ApprovalWorkflow, now: DateTime<Utc>) -> bool {
    if workflow.is_terminal() || workflow.current_level().is_none() {
        return false;
    }
    now - workflow.last_level_entered_at > Duration::days(workflow.escalation_days)
}

/// Same-day idempotence guard: one escalation per workflow per UTC day,
/// however often the sweep runs.
pub fn escalated_today(workflow: &ApprovalWorkflow, now: DateTime<Utc>) -> bool {
    workflow
        .last_escalated_at
        .map(|last| last.date_naive() == now.date_naive())
        .unwrap_or(false)
}

pub fn due_for_escalation(workflow: &ApprovalWorkflow, now: DateTime<Utc>) -> bool {
    is_overdue(workflow, now) && !escalated_today(workflow, now)
}

/// Produces the escalated copy of an overdue workflow: counter bumped,
/// guard timestamp stamped, one `escalate` history entry appended. The
/// workflow status and level layout are untouched; escalation is a nudge,
/// not a transition.
pub fn escalate(
    workflow: &ApprovalWorkflow,
    now: DateTime<Utc>,
) -> Result<ApprovalWorkflow, DomainError> {
    let current = workflow.current_level().ok_or_else(|| {
        DomainError::InvariantViolation(format!(
            "workflow {} has no current level to escalate",
            workflow.id.0
        ))
    })?;

    let idle_days = (now - workflow.last_level_entered_at).num_days();
    let comments = format!(
        "pending at {} for {} days (window {} days); approver `{}` notified",
        current.kind.as_str(),
        idle_days,
        workflow.escalation_days,
        current.approver.as_deref().unwrap_or("unassigned"),
    );

    let mut updated = workflow.clone();
    updated.escalation_count = updated.escalation_count.saturating_add(1);
    updated.last_escalated_at = Some(now);
    let entry = ApprovalHistoryItem::chained(
        updated.history.last(),
        updated.id.clone(),
        Some(current.kind),
        WorkflowAction::Escalate,
        SWEEP_ACTOR,
        Some(comments),
        workflow.status,
        workflow.status,
        updated.order.amount,
        now,
    );
    updated.history.push(entry);
    updated.updated_at = now;
    updated.check_invariants()?;
    Ok(updated)
}

/// What one `tick(now)` did, for the caller's logs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub escalated: Vec<WorkflowId>,
    /// Workflows skipped because an actor won the versioned commit race;
    /// the next sweep will pick them up again if still overdue.
    pub conflicts: Vec<WorkflowId>,
}
