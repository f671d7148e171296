use crate::domain::history::{ApprovalHistoryItem, WorkflowAction};
use crate::domain::rule::LevelKind;
use crate::domain::workflow::{ApprovalWorkflow, LevelStatus, WorkflowStatus};
use crate::errors::DomainError;

/// Level layout and status reconstructed purely from the history log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplayedState {
    pub status: WorkflowStatus,
    pub current_level: Option<LevelKind>,
    pub levels: Vec<(LevelKind, LevelStatus)>,
    pub escalation_count: u32,
}

/// Replays a workflow's history from `draft`. The history log is the
/// compliance record; if folding it forward does not land on the stored
/// aggregate state, the aggregate has been mutated outside the engine.
pub fn replay(workflow: &ApprovalWorkflow) -> Result<ReplayedState, DomainError> {
    let required: Vec<LevelKind> = workflow
        .levels
        .iter()
        .filter(|level| level.is_required)
        .map(|level| level.kind)
        .collect();

    let mut state = ReplayedState {
        status: WorkflowStatus::Draft,
        current_level: None,
        levels: workflow
            .levels
            .iter()
            .map(|level| {
                (
                    level.kind,
                    if level.is_required { LevelStatus::Pending } else { LevelStatus::NotRequired },
                )
            })
            .collect(),
        escalation_count: 0,
    };

    for entry in &workflow.history {
        if entry.previous_status != state.status {
            return Err(DomainError::InvariantViolation(format!(
                "history entry {} expects status {:?} but replay reached {:?}",
                entry.id, entry.previous_status, state.status
            )));
        }
        apply_entry(&mut state, &required, entry)?;
        if entry.new_status != state.status {
            return Err(DomainError::InvariantViolation(format!(
                "history entry {} records status {:?} but replay produced {:?}",
                entry.id, entry.new_status, state.status
            )));
        }
    }

    Ok(state)
}

/// Replays the history and checks the outcome against the stored aggregate.
pub fn verify(workflow: &ApprovalWorkflow) -> Result<ReplayedState, DomainError> {
    let replayed = replay(workflow)?;

    if replayed.status != workflow.status {
        return Err(DomainError::InvariantViolation(format!(
            "workflow {} stores status {:?} but its history replays to {:?}",
            workflow.id.0, workflow.status, replayed.status
        )));
    }
    for (kind, status) in &replayed.levels {
        let stored = workflow
            .level(*kind)
            .ok_or_else(|| DomainError::InvariantViolation(format!("level {kind:?} missing")))?;
        if stored.status != *status {
            return Err(DomainError::InvariantViolation(format!(
                "workflow {} level {} stores {:?} but replays to {:?}",
                workflow.id.0,
                kind.as_str(),
                stored.status,
                status
            )));
        }
    }
    if replayed.escalation_count != workflow.escalation_count {
        return Err(DomainError::InvariantViolation(format!(
            "workflow {} stores escalation_count {} but replays to {}",
            workflow.id.0, workflow.escalation_count, replayed.escalation_count
        )));
    }

    Ok(replayed)
}

fn apply_entry(
    state: &mut ReplayedState,
    required: &[LevelKind],
    entry: &ApprovalHistoryItem,
) -> Result<(), DomainError> {
    match entry.action {
        WorkflowAction::AutoApprove => {
            for (kind, status) in &mut state.levels {
                if required.contains(kind) {
                    *status = LevelStatus::Skipped;
                }
            }
            state.current_level = None;
            state.status = WorkflowStatus::FinalApproved;
        }
        WorkflowAction::Submit => {
            for (kind, status) in &mut state.levels {
                if required.contains(kind) {
                    *status = LevelStatus::Pending;
                }
            }
            state.current_level = required.first().copied();
            state.escalation_count = 0;
            state.status = WorkflowStatus::PendingApproval;
        }
        WorkflowAction::Approve => {
            let kind = expect_level(entry)?;
            set_level(state, kind, LevelStatus::Approved);
            state.current_level = required
                .iter()
                .copied()
                .filter(|candidate| candidate.rank() > kind.rank())
                .find(|candidate| level_status(state, *candidate) == Some(LevelStatus::Pending));
            state.status = match state.current_level {
                Some(_) => WorkflowStatus::LevelApproved(kind),
                None => WorkflowStatus::FinalApproved,
            };
        }
        WorkflowAction::Reject => {
            let kind = expect_level(entry)?;
            set_level(state, kind, LevelStatus::Rejected);
            state.current_level = None;
            state.status = WorkflowStatus::Rejected;
        }
        WorkflowAction::RequestChanges => {
            state.current_level = None;
            state.status = WorkflowStatus::ChangesRequested;
        }
        WorkflowAction::Escalate => {
            state.escalation_count = state.escalation_count.saturating_add(1);
        }
        WorkflowAction::Cancel => {
            state.current_level = None;
            state.status = WorkflowStatus::Cancelled;
        }
    }
    Ok(())
}

fn expect_level(entry: &ApprovalHistoryItem) -> Result<LevelKind, DomainError> {
    entry.level.ok_or_else(|| {
        DomainError::InvariantViolation(format!(
            "history entry {} ({}) is missing its level",
            entry.id,
            entry.action.as_str()
        ))
    })
}

fn set_level(state: &mut ReplayedState, kind: LevelKind, status: LevelStatus) {
    for (candidate, slot) in &mut state.levels {
        if *candidate == kind {
            *slot = status;
        }
    }
}

fn level_status(state: &ReplayedState, kind: LevelKind) -> Option<LevelStatus> {
    state.levels.iter().find(|(candidate, _)| *candidate == kind).map(|(_, status)| *status)
}
