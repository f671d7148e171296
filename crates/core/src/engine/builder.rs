use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::history::{ApprovalHistoryItem, WorkflowAction};
use crate::domain::order::PurchaseOrder;
use crate::domain::rule::{ApprovalRule, LevelKind};
use crate::domain::workflow::{
    ApprovalLevel, ApprovalWorkflow, LevelStatus, WorkflowId, WorkflowStatus,
};
use crate::errors::DomainError;

pub const SYSTEM_ACTOR: &str = "system";

/// Materializes an approval workflow from a resolved rule. Orders under the
/// rule's auto-approval threshold come back already terminal; everything
/// else starts at the first required level.
pub fn build(
    order: &PurchaseOrder,
    rule: &ApprovalRule,
    now: DateTime<Utc>,
) -> Result<ApprovalWorkflow, DomainError> {
    let workflow_id = WorkflowId(Uuid::new_v4().to_string());

    if rule.auto_approves(order.amount) {
        return Ok(build_auto_approved(workflow_id, order, rule, now));
    }

    // The rule was validated at save time; re-check here so a corrupted rule
    // row cannot mint a workflow nobody can act on.
    let mut first_required: Option<LevelKind> = None;
    for kind in LevelKind::ORDER {
        let requirement = rule.requirement(kind);
        if requirement.required {
            if requirement.approvers.is_empty() {
                return Err(DomainError::InvalidRuleConfiguration {
                    rule_id: rule.id.clone(),
                    reason: format!("required level {} has no approvers", kind.as_str()),
                });
            }
            first_required.get_or_insert(kind);
        }
    }
    let Some(first_required) = first_required else {
        return Err(DomainError::InvalidRuleConfiguration {
            rule_id: rule.id.clone(),
            reason: format!(
                "rule requires no levels yet does not auto-approve amount {}",
                order.amount
            ),
        });
    };

    let levels = LevelKind::ORDER
        .into_iter()
        .map(|kind| {
            let requirement = rule.requirement(kind);
            ApprovalLevel {
                kind,
                status: if requirement.required {
                    LevelStatus::Pending
                } else {
                    LevelStatus::NotRequired
                },
                is_required: requirement.required,
                is_current: kind == first_required,
                approver: requirement.approvers.first().cloned(),
                candidates: requirement.approvers.clone(),
                approved_at: None,
                comments: None,
            }
        })
        .collect();

    let submit_entry = ApprovalHistoryItem::chained(
        None,
        workflow_id.clone(),
        Some(first_required),
        WorkflowAction::Submit,
        order.submitted_by.clone(),
        None,
        WorkflowStatus::Draft,
        WorkflowStatus::PendingApproval,
        order.amount,
        now,
    );

    let workflow = ApprovalWorkflow {
        id: workflow_id,
        order: order.clone(),
        rule_id: rule.id.clone(),
        status: WorkflowStatus::PendingApproval,
        version: 1,
        levels,
        escalation_count: 0,
        escalation_days: rule.escalation_days,
        submitted_at: now,
        last_level_entered_at: now,
        last_escalated_at: None,
        history: vec![submit_entry],
        created_at: now,
        updated_at: now,
    };
    workflow.check_invariants()?;
    Ok(workflow)
}

fn build_auto_approved(
    workflow_id: WorkflowId,
    order: &PurchaseOrder,
    rule: &ApprovalRule,
    now: DateTime<Utc>,
) -> ApprovalWorkflow {
    let levels = LevelKind::ORDER
        .into_iter()
        .map(|kind| {
            let requirement = rule.requirement(kind);
            ApprovalLevel {
                kind,
                status: if requirement.required {
                    LevelStatus::Skipped
                } else {
                    LevelStatus::NotRequired
                },
                is_required: requirement.required,
                is_current: false,
                approver: requirement.approvers.first().cloned(),
                candidates: requirement.approvers.clone(),
                approved_at: None,
                comments: None,
            }
        })
        .collect();

    let threshold = rule
        .auto_approve_below
        .map(|value| value.to_string())
        .unwrap_or_else(|| "unset".to_string());
    let entry = ApprovalHistoryItem::chained(
        None,
        workflow_id.clone(),
        None,
        WorkflowAction::AutoApprove,
        SYSTEM_ACTOR,
        Some(format!(
            "amount {} is below rule `{}` auto-approval threshold {}",
            order.amount, rule.id.0, threshold
        )),
        WorkflowStatus::Draft,
        WorkflowStatus::FinalApproved,
        order.amount,
        now,
    );

    ApprovalWorkflow {
        id: workflow_id,
        order: order.clone(),
        rule_id: rule.id.clone(),
        status: WorkflowStatus::FinalApproved,
        version: 1,
        levels,
        escalation_count: 0,
        escalation_days: rule.escalation_days,
        submitted_at: now,
        last_level_entered_at: now,
        last_escalated_at: None,
        history: vec![entry],
        created_at: now,
        updated_at: now,
    }
}
