use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::history::ApprovalHistoryItem;
use crate::domain::order::PurchaseOrder;
use crate::domain::rule::{LevelKind, RuleId};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelStatus {
    NotRequired,
    Pending,
    Approved,
    Rejected,
    Skipped,
}

impl LevelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotRequired => "not_required",
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Skipped => "skipped",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "not_required" => Some(Self::NotRequired),
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkflowStatus {
    Draft,
    PendingApproval,
    LevelApproved(LevelKind),
    FinalApproved,
    Rejected,
    ChangesRequested,
    Cancelled,
}

// Serialized as the storage encoding (`level_2_approved`, ...) so API
// payloads and database rows read the same.
impl Serialize for WorkflowStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for WorkflowStatus {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).ok_or_else(|| {
            serde::de::Error::custom(format!("unknown workflow status `{raw}`"))
        })
    }
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::FinalApproved | Self::Rejected | Self::Cancelled)
    }

    pub fn encode(&self) -> String {
        match self {
            Self::Draft => "draft".to_string(),
            Self::PendingApproval => "pending_approval".to_string(),
            Self::LevelApproved(kind) => format!("{}_approved", kind.as_str()),
            Self::FinalApproved => "final_approved".to_string(),
            Self::Rejected => "rejected".to_string(),
            Self::ChangesRequested => "changes_requested".to_string(),
            Self::Cancelled => "cancelled".to_string(),
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "pending_approval" => Some(Self::PendingApproval),
            "final_approved" => Some(Self::FinalApproved),
            "rejected" => Some(Self::Rejected),
            "changes_requested" => Some(Self::ChangesRequested),
            "cancelled" => Some(Self::Cancelled),
            other => other
                .strip_suffix("_approved")
                .and_then(LevelKind::parse)
                .map(Self::LevelApproved),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalLevel {
    pub kind: LevelKind,
    pub status: LevelStatus,
    pub is_required: bool,
    pub is_current: bool,
    /// First-listed approver from the resolved rule; the only actor allowed
    /// to act on this level.
    pub approver: Option<String>,
    /// Full approver list from the rule, retained for escalation visibility.
    pub candidates: Vec<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub comments: Option<String>,
}

impl ApprovalLevel {
    pub fn is_awaiting_decision(&self) -> bool {
        self.is_required && self.status == LevelStatus::Pending
    }
}

/// The approval aggregate: one workflow per purchase order, carrying its
/// levels and the append-only history. All mutation flows through the
/// workflow engine; `version` backs the optimistic-concurrency commit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApprovalWorkflow {
    pub id: WorkflowId,
    pub order: PurchaseOrder,
    pub rule_id: RuleId,
    pub status: WorkflowStatus,
    pub version: u32,
    pub levels: Vec<ApprovalLevel>,
    pub escalation_count: u32,
    /// Frozen from the resolved rule at build time so the sweep does not
    /// need a rule lookup per workflow.
    pub escalation_days: i64,
    pub submitted_at: DateTime<Utc>,
    pub last_level_entered_at: DateTime<Utc>,
    pub last_escalated_at: Option<DateTime<Utc>>,
    pub history: Vec<ApprovalHistoryItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApprovalWorkflow {
    pub fn current_level(&self) -> Option<&ApprovalLevel> {
        self.levels.iter().find(|level| level.is_current)
    }

    pub fn current_level_mut(&mut self) -> Option<&mut ApprovalLevel> {
        self.levels.iter_mut().find(|level| level.is_current)
    }

    pub fn level(&self, kind: LevelKind) -> Option<&ApprovalLevel> {
        self.levels.iter().find(|level| level.kind == kind)
    }

    pub fn level_mut(&mut self, kind: LevelKind) -> Option<&mut ApprovalLevel> {
        self.levels.iter_mut().find(|level| level.kind == kind)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Next required pending level after `after` in the fixed progression
    /// order.
    pub fn next_pending_level(&self, after: LevelKind) -> Option<LevelKind> {
        self.levels
            .iter()
            .filter(|level| level.kind.rank() > after.rank())
            .find(|level| level.is_awaiting_decision())
            .map(|level| level.kind)
    }

    pub fn pending_required_levels(&self) -> usize {
        self.levels.iter().filter(|level| level.is_awaiting_decision()).count()
    }

    /// Structural invariants re-checked after every mutation. The stored
    /// status must agree with what the level statuses imply; a divergence
    /// means the engine (the only legal writer) has a bug.
    pub fn check_invariants(&self) -> Result<(), DomainError> {
        if self.levels.len() != LevelKind::ORDER.len() {
            return Err(DomainError::InvariantViolation(format!(
                "workflow {} must carry exactly {} levels, found {}",
                self.id.0,
                LevelKind::ORDER.len(),
                self.levels.len()
            )));
        }
        for (position, kind) in LevelKind::ORDER.iter().enumerate() {
            if self.levels[position].kind != *kind {
                return Err(DomainError::InvariantViolation(format!(
                    "workflow {} levels out of order at position {position}",
                    self.id.0
                )));
            }
        }

        let current_count = self.levels.iter().filter(|level| level.is_current).count();
        if current_count > 1 {
            return Err(DomainError::InvariantViolation(format!(
                "workflow {} has {} current levels",
                self.id.0, current_count
            )));
        }

        let any_rejected =
            self.levels.iter().any(|level| level.status == LevelStatus::Rejected);
        let pending_required = self.pending_required_levels();

        match self.status {
            WorkflowStatus::PendingApproval | WorkflowStatus::LevelApproved(_) => {
                if current_count != 1 {
                    return Err(DomainError::InvariantViolation(format!(
                        "actionable workflow {} must have exactly one current level",
                        self.id.0
                    )));
                }
                if pending_required == 0 {
                    return Err(DomainError::InvariantViolation(format!(
                        "actionable workflow {} has no pending required levels",
                        self.id.0
                    )));
                }
            }
            WorkflowStatus::Rejected => {
                if !any_rejected {
                    return Err(DomainError::InvariantViolation(format!(
                        "rejected workflow {} has no rejected level",
                        self.id.0
                    )));
                }
            }
            WorkflowStatus::FinalApproved => {
                if pending_required > 0 || any_rejected {
                    return Err(DomainError::InvariantViolation(format!(
                        "final-approved workflow {} still has open or rejected levels",
                        self.id.0
                    )));
                }
            }
            WorkflowStatus::Draft | WorkflowStatus::ChangesRequested => {
                if current_count != 0 {
                    return Err(DomainError::InvariantViolation(format!(
                        "workflow {} awaiting resubmission must have no current level",
                        self.id.0
                    )));
                }
            }
            // Cancellation clears currency and freezes level statuses.
            WorkflowStatus::Cancelled => {
                if current_count != 0 {
                    return Err(DomainError::InvariantViolation(format!(
                        "cancelled workflow {} must have no current level",
                        self.id.0
                    )));
                }
            }
        }

        Ok(())
    }
}
