use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::domain::rule::LevelKind;
use crate::domain::workflow::{WorkflowId, WorkflowStatus};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowAction {
    Submit,
    Approve,
    Reject,
    RequestChanges,
    Escalate,
    Cancel,
    AutoApprove,
}

impl WorkflowAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::RequestChanges => "request_changes",
            Self::Escalate => "escalate",
            Self::Cancel => "cancel",
            Self::AutoApprove => "auto_approve",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "submit" => Some(Self::Submit),
            "approve" => Some(Self::Approve),
            "reject" => Some(Self::Reject),
            "request_changes" => Some(Self::RequestChanges),
            "escalate" => Some(Self::Escalate),
            "cancel" => Some(Self::Cancel),
            "auto_approve" => Some(Self::AutoApprove),
            _ => None,
        }
    }
}

/// One append-only compliance record per workflow mutation. `po_amount` is a
/// snapshot taken at action time; it is never recomputed if the order is
/// edited later. Entries chain through `prev_hash`/`entry_hash` so tampering
/// with a stored row is detectable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApprovalHistoryItem {
    pub id: String,
    pub workflow_id: WorkflowId,
    /// 1-based position within the workflow's history.
    pub seq: u32,
    pub level: Option<LevelKind>,
    pub action: WorkflowAction,
    pub actor: String,
    pub comments: Option<String>,
    pub previous_status: WorkflowStatus,
    pub new_status: WorkflowStatus,
    pub po_amount: Decimal,
    pub prev_hash: Option<String>,
    pub entry_hash: String,
    pub occurred_at: DateTime<Utc>,
}

impl ApprovalHistoryItem {
    /// Builds the next entry of a workflow's chain. `previous` must be the
    /// current tail of the history, or `None` for the first entry.
    #[allow(clippy::too_many_arguments)]
    pub fn chained(
        previous: Option<&ApprovalHistoryItem>,
        workflow_id: WorkflowId,
        level: Option<LevelKind>,
        action: WorkflowAction,
        actor: impl Into<String>,
        comments: Option<String>,
        previous_status: WorkflowStatus,
        new_status: WorkflowStatus,
        po_amount: Decimal,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        let actor = actor.into();
        let seq = previous.map(|entry| entry.seq).unwrap_or(0).saturating_add(1);
        let prev_hash = previous.map(|entry| entry.entry_hash.clone());
        let entry_hash = hash_entry_material(
            &workflow_id,
            seq,
            level,
            action,
            &actor,
            previous_status,
            new_status,
            po_amount,
            prev_hash.as_deref(),
            occurred_at,
        );

        Self {
            id: Uuid::new_v4().to_string(),
            workflow_id,
            seq,
            level,
            action,
            actor,
            comments,
            previous_status,
            new_status,
            po_amount,
            prev_hash,
            entry_hash,
            occurred_at,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainVerification {
    pub valid: bool,
    pub verified_entries: usize,
    pub failure_reason: Option<String>,
}

/// Walks a workflow's history and re-derives every entry hash. Any edited,
/// dropped, or reordered row breaks the chain at the first bad link.
pub fn verify_chain(entries: &[ApprovalHistoryItem]) -> ChainVerification {
    let mut previous_hash: Option<&str> = None;

    for (index, entry) in entries.iter().enumerate() {
        let expected_seq = u32::try_from(index).unwrap_or(u32::MAX).saturating_add(1);
        if entry.seq != expected_seq {
            return ChainVerification {
                valid: false,
                verified_entries: index,
                failure_reason: Some(format!(
                    "sequence mismatch at entry {}: expected {}, found {}",
                    entry.id, expected_seq, entry.seq
                )),
            };
        }

        if entry.prev_hash.as_deref() != previous_hash {
            return ChainVerification {
                valid: false,
                verified_entries: index,
                failure_reason: Some(format!("previous hash mismatch at entry {}", entry.id)),
            };
        }

        let computed = hash_entry_material(
            &entry.workflow_id,
            entry.seq,
            entry.level,
            entry.action,
            &entry.actor,
            entry.previous_status,
            entry.new_status,
            entry.po_amount,
            entry.prev_hash.as_deref(),
            entry.occurred_at,
        );
        if computed != entry.entry_hash {
            return ChainVerification {
                valid: false,
                verified_entries: index,
                failure_reason: Some(format!("entry hash mismatch at entry {}", entry.id)),
            };
        }

        previous_hash = Some(entry.entry_hash.as_str());
    }

    ChainVerification { valid: true, verified_entries: entries.len(), failure_reason: None }
}

#[allow(clippy::too_many_arguments)]
fn hash_entry_material(
    workflow_id: &WorkflowId,
    seq: u32,
    level: Option<LevelKind>,
    action: WorkflowAction,
    actor: &str,
    previous_status: WorkflowStatus,
    new_status: WorkflowStatus,
    po_amount: Decimal,
    prev_hash: Option<&str>,
    occurred_at: DateTime<Utc>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(workflow_id.0.as_bytes());
    hasher.update(seq.to_be_bytes());
    hasher.update(level.map(|kind| kind.as_str()).unwrap_or("-").as_bytes());
    hasher.update(action.as_str().as_bytes());
    hasher.update(actor.as_bytes());
    hasher.update(previous_status.encode().as_bytes());
    hasher.update(new_status.encode().as_bytes());
    hasher.update(po_amount.to_string().as_bytes());
    hasher.update(prev_hash.unwrap_or("-").as_bytes());
    hasher.update(occurred_at.to_rfc3339().as_bytes());
    hex_digest(hasher)
}

fn hex_digest(hasher: Sha256) -> String {
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(out, "{byte:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::{verify_chain, ApprovalHistoryItem, WorkflowAction};
    use crate::domain::rule::LevelKind;
    use crate::domain::workflow::{WorkflowId, WorkflowStatus};

    fn entry(previous: Option<&ApprovalHistoryItem>) -> ApprovalHistoryItem {
        ApprovalHistoryItem::chained(
            previous,
            WorkflowId("wf-1".to_string()),
            Some(LevelKind::Level1),
            WorkflowAction::Approve,
            "u1",
            None,
            WorkflowStatus::PendingApproval,
            WorkflowStatus::LevelApproved(LevelKind::Level1),
            Decimal::new(125_000, 0),
            Utc::now(),
        )
    }

    #[test]
    fn chained_entries_link_and_verify() {
        let first = entry(None);
        let second = entry(Some(&first));
        let third = entry(Some(&second));

        assert_eq!(first.seq, 1);
        assert_eq!(second.seq, 2);
        assert_eq!(second.prev_hash.as_deref(), Some(first.entry_hash.as_str()));

        let verification = verify_chain(&[first, second, third]);
        assert!(verification.valid);
        assert_eq!(verification.verified_entries, 3);
    }

    #[test]
    fn tampered_amount_breaks_the_chain() {
        let first = entry(None);
        let mut second = entry(Some(&first));
        second.po_amount = Decimal::new(1, 0);

        let verification = verify_chain(&[first, second]);
        assert!(!verification.valid);
        assert_eq!(verification.verified_entries, 1);
        assert!(verification
            .failure_reason
            .as_deref()
            .is_some_and(|reason| reason.contains("entry hash mismatch")));
    }

    #[test]
    fn dropped_entry_breaks_the_chain() {
        let first = entry(None);
        let second = entry(Some(&first));
        let third = entry(Some(&second));

        let verification = verify_chain(&[first, third]);
        assert!(!verification.valid);
        assert_eq!(verification.verified_entries, 1);
    }

    #[test]
    fn action_round_trips_from_storage_encoding() {
        let cases = [
            WorkflowAction::Submit,
            WorkflowAction::Approve,
            WorkflowAction::Reject,
            WorkflowAction::RequestChanges,
            WorkflowAction::Escalate,
            WorkflowAction::Cancel,
            WorkflowAction::AutoApprove,
        ];

        for action in cases {
            assert_eq!(WorkflowAction::parse(action.as_str()), Some(action));
        }
    }
}
