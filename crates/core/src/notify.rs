use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::workflow::WorkflowId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ApprovalRequested,
    AutoApproved,
    FinalApproved,
    Rejected,
    ChangesRequested,
    Escalated,
    Cancelled,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ApprovalRequested => "approval_requested",
            Self::AutoApproved => "auto_approved",
            Self::FinalApproved => "final_approved",
            Self::Rejected => "rejected",
            Self::ChangesRequested => "changes_requested",
            Self::Escalated => "escalated",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Fire-and-forget delivery to approvers and submitters. Delivery failure
/// must never roll back a workflow transition that already committed; the
/// engine logs the error and moves on.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        recipient: &str,
        workflow_id: &WorkflowId,
        kind: NotificationKind,
    ) -> Result<(), String>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedNotification {
    pub recipient: String,
    pub workflow_id: WorkflowId,
    pub kind: NotificationKind,
}

#[derive(Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<RecordedNotification>>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<RecordedNotification> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(
        &self,
        recipient: &str,
        workflow_id: &WorkflowId,
        kind: NotificationKind,
    ) -> Result<(), String> {
        let record = RecordedNotification {
            recipient: recipient.to_string(),
            workflow_id: workflow_id.clone(),
            kind,
        };
        match self.sent.lock() {
            Ok(mut sent) => sent.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
        Ok(())
    }
}

/// Discards everything; used when no webhook endpoint is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(
        &self,
        _recipient: &str,
        _workflow_id: &WorkflowId,
        _kind: NotificationKind,
    ) -> Result<(), String> {
        Ok(())
    }
}
