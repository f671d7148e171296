pub mod builder;
pub mod escalation;
pub mod replay;
pub mod transitions;

use chrono::{DateTime, Utc};

use crate::domain::order::PurchaseOrder;
use crate::domain::workflow::{ApprovalWorkflow, WorkflowId, WorkflowStatus};
use crate::errors::{ApplicationError, DomainError};
use crate::notify::{NotificationKind, Notifier};
use crate::rules;
use crate::store::{RuleStore, StoreError, WorkflowStore};

pub use escalation::SweepReport;
pub use transitions::{ActionCommand, RequestedAction, TransitionOutcome};

/// The workflow engine owns every mutation of the approval aggregate:
/// submission, actor decisions, resubmission, and the escalation sweep.
/// Commits go through the store's versioned update so concurrent writers
/// against the same workflow serialize; the loser sees
/// `ConcurrentModification` and must re-fetch.
pub struct WorkflowEngine<W, R, N> {
    workflows: W,
    rules: R,
    notifier: N,
}

impl<W, R, N> WorkflowEngine<W, R, N>
where
    W: WorkflowStore,
    R: RuleStore,
    N: Notifier,
{
    pub fn new(workflows: W, rules: R, notifier: N) -> Self {
        Self { workflows, rules, notifier }
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Submitting an order resolves the applicable rule, materializes the
    /// workflow, and persists it. Orders below the rule's auto-approval
    /// threshold come back terminal.
    pub async fn submit(&self, order: PurchaseOrder) -> Result<ApprovalWorkflow, ApplicationError> {
        if let Some(existing) =
            self.workflows.find_by_order_id(&order.id).await.map_err(store_failure)?
        {
            if !existing.is_terminal() {
                return Err(DomainError::ActiveWorkflowExists { order_id: order.id }.into());
            }
        }

        let active_rules = self.rules.list_active().await.map_err(store_failure)?;
        let rule = rules::resolve(&active_rules, order.amount, &order.department)?;
        let workflow = builder::build(&order, &rule, Utc::now())?;
        self.workflows.insert(&workflow).await.map_err(store_failure)?;

        tracing::info!(
            event_name = "workflow.submitted",
            workflow_id = %workflow.id.0,
            order_id = %workflow.order.id.0,
            rule_id = %workflow.rule_id.0,
            status = %workflow.status.encode(),
            "approval workflow created"
        );

        match workflow.status {
            WorkflowStatus::FinalApproved => {
                self.dispatch(
                    &workflow.id,
                    &[(workflow.order.submitted_by.clone(), NotificationKind::AutoApproved)],
                )
                .await;
            }
            _ => {
                if let Some(approver) =
                    workflow.current_level().and_then(|level| level.approver.clone())
                {
                    self.dispatch(
                        &workflow.id,
                        &[(approver, NotificationKind::ApprovalRequested)],
                    )
                    .await;
                }
            }
        }

        Ok(workflow)
    }

    pub async fn get(&self, id: &WorkflowId) -> Result<ApprovalWorkflow, ApplicationError> {
        self.workflows
            .find_by_id(id)
            .await
            .map_err(store_failure)?
            .ok_or_else(|| DomainError::WorkflowNotFound { workflow_id: id.clone() }.into())
    }

    /// Runs one actor action through the state machine and commits the
    /// result against the revision that was loaded. A lost commit race
    /// surfaces as `ConcurrentModification`; the caller re-fetches and
    /// retries against the refreshed state.
    pub async fn apply_action(
        &self,
        id: &WorkflowId,
        cmd: ActionCommand,
    ) -> Result<ApprovalWorkflow, ApplicationError> {
        let workflow = self.get(id).await?;
        let expected_version = workflow.version;

        let outcome = transitions::apply(&workflow, &cmd, Utc::now())?;
        let mut updated = outcome.workflow;
        updated.version = expected_version + 1;

        self.workflows.update(&updated, expected_version).await.map_err(store_failure)?;

        tracing::info!(
            event_name = "workflow.action_applied",
            workflow_id = %updated.id.0,
            actor = %cmd.actor,
            action = %cmd.action.as_history_action().as_str(),
            status = %updated.status.encode(),
            version = updated.version,
            "workflow action committed"
        );

        let notifications: Vec<(String, NotificationKind)> = outcome
            .notifications
            .into_iter()
            .map(|notification| (notification.recipient, notification.kind))
            .collect();
        self.dispatch(&updated.id, &notifications).await;

        Ok(updated)
    }

    /// One escalation sweep. Overdue workflows get their counter bumped and
    /// an `escalate` history entry, at most once per UTC day. Workflows that
    /// lose the commit race to a concurrent actor are skipped; the next
    /// sweep catches them if they are still overdue.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<SweepReport, ApplicationError> {
        let candidates = self.workflows.list_actionable().await.map_err(store_failure)?;
        let mut report = SweepReport { scanned: candidates.len(), ..SweepReport::default() };

        for workflow in candidates {
            if !escalation::due_for_escalation(&workflow, now) {
                continue;
            }

            let expected_version = workflow.version;
            let mut escalated = escalation::escalate(&workflow, now)?;
            escalated.version = expected_version + 1;

            match self.workflows.update(&escalated, expected_version).await {
                Ok(()) => {
                    tracing::info!(
                        event_name = "workflow.escalated",
                        workflow_id = %escalated.id.0,
                        escalation_count = escalated.escalation_count,
                        "overdue workflow escalated"
                    );
                    if let Some(approver) =
                        escalated.current_level().and_then(|level| level.approver.clone())
                    {
                        self.dispatch(
                            &escalated.id,
                            &[(approver, NotificationKind::Escalated)],
                        )
                        .await;
                    }
                    report.escalated.push(escalated.id.clone());
                }
                Err(StoreError::VersionConflict { workflow_id }) => {
                    tracing::debug!(
                        event_name = "workflow.escalation_skipped",
                        workflow_id = %workflow_id.0,
                        "an actor committed first; leaving the workflow to the next sweep"
                    );
                    report.conflicts.push(workflow_id);
                }
                Err(error) => return Err(store_failure(error)),
            }
        }

        Ok(report)
    }

    /// Delivery is fire-and-forget: failures are logged and never affect the
    /// transition that already committed.
    async fn dispatch(&self, workflow_id: &WorkflowId, notifications: &[(String, NotificationKind)]) {
        for (recipient, kind) in notifications {
            if let Err(error) = self.notifier.notify(recipient, workflow_id, *kind).await {
                tracing::warn!(
                    event_name = "workflow.notification_failed",
                    workflow_id = %workflow_id.0,
                    recipient = %recipient,
                    kind = %kind.as_str(),
                    error = %error,
                    "notification delivery failed"
                );
            }
        }
    }
}

fn store_failure(error: StoreError) -> ApplicationError {
    match error {
        StoreError::VersionConflict { workflow_id } => {
            DomainError::ConcurrentModification { workflow_id }.into()
        }
        StoreError::Backend(message) => ApplicationError::Persistence(message),
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use super::{ActionCommand, RequestedAction, WorkflowEngine};
    use crate::domain::order::{OrderId, PurchaseOrder};
    use crate::domain::rule::{ApprovalRule, LevelKind, LevelRequirement, RuleId};
    use crate::domain::workflow::{ApprovalWorkflow, WorkflowId, WorkflowStatus};
    use crate::errors::{ApplicationError, DomainError};
    use crate::notify::{NotificationKind, RecordingNotifier};
    use crate::store::{InMemoryRuleStore, InMemoryWorkflowStore, StoreError, WorkflowStore};

    fn rule() -> ApprovalRule {
        let now = Utc::now();
        ApprovalRule {
            id: RuleId("rule-standard".to_string()),
            name: "Standard purchases".to_string(),
            priority: 10,
            min_amount: Decimal::new(50_000, 0),
            max_amount: Some(Decimal::new(500_000, 0)),
            departments: vec!["All".to_string()],
            level1: LevelRequirement::required_by(vec!["u1".to_string()]),
            level2: LevelRequirement::required_by(vec!["u2".to_string()]),
            level3: LevelRequirement::not_required(),
            finance: LevelRequirement::not_required(),
            auto_approve_below: Some(Decimal::new(10_000, 0)),
            escalation_days: 3,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn order(id: &str, amount: i64) -> PurchaseOrder {
        PurchaseOrder {
            id: OrderId(id.to_string()),
            order_number: format!("PO-2026-{id}"),
            amount: Decimal::new(amount, 0),
            department: "Operations".to_string(),
            submitted_by: "requester".to_string(),
            created_at: Utc::now(),
        }
    }

    fn engine() -> WorkflowEngine<InMemoryWorkflowStore, InMemoryRuleStore, RecordingNotifier> {
        WorkflowEngine::new(
            InMemoryWorkflowStore::default(),
            InMemoryRuleStore::with_rules(vec![rule()]),
            RecordingNotifier::default(),
        )
    }

    fn command(actor: &str, action: RequestedAction, comments: Option<&str>) -> ActionCommand {
        ActionCommand {
            actor: actor.to_string(),
            action,
            comments: comments.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn submit_then_approve_then_reject_runs_scenario() {
        let engine = engine();
        let workflow = engine.submit(order("po-1001", 125_000)).await.expect("submit");
        assert_eq!(workflow.status, WorkflowStatus::PendingApproval);

        let after_level1 = engine
            .apply_action(&workflow.id, command("u1", RequestedAction::Approve, None))
            .await
            .expect("level 1 approval");
        assert_eq!(after_level1.status, WorkflowStatus::LevelApproved(LevelKind::Level1));
        assert_eq!(after_level1.version, 2);

        let rejected = engine
            .apply_action(&workflow.id, command("u2", RequestedAction::Reject, Some("budget")))
            .await
            .expect("level 2 rejection");
        assert_eq!(rejected.status, WorkflowStatus::Rejected);

        let error = engine
            .apply_action(&workflow.id, command("u1", RequestedAction::Approve, None))
            .await
            .expect_err("terminal workflow");
        assert!(matches!(
            error,
            ApplicationError::Domain(DomainError::TerminalState { .. })
        ));
    }

    #[tokio::test]
    async fn submit_below_threshold_auto_approves_and_notifies_submitter() {
        let engine = engine();
        let workflow = engine.submit(order("po-1002", 5_000)).await.expect("submit");

        assert_eq!(workflow.status, WorkflowStatus::FinalApproved);
        assert_eq!(workflow.pending_required_levels(), 0);

        let sent = engine.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient, "requester");
        assert_eq!(sent[0].kind, NotificationKind::AutoApproved);
    }

    #[tokio::test]
    async fn submit_notifies_the_first_assigned_approver() {
        let engine = engine();
        let workflow = engine.submit(order("po-1003", 125_000)).await.expect("submit");

        let sent = engine.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient, "u1");
        assert_eq!(sent[0].kind, NotificationKind::ApprovalRequested);
        assert_eq!(sent[0].workflow_id, workflow.id);
    }

    #[tokio::test]
    async fn an_order_cannot_hold_two_active_workflows() {
        let engine = engine();
        engine.submit(order("po-1004", 125_000)).await.expect("first submit");

        let error = engine
            .submit(order("po-1004", 125_000))
            .await
            .expect_err("second submission of the same order");
        assert!(matches!(
            error,
            ApplicationError::Domain(DomainError::ActiveWorkflowExists { .. })
        ));
    }

    #[tokio::test]
    async fn a_rejected_order_may_be_submitted_again_as_a_fresh_workflow() {
        let engine = engine();
        let first = engine.submit(order("po-1008", 125_000)).await.expect("first submit");
        engine
            .apply_action(&first.id, command("u1", RequestedAction::Reject, Some("wrong vendor")))
            .await
            .expect("reject");

        let second = engine.submit(order("po-1008", 125_000)).await.expect("second submit");
        assert_ne!(second.id, first.id);
        assert_eq!(second.status, WorkflowStatus::PendingApproval);
    }

    #[tokio::test]
    async fn amount_outside_every_rule_band_is_an_error() {
        let engine = engine();
        let error = engine
            .submit(order("po-1005", 900_000))
            .await
            .expect_err("no rule covers 900k");
        assert!(matches!(
            error,
            ApplicationError::Domain(DomainError::NoApplicableRule { .. })
        ));
    }

    #[tokio::test]
    async fn tick_escalates_overdue_workflows_exactly_once_per_day() {
        let store = InMemoryWorkflowStore::default();
        let engine = WorkflowEngine::new(
            store.clone(),
            InMemoryRuleStore::with_rules(vec![rule()]),
            RecordingNotifier::default(),
        );

        let workflow = engine.submit(order("po-1006", 125_000)).await.expect("submit");

        // Age the workflow past the 3-day window.
        let mut aged = store.find_by_id(&workflow.id).await.expect("find").expect("exists");
        aged.last_level_entered_at = Utc::now() - Duration::days(4);
        let version = aged.version;
        store.update(&aged, version).await.expect("age workflow");

        let now = Utc::now();
        let first = engine.tick(now).await.expect("first sweep");
        assert_eq!(first.escalated.len(), 1);

        let second = engine.tick(now).await.expect("second sweep");
        assert!(second.escalated.is_empty(), "same-day sweep must be idempotent");

        let stored = store.find_by_id(&workflow.id).await.expect("find").expect("exists");
        assert_eq!(stored.escalation_count, 1);

        let escalations = engine
            .notifier
            .sent()
            .into_iter()
            .filter(|notification| notification.kind == NotificationKind::Escalated)
            .count();
        assert_eq!(escalations, 1);
    }

    /// Store wrapper that lets a competing writer slip in between the
    /// engine's read and its versioned commit.
    #[derive(Clone)]
    struct InterposingStore {
        inner: InMemoryWorkflowStore,
        steal: std::sync::Arc<std::sync::atomic::AtomicBool>,
    }

    #[async_trait]
    impl WorkflowStore for InterposingStore {
        async fn find_by_id(
            &self,
            id: &WorkflowId,
        ) -> Result<Option<ApprovalWorkflow>, StoreError> {
            let loaded = self.inner.find_by_id(id).await?;
            if let Some(stale) = &loaded {
                if self.steal.swap(false, std::sync::atomic::Ordering::SeqCst) {
                    // A rival approver commits against the same revision the
                    // engine just loaded.
                    let rival = crate::engine::transitions::apply(
                        stale,
                        &ActionCommand {
                            actor: "u1".to_string(),
                            action: RequestedAction::Approve,
                            comments: None,
                        },
                        Utc::now(),
                    )
                    .expect("rival transition");
                    let mut committed = rival.workflow;
                    committed.version = stale.version + 1;
                    self.inner.update(&committed, stale.version).await?;
                }
            }
            Ok(loaded)
        }

        async fn find_by_order_id(
            &self,
            order_id: &OrderId,
        ) -> Result<Option<ApprovalWorkflow>, StoreError> {
            self.inner.find_by_order_id(order_id).await
        }

        async fn insert(&self, workflow: &ApprovalWorkflow) -> Result<(), StoreError> {
            self.inner.insert(workflow).await
        }

        async fn update(
            &self,
            workflow: &ApprovalWorkflow,
            expected_version: u32,
        ) -> Result<(), StoreError> {
            self.inner.update(workflow, expected_version).await
        }

        async fn list_actionable(&self) -> Result<Vec<ApprovalWorkflow>, StoreError> {
            self.inner.list_actionable().await
        }
    }

    #[tokio::test]
    async fn losing_the_commit_race_surfaces_concurrent_modification() {
        let steal = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let store =
            InterposingStore { inner: InMemoryWorkflowStore::default(), steal: steal.clone() };
        let engine = WorkflowEngine::new(
            store.clone(),
            InMemoryRuleStore::with_rules(vec![rule()]),
            RecordingNotifier::default(),
        );

        let workflow = engine.submit(order("po-1007", 125_000)).await.expect("submit");

        // From here on, the next read triggers the rival's commit.
        steal.store(true, std::sync::atomic::Ordering::SeqCst);

        let error = engine
            .apply_action(&workflow.id, command("u1", RequestedAction::Approve, None))
            .await
            .expect_err("the slower writer must lose");
        assert!(matches!(
            error,
            ApplicationError::Domain(DomainError::ConcurrentModification { .. })
        ));

        // Exactly one of the two racing approvals took effect.
        let stored = store.find_by_id(&workflow.id).await.expect("find").expect("exists");
        assert_eq!(stored.status, WorkflowStatus::LevelApproved(LevelKind::Level1));
        assert_eq!(stored.version, 2);

        // Retrying against the refreshed state succeeds.
        let retried = engine
            .apply_action(&workflow.id, command("u2", RequestedAction::Approve, None))
            .await
            .expect("retry against refreshed state");
        assert_eq!(retried.status, WorkflowStatus::FinalApproved);
    }
}
