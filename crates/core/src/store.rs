use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::order::OrderId;
use crate::domain::rule::{ApprovalRule, RuleId};
use crate::domain::workflow::{ApprovalWorkflow, WorkflowId};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("workflow `{}` version check failed", .workflow_id.0)]
    VersionConflict { workflow_id: WorkflowId },
    #[error("store backend failure: {0}")]
    Backend(String),
}

/// Persistence boundary for the workflow aggregate. `update` must commit the
/// whole aggregate (workflow, levels, history) atomically and fail with
/// `VersionConflict` when the stored revision no longer matches
/// `expected_version`.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn find_by_id(&self, id: &WorkflowId) -> Result<Option<ApprovalWorkflow>, StoreError>;

    async fn find_by_order_id(
        &self,
        order_id: &OrderId,
    ) -> Result<Option<ApprovalWorkflow>, StoreError>;

    async fn insert(&self, workflow: &ApprovalWorkflow) -> Result<(), StoreError>;

    async fn update(
        &self,
        workflow: &ApprovalWorkflow,
        expected_version: u32,
    ) -> Result<(), StoreError>;

    /// Non-terminal workflows with a current level, for the escalation sweep.
    async fn list_actionable(&self) -> Result<Vec<ApprovalWorkflow>, StoreError>;
}

#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn find_by_id(&self, id: &RuleId) -> Result<Option<ApprovalRule>, StoreError>;

    async fn list_active(&self) -> Result<Vec<ApprovalRule>, StoreError>;

    async fn list_all(&self) -> Result<Vec<ApprovalRule>, StoreError>;

    async fn save(&self, rule: &ApprovalRule) -> Result<(), StoreError>;

    /// Soft delete: rules referenced by historical workflows are never
    /// removed, only deactivated. Returns whether the rule existed.
    async fn deactivate(&self, id: &RuleId) -> Result<bool, StoreError>;
}

#[derive(Clone, Default)]
pub struct InMemoryWorkflowStore {
    workflows: Arc<Mutex<HashMap<String, ApprovalWorkflow>>>,
}

impl InMemoryWorkflowStore {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ApprovalWorkflow>> {
        match self.workflows.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn find_by_id(&self, id: &WorkflowId) -> Result<Option<ApprovalWorkflow>, StoreError> {
        Ok(self.lock().get(&id.0).cloned())
    }

    async fn find_by_order_id(
        &self,
        order_id: &OrderId,
    ) -> Result<Option<ApprovalWorkflow>, StoreError> {
        // Newest instance wins; earlier terminal instances stay for audit.
        Ok(self
            .lock()
            .values()
            .filter(|workflow| workflow.order.id == *order_id)
            .max_by(|left, right| {
                left.created_at.cmp(&right.created_at).then_with(|| left.id.0.cmp(&right.id.0))
            })
            .cloned())
    }

    async fn insert(&self, workflow: &ApprovalWorkflow) -> Result<(), StoreError> {
        self.lock().insert(workflow.id.0.clone(), workflow.clone());
        Ok(())
    }

    async fn update(
        &self,
        workflow: &ApprovalWorkflow,
        expected_version: u32,
    ) -> Result<(), StoreError> {
        let mut workflows = self.lock();
        match workflows.get(&workflow.id.0) {
            Some(stored) if stored.version == expected_version => {
                workflows.insert(workflow.id.0.clone(), workflow.clone());
                Ok(())
            }
            Some(_) => Err(StoreError::VersionConflict { workflow_id: workflow.id.clone() }),
            None => Err(StoreError::Backend(format!(
                "workflow `{}` missing during versioned update",
                workflow.id.0
            ))),
        }
    }

    async fn list_actionable(&self) -> Result<Vec<ApprovalWorkflow>, StoreError> {
        let mut actionable: Vec<ApprovalWorkflow> = self
            .lock()
            .values()
            .filter(|workflow| !workflow.is_terminal() && workflow.current_level().is_some())
            .cloned()
            .collect();
        actionable.sort_by(|left, right| left.id.0.cmp(&right.id.0));
        Ok(actionable)
    }
}

#[derive(Clone, Default)]
pub struct InMemoryRuleStore {
    rules: Arc<Mutex<HashMap<String, ApprovalRule>>>,
}

impl InMemoryRuleStore {
    pub fn with_rules(rules: Vec<ApprovalRule>) -> Self {
        let store = Self::default();
        {
            let mut guard = store.lock();
            for rule in rules {
                guard.insert(rule.id.0.clone(), rule);
            }
        }
        store
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ApprovalRule>> {
        match self.rules.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl RuleStore for InMemoryRuleStore {
    async fn find_by_id(&self, id: &RuleId) -> Result<Option<ApprovalRule>, StoreError> {
        Ok(self.lock().get(&id.0).cloned())
    }

    async fn list_active(&self) -> Result<Vec<ApprovalRule>, StoreError> {
        let mut rules: Vec<ApprovalRule> =
            self.lock().values().filter(|rule| rule.is_active).cloned().collect();
        rules.sort_by(|left, right| left.id.0.cmp(&right.id.0));
        Ok(rules)
    }

    async fn list_all(&self) -> Result<Vec<ApprovalRule>, StoreError> {
        let mut rules: Vec<ApprovalRule> = self.lock().values().cloned().collect();
        rules.sort_by(|left, right| left.id.0.cmp(&right.id.0));
        Ok(rules)
    }

    async fn save(&self, rule: &ApprovalRule) -> Result<(), StoreError> {
        self.lock().insert(rule.id.0.clone(), rule.clone());
        Ok(())
    }

    async fn deactivate(&self, id: &RuleId) -> Result<bool, StoreError> {
        let mut rules = self.lock();
        match rules.get_mut(&id.0) {
            Some(rule) => {
                rule.is_active = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
