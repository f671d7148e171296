use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::history::WorkflowAction;
use crate::domain::order::OrderId;
use crate::domain::rule::RuleId;
use crate::domain::workflow::{WorkflowId, WorkflowStatus};

/// Typed failures of the approval domain. Every variant is returned to the
/// caller; none are swallowed inside the engine.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("no active approval rule matches amount {amount} in department `{department}`")]
    NoApplicableRule { amount: Decimal, department: String },
    #[error("rule `{}` is misconfigured: {reason}", .rule_id.0)]
    InvalidRuleConfiguration { rule_id: RuleId, reason: String },
    #[error("actor `{actor}` is not the assigned approver for workflow `{}`", .workflow_id.0)]
    UnauthorizedActor { workflow_id: WorkflowId, actor: String },
    #[error("action {action:?} requires non-empty comments")]
    MissingComments { action: WorkflowAction },
    #[error("workflow `{}` was modified concurrently; re-fetch and retry", .workflow_id.0)]
    ConcurrentModification { workflow_id: WorkflowId },
    #[error("workflow `{}` is terminal ({status:?}); no further actions accepted", .workflow_id.0)]
    TerminalState { workflow_id: WorkflowId, status: WorkflowStatus },
    #[error("workflow `{}` not found", .workflow_id.0)]
    WorkflowNotFound { workflow_id: WorkflowId },
    #[error("rule `{}` not found", .rule_id.0)]
    RuleNotFound { rule_id: RuleId },
    #[error("order `{}` already has an active approval workflow", .order_id.0)]
    ActiveWorkflowExists { order_id: OrderId },
    #[error("action {action:?} is not defined for workflow status {status:?}")]
    InvalidAction { status: WorkflowStatus, action: WorkflowAction },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Forbidden { .. } => "You are not allowed to act on this approval.",
            Self::NotFound { .. } => "The requested record does not exist.",
            Self::Conflict { .. } => {
                "The approval changed while you were acting. Refresh and retry."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    /// Conflicts are the only class the caller retries automatically.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let unassigned = "unassigned".to_string();
        match value {
            ApplicationError::Domain(domain) => match domain {
                DomainError::UnauthorizedActor { .. } => {
                    Self::Forbidden { message: domain.to_string(), correlation_id: unassigned }
                }
                DomainError::WorkflowNotFound { .. } | DomainError::RuleNotFound { .. } => {
                    Self::NotFound { message: domain.to_string(), correlation_id: unassigned }
                }
                DomainError::ConcurrentModification { .. }
                | DomainError::ActiveWorkflowExists { .. } => {
                    Self::Conflict { message: domain.to_string(), correlation_id: unassigned }
                }
                DomainError::InvariantViolation(_) => {
                    Self::Internal { message: domain.to_string(), correlation_id: unassigned }
                }
                _ => Self::BadRequest { message: domain.to_string(), correlation_id: unassigned },
            },
            ApplicationError::Persistence(message) | ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id: unassigned }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: unassigned }
            }
        }
    }
}
