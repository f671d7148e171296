pub mod config;
pub mod domain;
pub mod engine;
pub mod errors;
pub mod notify;
pub mod rules;
pub mod store;

pub use chrono;
pub use rust_decimal;

pub use domain::history::{verify_chain, ApprovalHistoryItem, ChainVerification, WorkflowAction};
pub use domain::order::{OrderId, PurchaseOrder};
pub use domain::rule::{ApprovalRule, LevelKind, LevelRequirement, RuleId};
pub use domain::workflow::{
    ApprovalLevel, ApprovalWorkflow, LevelStatus, WorkflowId, WorkflowStatus,
};
pub use engine::{
    ActionCommand, RequestedAction, SweepReport, TransitionOutcome, WorkflowEngine,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use notify::{NotificationKind, Notifier, NoopNotifier, RecordingNotifier};
pub use store::{
    InMemoryRuleStore, InMemoryWorkflowStore, RuleStore, StoreError, WorkflowStore,
};
