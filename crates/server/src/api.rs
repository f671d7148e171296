use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use countersign_core::domain::order::{OrderId, PurchaseOrder};
use countersign_core::domain::rule::{ApprovalRule, LevelRequirement, RuleId};
use countersign_core::domain::workflow::WorkflowId;
use countersign_core::engine::{ActionCommand, RequestedAction, WorkflowEngine};
use countersign_core::errors::{ApplicationError, InterfaceError};
use countersign_core::store::{RuleStore, StoreError, WorkflowStore};
use countersign_db::{SqlRuleStore, SqlWorkflowStore};

use crate::notify::ServerNotifier;

pub type Engine = WorkflowEngine<SqlWorkflowStore, SqlRuleStore, ServerNotifier>;

#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<Engine>,
    pub workflows: Arc<SqlWorkflowStore>,
    pub rules: Arc<SqlRuleStore>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/workflows", post(submit_workflow).get(list_open_workflows))
        .route("/workflows/{id}", get(get_workflow))
        .route("/workflows/{id}/actions", post(apply_action))
        .route("/rules", get(list_rules).post(create_rule))
        .route("/rules/{id}", axum::routing::put(update_rule).delete(delete_rule))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct SubmitWorkflowRequest {
    pub order_id: String,
    pub order_number: String,
    pub amount: Decimal,
    pub department: String,
    pub submitted_by: String,
}

#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    pub actor: String,
    pub action: RequestedAction,
    pub comments: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: &'static str,
    pub correlation_id: String,
    pub retryable: bool,
}

pub struct ApiError(InterfaceError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            InterfaceError::BadRequest { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            InterfaceError::Forbidden { .. } => StatusCode::FORBIDDEN,
            InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
            InterfaceError::Conflict { .. } => StatusCode::CONFLICT,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let correlation_id = match &self.0 {
            InterfaceError::BadRequest { correlation_id, .. }
            | InterfaceError::Forbidden { correlation_id, .. }
            | InterfaceError::NotFound { correlation_id, .. }
            | InterfaceError::Conflict { correlation_id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id, .. }
            | InterfaceError::Internal { correlation_id, .. } => correlation_id.clone(),
        };
        let body = ErrorBody {
            error: self.0.to_string(),
            message: self.0.user_message(),
            correlation_id,
            retryable: self.0.is_retryable(),
        };
        (status, Json(body)).into_response()
    }
}

fn interface(error: ApplicationError, correlation_id: &str) -> ApiError {
    tracing::warn!(
        event_name = "api.request_failed",
        correlation_id = %correlation_id,
        error = %error,
        "request failed"
    );
    ApiError(error.into_interface(correlation_id))
}

fn store_interface(error: StoreError, correlation_id: &str) -> ApiError {
    interface(ApplicationError::Persistence(error.to_string()), correlation_id)
}

fn correlation_id() -> String {
    Uuid::new_v4().to_string()
}

async fn submit_workflow(
    State(state): State<ApiState>,
    Json(request): Json<SubmitWorkflowRequest>,
) -> Result<Response, ApiError> {
    let correlation = correlation_id();
    let order = PurchaseOrder {
        id: OrderId(request.order_id),
        order_number: request.order_number,
        amount: request.amount,
        department: request.department,
        submitted_by: request.submitted_by,
        created_at: Utc::now(),
    };

    let workflow = state
        .engine
        .submit(order)
        .await
        .map_err(|error| interface(error, &correlation))?;

    Ok((StatusCode::CREATED, Json(workflow)).into_response())
}

async fn get_workflow(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let correlation = correlation_id();
    let workflow = state
        .engine
        .get(&WorkflowId(id))
        .await
        .map_err(|error| interface(error, &correlation))?;

    Ok(Json(workflow).into_response())
}

/// Open approvals: every workflow currently waiting on an approver.
async fn list_open_workflows(State(state): State<ApiState>) -> Result<Response, ApiError> {
    let correlation = correlation_id();
    let workflows = state
        .workflows
        .list_actionable()
        .await
        .map_err(|error| store_interface(error, &correlation))?;

    Ok(Json(workflows).into_response())
}

async fn apply_action(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(request): Json<ActionRequest>,
) -> Result<Response, ApiError> {
    let correlation = correlation_id();
    let command = ActionCommand {
        actor: request.actor,
        action: request.action,
        comments: request.comments,
    };

    let workflow = state
        .engine
        .apply_action(&WorkflowId(id), command)
        .await
        .map_err(|error| interface(error, &correlation))?;

    Ok(Json(workflow).into_response())
}

#[derive(Debug, Deserialize)]
pub struct RulePayload {
    pub name: String,
    pub priority: i32,
    pub min_amount: Decimal,
    pub max_amount: Option<Decimal>,
    pub departments: Vec<String>,
    #[serde(default)]
    pub level1: LevelRequirement,
    #[serde(default)]
    pub level2: LevelRequirement,
    #[serde(default)]
    pub level3: LevelRequirement,
    #[serde(default)]
    pub finance: LevelRequirement,
    pub auto_approve_below: Option<Decimal>,
    pub escalation_days: i64,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl RulePayload {
    fn into_rule(self, id: RuleId, created_at: chrono::DateTime<Utc>) -> ApprovalRule {
        ApprovalRule {
            id,
            name: self.name,
            priority: self.priority,
            min_amount: self.min_amount,
            max_amount: self.max_amount,
            departments: self.departments,
            level1: self.level1,
            level2: self.level2,
            level3: self.level3,
            finance: self.finance,
            auto_approve_below: self.auto_approve_below,
            escalation_days: self.escalation_days,
            is_active: self.is_active,
            created_at,
            updated_at: Utc::now(),
        }
    }
}

async fn list_rules(State(state): State<ApiState>) -> Result<Response, ApiError> {
    let correlation = correlation_id();
    let rules = state
        .rules
        .list_all()
        .await
        .map_err(|error| store_interface(error, &correlation))?;

    Ok(Json(rules).into_response())
}

async fn create_rule(
    State(state): State<ApiState>,
    Json(payload): Json<RulePayload>,
) -> Result<Response, ApiError> {
    let correlation = correlation_id();
    let rule = payload.into_rule(RuleId(Uuid::new_v4().to_string()), Utc::now());

    rule.validate()
        .map_err(|error| interface(ApplicationError::Domain(error), &correlation))?;
    state
        .rules
        .save(&rule)
        .await
        .map_err(|error| store_interface(error, &correlation))?;

    Ok((StatusCode::CREATED, Json(rule)).into_response())
}

async fn update_rule(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(payload): Json<RulePayload>,
) -> Result<Response, ApiError> {
    let correlation = correlation_id();
    let rule_id = RuleId(id);

    let existing = state
        .rules
        .find_by_id(&rule_id)
        .await
        .map_err(|error| store_interface(error, &correlation))?
        .ok_or_else(|| {
            interface(
                ApplicationError::Domain(
                    countersign_core::errors::DomainError::RuleNotFound {
                        rule_id: rule_id.clone(),
                    },
                ),
                &correlation,
            )
        })?;

    let rule = payload.into_rule(rule_id, existing.created_at);
    rule.validate()
        .map_err(|error| interface(ApplicationError::Domain(error), &correlation))?;
    state
        .rules
        .save(&rule)
        .await
        .map_err(|error| store_interface(error, &correlation))?;

    Ok(Json(rule).into_response())
}

async fn delete_rule(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let correlation = correlation_id();
    let rule_id = RuleId(id);

    let existed = state
        .rules
        .deactivate(&rule_id)
        .await
        .map_err(|error| store_interface(error, &correlation))?;
    if !existed {
        return Err(interface(
            ApplicationError::Domain(countersign_core::errors::DomainError::RuleNotFound {
                rule_id,
            }),
            &correlation,
        ));
    }

    Ok(StatusCode::NO_CONTENT.into_response())
}
