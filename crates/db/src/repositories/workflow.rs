use async_trait::async_trait;
use sqlx::{sqlite::SqliteRow, Row};

use countersign_core::domain::history::{ApprovalHistoryItem, WorkflowAction};
use countersign_core::domain::order::{OrderId, PurchaseOrder};
use countersign_core::domain::rule::{LevelKind, RuleId};
use countersign_core::domain::workflow::{
    ApprovalLevel, ApprovalWorkflow, LevelStatus, WorkflowId, WorkflowStatus,
};
use countersign_core::store::{StoreError, WorkflowStore};

use super::{
    backend, decode, encode_string_list, parse_datetime, parse_datetime_opt, parse_decimal,
    parse_string_list,
};
use crate::DbPool;

/// SQLite-backed workflow aggregate store. The aggregate (workflow row,
/// level rows, history rows) commits inside one transaction; `update` is
/// guarded by `WHERE version = ?`, so the slower of two racing writers
/// observes a version conflict instead of overwriting.
pub struct SqlWorkflowStore {
    pool: DbPool,
}

impl SqlWorkflowStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load_aggregate(&self, row: &SqliteRow) -> Result<ApprovalWorkflow, StoreError> {
        let mut workflow = row_to_workflow(row)?;

        let level_rows = sqlx::query(
            "SELECT kind, status, is_required, is_current, approver, candidates,
                    approved_at, comments
             FROM approval_level WHERE workflow_id = ?",
        )
        .bind(&workflow.id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        let mut levels =
            level_rows.iter().map(row_to_level).collect::<Result<Vec<_>, _>>()?;
        levels.sort_by_key(|level| level.kind.rank());
        workflow.levels = levels;

        let history_rows = sqlx::query(
            "SELECT id, workflow_id, seq, level, action, actor, comments,
                    previous_status, new_status, po_amount, prev_hash, entry_hash, occurred_at
             FROM approval_history WHERE workflow_id = ? ORDER BY seq ASC",
        )
        .bind(&workflow.id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        workflow.history =
            history_rows.iter().map(row_to_history_item).collect::<Result<Vec<_>, _>>()?;

        Ok(workflow)
    }
}

fn row_to_workflow(row: &SqliteRow) -> Result<ApprovalWorkflow, StoreError> {
    let id: String = row.try_get("id").map_err(|e| decode("id", e))?;
    let order_id: String = row.try_get("order_id").map_err(|e| decode("order_id", e))?;
    let order_number: String =
        row.try_get("order_number").map_err(|e| decode("order_number", e))?;
    let po_amount: String = row.try_get("po_amount").map_err(|e| decode("po_amount", e))?;
    let department: String = row.try_get("department").map_err(|e| decode("department", e))?;
    let submitted_by: String =
        row.try_get("submitted_by").map_err(|e| decode("submitted_by", e))?;
    let order_created_at: String =
        row.try_get("order_created_at").map_err(|e| decode("order_created_at", e))?;
    let rule_id: String = row.try_get("rule_id").map_err(|e| decode("rule_id", e))?;
    let status: String = row.try_get("status").map_err(|e| decode("status", e))?;
    let version: i64 = row.try_get("version").map_err(|e| decode("version", e))?;
    let escalation_count: i64 =
        row.try_get("escalation_count").map_err(|e| decode("escalation_count", e))?;
    let escalation_days: i64 =
        row.try_get("escalation_days").map_err(|e| decode("escalation_days", e))?;
    let submitted_at: String =
        row.try_get("submitted_at").map_err(|e| decode("submitted_at", e))?;
    let last_level_entered_at: String =
        row.try_get("last_level_entered_at").map_err(|e| decode("last_level_entered_at", e))?;
    let last_escalated_at: Option<String> =
        row.try_get("last_escalated_at").map_err(|e| decode("last_escalated_at", e))?;
    let created_at: String = row.try_get("created_at").map_err(|e| decode("created_at", e))?;
    let updated_at: String = row.try_get("updated_at").map_err(|e| decode("updated_at", e))?;

    Ok(ApprovalWorkflow {
        id: WorkflowId(id),
        order: PurchaseOrder {
            id: OrderId(order_id),
            order_number,
            amount: parse_decimal("po_amount", &po_amount)?,
            department,
            submitted_by,
            created_at: parse_datetime("order_created_at", &order_created_at)?,
        },
        rule_id: RuleId(rule_id),
        status: WorkflowStatus::parse(&status)
            .ok_or_else(|| decode("status", format!("unknown status `{status}`")))?,
        version: u32::try_from(version).map_err(|e| decode("version", e))?,
        levels: Vec::new(),
        escalation_count: u32::try_from(escalation_count)
            .map_err(|e| decode("escalation_count", e))?,
        escalation_days,
        submitted_at: parse_datetime("submitted_at", &submitted_at)?,
        last_level_entered_at: parse_datetime("last_level_entered_at", &last_level_entered_at)?,
        last_escalated_at: parse_datetime_opt("last_escalated_at", last_escalated_at)?,
        history: Vec::new(),
        created_at: parse_datetime("created_at", &created_at)?,
        updated_at: parse_datetime("updated_at", &updated_at)?,
    })
}

fn row_to_level(row: &SqliteRow) -> Result<ApprovalLevel, StoreError> {
    let kind: String = row.try_get("kind").map_err(|e| decode("kind", e))?;
    let status: String = row.try_get("status").map_err(|e| decode("status", e))?;
    let is_required: i64 = row.try_get("is_required").map_err(|e| decode("is_required", e))?;
    let is_current: i64 = row.try_get("is_current").map_err(|e| decode("is_current", e))?;
    let approver: Option<String> = row.try_get("approver").map_err(|e| decode("approver", e))?;
    let candidates: String = row.try_get("candidates").map_err(|e| decode("candidates", e))?;
    let approved_at: Option<String> =
        row.try_get("approved_at").map_err(|e| decode("approved_at", e))?;
    let comments: Option<String> = row.try_get("comments").map_err(|e| decode("comments", e))?;

    Ok(ApprovalLevel {
        kind: LevelKind::parse(&kind)
            .ok_or_else(|| decode("kind", format!("unknown level kind `{kind}`")))?,
        status: LevelStatus::parse(&status)
            .ok_or_else(|| decode("status", format!("unknown level status `{status}`")))?,
        is_required: is_required != 0,
        is_current: is_current != 0,
        approver,
        candidates: parse_string_list("candidates", &candidates)?,
        approved_at: parse_datetime_opt("approved_at", approved_at)?,
        comments,
    })
}

fn row_to_history_item(row: &SqliteRow) -> Result<ApprovalHistoryItem, StoreError> {
    let id: String = row.try_get("id").map_err(|e| decode("id", e))?;
    let workflow_id: String =
        row.try_get("workflow_id").map_err(|e| decode("workflow_id", e))?;
    let seq: i64 = row.try_get("seq").map_err(|e| decode("seq", e))?;
    let level: Option<String> = row.try_get("level").map_err(|e| decode("level", e))?;
    let action: String = row.try_get("action").map_err(|e| decode("action", e))?;
    let actor: String = row.try_get("actor").map_err(|e| decode("actor", e))?;
    let comments: Option<String> = row.try_get("comments").map_err(|e| decode("comments", e))?;
    let previous_status: String =
        row.try_get("previous_status").map_err(|e| decode("previous_status", e))?;
    let new_status: String = row.try_get("new_status").map_err(|e| decode("new_status", e))?;
    let po_amount: String = row.try_get("po_amount").map_err(|e| decode("po_amount", e))?;
    let prev_hash: Option<String> =
        row.try_get("prev_hash").map_err(|e| decode("prev_hash", e))?;
    let entry_hash: String = row.try_get("entry_hash").map_err(|e| decode("entry_hash", e))?;
    let occurred_at: String =
        row.try_get("occurred_at").map_err(|e| decode("occurred_at", e))?;

    let level = level
        .map(|value| {
            LevelKind::parse(&value)
                .ok_or_else(|| decode("level", format!("unknown level kind `{value}`")))
        })
        .transpose()?;

    Ok(ApprovalHistoryItem {
        id,
        workflow_id: WorkflowId(workflow_id),
        seq: u32::try_from(seq).map_err(|e| decode("seq", e))?,
        level,
        action: WorkflowAction::parse(&action)
            .ok_or_else(|| decode("action", format!("unknown action `{action}`")))?,
        actor,
        comments,
        previous_status: WorkflowStatus::parse(&previous_status)
            .ok_or_else(|| decode("previous_status", format!("`{previous_status}`")))?,
        new_status: WorkflowStatus::parse(&new_status)
            .ok_or_else(|| decode("new_status", format!("`{new_status}`")))?,
        po_amount: parse_decimal("po_amount", &po_amount)?,
        prev_hash,
        entry_hash,
        occurred_at: parse_datetime("occurred_at", &occurred_at)?,
    })
}

const WORKFLOW_COLUMNS: &str = "id, order_id, order_number, po_amount, department, submitted_by,
        order_created_at, rule_id, status, version, escalation_count, escalation_days,
        submitted_at, last_level_entered_at, last_escalated_at, created_at, updated_at";

const ACTIONABLE_STATUSES: &str =
    "'pending_approval', 'level_1_approved', 'level_2_approved', 'level_3_approved', \
     'finance_approved'";

async fn write_levels(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    workflow: &ApprovalWorkflow,
) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM approval_level WHERE workflow_id = ?")
        .bind(&workflow.id.0)
        .execute(&mut **tx)
        .await
        .map_err(backend)?;

    for level in &workflow.levels {
        sqlx::query(
            "INSERT INTO approval_level (
                workflow_id, kind, status, is_required, is_current, approver,
                candidates, approved_at, comments
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&workflow.id.0)
        .bind(level.kind.as_str())
        .bind(level.status.as_str())
        .bind(i64::from(level.is_required))
        .bind(i64::from(level.is_current))
        .bind(level.approver.as_deref())
        .bind(encode_string_list(&level.candidates))
        .bind(level.approved_at.map(|value| value.to_rfc3339()))
        .bind(level.comments.as_deref())
        .execute(&mut **tx)
        .await
        .map_err(backend)?;
    }

    Ok(())
}

/// History rows are append-only: only entries past the stored tail are
/// inserted, existing rows are never touched.
async fn append_history(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    workflow: &ApprovalWorkflow,
) -> Result<(), StoreError> {
    let stored_tail: i64 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(seq), 0) FROM approval_history WHERE workflow_id = ?",
    )
    .bind(&workflow.id.0)
    .fetch_one(&mut **tx)
    .await
    .map_err(backend)?;

    for entry in &workflow.history {
        if i64::from(entry.seq) <= stored_tail {
            continue;
        }
        sqlx::query(
            "INSERT INTO approval_history (
                id, workflow_id, seq, level, action, actor, comments,
                previous_status, new_status, po_amount, prev_hash, entry_hash, occurred_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.id)
        .bind(&entry.workflow_id.0)
        .bind(i64::from(entry.seq))
        .bind(entry.level.map(|kind| kind.as_str()))
        .bind(entry.action.as_str())
        .bind(&entry.actor)
        .bind(entry.comments.as_deref())
        .bind(entry.previous_status.encode())
        .bind(entry.new_status.encode())
        .bind(entry.po_amount.to_string())
        .bind(entry.prev_hash.as_deref())
        .bind(&entry.entry_hash)
        .bind(entry.occurred_at.to_rfc3339())
        .execute(&mut **tx)
        .await
        .map_err(backend)?;
    }

    Ok(())
}

#[async_trait]
impl WorkflowStore for SqlWorkflowStore {
    async fn find_by_id(&self, id: &WorkflowId) -> Result<Option<ApprovalWorkflow>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {WORKFLOW_COLUMNS} FROM approval_workflow WHERE id = ?"
        ))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        match row {
            Some(row) => Ok(Some(self.load_aggregate(&row).await?)),
            None => Ok(None),
        }
    }

    /// The latest workflow instance for an order. Earlier terminal
    /// instances are retained for audit but an order owns at most one
    /// active workflow, always the newest row.
    async fn find_by_order_id(
        &self,
        order_id: &OrderId,
    ) -> Result<Option<ApprovalWorkflow>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {WORKFLOW_COLUMNS} FROM approval_workflow WHERE order_id = ?
             ORDER BY created_at DESC, id DESC LIMIT 1"
        ))
        .bind(&order_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        match row {
            Some(row) => Ok(Some(self.load_aggregate(&row).await?)),
            None => Ok(None),
        }
    }

    async fn insert(&self, workflow: &ApprovalWorkflow) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        sqlx::query(
            "INSERT INTO approval_workflow (
                id, order_id, order_number, po_amount, department, submitted_by,
                order_created_at, rule_id, status, version, escalation_count, escalation_days,
                submitted_at, last_level_entered_at, last_escalated_at, created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&workflow.id.0)
        .bind(&workflow.order.id.0)
        .bind(&workflow.order.order_number)
        .bind(workflow.order.amount.to_string())
        .bind(&workflow.order.department)
        .bind(&workflow.order.submitted_by)
        .bind(workflow.order.created_at.to_rfc3339())
        .bind(&workflow.rule_id.0)
        .bind(workflow.status.encode())
        .bind(i64::from(workflow.version))
        .bind(i64::from(workflow.escalation_count))
        .bind(workflow.escalation_days)
        .bind(workflow.submitted_at.to_rfc3339())
        .bind(workflow.last_level_entered_at.to_rfc3339())
        .bind(workflow.last_escalated_at.map(|value| value.to_rfc3339()))
        .bind(workflow.created_at.to_rfc3339())
        .bind(workflow.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        write_levels(&mut tx, workflow).await?;
        append_history(&mut tx, workflow).await?;

        tx.commit().await.map_err(backend)
    }

    async fn update(
        &self,
        workflow: &ApprovalWorkflow,
        expected_version: u32,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let result = sqlx::query(
            "UPDATE approval_workflow SET
                order_number = ?,
                po_amount = ?,
                department = ?,
                submitted_by = ?,
                status = ?,
                version = ?,
                escalation_count = ?,
                escalation_days = ?,
                submitted_at = ?,
                last_level_entered_at = ?,
                last_escalated_at = ?,
                updated_at = ?
             WHERE id = ? AND version = ?",
        )
        .bind(&workflow.order.order_number)
        .bind(workflow.order.amount.to_string())
        .bind(&workflow.order.department)
        .bind(&workflow.order.submitted_by)
        .bind(workflow.status.encode())
        .bind(i64::from(workflow.version))
        .bind(i64::from(workflow.escalation_count))
        .bind(workflow.escalation_days)
        .bind(workflow.submitted_at.to_rfc3339())
        .bind(workflow.last_level_entered_at.to_rfc3339())
        .bind(workflow.last_escalated_at.map(|value| value.to_rfc3339()))
        .bind(workflow.updated_at.to_rfc3339())
        .bind(&workflow.id.0)
        .bind(i64::from(expected_version))
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            let exists: Option<i64> =
                sqlx::query_scalar("SELECT version FROM approval_workflow WHERE id = ?")
                    .bind(&workflow.id.0)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(backend)?;
            return match exists {
                Some(_) => Err(StoreError::VersionConflict { workflow_id: workflow.id.clone() }),
                None => Err(StoreError::Backend(format!(
                    "workflow `{}` missing during versioned update",
                    workflow.id.0
                ))),
            };
        }

        write_levels(&mut tx, workflow).await?;
        append_history(&mut tx, workflow).await?;

        tx.commit().await.map_err(backend)
    }

    async fn list_actionable(&self) -> Result<Vec<ApprovalWorkflow>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {WORKFLOW_COLUMNS} FROM approval_workflow
             WHERE status IN ({ACTIONABLE_STATUSES})
             ORDER BY last_level_entered_at ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        let mut workflows = Vec::with_capacity(rows.len());
        for row in &rows {
            workflows.push(self.load_aggregate(row).await?);
        }
        Ok(workflows)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use countersign_core::domain::order::{OrderId, PurchaseOrder};
    use countersign_core::domain::rule::{ApprovalRule, LevelKind, LevelRequirement, RuleId};
    use countersign_core::domain::workflow::{ApprovalWorkflow, WorkflowStatus};
    use countersign_core::engine::builder;
    use countersign_core::engine::transitions::{apply, ActionCommand, RequestedAction};
    use countersign_core::store::{RuleStore, StoreError, WorkflowStore};
    use countersign_core::verify_chain;

    use super::SqlWorkflowStore;
    use crate::repositories::SqlRuleStore;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

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

    /// The rule row must exist first so the workflow FK holds.
    async fn seeded_workflow(pool: &sqlx::SqlitePool, order_id: &str, amount: i64) -> ApprovalWorkflow {
        SqlRuleStore::new(pool.clone()).save(&rule()).await.expect("seed rule");
        builder::build(&order(order_id, amount), &rule(), Utc::now()).expect("build")
    }

    fn command(actor: &str, action: RequestedAction, comments: Option<&str>) -> ActionCommand {
        ActionCommand {
            actor: actor.to_string(),
            action,
            comments: comments.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn insert_and_find_round_trips_the_whole_aggregate() {
        let pool = setup().await;
        let store = SqlWorkflowStore::new(pool.clone());
        let workflow = seeded_workflow(&pool, "po-1001", 125_000).await;

        store.insert(&workflow).await.expect("insert");
        let found = store
            .find_by_id(&workflow.id)
            .await
            .expect("find")
            .expect("workflow should exist");

        assert_eq!(found, workflow);
    }

    #[tokio::test]
    async fn versioned_update_rejects_the_slower_writer() {
        let pool = setup().await;
        let store = SqlWorkflowStore::new(pool.clone());
        let workflow = seeded_workflow(&pool, "po-1001", 125_000).await;
        store.insert(&workflow).await.expect("insert");

        // Two writers both loaded version 1.
        let mut first = apply(&workflow, &command("u1", RequestedAction::Approve, None), Utc::now())
            .expect("first transition")
            .workflow;
        first.version = 2;
        let mut second = apply(
            &workflow,
            &command("u1", RequestedAction::RequestChanges, Some("hold on")),
            Utc::now(),
        )
        .expect("second transition")
        .workflow;
        second.version = 2;

        store.update(&first, 1).await.expect("first writer commits");
        let error = store.update(&second, 1).await.expect_err("second writer must lose");
        assert!(matches!(error, StoreError::VersionConflict { .. }));

        let stored = store.find_by_id(&workflow.id).await.expect("find").expect("exists");
        assert_eq!(stored.status, WorkflowStatus::LevelApproved(LevelKind::Level1));
        assert_eq!(stored.version, 2);
    }

    #[tokio::test]
    async fn history_rows_accumulate_and_the_chain_stays_valid() {
        let pool = setup().await;
        let store = SqlWorkflowStore::new(pool.clone());
        let workflow = seeded_workflow(&pool, "po-1001", 125_000).await;
        store.insert(&workflow).await.expect("insert");

        let mut updated =
            apply(&workflow, &command("u1", RequestedAction::Approve, None), Utc::now())
                .expect("approve")
                .workflow;
        updated.version = 2;
        store.update(&updated, 1).await.expect("update");

        let mut rejected = apply(
            &updated,
            &command("u2", RequestedAction::Reject, Some("budget")),
            Utc::now(),
        )
        .expect("reject")
        .workflow;
        rejected.version = 3;
        store.update(&rejected, 2).await.expect("update");

        let stored = store.find_by_id(&workflow.id).await.expect("find").expect("exists");
        assert_eq!(stored.history.len(), 3);
        assert_eq!(stored.history[0].seq, 1);
        assert_eq!(stored.history[2].seq, 3);
        assert!(verify_chain(&stored.history).valid);
    }

    #[tokio::test]
    async fn list_actionable_skips_terminal_and_parked_workflows() {
        let pool = setup().await;
        let store = SqlWorkflowStore::new(pool.clone());
        SqlRuleStore::new(pool.clone()).save(&rule()).await.expect("seed rule");

        let pending =
            builder::build(&order("po-pending", 125_000), &rule(), Utc::now()).expect("build");
        store.insert(&pending).await.expect("insert pending");

        let auto = builder::build(&order("po-auto", 5_000), &rule(), Utc::now()).expect("build");
        store.insert(&auto).await.expect("insert auto-approved");

        let built =
            builder::build(&order("po-parked", 125_000), &rule(), Utc::now()).expect("build");
        store.insert(&built).await.expect("insert parked");
        let mut parked = apply(
            &built,
            &command("u1", RequestedAction::RequestChanges, Some("revise")),
            Utc::now(),
        )
        .expect("park")
        .workflow;
        parked.version = 2;
        store.update(&parked, 1).await.expect("park workflow");

        let actionable = store.list_actionable().await.expect("list");
        assert_eq!(actionable.len(), 1);
        assert_eq!(actionable[0].id, pending.id);
    }

    #[tokio::test]
    async fn list_actionable_orders_by_idle_time() {
        let pool = setup().await;
        let store = SqlWorkflowStore::new(pool.clone());
        SqlRuleStore::new(pool.clone()).save(&rule()).await.expect("seed rule");

        let mut fresh =
            builder::build(&order("po-fresh", 125_000), &rule(), Utc::now()).expect("build");
        fresh.last_level_entered_at = Utc::now();
        store.insert(&fresh).await.expect("insert fresh");

        let mut stale =
            builder::build(&order("po-stale", 125_000), &rule(), Utc::now()).expect("build");
        stale.last_level_entered_at = Utc::now() - Duration::days(5);
        store.insert(&stale).await.expect("insert stale");

        let actionable = store.list_actionable().await.expect("list");
        assert_eq!(actionable.len(), 2);
        assert_eq!(actionable[0].id, stale.id, "idlest workflow sweeps first");
    }

    #[tokio::test]
    async fn find_by_order_id_returns_the_owning_workflow() {
        let pool = setup().await;
        let store = SqlWorkflowStore::new(pool.clone());
        let workflow = seeded_workflow(&pool, "po-1001", 125_000).await;
        store.insert(&workflow).await.expect("insert");

        let found = store
            .find_by_order_id(&OrderId("po-1001".to_string()))
            .await
            .expect("find")
            .expect("workflow should exist");
        assert_eq!(found.id, workflow.id);

        assert!(store
            .find_by_order_id(&OrderId("po-unknown".to_string()))
            .await
            .expect("find")
            .is_none());
    }
}
