use async_trait::async_trait;
use sqlx::{sqlite::SqliteRow, Row};

use countersign_core::domain::rule::{ApprovalRule, LevelRequirement, RuleId};
use countersign_core::store::{RuleStore, StoreError};

use super::{
    backend, decode, encode_string_list, parse_datetime, parse_decimal, parse_decimal_opt,
    parse_string_list,
};
use crate::DbPool;

pub struct SqlRuleStore {
    pool: DbPool,
}

impl SqlRuleStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const RULE_COLUMNS: &str = "id, name, priority, min_amount, max_amount, departments,
        level1_required, level1_approvers, level2_required, level2_approvers,
        level3_required, level3_approvers, finance_required, finance_approvers,
        auto_approve_below, escalation_days, is_active, created_at, updated_at";

fn row_to_rule(row: &SqliteRow) -> Result<ApprovalRule, StoreError> {
    let id: String = row.try_get("id").map_err(|e| decode("id", e))?;
    let name: String = row.try_get("name").map_err(|e| decode("name", e))?;
    let priority: i64 = row.try_get("priority").map_err(|e| decode("priority", e))?;
    let min_amount: String = row.try_get("min_amount").map_err(|e| decode("min_amount", e))?;
    let max_amount: Option<String> =
        row.try_get("max_amount").map_err(|e| decode("max_amount", e))?;
    let departments: String =
        row.try_get("departments").map_err(|e| decode("departments", e))?;
    let auto_approve_below: Option<String> =
        row.try_get("auto_approve_below").map_err(|e| decode("auto_approve_below", e))?;
    let escalation_days: i64 =
        row.try_get("escalation_days").map_err(|e| decode("escalation_days", e))?;
    let is_active: i64 = row.try_get("is_active").map_err(|e| decode("is_active", e))?;
    let created_at: String = row.try_get("created_at").map_err(|e| decode("created_at", e))?;
    let updated_at: String = row.try_get("updated_at").map_err(|e| decode("updated_at", e))?;

    let requirement = |required_column: &str, approvers_column: &str| {
        let required: i64 =
            row.try_get(required_column).map_err(|e| decode(required_column, e))?;
        let approvers: String =
            row.try_get(approvers_column).map_err(|e| decode(approvers_column, e))?;
        Ok::<LevelRequirement, StoreError>(LevelRequirement {
            required: required != 0,
            approvers: parse_string_list(approvers_column, &approvers)?,
        })
    };

    Ok(ApprovalRule {
        id: RuleId(id),
        name,
        priority: i32::try_from(priority).map_err(|e| decode("priority", e))?,
        min_amount: parse_decimal("min_amount", &min_amount)?,
        max_amount: parse_decimal_opt("max_amount", max_amount)?,
        departments: parse_string_list("departments", &departments)?,
        level1: requirement("level1_required", "level1_approvers")?,
        level2: requirement("level2_required", "level2_approvers")?,
        level3: requirement("level3_required", "level3_approvers")?,
        finance: requirement("finance_required", "finance_approvers")?,
        auto_approve_below: parse_decimal_opt("auto_approve_below", auto_approve_below)?,
        escalation_days,
        is_active: is_active != 0,
        created_at: parse_datetime("created_at", &created_at)?,
        updated_at: parse_datetime("updated_at", &updated_at)?,
    })
}

#[async_trait]
impl RuleStore for SqlRuleStore {
    async fn find_by_id(&self, id: &RuleId) -> Result<Option<ApprovalRule>, StoreError> {
        let row = sqlx::query(&format!("SELECT {RULE_COLUMNS} FROM approval_rule WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        row.as_ref().map(row_to_rule).transpose()
    }

    async fn list_active(&self) -> Result<Vec<ApprovalRule>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {RULE_COLUMNS} FROM approval_rule
             WHERE is_active = 1
             ORDER BY priority ASC, created_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter().map(row_to_rule).collect()
    }

    async fn list_all(&self) -> Result<Vec<ApprovalRule>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {RULE_COLUMNS} FROM approval_rule
             ORDER BY priority ASC, created_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter().map(row_to_rule).collect()
    }

    async fn save(&self, rule: &ApprovalRule) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO approval_rule (
                id, name, priority, min_amount, max_amount, departments,
                level1_required, level1_approvers, level2_required, level2_approvers,
                level3_required, level3_approvers, finance_required, finance_approvers,
                auto_approve_below, escalation_days, is_active, created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                priority = excluded.priority,
                min_amount = excluded.min_amount,
                max_amount = excluded.max_amount,
                departments = excluded.departments,
                level1_required = excluded.level1_required,
                level1_approvers = excluded.level1_approvers,
                level2_required = excluded.level2_required,
                level2_approvers = excluded.level2_approvers,
                level3_required = excluded.level3_required,
                level3_approvers = excluded.level3_approvers,
                finance_required = excluded.finance_required,
                finance_approvers = excluded.finance_approvers,
                auto_approve_below = excluded.auto_approve_below,
                escalation_days = excluded.escalation_days,
                is_active = excluded.is_active,
                updated_at = excluded.updated_at",
        )
        .bind(&rule.id.0)
        .bind(&rule.name)
        .bind(i64::from(rule.priority))
        .bind(rule.min_amount.to_string())
        .bind(rule.max_amount.map(|value| value.to_string()))
        .bind(encode_string_list(&rule.departments))
        .bind(i64::from(rule.level1.required))
        .bind(encode_string_list(&rule.level1.approvers))
        .bind(i64::from(rule.level2.required))
        .bind(encode_string_list(&rule.level2.approvers))
        .bind(i64::from(rule.level3.required))
        .bind(encode_string_list(&rule.level3.approvers))
        .bind(i64::from(rule.finance.required))
        .bind(encode_string_list(&rule.finance.approvers))
        .bind(rule.auto_approve_below.map(|value| value.to_string()))
        .bind(rule.escalation_days)
        .bind(i64::from(rule.is_active))
        .bind(rule.created_at.to_rfc3339())
        .bind(rule.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

    async fn deactivate(&self, id: &RuleId) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE approval_rule SET is_active = 0 WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        Ok(result.rows_affected() > 0)
    }
}
