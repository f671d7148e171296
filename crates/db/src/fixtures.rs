use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use countersign_core::domain::rule::{ApprovalRule, LevelRequirement, RuleId};
use countersign_core::store::{RuleStore, StoreError};

use crate::repositories::SqlRuleStore;
use crate::DbPool;

pub const SEED_DATASET: &str = "deterministic_demo_rule_catalog";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedSummary {
    pub dataset: &'static str,
    pub rules: Vec<(String, String)>,
}

fn seed_timestamp() -> DateTime<Utc> {
    // Fixed so repeated seeds are byte-identical and rule tie-breaking in
    // the resolver stays stable.
    DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
        .map(|value| value.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Demo rule catalog: a petty-cash band that fully auto-approves, the
/// standard two-level band, a department-scoped band, and a high-value band
/// that walks all four levels.
pub fn default_rules() -> Vec<ApprovalRule> {
    let at = seed_timestamp();

    vec![
        ApprovalRule {
            id: RuleId("rule-petty-cash".to_string()),
            name: "Petty cash".to_string(),
            priority: 5,
            min_amount: Decimal::ZERO,
            max_amount: Some(Decimal::new(9_999, 0)),
            departments: vec!["All".to_string()],
            level1: LevelRequirement::not_required(),
            level2: LevelRequirement::not_required(),
            level3: LevelRequirement::not_required(),
            finance: LevelRequirement::not_required(),
            auto_approve_below: Some(Decimal::new(10_000, 0)),
            escalation_days: 3,
            is_active: true,
            created_at: at,
            updated_at: at,
        },
        ApprovalRule {
            id: RuleId("rule-standard".to_string()),
            name: "Standard purchases".to_string(),
            priority: 10,
            min_amount: Decimal::new(10_000, 0),
            max_amount: Some(Decimal::new(500_000, 0)),
            departments: vec!["All".to_string()],
            level1: LevelRequirement::required_by(vec![
                "lead.operations".to_string(),
                "lead.operations.backup".to_string(),
            ]),
            level2: LevelRequirement::required_by(vec!["manager.purchasing".to_string()]),
            level3: LevelRequirement::not_required(),
            finance: LevelRequirement::not_required(),
            auto_approve_below: Some(Decimal::new(25_000, 0)),
            escalation_days: 3,
            is_active: true,
            created_at: at,
            updated_at: at,
        },
        ApprovalRule {
            id: RuleId("rule-it-hardware".to_string()),
            name: "IT hardware purchases".to_string(),
            priority: 8,
            min_amount: Decimal::new(10_000, 0),
            max_amount: Some(Decimal::new(750_000, 0)),
            departments: vec!["IT".to_string()],
            level1: LevelRequirement::required_by(vec!["lead.it".to_string()]),
            level2: LevelRequirement::required_by(vec!["manager.it".to_string()]),
            level3: LevelRequirement::not_required(),
            finance: LevelRequirement::required_by(vec!["controller.finance".to_string()]),
            auto_approve_below: None,
            escalation_days: 2,
            is_active: true,
            created_at: at,
            updated_at: at,
        },
        ApprovalRule {
            id: RuleId("rule-high-value".to_string()),
            name: "High-value purchases".to_string(),
            priority: 20,
            min_amount: Decimal::new(500_000, 0),
            max_amount: None,
            departments: vec!["All".to_string()],
            level1: LevelRequirement::required_by(vec!["lead.operations".to_string()]),
            level2: LevelRequirement::required_by(vec!["manager.purchasing".to_string()]),
            level3: LevelRequirement::required_by(vec!["director.operations".to_string()]),
            finance: LevelRequirement::required_by(vec!["cfo".to_string()]),
            auto_approve_below: None,
            escalation_days: 5,
            is_active: true,
            created_at: at,
            updated_at: at,
        },
    ]
}

/// Upserts the demo catalog; safe to run repeatedly.
pub async fn seed_rules(pool: &DbPool) -> Result<SeedSummary, StoreError> {
    let store = SqlRuleStore::new(pool.clone());
    let rules = default_rules();

    let mut seeded = Vec::with_capacity(rules.len());
    for rule in &rules {
        rule.validate().map_err(|error| StoreError::Backend(error.to_string()))?;
        store.save(rule).await?;
        seeded.push((rule.id.0.clone(), rule.name.clone()));
    }

    Ok(SeedSummary { dataset: SEED_DATASET, rules: seeded })
}
