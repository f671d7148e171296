use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleId(pub String);

/// The four approval stages in their fixed progression order. `Finance` is
/// the virtual fourth level that closes out high-value orders.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelKind {
    Level1,
    Level2,
    Level3,
    Finance,
}

impl LevelKind {
    pub const ORDER: [LevelKind; 4] =
        [LevelKind::Level1, LevelKind::Level2, LevelKind::Level3, LevelKind::Finance];

    pub fn rank(&self) -> u8 {
        match self {
            Self::Level1 => 1,
            Self::Level2 => 2,
            Self::Level3 => 3,
            Self::Finance => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Level1 => "level_1",
            Self::Level2 => "level_2",
            Self::Level3 => "level_3",
            Self::Finance => "finance",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "level_1" => Some(Self::Level1),
            "level_2" => Some(Self::Level2),
            "level_3" => Some(Self::Level3),
            "finance" => Some(Self::Finance),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelRequirement {
    pub required: bool,
    pub approvers: Vec<String>,
}

impl LevelRequirement {
    pub fn not_required() -> Self {
        Self::default()
    }

    pub fn required_by(approvers: Vec<String>) -> Self {
        Self { required: true, approvers }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRule {
    pub id: RuleId,
    pub name: String,
    /// Lower value wins during resolution.
    pub priority: i32,
    pub min_amount: Decimal,
    /// Open-ended band when absent.
    pub max_amount: Option<Decimal>,
    /// Department names, or the `all` wildcard.
    pub departments: Vec<String>,
    pub level1: LevelRequirement,
    pub level2: LevelRequirement,
    pub level3: LevelRequirement,
    pub finance: LevelRequirement,
    /// Orders strictly below this amount are created fully approved.
    pub auto_approve_below: Option<Decimal>,
    /// Idle days before a pending level escalates.
    pub escalation_days: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApprovalRule {
    pub fn requirement(&self, kind: LevelKind) -> &LevelRequirement {
        match kind {
            LevelKind::Level1 => &self.level1,
            LevelKind::Level2 => &self.level2,
            LevelKind::Level3 => &self.level3,
            LevelKind::Finance => &self.finance,
        }
    }

    pub fn matches(&self, amount: Decimal, department: &str) -> bool {
        if !self.is_active {
            return false;
        }
        if amount < self.min_amount {
            return false;
        }
        if let Some(max_amount) = self.max_amount {
            if amount > max_amount {
                return false;
            }
        }
        self.covers_department(department)
    }

    pub fn covers_department(&self, department: &str) -> bool {
        let department = normalize_key(department);
        self.departments.iter().map(|candidate| normalize_key(candidate)).any(|candidate| {
            candidate == "*" || candidate == "all" || candidate == department
        })
    }

    pub fn required_levels(&self) -> impl Iterator<Item = LevelKind> + '_ {
        LevelKind::ORDER.into_iter().filter(|kind| self.requirement(*kind).required)
    }

    pub fn auto_approves(&self, amount: Decimal) -> bool {
        self.auto_approve_below.map(|threshold| amount < threshold).unwrap_or(false)
    }

    /// Structural validation applied at rule save time. The workflow builder
    /// re-checks the approver invariant defensively at build time.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::InvalidRuleConfiguration {
                rule_id: self.id.clone(),
                reason: "rule name must not be empty".to_string(),
            });
        }

        if self.min_amount < Decimal::ZERO {
            return Err(DomainError::InvalidRuleConfiguration {
                rule_id: self.id.clone(),
                reason: "min_amount must not be negative".to_string(),
            });
        }

        if let Some(max_amount) = self.max_amount {
            if max_amount <= self.min_amount {
                return Err(DomainError::InvalidRuleConfiguration {
                    rule_id: self.id.clone(),
                    reason: format!(
                        "max_amount {} must exceed min_amount {}",
                        max_amount, self.min_amount
                    ),
                });
            }
        }

        if self.departments.is_empty() {
            return Err(DomainError::InvalidRuleConfiguration {
                rule_id: self.id.clone(),
                reason: "departments must name at least one department or the `all` wildcard"
                    .to_string(),
            });
        }

        if self.escalation_days <= 0 {
            return Err(DomainError::InvalidRuleConfiguration {
                rule_id: self.id.clone(),
                reason: "escalation_days must be positive".to_string(),
            });
        }

        for kind in LevelKind::ORDER {
            let requirement = self.requirement(kind);
            if requirement.required && requirement.approvers.is_empty() {
                return Err(DomainError::InvalidRuleConfiguration {
                    rule_id: self.id.clone(),
                    reason: format!("required level {} has no approvers", kind.as_str()),
                });
            }
        }

        if self.required_levels().next().is_none() && !self.band_fully_auto_approved() {
            return Err(DomainError::InvalidRuleConfiguration {
                rule_id: self.id.clone(),
                reason: "at least one level must be required unless auto_approve_below covers \
                         the whole amount band"
                    .to_string(),
            });
        }

        Ok(())
    }

    fn band_fully_auto_approved(&self) -> bool {
        match (self.auto_approve_below, self.max_amount) {
            (Some(threshold), Some(max_amount)) => threshold > max_amount,
            _ => false,
        }
    }
}

pub(crate) fn normalize_key(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}
