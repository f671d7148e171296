use rust_decimal::Decimal;

use crate::domain::rule::ApprovalRule;
use crate::errors::DomainError;

/// Selects the single applicable rule for an order. Matching is pure over a
/// rule snapshot so the resolution is deterministic and unit-testable; the
/// engine feeds it the active rules from the rule store.
///
/// Selection order: lowest `priority` wins; ties break toward the most
/// recently created rule (created_at, then id, descending) so the outcome
/// never depends on collection iteration order. A miss is an error — there
/// is deliberately no fallback rule.
pub fn resolve(
    rules: &[ApprovalRule],
    amount: Decimal,
    department: &str,
) -> Result<ApprovalRule, DomainError> {
    let mut matches: Vec<&ApprovalRule> =
        rules.iter().filter(|rule| rule.matches(amount, department)).collect();

    matches.sort_by(|left, right| {
        left.priority
            .cmp(&right.priority)
            .then_with(|| right.created_at.cmp(&left.created_at))
            .then_with(|| right.id.0.cmp(&left.id.0))
    });

    matches.first().map(|rule| (*rule).clone()).ok_or_else(|| DomainError::NoApplicableRule {
        amount,
        department: department.to_string(),
    })
}
