use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use countersign_core::store::StoreError;

pub mod rule;
pub mod workflow;

pub use rule::SqlRuleStore;
pub use workflow::SqlWorkflowStore;

pub(crate) fn backend(error: sqlx::Error) -> StoreError {
    StoreError::Backend(format!("database error: {error}"))
}

pub(crate) fn decode(field: &str, detail: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(format!("decode error for `{field}`: {detail}"))
}

pub(crate) fn parse_datetime(field: &str, raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| decode(field, error))
}

pub(crate) fn parse_datetime_opt(
    field: &str,
    raw: Option<String>,
) -> Result<Option<DateTime<Utc>>, StoreError> {
    raw.map(|value| parse_datetime(field, &value)).transpose()
}

pub(crate) fn parse_decimal(field: &str, raw: &str) -> Result<Decimal, StoreError> {
    raw.parse::<Decimal>().map_err(|error| decode(field, error))
}

pub(crate) fn parse_decimal_opt(
    field: &str,
    raw: Option<String>,
) -> Result<Option<Decimal>, StoreError> {
    raw.map(|value| parse_decimal(field, &value)).transpose()
}

pub(crate) fn parse_string_list(field: &str, raw: &str) -> Result<Vec<String>, StoreError> {
    serde_json::from_str::<Vec<String>>(raw).map_err(|error| decode(field, error))
}

pub(crate) fn encode_string_list(values: &[String]) -> String {
    serde_json::to_string(values).unwrap_or_else(|_| "[]".to_string())
}
