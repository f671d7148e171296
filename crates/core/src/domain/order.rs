use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

/// The slice of a purchase order the approval engine needs. The full order
/// document lives with the purchasing service; the workflow keeps its own
/// snapshot of the fields that drive rule resolution and history records.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PurchaseOrder {
    pub id: OrderId,
    pub order_number: String,
    pub amount: Decimal,
    pub department: String,
    pub submitted_by: String,
    pub created_at: DateTime<Utc>,
}
