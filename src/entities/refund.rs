use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_REFUND_REASON: &str = "requested_by_customer";

/// Refund record against a payment. `order_id` is backfilled from the
/// payment at construction so refunds can be queried per order directly.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "refunds")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub payment_id: Uuid,
    pub order_id: Uuid,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub amount: Decimal,
    pub status: RefundStatus,
    /// External refund identifier.
    #[sea_orm(unique)]
    pub processor_refund_id: String,
    pub reason: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::payment::Entity",
        from = "Column::PaymentId",
        to = "super::payment::Column::Id"
    )]
    Payment,
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id"
    )]
    Order,
}

impl Related<super::payment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payment.def()
    }
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn partial_refund(&self, payment_amount: Decimal) -> bool {
        self.amount < payment_amount
    }

    /// Share of the payment this refund covers, rounded to two places.
    pub fn refund_percentage(&self, payment_amount: Decimal) -> Decimal {
        if payment_amount.is_zero() {
            return Decimal::ZERO;
        }
        (self.amount / payment_amount * Decimal::from(100)).round_dp(2)
    }
}

/// Refund status as reported by the processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "succeeded")]
    Succeeded,
    #[sea_orm(string_value = "failed")]
    Failed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl RefundStatus {
    pub fn from_processor(status: &str) -> Self {
        match status {
            "succeeded" => Self::Succeeded,
            "failed" => Self::Failed,
            "canceled" | "cancelled" => Self::Cancelled,
            _ => Self::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn refund(amount: Decimal) -> Model {
        Model {
            id: Uuid::new_v4(),
            payment_id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            amount,
            status: RefundStatus::Succeeded,
            processor_refund_id: "re_test_123".into(),
            reason: DEFAULT_REFUND_REASON.into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn partial_refund_detection() {
        assert!(refund(dec!(5.00)).partial_refund(dec!(20.00)));
        assert!(!refund(dec!(20.00)).partial_refund(dec!(20.00)));
    }

    #[test]
    fn refund_percentage_rounds_to_two_places() {
        assert_eq!(refund(dec!(5.00)).refund_percentage(dec!(20.00)), dec!(25.00));
        assert_eq!(refund(dec!(10.00)).refund_percentage(dec!(30.00)), dec!(33.33));
        assert_eq!(refund(dec!(5.00)).refund_percentage(Decimal::ZERO), Decimal::ZERO);
    }
}
