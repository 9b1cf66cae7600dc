use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Payment record mirroring the processor's payment-intent lifecycle.
/// An order may accrue several payments (retries); `intent_id` is unique
/// across all of them.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub order_id: Uuid,
    /// External payment-intent identifier.
    #[sea_orm(unique)]
    pub intent_id: String,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub amount: Decimal,
    pub status: PaymentStatus,
    #[sea_orm(nullable)]
    pub payment_method: Option<String>,
    /// External customer identifier, when one was attached to the intent.
    #[sea_orm(nullable)]
    pub customer_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id"
    )]
    Order,
    #[sea_orm(has_many = "super::refund::Entity")]
    Refunds,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl Related<super::refund::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Refunds.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Amount still refundable, given the sum of succeeded refunds.
    pub fn refundable_amount(&self, total_refunded: Decimal) -> Decimal {
        self.amount - total_refunded
    }

    pub fn fully_refunded(&self, total_refunded: Decimal) -> bool {
        total_refunded >= self.amount
    }

    /// Only a succeeded payment with a positive remaining balance can be
    /// refunded.
    pub fn can_be_refunded(&self, total_refunded: Decimal) -> bool {
        self.status == PaymentStatus::Succeeded
            && self.refundable_amount(total_refunded) > Decimal::ZERO
    }
}

/// Payment-intent status as reported by the processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(30))")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "requires_payment_method")]
    RequiresPaymentMethod,
    #[sea_orm(string_value = "requires_action")]
    RequiresAction,
    #[sea_orm(string_value = "processing")]
    Processing,
    #[sea_orm(string_value = "succeeded")]
    Succeeded,
    #[sea_orm(string_value = "failed")]
    Failed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn payment(status: PaymentStatus, amount: Decimal) -> Model {
        Model {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            intent_id: "pi_test_123".into(),
            amount,
            status,
            payment_method: None,
            customer_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn refundable_amount_subtracts_succeeded_refunds() {
        let p = payment(PaymentStatus::Succeeded, dec!(20.00));
        assert_eq!(p.refundable_amount(Decimal::ZERO), dec!(20.00));
        assert_eq!(p.refundable_amount(dec!(5.00)), dec!(15.00));
        assert_eq!(p.refundable_amount(dec!(20.00)), Decimal::ZERO);
    }

    #[test]
    fn fully_refunded_at_or_beyond_amount() {
        let p = payment(PaymentStatus::Succeeded, dec!(20.00));
        assert!(!p.fully_refunded(dec!(19.99)));
        assert!(p.fully_refunded(dec!(20.00)));
    }

    #[test]
    fn only_succeeded_payments_are_refundable() {
        let p = payment(PaymentStatus::Pending, dec!(20.00));
        assert!(!p.can_be_refunded(Decimal::ZERO));
        let p = payment(PaymentStatus::Succeeded, dec!(20.00));
        assert!(p.can_be_refunded(Decimal::ZERO));
        assert!(!p.can_be_refunded(dec!(20.00)));
    }
}
