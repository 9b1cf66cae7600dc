use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order entity. Items and total are an immutable snapshot taken at
/// checkout; only `status` (and `updated_at`) change afterwards.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub order_number: String,
    pub user_id: Uuid,
    pub status: OrderStatus,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub total_amount: Decimal,
    #[sea_orm(nullable)]
    pub shipping_address: Option<String>,
    #[sea_orm(nullable)]
    pub billing_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItems,
    #[sea_orm(has_many = "super::payment::Entity")]
    Payments,
    #[sea_orm(has_many = "super::refund::Entity")]
    Refunds,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl Related<super::payment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payments.def()
    }
}

impl Related<super::refund::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Refunds.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// `ORD-` plus the first eight hex digits of the order id, uppercased.
    pub fn format_order_number(id: Uuid) -> String {
        format!("ORD-{}", id.simple().to_string()[..8].to_uppercase())
    }
}

/// Order status enumeration.
///
/// The happy path runs `Pending -> PaymentPending -> Confirmed ->
/// Processing -> Shipped -> Delivered`; `Cancelled` and `Refunded` are the
/// alternate terminal branches. All transition rules live here so that no
/// service needs its own status conditionals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "payment_pending")]
    PaymentPending,
    #[sea_orm(string_value = "confirmed")]
    Confirmed,
    #[sea_orm(string_value = "processing")]
    Processing,
    #[sea_orm(string_value = "shipped")]
    Shipped,
    #[sea_orm(string_value = "delivered")]
    Delivered,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
    #[sea_orm(string_value = "refunded")]
    Refunded,
}

impl OrderStatus {
    /// Terminal states: no transition (other than the fully-refunded
    /// exception below) is defined out of these.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled | Self::Refunded)
    }

    /// A user may cancel only before fulfilment begins.
    pub fn can_be_cancelled(self) -> bool {
        matches!(self, Self::Pending | Self::PaymentPending | Self::Confirmed)
    }

    /// The central transition table. Covers both event-driven transitions
    /// (checkout, webhooks, cancellation) and explicit status updates.
    pub fn can_transition_to(self, target: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, target) {
            // No self-loops; idempotent re-application is handled by the
            // callers observing the status first.
            (from, to) if from == to => false,
            // Payment intent requested.
            (Pending, PaymentPending) => true,
            // Processor reported success.
            (Pending | PaymentPending, Confirmed) => true,
            // Cancellation: user-initiated or processor failure.
            (from, Cancelled) => from.can_be_cancelled(),
            // Fulfilment progression.
            (Confirmed, Processing) | (Processing, Shipped) | (Shipped, Delivered) => true,
            // A fully refunded payment supersedes delivery.
            (Confirmed | Processing | Shipped | Delivered, Refunded) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::PaymentPending => "payment_pending",
            Self::Confirmed => "confirmed",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        };
        f.write_str(s)
    }
}
