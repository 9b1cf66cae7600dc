use crate::{
    db::DbPool,
    entities::{
        refund, refund::DEFAULT_REFUND_REASON, Order, OrderStatus, Payment, Refund, RefundModel,
        RefundStatus,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    payments::{to_minor_units, CreateRefundRequest, PaymentProcessor},
    services::orders::OrderService,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Refund service.
///
/// A refund is validated against the payment's remaining refundable
/// balance, created at the processor, and recorded locally in a single
/// transaction. When the succeeded refunds reach the payment's full
/// amount the order is moved to `refunded`.
#[derive(Clone)]
pub struct RefundService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    orders: OrderService,
    processor: Arc<dyn PaymentProcessor>,
}

impl RefundService {
    pub fn new(
        db: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        orders: OrderService,
        processor: Arc<dyn PaymentProcessor>,
    ) -> Self {
        Self {
            db,
            event_sender,
            orders,
            processor,
        }
    }

    pub async fn get_refund(&self, refund_id: Uuid) -> Result<RefundModel, ServiceError> {
        Refund::find_by_id(refund_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Refund {} not found", refund_id)))
    }

    pub async fn list_for_payment(
        &self,
        payment_id: Uuid,
    ) -> Result<Vec<RefundModel>, ServiceError> {
        Ok(Refund::find()
            .filter(refund::Column::PaymentId.eq(payment_id))
            .order_by_desc(refund::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    pub async fn list_for_order(&self, order_id: Uuid) -> Result<Vec<RefundModel>, ServiceError> {
        Ok(Refund::find()
            .filter(refund::Column::OrderId.eq(order_id))
            .order_by_desc(refund::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    /// Creates a refund against a payment. `amount` defaults to the full
    /// remaining refundable balance; partial amounts are allowed as long
    /// as they stay within it.
    #[instrument(skip(self, input))]
    pub async fn create_refund(
        &self,
        payment_id: Uuid,
        input: CreateRefundInput,
    ) -> Result<RefundModel, ServiceError> {
        let txn = self.db.begin().await?;

        // Row-lock the payment so concurrent refunds serialize before
        // reading the refunded total; otherwise two transactions could
        // each see the pre-refund balance and overshoot it together.
        let payment = Payment::find_by_id(payment_id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Payment {} not found", payment_id)))?;
        let total_refunded = self.total_refunded_on(&txn, payment_id).await?;

        if !payment.can_be_refunded(total_refunded) {
            return Err(ServiceError::NotRefundable(format!(
                "Payment {} is not refundable",
                payment_id
            )));
        }

        let refundable = payment.refundable_amount(total_refunded);
        let amount = input.amount.unwrap_or(refundable);
        if amount <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "refund amount must be greater than zero".to_string(),
            ));
        }
        if amount > refundable {
            return Err(ServiceError::ExceedsRefundable(format!(
                "requested {} exceeds refundable {}",
                amount, refundable
            )));
        }

        let reason = input
            .reason
            .unwrap_or_else(|| DEFAULT_REFUND_REASON.to_string());
        let snapshot = self
            .processor
            .create_refund(CreateRefundRequest {
                intent_id: payment.intent_id.clone(),
                amount_minor: to_minor_units(amount)?,
                order_id: payment.order_id,
                payment_id,
                reason: reason.clone(),
            })
            .await?;

        let refund = refund::ActiveModel {
            id: Set(Uuid::new_v4()),
            payment_id: Set(payment_id),
            order_id: Set(payment.order_id),
            amount: Set(amount),
            status: Set(snapshot.status),
            processor_refund_id: Set(snapshot.refund_id),
            reason: Set(reason),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        };
        let refund = refund.insert(&txn).await?;

        if snapshot.status == RefundStatus::Succeeded {
            self.settle_order_if_fully_refunded(&txn, payment.order_id, payment_id, payment.amount)
                .await?;
        }

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::RefundCreated {
                refund_id: refund.id,
                payment_id,
            })
            .await;
        info!(refund_id = %refund.id, %payment_id, %amount, "Refund created");
        Ok(refund)
    }

    /// Cancels a refund that has not reached the processor's terminal
    /// state yet. Local bookkeeping only; succeeded refunds cannot be
    /// undone.
    #[instrument(skip(self))]
    pub async fn cancel_refund(&self, refund_id: Uuid) -> Result<RefundModel, ServiceError> {
        let refund = self.get_refund(refund_id).await?;
        if refund.status != RefundStatus::Pending {
            return Err(ServiceError::InvalidState(format!(
                "Refund is already {:?}",
                refund.status
            )));
        }

        let mut active: refund::ActiveModel = refund.into();
        active.status = Set(RefundStatus::Cancelled);
        active.updated_at = Set(Utc::now());
        let refund = active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::RefundStatusChanged {
                refund_id,
                status: RefundStatus::Cancelled,
            })
            .await;
        Ok(refund)
    }

    /// Applies a processor-reported status to a refund found by its
    /// external id, settling the order when refunds become complete.
    /// Returns `None` for refund ids this system never issued.
    pub async fn apply_processor_status_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        processor_refund_id: &str,
        status: RefundStatus,
    ) -> Result<Option<RefundModel>, ServiceError> {
        let Some(refund) = Refund::find()
            .filter(refund::Column::ProcessorRefundId.eq(processor_refund_id))
            .one(conn)
            .await?
        else {
            return Ok(None);
        };

        if refund.status == status {
            return Ok(Some(refund));
        }

        let payment = Payment::find_by_id(refund.payment_id)
            .one(conn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Payment {} not found", refund.payment_id))
            })?;
        let (refund_id, payment_id, order_id) = (refund.id, refund.payment_id, refund.order_id);

        let mut active: refund::ActiveModel = refund.into();
        active.status = Set(status);
        active.updated_at = Set(Utc::now());
        let refund = active.update(conn).await?;

        if status == RefundStatus::Succeeded {
            self.settle_order_if_fully_refunded(conn, order_id, payment_id, payment.amount)
                .await?;
        }

        self.event_sender
            .send_or_log(Event::RefundStatusChanged { refund_id, status })
            .await;
        Ok(Some(refund))
    }

    /// Sum of succeeded refunds for a payment.
    pub async fn total_refunded_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        payment_id: Uuid,
    ) -> Result<Decimal, ServiceError> {
        let refunds = Refund::find()
            .filter(refund::Column::PaymentId.eq(payment_id))
            .filter(refund::Column::Status.eq(RefundStatus::Succeeded))
            .all(conn)
            .await?;
        Ok(refunds.iter().map(|r| r.amount).sum())
    }

    async fn settle_order_if_fully_refunded<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_id: Uuid,
        payment_id: Uuid,
        payment_amount: Decimal,
    ) -> Result<(), ServiceError> {
        let total_refunded = self.total_refunded_on(conn, payment_id).await?;
        if total_refunded < payment_amount {
            return Ok(());
        }

        let order = Order::find_by_id(order_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
        if order.status != OrderStatus::Refunded {
            self.orders
                .transition_on(conn, order, OrderStatus::Refunded)
                .await?;
        }
        Ok(())
    }
}

/// Refund request payload
#[derive(Debug, Default, Deserialize)]
pub struct CreateRefundInput {
    /// Defaults to the payment's remaining refundable balance.
    pub amount: Option<Decimal>,
    /// Defaults to `requested_by_customer`.
    pub reason: Option<String>,
}
