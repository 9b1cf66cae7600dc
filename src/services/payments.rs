use crate::{
    db::DbPool,
    entities::{
        payment, Order, OrderStatus, Payment, PaymentModel, PaymentStatus,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    payments::{IntentSnapshot, PaymentProcessor},
    services::{carts::CartService, orders::OrderService},
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Payment lifecycle service.
///
/// Local payment records shadow the processor's payment intents. State
/// changes arrive from two directions, synchronous API calls and the
/// webhook reconciler, and both funnel into the `apply_*_on` helpers so
/// the cascade onto the order happens exactly once regardless of which
/// signal lands first.
#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    orders: OrderService,
    carts: CartService,
    processor: Arc<dyn PaymentProcessor>,
}

impl PaymentService {
    pub fn new(
        db: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        orders: OrderService,
        carts: CartService,
        processor: Arc<dyn PaymentProcessor>,
    ) -> Self {
        Self {
            db,
            event_sender,
            orders,
            carts,
            processor,
        }
    }

    pub async fn get_payment(&self, payment_id: Uuid) -> Result<PaymentModel, ServiceError> {
        Payment::find_by_id(payment_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Payment {} not found", payment_id)))
    }

    pub async fn find_by_intent<C: ConnectionTrait>(
        &self,
        conn: &C,
        intent_id: &str,
    ) -> Result<Option<PaymentModel>, ServiceError> {
        Ok(Payment::find()
            .filter(payment::Column::IntentId.eq(intent_id))
            .one(conn)
            .await?)
    }

    pub async fn list_for_order(&self, order_id: Uuid) -> Result<Vec<PaymentModel>, ServiceError> {
        Ok(Payment::find()
            .filter(payment::Column::OrderId.eq(order_id))
            .order_by_desc(payment::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    /// Confirms the intent at the processor and applies the resulting
    /// status locally. A succeeded confirmation triggers the full
    /// success cascade without waiting for the webhook.
    #[instrument(skip(self))]
    pub async fn confirm_payment(
        &self,
        payment_id: Uuid,
        payment_method_id: Option<&str>,
    ) -> Result<PaymentModel, ServiceError> {
        let payment = self.get_payment(payment_id).await?;
        if matches!(
            payment.status,
            PaymentStatus::Succeeded | PaymentStatus::Failed | PaymentStatus::Cancelled
        ) {
            return Err(ServiceError::InvalidState(format!(
                "Payment is already {:?}",
                payment.status
            )));
        }

        let snapshot = self
            .processor
            .confirm_payment_intent(&payment.intent_id, payment_method_id)
            .await?;
        let payment_method = payment_method_id.map(str::to_string);
        self.apply_snapshot(payment, snapshot, payment_method).await
    }

    /// Development shortcut that marks a payment as succeeded without a
    /// processor round-trip. Only payments still awaiting a payment
    /// method qualify.
    #[instrument(skip(self))]
    pub async fn accept_payment(&self, payment_id: Uuid) -> Result<PaymentModel, ServiceError> {
        let payment = self.get_payment(payment_id).await?;
        if !matches!(
            payment.status,
            PaymentStatus::Pending | PaymentStatus::RequiresPaymentMethod
        ) {
            return Err(ServiceError::InvalidState(format!(
                "Payment is already {:?}",
                payment.status
            )));
        }

        let txn = self.db.begin().await?;
        let payment = self
            .apply_success_on(&txn, payment, Some("sandbox".to_string()))
            .await?;
        txn.commit().await?;
        Ok(payment)
    }

    /// Cancels the intent at the processor and cancels the local payment
    /// and, where still legal, the order.
    #[instrument(skip(self))]
    pub async fn cancel_payment(&self, payment_id: Uuid) -> Result<PaymentModel, ServiceError> {
        let payment = self.get_payment(payment_id).await?;
        if !matches!(
            payment.status,
            PaymentStatus::Pending
                | PaymentStatus::RequiresPaymentMethod
                | PaymentStatus::RequiresAction
        ) {
            return Err(ServiceError::InvalidState(format!(
                "Payment is already {:?}",
                payment.status
            )));
        }

        self.processor.cancel_payment_intent(&payment.intent_id).await?;

        let txn = self.db.begin().await?;
        let payment = self.apply_cancellation_on(&txn, payment).await?;
        txn.commit().await?;
        Ok(payment)
    }

    /// Re-reads the intent from the processor and syncs the local status.
    #[instrument(skip(self))]
    pub async fn sync_payment(&self, payment_id: Uuid) -> Result<PaymentModel, ServiceError> {
        let payment = self.get_payment(payment_id).await?;
        let snapshot = self.processor.retrieve_payment_intent(&payment.intent_id).await?;
        self.apply_snapshot(payment, snapshot, None).await
    }

    async fn apply_snapshot(
        &self,
        payment: PaymentModel,
        snapshot: IntentSnapshot,
        payment_method: Option<String>,
    ) -> Result<PaymentModel, ServiceError> {
        let txn = self.db.begin().await?;
        let payment = match snapshot.status {
            PaymentStatus::Succeeded => {
                self.apply_success_on(&txn, payment, payment_method).await?
            }
            PaymentStatus::Failed => self.apply_failure_on(&txn, payment).await?,
            PaymentStatus::Cancelled => self.apply_cancellation_on(&txn, payment).await?,
            status => self.set_status_on(&txn, payment, status, payment_method).await?,
        };
        txn.commit().await?;
        Ok(payment)
    }

    /// Marks a payment succeeded and confirms its order, clearing the
    /// user's cart. Idempotent: an already-succeeded payment and an
    /// already-confirmed order are both left untouched, so the webhook
    /// and a synchronous confirmation can race without double effects.
    pub async fn apply_success_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        payment: PaymentModel,
        payment_method: Option<String>,
    ) -> Result<PaymentModel, ServiceError> {
        if payment.status == PaymentStatus::Succeeded {
            return Ok(payment);
        }

        let payment = self
            .set_status_on(conn, payment, PaymentStatus::Succeeded, payment_method)
            .await?;

        let order = Order::find_by_id(payment.order_id)
            .one(conn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Order {} not found", payment.order_id))
            })?;
        if matches!(
            order.status,
            OrderStatus::Pending | OrderStatus::PaymentPending
        ) {
            let user_id = order.user_id;
            self.orders
                .transition_on(conn, order, OrderStatus::Confirmed)
                .await?;
            self.carts.clear_for_user(conn, user_id).await?;
        } else {
            warn!(order_id = %payment.order_id, status = %order.status, "Payment succeeded for order not awaiting payment");
        }

        self.event_sender
            .send_or_log(Event::PaymentSucceeded {
                payment_id: payment.id,
                order_id: payment.order_id,
            })
            .await;
        info!(payment_id = %payment.id, order_id = %payment.order_id, "Payment succeeded");
        Ok(payment)
    }

    /// Marks a payment failed and cancels its order, restoring stock.
    /// Idempotent against repeated failure signals and against an order
    /// that was already cancelled another way.
    pub async fn apply_failure_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        payment: PaymentModel,
    ) -> Result<PaymentModel, ServiceError> {
        if payment.status == PaymentStatus::Failed {
            return Ok(payment);
        }

        let payment = self
            .set_status_on(conn, payment, PaymentStatus::Failed, None)
            .await?;
        self.cancel_order_for(conn, payment.order_id).await?;

        self.event_sender
            .send_or_log(Event::PaymentFailed {
                payment_id: payment.id,
                order_id: payment.order_id,
            })
            .await;
        info!(payment_id = %payment.id, order_id = %payment.order_id, "Payment failed");
        Ok(payment)
    }

    /// Marks a payment cancelled and cancels its order, restoring stock.
    pub async fn apply_cancellation_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        payment: PaymentModel,
    ) -> Result<PaymentModel, ServiceError> {
        if payment.status == PaymentStatus::Cancelled {
            return Ok(payment);
        }

        let payment = self
            .set_status_on(conn, payment, PaymentStatus::Cancelled, None)
            .await?;
        self.cancel_order_for(conn, payment.order_id).await?;

        info!(payment_id = %payment.id, order_id = %payment.order_id, "Payment cancelled");
        Ok(payment)
    }

    /// Marks a payment as requiring further customer action.
    pub async fn apply_requires_action_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        payment: PaymentModel,
    ) -> Result<PaymentModel, ServiceError> {
        if payment.status == PaymentStatus::Succeeded {
            // A late requires_action signal never demotes a settled payment.
            return Ok(payment);
        }
        self.set_status_on(conn, payment, PaymentStatus::RequiresAction, None)
            .await
    }

    async fn cancel_order_for<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_id: Uuid,
    ) -> Result<(), ServiceError> {
        let order = Order::find_by_id(order_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
        if order.status.can_be_cancelled() {
            self.orders.cancel_and_restock_on(conn, order).await?;
        } else {
            // Already cancelled (or past the point of cancellation); stock
            // must not be restored a second time.
            warn!(%order_id, status = %order.status, "Skipping order cancellation");
        }
        Ok(())
    }

    async fn set_status_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        payment: PaymentModel,
        status: PaymentStatus,
        payment_method: Option<String>,
    ) -> Result<PaymentModel, ServiceError> {
        let mut active: payment::ActiveModel = payment.into();
        active.status = Set(status);
        if let Some(method) = payment_method {
            active.payment_method = Set(Some(method));
        }
        active.updated_at = Set(Utc::now());
        Ok(active.update(conn).await?)
    }
}
