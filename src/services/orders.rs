use crate::{
    db::DbPool,
    entities::{order, order_item, Order, OrderItem, OrderItemModel, OrderModel, OrderStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    services::inventory::InventoryService,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Order lifecycle service.
///
/// Every status change, whether driven by a customer, an operator, or the
/// payment reconciler, goes through [`OrderService::transition_on`] so the
/// single transition table in [`OrderStatus`] is the only authority on
/// which moves are legal.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    inventory: InventoryService,
}

impl OrderService {
    pub fn new(
        db: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        inventory: InventoryService,
    ) -> Self {
        Self {
            db,
            event_sender,
            inventory,
        }
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderModel, ServiceError> {
        Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    pub async fn get_order_with_items(
        &self,
        order_id: Uuid,
    ) -> Result<(OrderModel, Vec<OrderItemModel>), ServiceError> {
        let order = self.get_order(order_id).await?;
        let items = self.items_for(&*self.db, order_id).await?;
        Ok((order, items))
    }

    /// Orders for a user, newest first.
    pub async fn list_orders_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<OrderModel>, ServiceError> {
        Ok(Order::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    /// Customer-initiated cancellation. Only allowed before fulfilment
    /// begins (pending, payment_pending or confirmed); reserved stock is
    /// returned in the same transaction.
    #[instrument(skip(self))]
    pub async fn cancel_order(&self, order_id: Uuid) -> Result<OrderModel, ServiceError> {
        let txn = self.db.begin().await?;

        let order = Order::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if !order.status.can_be_cancelled() {
            return Err(ServiceError::InvalidState(format!(
                "Order in status {} cannot be cancelled",
                order.status
            )));
        }

        let order = self
            .cancel_and_restock_on(&txn, order)
            .await?;
        txn.commit().await?;

        self.event_sender.send_or_log(Event::OrderCancelled(order_id)).await;
        info!(%order_id, "Order cancelled");
        Ok(order)
    }

    /// Operator-facing status update. Unlike the event-driven paths,
    /// which follow the transition table step by step, an operator may
    /// set any valid target from a non-terminal state (e.g. jump
    /// Confirmed straight to Shipped). Terminal states stay immutable,
    /// and cancellation keeps its stock-restore semantics.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> Result<OrderModel, ServiceError> {
        let txn = self.db.begin().await?;

        let order = Order::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if order.status.is_terminal() || new_status == order.status {
            return Err(ServiceError::InvalidTransition(format!(
                "{} -> {}",
                order.status, new_status
            )));
        }

        let order = if new_status == OrderStatus::Cancelled {
            if !order.status.can_be_cancelled() {
                return Err(ServiceError::InvalidTransition(format!(
                    "{} -> {}",
                    order.status, new_status
                )));
            }
            self.cancel_and_restock_on(&txn, order).await?
        } else {
            self.set_status_on(&txn, order, new_status).await?
        };

        txn.commit().await?;
        Ok(order)
    }

    /// Applies a status transition on an existing connection, enforcing
    /// the transition table. Emits [`Event::OrderStatusChanged`].
    pub async fn transition_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        order: OrderModel,
        new_status: OrderStatus,
    ) -> Result<OrderModel, ServiceError> {
        if !order.status.can_transition_to(new_status) {
            return Err(ServiceError::InvalidTransition(format!(
                "{} -> {}",
                order.status, new_status
            )));
        }
        self.set_status_on(conn, order, new_status).await
    }

    /// Writes a status change and emits [`Event::OrderStatusChanged`].
    /// Callers have already decided the change is legal for their path.
    async fn set_status_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        order: OrderModel,
        new_status: OrderStatus,
    ) -> Result<OrderModel, ServiceError> {
        let old_status = order.status;
        let order_id = order.id;
        let mut active: order::ActiveModel = order.into();
        active.status = Set(new_status);
        active.updated_at = Set(Utc::now());
        let order = active.update(conn).await?;

        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            })
            .await;
        info!(%order_id, %old_status, %new_status, "Order status changed");
        Ok(order)
    }

    /// Cancels an order and restores its reserved stock on an existing
    /// connection. Callers are responsible for having checked that the
    /// cancellation is legal for their path.
    pub async fn cancel_and_restock_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        order: OrderModel,
    ) -> Result<OrderModel, ServiceError> {
        let order_id = order.id;
        let items = self.items_for(conn, order_id).await?;
        self.inventory.restore_for_order(conn, &items).await?;
        self.event_sender.send_or_log(Event::StockRestored { order_id }).await;
        self.transition_on(conn, order, OrderStatus::Cancelled).await
    }

    pub async fn items_for<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_id: Uuid,
    ) -> Result<Vec<OrderItemModel>, ServiceError> {
        Ok(OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(conn)
            .await?)
    }
}
