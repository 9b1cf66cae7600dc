use crate::{
    db::DbPool,
    entities::{
        order, order_item, payment, Order, OrderItem, OrderModel, OrderStatus, PaymentModel,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    payments::{to_minor_units, CreateIntentRequest, PaymentProcessor},
    services::{carts::CartService, inventory::InventoryService, orders::OrderService},
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set, TransactionTrait};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Checkout orchestration.
///
/// Turning a cart into a payable order spans a local transaction and a
/// remote processor call, so it runs as a small saga:
///
/// 1. In one transaction: validate the cart, reserve stock for every
///    line, and create the order with price snapshots. Committing here
///    makes the reservation durable before any network call.
/// 2. Create the payment intent at the processor.
/// 3. If the processor call fails, compensate: restore the reserved
///    stock and delete the order, then surface the failure.
/// 4. Otherwise record the payment and move the order to
///    `payment_pending`.
///
/// The cart is deliberately left intact; it is only cleared once the
/// payment actually succeeds.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    carts: CartService,
    inventory: InventoryService,
    orders: OrderService,
    processor: Arc<dyn PaymentProcessor>,
    currency: String,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        carts: CartService,
        inventory: InventoryService,
        orders: OrderService,
        processor: Arc<dyn PaymentProcessor>,
        currency: String,
    ) -> Self {
        Self {
            db,
            event_sender,
            carts,
            inventory,
            orders,
            processor,
            currency,
        }
    }

    #[instrument(skip(self, input))]
    pub async fn checkout(
        &self,
        user_id: Uuid,
        input: CheckoutInput,
    ) -> Result<CheckoutOutcome, ServiceError> {
        let order = self.create_order_from_cart(user_id, &input).await?;

        let amount_minor = to_minor_units(order.total_amount)?;
        let intent = match self
            .processor
            .create_payment_intent(CreateIntentRequest {
                amount_minor,
                currency: self.currency.clone(),
                order_id: order.id,
                order_number: order.order_number.clone(),
                user_id,
                customer_id: None,
            })
            .await
        {
            Ok(intent) => intent,
            Err(e) => {
                error!(order_id = %order.id, error = %e, "Payment intent creation failed, unwinding order");
                self.unwind_order(order.id).await?;
                return Err(e.into());
            }
        };

        let txn = self.db.begin().await?;
        let payment = payment::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            intent_id: Set(intent.intent_id.clone()),
            amount: Set(order.total_amount),
            status: Set(intent.status),
            payment_method: Set(None),
            customer_id: Set(None),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        };
        let payment = payment.insert(&txn).await?;
        let order = self
            .orders
            .transition_on(&txn, order, OrderStatus::PaymentPending)
            .await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::PaymentCreated {
                payment_id: payment.id,
                order_id: order.id,
            })
            .await;
        info!(order_id = %order.id, order_number = %order.order_number, intent_id = %intent.intent_id, "Checkout complete, awaiting payment");

        Ok(CheckoutOutcome {
            order,
            payment,
            client_secret: intent.client_secret,
        })
    }

    /// Step one of the saga: cart validation, stock reservation and order
    /// creation, all in one transaction.
    async fn create_order_from_cart(
        &self,
        user_id: Uuid,
        input: &CheckoutInput,
    ) -> Result<OrderModel, ServiceError> {
        let cart = self.carts.get_or_create_cart(user_id).await?;

        let txn = self.db.begin().await?;

        let lines = crate::entities::CartItem::find()
            .filter(crate::entities::cart_item::Column::CartId.eq(cart.id))
            .find_also_related(crate::entities::Product)
            .all(&txn)
            .await?;
        if lines.is_empty() {
            return Err(ServiceError::EmptyCart);
        }

        let order_id = Uuid::new_v4();
        let mut total = rust_decimal::Decimal::ZERO;
        let mut items = Vec::with_capacity(lines.len());
        for (item, product) in lines {
            let product = product.ok_or_else(|| {
                ServiceError::InternalError(format!(
                    "cart item {} references missing product",
                    item.id
                ))
            })?;

            self.inventory
                .reserve_stock(&txn, product.id, item.quantity)
                .await?;

            total += product.price * rust_decimal::Decimal::from(item.quantity);
            items.push(order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(product.id),
                quantity: Set(item.quantity),
                price: Set(product.price),
                created_at: Set(Utc::now()),
            });
        }

        let order = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(OrderModel::format_order_number(order_id)),
            user_id: Set(user_id),
            status: Set(OrderStatus::Pending),
            total_amount: Set(total),
            shipping_address: Set(input.shipping_address.clone()),
            billing_address: Set(input.billing_address.clone()),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        };
        let order = order.insert(&txn).await?;
        OrderItem::insert_many(items).exec(&txn).await?;

        txn.commit().await?;

        self.event_sender.send_or_log(Event::OrderCreated(order_id)).await;
        info!(%order_id, %user_id, %total, "Order created from cart");
        Ok(order)
    }

    /// Compensation for a failed processor call: return the reserved
    /// stock and remove the half-created order.
    async fn unwind_order(&self, order_id: Uuid) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;

        let items = self.orders.items_for(&txn, order_id).await?;
        self.inventory.restore_for_order(&txn, &items).await?;
        OrderItem::delete_many()
            .filter(order_item::Column::OrderId.eq(order_id))
            .exec(&txn)
            .await?;
        Order::delete_by_id(order_id).exec(&txn).await?;

        txn.commit().await?;
        warn!(%order_id, "Rolled back order after payment intent failure");
        Ok(())
    }
}

/// Checkout request payload
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckoutInput {
    pub shipping_address: Option<String>,
    pub billing_address: Option<String>,
}

/// Result of a successful checkout: the created order, its payment
/// record, and the client secret the caller needs to complete payment.
#[derive(Debug, Serialize)]
pub struct CheckoutOutcome {
    pub order: OrderModel,
    pub payment: PaymentModel,
    pub client_secret: String,
}
