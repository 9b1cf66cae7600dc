//! Domain services. Each service is a cheap-to-clone handle over the
//! shared database pool and event channel; [`AppServices`] wires the full
//! set together at startup.

pub mod carts;
pub mod checkout;
pub mod inventory;
pub mod orders;
pub mod payments;
pub mod refunds;
pub mod webhooks;

pub use carts::CartService;
pub use checkout::CheckoutService;
pub use inventory::InventoryService;
pub use orders::OrderService;
pub use payments::PaymentService;
pub use refunds::RefundService;
pub use webhooks::WebhookReconciler;

use crate::{
    config::AppConfig,
    db::DbPool,
    events::EventSender,
    payments::{PaymentProcessor, WebhookVerifier},
};
use std::sync::Arc;

/// The full service graph.
#[derive(Clone)]
pub struct AppServices {
    pub carts: CartService,
    pub inventory: InventoryService,
    pub orders: OrderService,
    pub checkout: CheckoutService,
    pub payments: PaymentService,
    pub refunds: RefundService,
    pub webhooks: WebhookReconciler,
}

impl AppServices {
    pub fn new(
        db: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        processor: Arc<dyn PaymentProcessor>,
        config: &AppConfig,
    ) -> Self {
        let carts = CartService::new(db.clone(), event_sender.clone());
        let inventory = InventoryService::new(db.clone());
        let orders = OrderService::new(db.clone(), event_sender.clone(), inventory.clone());
        let checkout = CheckoutService::new(
            db.clone(),
            event_sender.clone(),
            carts.clone(),
            inventory.clone(),
            orders.clone(),
            processor.clone(),
            config.default_currency.clone(),
        );
        let payments = PaymentService::new(
            db.clone(),
            event_sender.clone(),
            orders.clone(),
            carts.clone(),
            processor.clone(),
        );
        let refunds = RefundService::new(
            db.clone(),
            event_sender.clone(),
            orders.clone(),
            processor.clone(),
        );
        let verifier = WebhookVerifier::new(
            config.payment_webhook_secret.clone(),
            config.payment_webhook_tolerance_secs,
        );
        let webhooks = WebhookReconciler::new(db, verifier, payments.clone(), refunds.clone());

        Self {
            carts,
            inventory,
            orders,
            checkout,
            payments,
            refunds,
            webhooks,
        }
    }
}
