use crate::entities::{order::OrderStatus, refund::RefundStatus};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

/// Domain events emitted by the lifecycle services after a successful
/// commit. Consumers (notification workers, projections) read from the
/// paired receiver; delivery failures are logged, never escalated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Cart events
    CartCreated(Uuid),
    CartItemAdded { cart_id: Uuid, product_id: Uuid },
    CartCleared(Uuid),

    // Order events
    OrderCreated(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
    OrderCancelled(Uuid),

    // Payment events
    PaymentCreated { payment_id: Uuid, order_id: Uuid },
    PaymentSucceeded { payment_id: Uuid, order_id: Uuid },
    PaymentFailed { payment_id: Uuid, order_id: Uuid },

    // Refund events
    RefundCreated { refund_id: Uuid, payment_id: Uuid },
    RefundStatusChanged { refund_id: Uuid, status: RefundStatus },

    // Inventory events
    StockRestored { order_id: Uuid },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Creates a sender together with its receiver, for wiring at startup.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self::new(tx), rx)
    }

    /// Sends an event asynchronously.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the receiver is
    /// gone. Used on paths where event delivery must not abort the
    /// committed operation.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event.clone()).await {
            warn!(error = %e, event = ?event, "Event delivery failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_delivers_to_receiver() {
        let (sender, mut rx) = EventSender::channel(8);
        let order_id = Uuid::new_v4();
        sender.send(Event::OrderCreated(order_id)).await.unwrap();

        match rx.recv().await {
            Some(Event::OrderCreated(id)) => assert_eq!(id, order_id),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn send_or_log_swallows_closed_channel() {
        let (sender, rx) = EventSender::channel(1);
        drop(rx);
        // Must not panic or error out.
        sender.send_or_log(Event::CartCleared(Uuid::new_v4())).await;
    }
}
