use crate::{
    db::DbPool,
    entities::{webhook_event, ProcessedWebhookEvent},
    errors::ServiceError,
    payments::{ProcessorEvent, WebhookEvent, WebhookVerifier},
    services::{payments::PaymentService, refunds::RefundService},
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ConnectionTrait, EntityTrait, Set, TransactionTrait};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Webhook reconciler.
///
/// Inbound processor events are the source of truth for payment
/// settlement. Each delivery is verified, then applied inside one
/// transaction together with an insert into the
/// `processed_webhook_events` ledger, keyed by the external event id.
/// Deliveries are therefore idempotent two ways: a replayed event id
/// short-circuits on the ledger, and the state handlers themselves
/// tolerate out-of-order signals.
#[derive(Clone)]
pub struct WebhookReconciler {
    db: Arc<DbPool>,
    verifier: WebhookVerifier,
    payments: PaymentService,
    refunds: RefundService,
}

impl WebhookReconciler {
    pub fn new(
        db: Arc<DbPool>,
        verifier: WebhookVerifier,
        payments: PaymentService,
        refunds: RefundService,
    ) -> Self {
        Self {
            db,
            verifier,
            payments,
            refunds,
        }
    }

    /// Verifies and applies a raw webhook delivery.
    #[instrument(skip(self, signature_header, payload))]
    pub async fn process_delivery(
        &self,
        signature_header: Option<&str>,
        payload: &[u8],
    ) -> Result<(), ServiceError> {
        let event = self.verifier.verify_and_parse(signature_header, payload)?;
        self.process(event).await
    }

    /// Applies a verified webhook event exactly once.
    #[instrument(skip(self, event), fields(event_id = %event.id, event_type = event.event.kind()))]
    pub async fn process(&self, event: WebhookEvent) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;

        if ProcessedWebhookEvent::find_by_id(event.id.clone())
            .one(&txn)
            .await?
            .is_some()
        {
            info!(event_id = %event.id, "Duplicate webhook event, skipping");
            return Ok(());
        }

        let ledger_entry = webhook_event::ActiveModel {
            id: Set(event.id.clone()),
            event_type: Set(event.event.kind().to_string()),
            processed_at: Set(Utc::now()),
        };
        ledger_entry.insert(&txn).await?;

        self.apply(&txn, &event.event).await?;

        txn.commit().await?;
        info!(event_id = %event.id, "Webhook event applied");
        Ok(())
    }

    async fn apply<C: ConnectionTrait>(
        &self,
        conn: &C,
        event: &ProcessorEvent,
    ) -> Result<(), ServiceError> {
        match event {
            ProcessorEvent::PaymentIntentSucceeded {
                intent_id,
                payment_method,
            } => {
                let Some(payment) = self.payments.find_by_intent(conn, intent_id).await? else {
                    warn!(%intent_id, "Webhook for unknown payment intent");
                    return Ok(());
                };
                self.payments
                    .apply_success_on(conn, payment, payment_method.clone())
                    .await?;
            }
            ProcessorEvent::PaymentIntentFailed { intent_id } => {
                let Some(payment) = self.payments.find_by_intent(conn, intent_id).await? else {
                    warn!(%intent_id, "Webhook for unknown payment intent");
                    return Ok(());
                };
                self.payments.apply_failure_on(conn, payment).await?;
            }
            ProcessorEvent::PaymentIntentCanceled { intent_id } => {
                let Some(payment) = self.payments.find_by_intent(conn, intent_id).await? else {
                    warn!(%intent_id, "Webhook for unknown payment intent");
                    return Ok(());
                };
                self.payments.apply_cancellation_on(conn, payment).await?;
            }
            ProcessorEvent::PaymentIntentRequiresAction { intent_id } => {
                let Some(payment) = self.payments.find_by_intent(conn, intent_id).await? else {
                    warn!(%intent_id, "Webhook for unknown payment intent");
                    return Ok(());
                };
                self.payments.apply_requires_action_on(conn, payment).await?;
            }
            ProcessorEvent::RefundCreated { refund_id, status }
            | ProcessorEvent::RefundUpdated { refund_id, status } => {
                if self
                    .refunds
                    .apply_processor_status_on(conn, refund_id, *status)
                    .await?
                    .is_none()
                {
                    warn!(%refund_id, "Webhook for unknown refund");
                }
            }
            ProcessorEvent::DisputeCreated { charge_id } => {
                // Disputes need a human; record them loudly and move on.
                warn!(%charge_id, "Dispute opened against charge");
            }
            ProcessorEvent::Unhandled { event_type } => {
                debug!(%event_type, "Ignoring unhandled webhook event type");
            }
        }
        Ok(())
    }
}
