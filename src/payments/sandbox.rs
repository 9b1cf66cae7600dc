//! In-memory payment processor for tests and local development.
//!
//! Behaves like a cooperative processor: intents open in
//! `requires_payment_method`, confirmation succeeds, refunds succeed
//! immediately. Failure injection flags simulate declines and outages so
//! orchestrator compensation paths can be exercised deterministically.

use super::processor::{
    CreateIntentRequest, CreateRefundRequest, CustomerHandle, IntentSnapshot, PaymentProcessor,
    ProcessorError, RefundSnapshot,
};
use crate::entities::{PaymentStatus, RefundStatus};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
pub struct SandboxProcessor {
    intents: Mutex<HashMap<String, IntentSnapshot>>,
    fail_intents: AtomicBool,
    fail_refunds: AtomicBool,
}

impl SandboxProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent intent creations fail with a decline.
    pub fn set_fail_intents(&self, fail: bool) {
        self.fail_intents.store(fail, Ordering::SeqCst);
    }

    /// Makes subsequent refund creations fail.
    pub fn set_fail_refunds(&self, fail: bool) {
        self.fail_refunds.store(fail, Ordering::SeqCst);
    }

    fn short_id() -> String {
        Uuid::new_v4().simple().to_string()[..12].to_string()
    }
}

#[async_trait]
impl PaymentProcessor for SandboxProcessor {
    async fn create_customer(
        &self,
        _user_id: Uuid,
        _email: &str,
        _name: &str,
    ) -> Result<CustomerHandle, ProcessorError> {
        Ok(CustomerHandle {
            customer_id: format!("cus_sbx_{}", Self::short_id()),
        })
    }

    async fn create_payment_intent(
        &self,
        request: CreateIntentRequest,
    ) -> Result<IntentSnapshot, ProcessorError> {
        if self.fail_intents.load(Ordering::SeqCst) {
            return Err(ProcessorError::Api("card declined (sandbox)".to_string()));
        }

        let intent_id = format!("pi_sbx_{}", Self::short_id());
        let snapshot = IntentSnapshot {
            client_secret: format!("{}_secret_{}", intent_id, Self::short_id()),
            intent_id: intent_id.clone(),
            status: PaymentStatus::RequiresPaymentMethod,
            amount_minor: request.amount_minor,
        };
        self.intents
            .lock()
            .await
            .insert(intent_id, snapshot.clone());
        Ok(snapshot)
    }

    async fn confirm_payment_intent(
        &self,
        intent_id: &str,
        _payment_method_id: Option<&str>,
    ) -> Result<IntentSnapshot, ProcessorError> {
        let mut intents = self.intents.lock().await;
        let snapshot = intents
            .get_mut(intent_id)
            .ok_or_else(|| ProcessorError::Api(format!("no such intent: {}", intent_id)))?;
        snapshot.status = PaymentStatus::Succeeded;
        Ok(snapshot.clone())
    }

    async fn cancel_payment_intent(
        &self,
        intent_id: &str,
    ) -> Result<IntentSnapshot, ProcessorError> {
        let mut intents = self.intents.lock().await;
        let snapshot = intents
            .get_mut(intent_id)
            .ok_or_else(|| ProcessorError::Api(format!("no such intent: {}", intent_id)))?;
        snapshot.status = PaymentStatus::Cancelled;
        Ok(snapshot.clone())
    }

    async fn retrieve_payment_intent(
        &self,
        intent_id: &str,
    ) -> Result<IntentSnapshot, ProcessorError> {
        self.intents
            .lock()
            .await
            .get(intent_id)
            .cloned()
            .ok_or_else(|| ProcessorError::Api(format!("no such intent: {}", intent_id)))
    }

    async fn create_refund(
        &self,
        request: CreateRefundRequest,
    ) -> Result<RefundSnapshot, ProcessorError> {
        if self.fail_refunds.load(Ordering::SeqCst) {
            return Err(ProcessorError::Api("refund rejected (sandbox)".to_string()));
        }
        if !self.intents.lock().await.contains_key(&request.intent_id) {
            return Err(ProcessorError::Api(format!(
                "no such intent: {}",
                request.intent_id
            )));
        }

        Ok(RefundSnapshot {
            refund_id: format!("re_sbx_{}", Self::short_id()),
            status: RefundStatus::Succeeded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intent_request() -> CreateIntentRequest {
        CreateIntentRequest {
            amount_minor: 2000,
            currency: "usd".to_string(),
            order_id: Uuid::new_v4(),
            order_number: "ORD-TEST0001".to_string(),
            user_id: Uuid::new_v4(),
            customer_id: None,
        }
    }

    #[tokio::test]
    async fn intent_lifecycle() {
        let processor = SandboxProcessor::new();
        let intent = processor.create_payment_intent(intent_request()).await.unwrap();
        assert_eq!(intent.status, PaymentStatus::RequiresPaymentMethod);
        assert_eq!(intent.amount_minor, 2000);

        let confirmed = processor
            .confirm_payment_intent(&intent.intent_id, Some("pm_card_visa"))
            .await
            .unwrap();
        assert_eq!(confirmed.status, PaymentStatus::Succeeded);

        let retrieved = processor
            .retrieve_payment_intent(&intent.intent_id)
            .await
            .unwrap();
        assert_eq!(retrieved.status, PaymentStatus::Succeeded);
    }

    #[tokio::test]
    async fn failure_injection() {
        let processor = SandboxProcessor::new();
        processor.set_fail_intents(true);
        let err = processor.create_payment_intent(intent_request()).await;
        assert!(matches!(err, Err(ProcessorError::Api(_))));

        processor.set_fail_intents(false);
        assert!(processor.create_payment_intent(intent_request()).await.is_ok());
    }

    #[tokio::test]
    async fn refund_requires_known_intent() {
        let processor = SandboxProcessor::new();
        let err = processor
            .create_refund(CreateRefundRequest {
                intent_id: "pi_unknown".to_string(),
                amount_minor: 100,
                order_id: Uuid::new_v4(),
                payment_id: Uuid::new_v4(),
                reason: "requested_by_customer".to_string(),
            })
            .await;
        assert!(matches!(err, Err(ProcessorError::Api(_))));
    }
}
