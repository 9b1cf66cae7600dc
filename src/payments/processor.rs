use crate::entities::{PaymentStatus, RefundStatus};
use crate::errors::ServiceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Failure from the remote payment processor.
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    /// The processor rejected the request (declined card, invalid intent,
    /// amount too large, ...).
    #[error("processor rejected request: {0}")]
    Api(String),
    /// The call never completed (network failure, timeout).
    #[error("processor unreachable: {0}")]
    Transport(String),
}

impl From<ProcessorError> for ServiceError {
    fn from(err: ProcessorError) -> Self {
        ServiceError::ProcessorError(err.to_string())
    }
}

/// Processor-side customer reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerHandle {
    pub customer_id: String,
}

/// Request to open a payment intent for an order.
#[derive(Debug, Clone)]
pub struct CreateIntentRequest {
    /// Amount in minor units (cents).
    pub amount_minor: i64,
    /// ISO currency code, lowercase.
    pub currency: String,
    pub order_id: Uuid,
    pub order_number: String,
    pub user_id: Uuid,
    /// Attach the intent to an existing processor customer.
    pub customer_id: Option<String>,
}

/// Snapshot of a processor payment intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentSnapshot {
    pub intent_id: String,
    pub client_secret: String,
    pub status: PaymentStatus,
    pub amount_minor: i64,
}

/// Request to refund part or all of a payment intent.
#[derive(Debug, Clone)]
pub struct CreateRefundRequest {
    pub intent_id: String,
    /// Amount in minor units (cents).
    pub amount_minor: i64,
    pub order_id: Uuid,
    pub payment_id: Uuid,
    /// Callers default this; see `DEFAULT_REFUND_REASON`.
    pub reason: String,
}

/// Snapshot of a processor refund.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundSnapshot {
    pub refund_id: String,
    pub status: RefundStatus,
}

/// Abstract boundary to the external payment processor.
///
/// All calls are synchronous remote calls from the caller's perspective; a
/// timeout or error aborts the orchestrated step that issued it and the
/// orchestrator compensates. Implementations must not retain domain state.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn create_customer(
        &self,
        user_id: Uuid,
        email: &str,
        name: &str,
    ) -> Result<CustomerHandle, ProcessorError>;

    async fn create_payment_intent(
        &self,
        request: CreateIntentRequest,
    ) -> Result<IntentSnapshot, ProcessorError>;

    async fn confirm_payment_intent(
        &self,
        intent_id: &str,
        payment_method_id: Option<&str>,
    ) -> Result<IntentSnapshot, ProcessorError>;

    async fn cancel_payment_intent(&self, intent_id: &str)
        -> Result<IntentSnapshot, ProcessorError>;

    async fn retrieve_payment_intent(
        &self,
        intent_id: &str,
    ) -> Result<IntentSnapshot, ProcessorError>;

    async fn create_refund(
        &self,
        request: CreateRefundRequest,
    ) -> Result<RefundSnapshot, ProcessorError>;
}
