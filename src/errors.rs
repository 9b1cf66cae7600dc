use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Error body returned by the HTTP layer for any failed operation.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status category (e.g. "Not Found", "Unprocessable Entity")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::error::DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// The operation is not legal for the entity's current status, e.g.
    /// cancelling a shipped order or confirming a non-pending payment.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// An order-status transition outside the transition table.
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    #[error("Payment cannot be refunded: {0}")]
    NotRefundable(String),

    #[error("Refund amount exceeds refundable amount: {0}")]
    ExceedsRefundable(String),

    /// The remote payment processor failed or returned an error payload.
    #[error("Payment processor error: {0}")]
    ProcessorError(String),

    #[error("Invalid webhook signature")]
    SignatureInvalid,

    #[error("Malformed webhook payload: {0}")]
    MalformedPayload(String),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_) | Self::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            Self::InvalidState(_)
            | Self::InvalidTransition(_)
            | Self::EmptyCart
            | Self::InsufficientStock(_)
            | Self::NotRefundable(_)
            | Self::ExceedsRefundable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::SignatureInvalid => StatusCode::UNAUTHORIZED,
            Self::ProcessorError(_) => StatusCode::BAD_GATEWAY,
            Self::DatabaseError(_) | Self::EventError(_) | Self::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::EventError(_) | Self::InternalError(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_code_mapping() {
        assert_eq!(
            ServiceError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::ValidationError("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::InvalidState("x".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ServiceError::InvalidTransition("x".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(ServiceError::EmptyCart.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            ServiceError::InsufficientStock("x".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ServiceError::ProcessorError("x".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ServiceError::SignatureInvalid.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ServiceError::MalformedPayload("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn response_message_hides_internal_details() {
        assert_eq!(
            ServiceError::InternalError("connection string".into()).response_message(),
            "Internal server error"
        );

        // User-facing errors keep the actual message.
        assert_eq!(
            ServiceError::NotFound("Order not found".into()).response_message(),
            "Not found: Order not found"
        );
        assert_eq!(ServiceError::EmptyCart.response_message(), "Cart is empty");
    }

    #[tokio::test]
    async fn into_response_serializes_error_body() {
        let response = ServiceError::InsufficientStock("Widget (available: 1)".into()).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let payload: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload.error, "Unprocessable Entity");
        assert!(payload.message.contains("Widget"));
    }
}
