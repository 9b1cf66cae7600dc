//! Inbound webhook verification and parsing.
//!
//! The processor signs each delivery with an HMAC-SHA256 over
//! `"{timestamp}.{payload}"`, carried in a `t=<ts>,v1=<hex>` header.
//! Verification rejects stale timestamps and compares digests in constant
//! time before the payload is parsed into a typed event.

use crate::entities::RefundStatus;
use crate::errors::ServiceError;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Typed processor event, after signature verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessorEvent {
    PaymentIntentSucceeded {
        intent_id: String,
        payment_method: Option<String>,
    },
    PaymentIntentFailed {
        intent_id: String,
    },
    PaymentIntentCanceled {
        intent_id: String,
    },
    PaymentIntentRequiresAction {
        intent_id: String,
    },
    RefundCreated {
        refund_id: String,
        status: RefundStatus,
    },
    RefundUpdated {
        refund_id: String,
        status: RefundStatus,
    },
    /// Chargeback opened against a charge. Logged only; no state change.
    DisputeCreated {
        charge_id: String,
    },
    /// Event type this core does not handle.
    Unhandled {
        event_type: String,
    },
}

impl ProcessorEvent {
    /// Wire-format event type, recorded in the idempotency ledger.
    pub fn kind(&self) -> &str {
        match self {
            Self::PaymentIntentSucceeded { .. } => "payment_intent.succeeded",
            Self::PaymentIntentFailed { .. } => "payment_intent.payment_failed",
            Self::PaymentIntentCanceled { .. } => "payment_intent.canceled",
            Self::PaymentIntentRequiresAction { .. } => "payment_intent.requires_action",
            Self::RefundCreated { .. } => "refund.created",
            Self::RefundUpdated { .. } => "refund.updated",
            Self::DisputeCreated { .. } => "charge.dispute.created",
            Self::Unhandled { event_type } => event_type,
        }
    }
}

/// A verified webhook delivery: the external event id plus its payload.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub id: String,
    pub event: ProcessorEvent,
}

/// Verifies webhook signatures and parses payloads into typed events.
#[derive(Debug, Clone)]
pub struct WebhookVerifier {
    secret: Option<String>,
    tolerance_secs: u64,
}

impl WebhookVerifier {
    /// `secret = None` disables verification (local development only).
    pub fn new(secret: Option<String>, tolerance_secs: u64) -> Self {
        Self {
            secret,
            tolerance_secs,
        }
    }

    /// Verifies the signature header against the raw payload, then parses
    /// the payload. Returns `SignatureInvalid` on a bad or stale
    /// signature, `MalformedPayload` on an unparsable body.
    pub fn verify_and_parse(
        &self,
        signature_header: Option<&str>,
        payload: &[u8],
    ) -> Result<WebhookEvent, ServiceError> {
        if let Some(secret) = &self.secret {
            let header = signature_header.ok_or(ServiceError::SignatureInvalid)?;
            if !self.verify_signature(header, payload, secret) {
                return Err(ServiceError::SignatureInvalid);
            }
        }
        parse_event(payload)
    }

    fn verify_signature(&self, header: &str, payload: &[u8], secret: &str) -> bool {
        let (mut ts, mut v1) = ("", "");
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", val)) => ts = val,
                Some(("v1", val)) => v1 = val,
                _ => {}
            }
        }
        if ts.is_empty() || v1.is_empty() {
            return false;
        }

        match ts.parse::<i64>() {
            Ok(ts_i) => {
                let now = chrono::Utc::now().timestamp();
                if (now - ts_i).unsigned_abs() > self.tolerance_secs {
                    return false;
                }
            }
            Err(_) => return false,
        }

        let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
            Ok(mac) => mac,
            Err(_) => return false,
        };
        mac.update(ts.as_bytes());
        mac.update(b".");
        mac.update(payload);
        let expected = hex::encode(mac.finalize().into_bytes());
        constant_time_eq(&expected, v1)
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

fn parse_event(payload: &[u8]) -> Result<WebhookEvent, ServiceError> {
    let json: Value = serde_json::from_slice(payload)
        .map_err(|e| ServiceError::MalformedPayload(format!("invalid json: {}", e)))?;

    let id = json
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| ServiceError::MalformedPayload("missing event id".to_string()))?
        .to_string();
    let event_type = json
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| ServiceError::MalformedPayload("missing event type".to_string()))?;
    let object = json
        .pointer("/data/object")
        .ok_or_else(|| ServiceError::MalformedPayload("missing data.object".to_string()))?;

    let object_id = |field_name: &str| -> Result<String, ServiceError> {
        object
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ServiceError::MalformedPayload(format!("missing {}", field_name)))
    };

    let event = match event_type {
        "payment_intent.succeeded" => ProcessorEvent::PaymentIntentSucceeded {
            intent_id: object_id("payment intent id")?,
            payment_method: object
                .get("payment_method")
                .and_then(Value::as_str)
                .map(str::to_string),
        },
        "payment_intent.payment_failed" => ProcessorEvent::PaymentIntentFailed {
            intent_id: object_id("payment intent id")?,
        },
        "payment_intent.canceled" => ProcessorEvent::PaymentIntentCanceled {
            intent_id: object_id("payment intent id")?,
        },
        "payment_intent.requires_action" => ProcessorEvent::PaymentIntentRequiresAction {
            intent_id: object_id("payment intent id")?,
        },
        "refund.created" | "refund.updated" => {
            let refund_id = object_id("refund id")?;
            let status = object
                .get("status")
                .and_then(Value::as_str)
                .map(RefundStatus::from_processor)
                .ok_or_else(|| {
                    ServiceError::MalformedPayload("missing refund status".to_string())
                })?;
            if event_type == "refund.created" {
                ProcessorEvent::RefundCreated { refund_id, status }
            } else {
                ProcessorEvent::RefundUpdated { refund_id, status }
            }
        }
        "charge.dispute.created" => ProcessorEvent::DisputeCreated {
            charge_id: object_id("charge id")?,
        },
        other => ProcessorEvent::Unhandled {
            event_type: other.to_string(),
        },
    };

    Ok(WebhookEvent { id, event })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SECRET: &str = "whsec_test123secret456";

    fn sign(payload: &[u8], secret: &str, timestamp: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{}.", timestamp).as_bytes());
        mac.update(payload);
        format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
    }

    fn verifier() -> WebhookVerifier {
        WebhookVerifier::new(Some(SECRET.to_string()), 300)
    }

    fn succeeded_payload() -> Vec<u8> {
        json!({
            "id": "evt_001",
            "type": "payment_intent.succeeded",
            "data": { "object": { "id": "pi_123", "payment_method": "pm_card_visa" } }
        })
        .to_string()
        .into_bytes()
    }

    #[test]
    fn valid_signature_is_accepted() {
        let payload = succeeded_payload();
        let header = sign(&payload, SECRET, chrono::Utc::now().timestamp());

        let event = verifier().verify_and_parse(Some(&header), &payload).unwrap();
        assert_eq!(event.id, "evt_001");
        assert_eq!(
            event.event,
            ProcessorEvent::PaymentIntentSucceeded {
                intent_id: "pi_123".to_string(),
                payment_method: Some("pm_card_visa".to_string()),
            }
        );
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let payload = succeeded_payload();
        let header = sign(&payload, "wrong_secret", chrono::Utc::now().timestamp());

        let err = verifier()
            .verify_and_parse(Some(&header), &payload)
            .unwrap_err();
        assert!(matches!(err, ServiceError::SignatureInvalid));
    }

    #[test]
    fn modified_payload_is_rejected() {
        let payload = succeeded_payload();
        let header = sign(&payload, SECRET, chrono::Utc::now().timestamp());
        let tampered = String::from_utf8(payload).unwrap().replace("pi_123", "pi_999");

        let err = verifier()
            .verify_and_parse(Some(&header), tampered.as_bytes())
            .unwrap_err();
        assert!(matches!(err, ServiceError::SignatureInvalid));
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let payload = succeeded_payload();
        // 10 minutes ago, beyond the 5-minute tolerance.
        let header = sign(&payload, SECRET, chrono::Utc::now().timestamp() - 600);

        let err = verifier()
            .verify_and_parse(Some(&header), &payload)
            .unwrap_err();
        assert!(matches!(err, ServiceError::SignatureInvalid));
    }

    #[test]
    fn missing_header_is_rejected_when_secret_configured() {
        let payload = succeeded_payload();
        let err = verifier().verify_and_parse(None, &payload).unwrap_err();
        assert!(matches!(err, ServiceError::SignatureInvalid));
    }

    #[test]
    fn verification_skipped_without_secret() {
        let payload = succeeded_payload();
        let verifier = WebhookVerifier::new(None, 300);
        assert!(verifier.verify_and_parse(None, &payload).is_ok());
    }

    #[test]
    fn malformed_json_is_reported() {
        let verifier = WebhookVerifier::new(None, 300);
        let err = verifier.verify_and_parse(None, b"not json").unwrap_err();
        assert!(matches!(err, ServiceError::MalformedPayload(_)));
    }

    #[test]
    fn missing_event_id_is_reported() {
        let verifier = WebhookVerifier::new(None, 300);
        let payload = json!({
            "type": "payment_intent.succeeded",
            "data": { "object": { "id": "pi_123" } }
        })
        .to_string();
        let err = verifier.verify_and_parse(None, payload.as_bytes()).unwrap_err();
        assert!(matches!(err, ServiceError::MalformedPayload(_)));
    }

    #[test]
    fn refund_events_carry_status() {
        let verifier = WebhookVerifier::new(None, 300);
        let payload = json!({
            "id": "evt_re_1",
            "type": "refund.updated",
            "data": { "object": { "id": "re_123", "status": "succeeded" } }
        })
        .to_string();

        let event = verifier.verify_and_parse(None, payload.as_bytes()).unwrap();
        assert_eq!(
            event.event,
            ProcessorEvent::RefundUpdated {
                refund_id: "re_123".to_string(),
                status: RefundStatus::Succeeded,
            }
        );
    }

    #[test]
    fn unknown_event_types_are_unhandled_not_errors() {
        let verifier = WebhookVerifier::new(None, 300);
        let payload = json!({
            "id": "evt_x",
            "type": "customer.created",
            "data": { "object": { "id": "cus_1" } }
        })
        .to_string();

        let event = verifier.verify_and_parse(None, payload.as_bytes()).unwrap();
        assert_eq!(
            event.event,
            ProcessorEvent::Unhandled {
                event_type: "customer.created".to_string()
            }
        );
    }
}
