//! Payment processor boundary.
//!
//! The core never talks to the processor's HTTP API directly; it depends
//! on the [`PaymentProcessor`] trait and typed snapshots of processor
//! objects. Amounts are `Decimal` major units everywhere in the domain and
//! convert to integer minor units only at this boundary.

pub mod processor;
pub mod sandbox;
pub mod webhook;

pub use processor::{
    CreateIntentRequest, CreateRefundRequest, CustomerHandle, IntentSnapshot, PaymentProcessor,
    ProcessorError, RefundSnapshot,
};
pub use sandbox::SandboxProcessor;
pub use webhook::{ProcessorEvent, WebhookEvent, WebhookVerifier};

use crate::errors::ServiceError;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Converts a major-unit amount to processor minor units (×100).
/// Fails on negative amounts or values that do not fit an `i64`.
pub fn to_minor_units(amount: Decimal) -> Result<i64, ServiceError> {
    if amount < Decimal::ZERO {
        return Err(ServiceError::ValidationError(format!(
            "amount must not be negative: {}",
            amount
        )));
    }
    (amount * Decimal::from(100))
        .round_dp(0)
        .to_i64()
        .ok_or_else(|| {
            ServiceError::ValidationError(format!("amount out of range: {}", amount))
        })
}

/// Converts processor minor units back to a major-unit decimal.
pub fn from_minor_units(minor: i64) -> Decimal {
    Decimal::from(minor) / Decimal::from(100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn minor_unit_conversion_round_trip() {
        assert_eq!(to_minor_units(dec!(20.00)).unwrap(), 2000);
        assert_eq!(to_minor_units(dec!(0.01)).unwrap(), 1);
        assert_eq!(to_minor_units(Decimal::ZERO).unwrap(), 0);
        assert_eq!(from_minor_units(2000), dec!(20.00));
        assert_eq!(from_minor_units(1), dec!(0.01));
    }

    #[test]
    fn fractional_cents_round_half_even() {
        // 10.005 -> 1000.5 minor units, banker's rounding lands on 1000.
        assert_eq!(to_minor_units(dec!(10.005)).unwrap(), 1000);
        assert_eq!(to_minor_units(dec!(10.015)).unwrap(), 1002);
    }

    #[test]
    fn negative_amounts_are_rejected() {
        assert!(to_minor_units(dec!(-1.00)).is_err());
    }
}
