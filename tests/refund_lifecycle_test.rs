mod common;

use chrono::Utc;
use common::{seed_product, setup, TestApp};
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, Set};
use storefront_api::{
    entities::{refund, OrderStatus, PaymentModel, RefundStatus},
    errors::ServiceError,
    services::carts::AddItemInput,
    services::checkout::CheckoutInput,
    services::refunds::CreateRefundInput,
};
use uuid::Uuid;

/// Checkout and settle a payment, leaving the order confirmed.
async fn paid_order(app: &TestApp) -> PaymentModel {
    let user_id = Uuid::new_v4();
    let product = seed_product(app, "Widget", dec!(10.00), 5).await;
    app.services
        .carts
        .add_item(
            user_id,
            AddItemInput {
                product_id: product.id,
                quantity: 2,
            },
        )
        .await
        .unwrap();
    let outcome = app
        .services
        .checkout
        .checkout(user_id, CheckoutInput::default())
        .await
        .unwrap();
    app.services
        .payments
        .accept_payment(outcome.payment.id)
        .await
        .unwrap()
}

#[tokio::test]
async fn full_refund_settles_order_as_refunded() {
    let app = setup().await;
    let payment = paid_order(&app).await;

    let refund = app
        .services
        .refunds
        .create_refund(payment.id, CreateRefundInput::default())
        .await
        .unwrap();

    assert_eq!(refund.amount, dec!(20.00));
    assert_eq!(refund.status, RefundStatus::Succeeded);
    assert_eq!(refund.reason, "requested_by_customer");
    assert!(!refund.partial_refund(payment.amount));
    assert!(refund.processor_refund_id.starts_with("re_"));

    let total = app
        .services
        .refunds
        .total_refunded_on(&*app.db, payment.id)
        .await
        .unwrap();
    assert!(payment.fully_refunded(total));
    assert_eq!(payment.refundable_amount(total), dec!(0.00));

    let order = app.services.orders.get_order(payment.order_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Refunded);
}

#[tokio::test]
async fn partial_refunds_accumulate_until_fully_refunded() {
    let app = setup().await;
    let payment = paid_order(&app).await;

    let first = app
        .services
        .refunds
        .create_refund(
            payment.id,
            CreateRefundInput {
                amount: Some(dec!(5.00)),
                reason: Some("damaged_item".to_string()),
            },
        )
        .await
        .unwrap();
    assert!(first.partial_refund(payment.amount));
    assert_eq!(first.refund_percentage(payment.amount), dec!(25.00));

    // A partial refund leaves the order confirmed.
    let order = app.services.orders.get_order(payment.order_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Confirmed);

    // Refunding the remainder settles the order.
    app.services
        .refunds
        .create_refund(
            payment.id,
            CreateRefundInput {
                amount: Some(dec!(15.00)),
                reason: None,
            },
        )
        .await
        .unwrap();
    let order = app.services.orders.get_order(payment.order_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Refunded);

    let refunds = app.services.refunds.list_for_payment(payment.id).await.unwrap();
    assert_eq!(refunds.len(), 2);
}

#[tokio::test]
async fn refund_beyond_remaining_balance_is_rejected() {
    let app = setup().await;
    let payment = paid_order(&app).await;

    app.services
        .refunds
        .create_refund(
            payment.id,
            CreateRefundInput {
                amount: Some(dec!(15.00)),
                reason: None,
            },
        )
        .await
        .unwrap();

    let err = app
        .services
        .refunds
        .create_refund(
            payment.id,
            CreateRefundInput {
                amount: Some(dec!(10.00)),
                reason: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ExceedsRefundable(_)));
}

#[tokio::test]
async fn unsettled_payment_is_not_refundable() {
    let app = setup().await;
    let user_id = Uuid::new_v4();
    let product = seed_product(&app, "Widget", dec!(10.00), 5).await;
    app.services
        .carts
        .add_item(
            user_id,
            AddItemInput {
                product_id: product.id,
                quantity: 1,
            },
        )
        .await
        .unwrap();
    let outcome = app
        .services
        .checkout
        .checkout(user_id, CheckoutInput::default())
        .await
        .unwrap();

    let err = app
        .services
        .refunds
        .create_refund(outcome.payment.id, CreateRefundInput::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotRefundable(_)));
}

#[tokio::test]
async fn fully_refunded_payment_rejects_further_refunds() {
    let app = setup().await;
    let payment = paid_order(&app).await;

    app.services
        .refunds
        .create_refund(payment.id, CreateRefundInput::default())
        .await
        .unwrap();

    let err = app
        .services
        .refunds
        .create_refund(payment.id, CreateRefundInput::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotRefundable(_)));
}

#[tokio::test]
async fn nonpositive_refund_amount_is_rejected() {
    let app = setup().await;
    let payment = paid_order(&app).await;

    let err = app
        .services
        .refunds
        .create_refund(
            payment.id,
            CreateRefundInput {
                amount: Some(dec!(0.00)),
                reason: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn only_pending_refunds_can_be_cancelled() {
    let app = setup().await;
    let payment = paid_order(&app).await;

    // A pending refund, as appears while the processor is still working.
    let pending = refund::ActiveModel {
        id: Set(Uuid::new_v4()),
        payment_id: Set(payment.id),
        order_id: Set(payment.order_id),
        amount: Set(dec!(5.00)),
        status: Set(RefundStatus::Pending),
        processor_refund_id: Set("re_pending_1".to_string()),
        reason: Set("requested_by_customer".to_string()),
        created_at: Set(Utc::now()),
        updated_at: Set(Utc::now()),
    }
    .insert(&*app.db)
    .await
    .unwrap();

    let cancelled = app.services.refunds.cancel_refund(pending.id).await.unwrap();
    assert_eq!(cancelled.status, RefundStatus::Cancelled);

    let settled = app
        .services
        .refunds
        .create_refund(payment.id, CreateRefundInput::default())
        .await
        .unwrap();
    let err = app.services.refunds.cancel_refund(settled.id).await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidState(_)));
}

#[tokio::test]
async fn refund_webhook_settles_pending_refund() {
    let app = setup().await;
    let payment = paid_order(&app).await;

    let pending = refund::ActiveModel {
        id: Set(Uuid::new_v4()),
        payment_id: Set(payment.id),
        order_id: Set(payment.order_id),
        amount: Set(dec!(20.00)),
        status: Set(RefundStatus::Pending),
        processor_refund_id: Set("re_async_1".to_string()),
        reason: Set("requested_by_customer".to_string()),
        created_at: Set(Utc::now()),
        updated_at: Set(Utc::now()),
    }
    .insert(&*app.db)
    .await
    .unwrap();

    app.services
        .webhooks
        .process(storefront_api::payments::WebhookEvent {
            id: "evt_refund_1".to_string(),
            event: storefront_api::payments::ProcessorEvent::RefundUpdated {
                refund_id: "re_async_1".to_string(),
                status: RefundStatus::Succeeded,
            },
        })
        .await
        .unwrap();

    let refund = app.services.refunds.get_refund(pending.id).await.unwrap();
    assert_eq!(refund.status, RefundStatus::Succeeded);

    // The succeeded refund covers the full payment, so the order settles.
    let order = app.services.orders.get_order(payment.order_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Refunded);
}
