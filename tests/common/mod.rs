//! Shared harness for integration tests: an in-memory SQLite database
//! with the full schema, a drained event channel, and a sandbox payment
//! processor.
#![allow(dead_code)]

use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, Set};
use std::sync::Arc;
use storefront_api::{
    config::AppConfig,
    db::{self, DbPool},
    entities::{product, ProductModel},
    events::EventSender,
    payments::SandboxProcessor,
    services::AppServices,
};
use uuid::Uuid;

pub struct TestApp {
    pub db: Arc<DbPool>,
    pub services: AppServices,
    pub processor: Arc<SandboxProcessor>,
}

/// Builds a fresh application over an in-memory SQLite database.
///
/// The pool is capped at a single connection so every query shares the
/// one in-memory database.
pub async fn setup() -> TestApp {
    let mut opts = ConnectOptions::new("sqlite::memory:".to_string());
    opts.max_connections(1).sqlx_logging(false);
    let db = Arc::new(Database::connect(opts).await.expect("connect sqlite"));
    db::init_schema(&db).await.expect("init schema");

    let (event_sender, mut rx) = EventSender::channel(64);
    // Drain events so senders never hit a full buffer mid-test.
    tokio::spawn(async move { while rx.recv().await.is_some() {} });

    let config = AppConfig::new(
        "sqlite::memory:".to_string(),
        "127.0.0.1".to_string(),
        8080,
        "test".to_string(),
    );
    let processor = Arc::new(SandboxProcessor::new());
    let services = AppServices::new(
        db.clone(),
        Arc::new(event_sender),
        processor.clone(),
        &config,
    );

    TestApp {
        db,
        services,
        processor,
    }
}

pub async fn seed_product(app: &TestApp, name: &str, price: Decimal, stock: i32) -> ProductModel {
    let now = chrono::Utc::now();
    product::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        sku: Set(None),
        description: Set(None),
        price: Set(price),
        stock_quantity: Set(stock),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&*app.db)
    .await
    .expect("insert product")
}

pub async fn stock_of(app: &TestApp, product_id: Uuid) -> i32 {
    app.services
        .inventory
        .get_product(product_id)
        .await
        .expect("product exists")
        .stock_quantity
}
