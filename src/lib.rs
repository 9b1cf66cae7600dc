//! Storefront API Library
//!
//! Core order, payment and refund lifecycle for the storefront backend:
//! carts, checkout, payment-intent tracking against an external processor,
//! webhook reconciliation and refunds.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod logging;
pub mod payments;
pub mod services;

use crate::payments::PaymentProcessor;
use sea_orm::DatabaseConnection;
use std::sync::Arc;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: Arc<events::EventSender>,
    pub services: services::AppServices,
}

impl AppState {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: Arc<events::EventSender>,
        processor: Arc<dyn PaymentProcessor>,
    ) -> Self {
        let services =
            services::AppServices::new(db.clone(), event_sender.clone(), processor, &config);
        Self {
            db,
            config,
            event_sender,
            services,
        }
    }
}
