//! Storefront API
//!
//! Cart validation, atomic order commit, payment initiation and settlement, and
//! courier shipment orchestration behind an axum HTTP surface.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod models;
pub mod payments;
pub mod services;
pub mod shipping;
pub mod webhooks;

use std::sync::Arc;

use axum::{
    response::Json,
    routing::{delete, get, post, put},
    Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;

pub use handlers::AppServices;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<config::AppConfig>,
    /// Decided once at startup by [`db::TransactionSupport::detect`].
    pub tx_support: db::TransactionSupport,
    pub services: AppServices,
}

// Common response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Shopper-facing routes, mounted under `/api/v1`.
pub fn storefront_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/cart",
            get(handlers::cart::get_cart).delete(handlers::cart::clear_cart),
        )
        .route("/cart/items", post(handlers::cart::add_item))
        .route(
            "/cart/items/:product_id/decrement",
            post(handlers::cart::decrement_item),
        )
        .route(
            "/cart/items/:product_id",
            delete(handlers::cart::remove_item),
        )
        .route("/cart/validate", post(handlers::cart::validate_cart))
        .route(
            "/payment-gateways",
            get(handlers::checkout::list_gateways),
        )
        .route("/checkout", post(handlers::checkout::checkout))
        .route("/orders", get(handlers::orders::list_my_orders))
        .route("/orders/:id", get(handlers::orders::get_order))
        .route(
            "/orders/:id/payment",
            post(handlers::checkout::retry_payment),
        )
        .route(
            "/payments/webhook",
            post(handlers::payment_webhooks::payment_webhook),
        )
}

/// Operator routes, mounted under `/api/v1/admin`. Each handler requires the
/// administrator role.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/gateways", get(handlers::gateways::list_gateways))
        .route("/gateways/:id", put(handlers::gateways::save_gateway))
        .route("/orders", get(handlers::orders::list_orders))
        .route(
            "/orders/:id/status",
            put(handlers::orders::update_order_status),
        )
        .route(
            "/orders/:id/payment",
            post(handlers::orders::record_manual_payment),
        )
        .route(
            "/orders/:id/shipment",
            post(handlers::shipments::book_shipment),
        )
        .route(
            "/orders/:id/shipment/label",
            post(handlers::shipments::issue_label),
        )
        .route(
            "/orders/:id/shipment/cancel",
            post(handlers::shipments::cancel_shipment),
        )
        .route(
            "/orders/:id/shipment/sync",
            post(handlers::shipments::sync_tracking),
        )
}

/// Complete router with state applied. HTTP layers are added by the binary.
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .nest("/api/v1", storefront_routes())
        .nest("/api/v1/admin", admin_routes())
        .with_state(state)
}
