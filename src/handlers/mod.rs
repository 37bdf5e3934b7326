pub mod cart;
pub mod checkout;
pub mod gateways;
pub mod health;
pub mod orders;
pub mod payment_webhooks;
pub mod shipments;

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::{
    config::AppConfig,
    db::TransactionSupport,
    events::EventSender,
    payments::PaymentAdapters,
    services::{
        catalog::DbCatalog,
        commerce::{CartService, CartValidator, CheckoutService},
        gateway_settings::GatewaySettingsService,
        order_commit::OrderCommitService,
        order_status::OrderStatusService,
        shipments::ShipmentService,
    },
    shipping::{CarrierClient, TrackingStatusMap},
    webhooks::WebhookReconciler,
};

/// Service container shared by every handler.
#[derive(Clone)]
pub struct AppServices {
    pub cart: Arc<CartService>,
    pub cart_validator: Arc<CartValidator>,
    pub checkout: Arc<CheckoutService>,
    pub order_commit: Arc<OrderCommitService>,
    pub orders: Arc<OrderStatusService>,
    pub gateways: Arc<GatewaySettingsService>,
    pub shipments: Arc<ShipmentService>,
    pub webhooks: Arc<WebhookReconciler>,
}

impl AppServices {
    /// Wires every service against one pool. Provider and carrier clients are
    /// passed in so tests can substitute fakes.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: &AppConfig,
        tx_support: TransactionSupport,
        event_sender: Arc<EventSender>,
        adapters: PaymentAdapters,
        carrier: Arc<dyn CarrierClient>,
    ) -> Self {
        let orders = Arc::new(OrderStatusService::new(
            db.clone(),
            event_sender.clone(),
            tx_support,
        ));
        let order_commit = Arc::new(OrderCommitService::new(
            db.clone(),
            event_sender.clone(),
            tx_support,
        ));
        let gateways = Arc::new(GatewaySettingsService::new(db.clone()));
        let checkout = Arc::new(CheckoutService::new(
            order_commit.clone(),
            orders.clone(),
            gateways.clone(),
            adapters.clone(),
            config.default_currency.clone(),
        ));
        let tracking_map = TrackingStatusMap::with_overrides(&config.tracking_override_pairs());
        let shipments = Arc::new(ShipmentService::new(
            db.clone(),
            orders.clone(),
            carrier,
            tracking_map,
            event_sender,
        ));
        let webhooks = Arc::new(WebhookReconciler::new(
            gateways.clone(),
            adapters,
            orders.clone(),
            config,
        ));

        Self {
            cart: Arc::new(CartService::new(db.clone())),
            cart_validator: Arc::new(CartValidator::new(Arc::new(DbCatalog::new(db)))),
            checkout,
            order_commit,
            orders,
            gateways,
            shipments,
            webhooks,
        }
    }
}
