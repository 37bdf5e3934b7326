use std::sync::Arc;

use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    errors::ServiceError,
    payments::{GatewayId, PaymentAdapters, WebhookEvent},
    services::{
        gateway_settings::GatewaySettingsService,
        order_status::{OrderStatusService, SettlementOutcome},
    },
};

/// How a delivery was answered. Providers retry on anything but 2xx.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Accepted. `settlement` is `None` when nothing was applied.
    Ack {
        settlement: Option<SettlementOutcome>,
    },
    /// Permanent rejection; the provider should not bother retrying.
    Reject(String),
    /// Transient failure; the provider retries later.
    Retry(String),
}

impl WebhookOutcome {
    fn ack() -> Self {
        Self::Ack { settlement: None }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Ack { .. } => StatusCode::OK,
            Self::Reject(_) => StatusCode::BAD_REQUEST,
            Self::Retry(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for WebhookOutcome {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match self {
            Self::Ack { .. } => json!({ "received": true }),
            Self::Reject(message) | Self::Retry(message) => json!({ "error": message }),
        };
        (status, Json(body)).into_response()
    }
}

/// Verifies, correlates and applies provider notifications.
#[derive(Clone)]
pub struct WebhookReconciler {
    gateways: Arc<GatewaySettingsService>,
    adapters: PaymentAdapters,
    orders: Arc<OrderStatusService>,
    stripe_secret: Option<String>,
    razorpay_secret: Option<String>,
}

impl WebhookReconciler {
    pub fn new(
        gateways: Arc<GatewaySettingsService>,
        adapters: PaymentAdapters,
        orders: Arc<OrderStatusService>,
        config: &AppConfig,
    ) -> Self {
        Self {
            gateways,
            adapters,
            orders,
            stripe_secret: config.stripe_webhook_secret.clone(),
            razorpay_secret: config.razorpay_webhook_secret.clone(),
        }
    }

    /// Handles one delivery. The body must be the exact bytes received; the
    /// signature is checked before anything is parsed.
    #[instrument(skip_all)]
    pub async fn handle(&self, raw_body: &[u8], headers: &HeaderMap) -> WebhookOutcome {
        let Some(gateway) = GatewayId::from_webhook_headers(headers) else {
            reject_metric("unknown_provider");
            warn!("webhook without a recognised signature header");
            return WebhookOutcome::Reject("Unrecognised webhook provider".to_string());
        };

        let settings = match self.gateways.load().await {
            Ok(settings) => settings.get(gateway),
            Err(e) => {
                error!(provider = %gateway, "could not load gateway settings: {}", e);
                return WebhookOutcome::Retry("Webhook processing failed".to_string());
            }
        };

        let secret = settings
            .webhook_secret()
            .map(str::to_string)
            .or_else(|| self.fallback_secret(gateway));
        let Some(secret) = secret else {
            error!(provider = %gateway, "webhook secret not configured");
            return WebhookOutcome::Retry("Webhook secret not configured".to_string());
        };

        let adapter = self.adapters.get(gateway);
        if let Err(e) = adapter.verify_webhook(raw_body, headers, &secret) {
            reject_metric("signature");
            warn!(provider = %gateway, reason = %e, "webhook signature rejected");
            return WebhookOutcome::Reject("Invalid signature".to_string());
        }

        let event = match adapter.parse_event(raw_body) {
            Ok(event) => event,
            Err(e) => {
                warn!(provider = %gateway, "authentic webhook with unreadable payload: {}", e);
                return WebhookOutcome::ack();
            }
        };

        let (order_ref, succeeded) = match event {
            WebhookEvent::PaymentSucceeded { order_ref } => (order_ref, true),
            WebhookEvent::PaymentFailed { order_ref } => (order_ref, false),
            WebhookEvent::Ignored { event_type } => {
                info!(provider = %gateway, event_type = %event_type, "webhook event ignored");
                return WebhookOutcome::ack();
            }
        };

        let Some(order_id) = order_ref.as_deref().and_then(|r| Uuid::parse_str(r.trim()).ok())
        else {
            warn!(provider = %gateway, order_ref = ?order_ref, "webhook without a usable order reference");
            return WebhookOutcome::ack();
        };

        match self.orders.get_order(order_id).await {
            Ok(order) if order.payment_method != gateway.to_string() => {
                metrics::counter!("storefront_webhook_provider_mismatch_total", 1, "provider" => gateway.to_string());
                warn!(
                    provider = %gateway,
                    order_id = %order_id,
                    payment_method = %order.payment_method,
                    "webhook provider differs from the order's payment method"
                );
            }
            Ok(_) => {}
            Err(ServiceError::NotFound(_)) => {
                warn!(provider = %gateway, order_id = %order_id, "webhook for unknown order");
                return WebhookOutcome::ack();
            }
            Err(e) => {
                error!(provider = %gateway, order_id = %order_id, "webhook order lookup failed: {}", e);
                return WebhookOutcome::Retry("Webhook processing failed".to_string());
            }
        }

        let result = if succeeded {
            self.orders.settle_payment(order_id, gateway).await
        } else {
            self.orders.fail_payment(order_id, gateway).await
        };

        match result {
            Ok(outcome) => {
                info!(provider = %gateway, order_id = %order_id, outcome = ?outcome, "webhook reconciled");
                WebhookOutcome::Ack {
                    settlement: Some(outcome),
                }
            }
            Err(ServiceError::NotFound(_)) => {
                warn!(provider = %gateway, order_id = %order_id, "webhook for unknown order");
                WebhookOutcome::ack()
            }
            Err(e) => {
                error!(provider = %gateway, order_id = %order_id, "webhook settlement failed: {}", e);
                WebhookOutcome::Retry("Webhook processing failed".to_string())
            }
        }
    }

    fn fallback_secret(&self, gateway: GatewayId) -> Option<String> {
        match gateway {
            GatewayId::Stripe => self.stripe_secret.clone(),
            GatewayId::Razorpay => self.razorpay_secret.clone(),
            GatewayId::Cod | GatewayId::Whatsapp => None,
        }
        .filter(|s| !s.trim().is_empty())
    }
}

fn reject_metric(reason: &'static str) {
    metrics::counter!("storefront_webhook_rejections_total", 1, "reason" => reason);
}
