//! Provider-agnostic payment initiation and webhook verification.

pub mod adapters;
pub mod money;
pub mod registry;
pub mod settings;

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{config::AppConfig, entities::order, errors::ServiceError};

pub use adapters::{ManualAdapter, RazorpayAdapter, StripeAdapter};
pub use settings::{GatewaySettings, PaymentSettings};

/// Closed set of supported gateways.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
    strum::EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum GatewayId {
    Cod,
    Whatsapp,
    Stripe,
    Razorpay,
}

impl GatewayId {
    /// Manual gateways settle outside the system (cash, bank transfer).
    pub fn is_manual(self) -> bool {
        matches!(self, Self::Cod | Self::Whatsapp)
    }

    /// Picks the provider from the signature header it sends.
    pub fn from_webhook_headers(headers: &HeaderMap) -> Option<Self> {
        if headers.contains_key(adapters::stripe::SIGNATURE_HEADER) {
            Some(Self::Stripe)
        } else if headers.contains_key(adapters::razorpay::SIGNATURE_HEADER) {
            Some(Self::Razorpay)
        } else {
            None
        }
    }
}

/// What the client has to do next to complete payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentInitResult {
    /// Nothing to do online; payment is collected out of band.
    Manual,
    /// Confirm with the provider's client SDK.
    ClientConfirm {
        provider_public_key: String,
        confirmation_token: String,
        #[serde(skip)]
        intent_id: String,
    },
    /// Open the provider's hosted checkout.
    Redirect {
        provider_order_ref: String,
        amount_minor_units: i64,
        currency: String,
        public_key: String,
    },
}

impl PaymentInitResult {
    /// Provider-side reference worth keeping on the order.
    pub fn provider_ref(&self) -> Option<&str> {
        match self {
            Self::Manual => None,
            Self::ClientConfirm { intent_id, .. } => Some(intent_id.as_str()),
            Self::Redirect {
                provider_order_ref, ..
            } => Some(provider_order_ref.as_str()),
        }
    }
}

/// Verified provider notification, reduced to what settlement needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    PaymentSucceeded { order_ref: Option<String> },
    PaymentFailed { order_ref: Option<String> },
    Ignored { event_type: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature header {0} missing")]
    MissingHeader(&'static str),
    #[error("signature header malformed")]
    Malformed,
    #[error("signature timestamp outside tolerance")]
    Expired,
    #[error("signature mismatch")]
    Mismatch,
    #[error("gateway {0} does not accept webhooks")]
    Unsupported(GatewayId),
}

#[async_trait]
pub trait PaymentAdapter: Send + Sync {
    fn gateway(&self) -> GatewayId;

    /// Starts a charge for `order`. Settings are the per-request snapshot for this gateway.
    async fn initiate(
        &self,
        order: &order::Model,
        settings: &GatewaySettings,
    ) -> Result<PaymentInitResult, ServiceError>;

    /// Checks the provider signature over the exact raw bytes received.
    fn verify_webhook(
        &self,
        raw_body: &[u8],
        headers: &HeaderMap,
        secret: &str,
    ) -> Result<(), SignatureError>;

    /// Interprets an already verified body.
    fn parse_event(&self, raw_body: &[u8]) -> Result<WebhookEvent, serde_json::Error>;
}

/// One adapter per [`GatewayId`].
#[derive(Clone)]
pub struct PaymentAdapters {
    manual: Arc<dyn PaymentAdapter>,
    stripe: Arc<dyn PaymentAdapter>,
    razorpay: Arc<dyn PaymentAdapter>,
}

impl PaymentAdapters {
    pub fn new(
        manual: Arc<dyn PaymentAdapter>,
        stripe: Arc<dyn PaymentAdapter>,
        razorpay: Arc<dyn PaymentAdapter>,
    ) -> Self {
        Self {
            manual,
            stripe,
            razorpay,
        }
    }

    /// Builds the HTTP-backed adapters from configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self, ServiceError> {
        let client = adapters::provider_client(config.payment_timeout_secs)?;
        Ok(Self::new(
            Arc::new(ManualAdapter),
            Arc::new(StripeAdapter::new(
                client.clone(),
                config.stripe_api_base.clone(),
                config.stripe_webhook_tolerance_secs,
            )),
            Arc::new(RazorpayAdapter::new(client, config.razorpay_api_base.clone())),
        ))
    }

    pub fn get(&self, gateway: GatewayId) -> &dyn PaymentAdapter {
        match gateway {
            GatewayId::Cod | GatewayId::Whatsapp => self.manual.as_ref(),
            GatewayId::Stripe => self.stripe.as_ref(),
            GatewayId::Razorpay => self.razorpay.as_ref(),
        }
    }

    /// Guards, then dispatches to the gateway's adapter.
    pub async fn initiate(
        &self,
        order: &order::Model,
        settings: &GatewaySettings,
    ) -> Result<PaymentInitResult, ServiceError> {
        if !settings.enabled {
            return Err(ServiceError::GatewayDisabled(settings.id.to_string()));
        }
        if order.total_amount <= rust_decimal::Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Order total must be greater than zero".to_string(),
            ));
        }
        self.get(settings.id).initiate(order, settings).await
    }
}
