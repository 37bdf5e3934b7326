use async_trait::async_trait;
use axum::http::HeaderMap;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};

use super::{provider_failure, verify_hex_hmac};
use crate::{
    entities::order,
    errors::ServiceError,
    payments::{
        money::to_minor_units, GatewayId, GatewaySettings, PaymentAdapter, PaymentInitResult,
        SignatureError, WebhookEvent,
    },
};

pub const SIGNATURE_HEADER: &str = "stripe-signature";
const DEFAULT_CURRENCY: &str = "usd";

/// Payment intents confirmed on the client with the publishable key.
#[derive(Clone)]
pub struct StripeAdapter {
    client: reqwest::Client,
    api_base: String,
    tolerance_secs: u64,
}

#[derive(Debug, Deserialize)]
struct PaymentIntentResponse {
    id: String,
    client_secret: String,
}

impl StripeAdapter {
    pub fn new(client: reqwest::Client, api_base: String, tolerance_secs: u64) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            tolerance_secs,
        }
    }
}

/// Splits `t=<unix>,v1=<hex>[,v1=<hex>...]`.
fn parse_signature_header(header: &str) -> Result<(i64, Vec<&str>), SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => {
                timestamp = Some(value.parse::<i64>().map_err(|_| SignatureError::Malformed)?)
            }
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }
    match timestamp {
        Some(t) if !signatures.is_empty() => Ok((t, signatures)),
        _ => Err(SignatureError::Malformed),
    }
}

#[async_trait]
impl PaymentAdapter for StripeAdapter {
    fn gateway(&self) -> GatewayId {
        GatewayId::Stripe
    }

    #[instrument(skip(self, order, settings), fields(order_id = %order.id, gateway = "stripe"))]
    async fn initiate(
        &self,
        order: &order::Model,
        settings: &GatewaySettings,
    ) -> Result<PaymentInitResult, ServiceError> {
        let publishable_key = settings.require("publishableKey")?;
        let secret_key = settings.require("secretKey")?;
        let currency = if order.currency.trim().is_empty() {
            DEFAULT_CURRENCY.to_string()
        } else {
            order.currency.trim().to_lowercase()
        };
        let amount = to_minor_units(order.total_amount, &currency)?;

        let form = [
            ("amount", amount.to_string()),
            ("currency", currency),
            ("metadata[orderId]", order.id.to_string()),
            ("automatic_payment_methods[enabled]", "true".to_string()),
        ];

        let response = self
            .client
            .post(format!("{}/v1/payment_intents", self.api_base))
            .basic_auth(secret_key, None::<&str>)
            .header("Idempotency-Key", format!("order-{}-{}", order.id, amount))
            .form(&form)
            .send()
            .await
            .map_err(|e| provider_failure("stripe", order.id, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(provider_failure(
                "stripe",
                order.id,
                format!("status {}: {}", status, body),
            ));
        }

        let intent: PaymentIntentResponse = response
            .json()
            .await
            .map_err(|e| provider_failure("stripe", order.id, e))?;
        debug!(intent_id = %intent.id, "payment intent created");

        Ok(PaymentInitResult::ClientConfirm {
            provider_public_key: publishable_key.to_string(),
            confirmation_token: intent.client_secret,
            intent_id: intent.id,
        })
    }

    fn verify_webhook(
        &self,
        raw_body: &[u8],
        headers: &HeaderMap,
        secret: &str,
    ) -> Result<(), SignatureError> {
        let header = headers
            .get(SIGNATURE_HEADER)
            .and_then(|h| h.to_str().ok())
            .ok_or(SignatureError::MissingHeader(SIGNATURE_HEADER))?;
        let (timestamp, signatures) = parse_signature_header(header)?;

        let now = chrono::Utc::now().timestamp();
        if now.abs_diff(timestamp) > self.tolerance_secs {
            return Err(SignatureError::Expired);
        }

        let mut signed = format!("{}.", timestamp).into_bytes();
        signed.extend_from_slice(raw_body);

        if signatures
            .iter()
            .any(|sig| verify_hex_hmac(secret, &signed, sig))
        {
            Ok(())
        } else {
            Err(SignatureError::Mismatch)
        }
    }

    fn parse_event(&self, raw_body: &[u8]) -> Result<WebhookEvent, serde_json::Error> {
        let event: Value = serde_json::from_slice(raw_body)?;
        let event_type = event["type"].as_str().unwrap_or_default();
        let order_ref = event["data"]["object"]["metadata"]["orderId"]
            .as_str()
            .map(str::to_string);

        Ok(match event_type {
            "payment_intent.succeeded" => WebhookEvent::PaymentSucceeded { order_ref },
            "payment_intent.payment_failed" => WebhookEvent::PaymentFailed { order_ref },
            other => WebhookEvent::Ignored {
                event_type: other.to_string(),
            },
        })
    }
}
