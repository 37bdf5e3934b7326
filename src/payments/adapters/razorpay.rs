use async_trait::async_trait;
use axum::http::HeaderMap;
use serde::Deserialize;
use serde_json::{json, Value};
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

pub const SIGNATURE_HEADER: &str = "x-razorpay-signature";
const DEFAULT_CURRENCY: &str = "INR";

/// Hosted checkout: we create a provider order and the browser completes it.
#[derive(Clone)]
pub struct RazorpayAdapter {
    client: reqwest::Client,
    api_base: String,
}

#[derive(Debug, Deserialize)]
struct RazorpayOrderResponse {
    id: String,
    amount: i64,
    currency: String,
}

impl RazorpayAdapter {
    pub fn new(client: reqwest::Client, api_base: String) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }
}

/// Order id from payment notes, falling back to the order receipt.
fn order_reference(event: &Value) -> Option<String> {
    let payload = &event["payload"];
    payload["payment"]["entity"]["notes"]["orderId"]
        .as_str()
        .or_else(|| payload["order"]["entity"]["notes"]["orderId"].as_str())
        .or_else(|| payload["order"]["entity"]["receipt"].as_str())
        .map(str::to_string)
}

#[async_trait]
impl PaymentAdapter for RazorpayAdapter {
    fn gateway(&self) -> GatewayId {
        GatewayId::Razorpay
    }

    #[instrument(skip(self, order, settings), fields(order_id = %order.id, gateway = "razorpay"))]
    async fn initiate(
        &self,
        order: &order::Model,
        settings: &GatewaySettings,
    ) -> Result<PaymentInitResult, ServiceError> {
        let key_id = settings.require("keyId")?;
        let key_secret = settings.require("keySecret")?;
        let currency = if order.currency.trim().is_empty() {
            DEFAULT_CURRENCY.to_string()
        } else {
            order.currency.trim().to_uppercase()
        };
        let amount = to_minor_units(order.total_amount, &currency)?;

        let response = self
            .client
            .post(format!("{}/v1/orders", self.api_base))
            .basic_auth(key_id, Some(key_secret))
            .json(&json!({
                "amount": amount,
                "currency": currency,
                "receipt": order.id.to_string(),
                "notes": { "orderId": order.id.to_string() },
            }))
            .send()
            .await
            .map_err(|e| provider_failure("razorpay", order.id, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(provider_failure(
                "razorpay",
                order.id,
                format!("status {}: {}", status, body),
            ));
        }

        let created: RazorpayOrderResponse = response
            .json()
            .await
            .map_err(|e| provider_failure("razorpay", order.id, e))?;
        debug!(provider_order = %created.id, "razorpay order created");

        Ok(PaymentInitResult::Redirect {
            provider_order_ref: created.id,
            amount_minor_units: created.amount,
            currency: created.currency,
            public_key: key_id.to_string(),
        })
    }

    fn verify_webhook(
        &self,
        raw_body: &[u8],
        headers: &HeaderMap,
        secret: &str,
    ) -> Result<(), SignatureError> {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|h| h.to_str().ok())
            .ok_or(SignatureError::MissingHeader(SIGNATURE_HEADER))?;
        if verify_hex_hmac(secret, raw_body, signature) {
            Ok(())
        } else {
            Err(SignatureError::Mismatch)
        }
    }

    fn parse_event(&self, raw_body: &[u8]) -> Result<WebhookEvent, serde_json::Error> {
        let event: Value = serde_json::from_slice(raw_body)?;
        let event_type = event["event"].as_str().unwrap_or_default();
        let order_ref = order_reference(&event);

        Ok(match event_type {
            "order.paid" | "payment.captured" => WebhookEvent::PaymentSucceeded { order_ref },
            "payment.failed" => WebhookEvent::PaymentFailed { order_ref },
            other => WebhookEvent::Ignored {
                event_type: other.to_string(),
            },
        })
    }
}
