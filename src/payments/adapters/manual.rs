use async_trait::async_trait;
use axum::http::HeaderMap;
use tracing::info;

use crate::{
    entities::order,
    errors::ServiceError,
    payments::{GatewayId, GatewaySettings, PaymentAdapter, PaymentInitResult, SignatureError, WebhookEvent},
};

/// Cash on delivery and WhatsApp/UPI: payment is collected out of band and
/// recorded by an administrator.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManualAdapter;

#[async_trait]
impl PaymentAdapter for ManualAdapter {
    fn gateway(&self) -> GatewayId {
        GatewayId::Cod
    }

    async fn initiate(
        &self,
        order: &order::Model,
        settings: &GatewaySettings,
    ) -> Result<PaymentInitResult, ServiceError> {
        info!(order_id = %order.id, gateway = %settings.id, "manual payment selected");
        Ok(PaymentInitResult::Manual)
    }

    fn verify_webhook(
        &self,
        _raw_body: &[u8],
        _headers: &HeaderMap,
        _secret: &str,
    ) -> Result<(), SignatureError> {
        Err(SignatureError::Unsupported(GatewayId::Cod))
    }

    fn parse_event(&self, _raw_body: &[u8]) -> Result<WebhookEvent, serde_json::Error> {
        Ok(WebhookEvent::Ignored {
            event_type: "manual".to_string(),
        })
    }
}
