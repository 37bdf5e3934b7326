use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::order,
    errors::ServiceError,
    models::{OrderStatus, PaymentStatus, ShippingAddress},
    payments::{GatewayId, PaymentAdapters, PaymentInitResult},
    services::{
        gateway_settings::GatewaySettingsService,
        order_commit::{CommitRequest, OrderCommitService},
        order_status::OrderStatusService,
    },
};

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
    pub shipping_address: ShippingAddress,
    pub payment_method: String,
}

/// The committed order plus the result of starting payment. Payment can fail
/// after the order exists; the shopper then retries against the same order.
#[derive(Debug)]
pub struct CheckoutOutcome {
    pub order: order::Model,
    pub payment: Result<PaymentInitResult, ServiceError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentStart {
    pub order_id: Uuid,
    pub payment: PaymentInitResult,
}

/// Orchestrates commit and payment initiation.
#[derive(Clone)]
pub struct CheckoutService {
    commit: Arc<OrderCommitService>,
    orders: Arc<OrderStatusService>,
    gateways: Arc<GatewaySettingsService>,
    adapters: PaymentAdapters,
    default_currency: String,
}

impl CheckoutService {
    pub fn new(
        commit: Arc<OrderCommitService>,
        orders: Arc<OrderStatusService>,
        gateways: Arc<GatewaySettingsService>,
        adapters: PaymentAdapters,
        default_currency: String,
    ) -> Self {
        Self {
            commit,
            orders,
            gateways,
            adapters,
            default_currency,
        }
    }

    /// Commits the owner's cart and starts payment with the chosen gateway.
    ///
    /// The gateway is checked before anything is written: an unknown id is a
    /// `ValidationError`, a disabled one `GatewayDisabled`.
    #[instrument(skip(self, request), fields(owner = %owner_ref, gateway = %request.payment_method))]
    pub async fn checkout(
        &self,
        owner_ref: &str,
        request: CheckoutRequest,
    ) -> Result<CheckoutOutcome, ServiceError> {
        let gateway = parse_gateway(&request.payment_method)?;
        let settings = self.gateways.load().await?.get(gateway);
        if !settings.enabled {
            return Err(ServiceError::GatewayDisabled(gateway.to_string()));
        }

        let order = self
            .commit
            .commit_order(CommitRequest {
                owner_ref: owner_ref.to_string(),
                shipping_address: request.shipping_address,
                payment_method: gateway.to_string(),
                currency: settings.currency_or(&self.default_currency),
            })
            .await?;

        let payment = self.adapters.initiate(&order, &settings).await;
        match &payment {
            Ok(result) => self.remember_ref(order.id, result).await,
            Err(e) => warn!(order_id = %order.id, "payment initiation failed after commit: {}", e),
        }

        Ok(CheckoutOutcome { order, payment })
    }

    /// Starts payment again for an unpaid order that belongs to the caller.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn retry_payment(
        &self,
        owner_ref: &str,
        order_id: Uuid,
    ) -> Result<PaymentStart, ServiceError> {
        let order = self.orders.get_order_for_owner(owner_ref, order_id).await?;
        if order.status != OrderStatus::Pending || order.payment_status != PaymentStatus::Pending {
            return Err(ServiceError::ValidationError(format!(
                "Order {} is not awaiting payment",
                order_id
            )));
        }

        let gateway = parse_gateway(&order.payment_method)?;
        let settings = self.gateways.load().await?.get(gateway);
        let payment = self.adapters.initiate(&order, &settings).await?;
        self.remember_ref(order.id, &payment).await;

        info!("payment re-initiated");
        Ok(PaymentStart { order_id, payment })
    }

    async fn remember_ref(&self, order_id: Uuid, result: &PaymentInitResult) {
        if let Some(reference) = result.provider_ref() {
            if let Err(e) = self.orders.set_payment_ref(order_id, reference).await {
                warn!(order_id = %order_id, "could not store payment reference: {}", e);
            }
        }
    }
}

fn parse_gateway(raw: &str) -> Result<GatewayId, ServiceError> {
    raw.trim()
        .parse::<GatewayId>()
        .map_err(|_| ServiceError::ValidationError(format!("Unknown payment method '{}'", raw)))
}
