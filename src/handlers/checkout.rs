use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    entities::order,
    errors::ServiceError,
    payments::{settings::PublicGateway, PaymentInitResult},
    services::commerce::{CheckoutRequest, PaymentStart},
    ApiResponse, ApiResult, AppState,
};

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub order: order::Model,
    pub payment: PaymentInitResult,
}

/// Error body for a payment start that failed after the order was stored.
/// Carries the order id so the client can retry payment on it.
#[derive(Debug, Serialize)]
pub struct CheckoutPaymentFailure {
    pub error: String,
    pub message: String,
    pub code: String,
    pub order_id: Uuid,
    pub timestamp: String,
}

/// GET /api/v1/payment-gateways
pub async fn list_gateways(State(state): State<AppState>) -> ApiResult<Vec<PublicGateway>> {
    let settings = state.services.gateways.load().await?;
    let gateways = settings.enabled().map(|g| g.public_view()).collect();
    Ok(Json(ApiResponse::success(gateways)))
}

/// POST /api/v1/checkout
pub async fn checkout(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CheckoutRequest>,
) -> Result<Response, ServiceError> {
    let outcome = state
        .services
        .checkout
        .checkout(&user.user_id, request)
        .await?;

    match outcome.payment {
        Ok(payment) => Ok((
            StatusCode::CREATED,
            Json(ApiResponse::success(CheckoutResponse {
                order: outcome.order,
                payment,
            })),
        )
            .into_response()),
        Err(e) => {
            let status = e.status_code();
            warn!(order_id = %outcome.order.id, "checkout committed without payment start");
            let body = CheckoutPaymentFailure {
                error: status.canonical_reason().unwrap_or("Error").to_string(),
                message: e.response_message(),
                code: e.code().to_string(),
                order_id: outcome.order.id,
                timestamp: chrono::Utc::now().to_rfc3339(),
            };
            Ok((status, Json(body)).into_response())
        }
    }
}

/// POST /api/v1/orders/:id/payment
pub async fn retry_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(order_id): Path<Uuid>,
) -> ApiResult<PaymentStart> {
    let start = state
        .services
        .checkout
        .retry_payment(&user.user_id, order_id)
        .await?;
    Ok(Json(ApiResponse::success(start)))
}
