use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::{
    auth::AdminUser,
    services::shipments::{ShipmentOutcome, SyncOutcome},
    ApiResponse, ApiResult, AppState,
};

/// POST /api/v1/admin/orders/:id/shipment
pub async fn book_shipment(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(order_id): Path<Uuid>,
) -> ApiResult<ShipmentOutcome> {
    let outcome = state.services.shipments.book_shipment(order_id).await?;
    Ok(Json(ApiResponse::success(outcome)))
}

/// POST /api/v1/admin/orders/:id/shipment/label
pub async fn issue_label(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(order_id): Path<Uuid>,
) -> ApiResult<ShipmentOutcome> {
    let outcome = state
        .services
        .shipments
        .issue_tracking_label(order_id)
        .await?;
    Ok(Json(ApiResponse::success(outcome)))
}

/// POST /api/v1/admin/orders/:id/shipment/cancel
pub async fn cancel_shipment(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(order_id): Path<Uuid>,
) -> ApiResult<ShipmentOutcome> {
    let outcome = state.services.shipments.cancel_shipment(order_id).await?;
    Ok(Json(ApiResponse::success(outcome)))
}

/// POST /api/v1/admin/orders/:id/shipment/sync
pub async fn sync_tracking(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(order_id): Path<Uuid>,
) -> ApiResult<SyncOutcome> {
    let outcome = state
        .services
        .shipments
        .sync_tracking_status(order_id)
        .await?;
    Ok(Json(ApiResponse::success(outcome)))
}
