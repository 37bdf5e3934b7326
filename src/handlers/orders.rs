use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::{AdminUser, AuthUser},
    entities::{order, order_line},
    models::OrderStatus,
    services::order_status::OrderPage,
    ApiResponse, ApiResult, AppState,
};

#[derive(Debug, Serialize)]
pub struct OrderView {
    #[serde(flatten)]
    pub order: order::Model,
    pub lines: Vec<order_line::Model>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ListOrdersQuery {
    pub status: Option<OrderStatus>,
    #[serde(default = "default_page")]
    #[validate(range(min = 1))]
    pub page: u64,
    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 100))]
    pub limit: u64,
}

fn default_page() -> u64 {
    1
}

fn default_limit() -> u64 {
    20
}

async fn order_view(state: &AppState, order: order::Model) -> ApiResult<OrderView> {
    let lines = state.services.orders.get_lines(order.id).await?;
    Ok(Json(ApiResponse::success(OrderView { order, lines })))
}

/// GET /api/v1/orders
///
/// The caller's own orders, newest first.
pub async fn list_my_orders(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Vec<order::Model>> {
    let orders = state.services.orders.list_for_owner(&user.user_id).await?;
    Ok(Json(ApiResponse::success(orders)))
}

/// GET /api/v1/admin/orders?status=&page=&limit=
pub async fn list_orders(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<ListOrdersQuery>,
) -> ApiResult<OrderPage> {
    query.validate()?;
    let page = state
        .services
        .orders
        .list_orders(query.status, query.page, query.limit)
        .await?;
    Ok(Json(ApiResponse::success(page)))
}

/// GET /api/v1/orders/:id
///
/// Shoppers see their own orders; administrators see any.
pub async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(order_id): Path<Uuid>,
) -> ApiResult<OrderView> {
    let orders = &state.services.orders;
    let order = if user.is_admin() {
        orders.get_order(order_id).await?
    } else {
        orders.get_order_for_owner(&user.user_id, order_id).await?
    };
    order_view(&state, order).await
}

/// PUT /api/v1/admin/orders/:id/status
///
/// Cancellation goes through the shipment orchestrator so a booked courier is
/// cancelled as well.
pub async fn update_order_status(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> ApiResult<OrderView> {
    let order = if payload.status == OrderStatus::Cancelled {
        state.services.shipments.cancel_shipment(order_id).await?;
        state.services.orders.get_order(order_id).await?
    } else {
        state
            .services
            .orders
            .update_status(order_id, payload.status)
            .await?
    };
    order_view(&state, order).await
}

/// POST /api/v1/admin/orders/:id/payment
pub async fn record_manual_payment(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(order_id): Path<Uuid>,
) -> ApiResult<OrderView> {
    let order = state.services.orders.record_manual_payment(order_id).await?;
    order_view(&state, order).await
}
