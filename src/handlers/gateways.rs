use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use strum::IntoEnumIterator;
use tracing::info;

use crate::{
    auth::AdminUser,
    errors::ServiceError,
    payments::{settings::AdminGateway, GatewayId},
    ApiResponse, ApiResult, AppState,
};

#[derive(Debug, Deserialize)]
pub struct SaveGatewayRequest {
    pub enabled: bool,
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

/// GET /api/v1/admin/gateways
///
/// Every registered gateway, stored or not, with secrets masked.
pub async fn list_gateways(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> ApiResult<Vec<AdminGateway>> {
    let settings = state.services.gateways.load().await?;
    let gateways = GatewayId::iter()
        .map(|id| settings.get(id).admin_view())
        .collect();
    Ok(Json(ApiResponse::success(gateways)))
}

/// PUT /api/v1/admin/gateways/:id
pub async fn save_gateway(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    Json(payload): Json<SaveGatewayRequest>,
) -> ApiResult<AdminGateway> {
    let gateway = id
        .parse::<GatewayId>()
        .map_err(|_| ServiceError::NotFound(format!("Payment gateway {} not found", id)))?;

    let saved = state
        .services
        .gateways
        .save(gateway, payload.enabled, &payload.config)
        .await?;
    info!(gateway = %gateway, enabled = saved.enabled, by = %admin.user_id, "gateway settings saved");
    Ok(Json(ApiResponse::success(saved.admin_view())))
}
