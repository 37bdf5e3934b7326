use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::AuthUser,
    errors::ServiceError,
    models::{Cart, CartSummary, ValidationReport},
    ApiResponse, ApiResult, AppState,
};

#[derive(Debug, Deserialize, Validate)]
pub struct AddItemRequest {
    pub product_id: Uuid,
    #[serde(default = "one")]
    #[validate(range(min = 1, max = 10000))]
    pub quantity: u32,
}

fn one() -> u32 {
    1
}

/// A line as held by the client, with the price it last showed the shopper.
#[derive(Debug, Deserialize, Validate)]
pub struct ClientCartLine {
    pub product_id: Uuid,
    #[serde(default)]
    pub name: String,
    pub unit_price: Decimal,
    #[validate(range(min = 1, max = 10000))]
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct ValidateCartRequest {
    #[serde(default)]
    pub lines: Vec<ClientCartLine>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ValidateQuery {
    /// Store the corrected cart when the check changed anything.
    #[serde(default)]
    pub persist: bool,
}

#[derive(Debug, Serialize)]
pub struct CartValidationResponse {
    pub cart: CartSummary,
    pub warnings: Vec<String>,
    pub removed: Vec<Uuid>,
    pub persisted: bool,
}

impl CartValidationResponse {
    fn new(report: ValidationReport, persisted: bool) -> Self {
        Self {
            cart: report.cart.summary(),
            warnings: report.warnings,
            removed: report.removed,
            persisted,
        }
    }
}

/// GET /api/v1/cart
pub async fn get_cart(State(state): State<AppState>, user: AuthUser) -> ApiResult<CartSummary> {
    let cart = state.services.cart.get_cart(&user.user_id).await?;
    Ok(Json(ApiResponse::success(cart.summary())))
}

/// POST /api/v1/cart/items
pub async fn add_item(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<AddItemRequest>,
) -> ApiResult<CartSummary> {
    payload.validate()?;
    let cart = state
        .services
        .cart
        .add_item(&user.user_id, payload.product_id, payload.quantity)
        .await?;
    Ok(Json(ApiResponse::success(cart.summary())))
}

/// POST /api/v1/cart/items/:product_id/decrement
pub async fn decrement_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(product_id): Path<Uuid>,
) -> ApiResult<CartSummary> {
    let cart = state
        .services
        .cart
        .decrement_item(&user.user_id, product_id)
        .await?;
    Ok(Json(ApiResponse::success(cart.summary())))
}

/// DELETE /api/v1/cart/items/:product_id
pub async fn remove_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(product_id): Path<Uuid>,
) -> ApiResult<CartSummary> {
    let cart = state
        .services
        .cart
        .remove_item(&user.user_id, product_id)
        .await?;
    Ok(Json(ApiResponse::success(cart.summary())))
}

/// DELETE /api/v1/cart
pub async fn clear_cart(State(state): State<AppState>, user: AuthUser) -> ApiResult<CartSummary> {
    let cart = state.services.cart.clear_cart(&user.user_id).await?;
    Ok(Json(ApiResponse::success(cart.summary())))
}

/// POST /api/v1/cart/validate
///
/// Re-prices a cart against the catalog. The body may carry the client-held
/// `lines`; without a body the stored cart is checked. With `?persist=true` the
/// corrected lines replace the stored ones.
pub async fn validate_cart(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ValidateQuery>,
    body: Bytes,
) -> ApiResult<CartValidationResponse> {
    let client_cart = parse_client_cart(&user.user_id, &body)?;
    let submitted = client_cart.is_some();
    let cart = match client_cart {
        Some(cart) => cart,
        None => state.services.cart.get_cart(&user.user_id).await?,
    };
    let report = state.services.cart_validator.validate(&cart).await?;

    let persisted = query.persist && (submitted || report.has_changes());
    if persisted {
        state
            .services
            .cart
            .replace_lines(&user.user_id, &report.cart)
            .await?;
        info!(warnings = report.warnings.len(), submitted, "corrected cart stored");
    }

    Ok(Json(ApiResponse::success(CartValidationResponse::new(
        report, persisted,
    ))))
}

/// Builds a cart from a `{"lines": [...]}` body. An empty body means none was sent.
fn parse_client_cart(owner_ref: &str, body: &[u8]) -> Result<Option<Cart>, ServiceError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    let request: ValidateCartRequest = serde_json::from_slice(body)
        .map_err(|e| ServiceError::ValidationError(format!("Invalid cart body: {}", e)))?;

    let mut cart = Cart::new(owner_ref);
    for line in &request.lines {
        line.validate()?;
        let name = if line.name.trim().is_empty() {
            format!("Item {}", line.product_id)
        } else {
            line.name.clone()
        };
        cart.add(line.product_id, &name, line.unit_price, line.quantity);
    }
    Ok(Some(cart))
}
