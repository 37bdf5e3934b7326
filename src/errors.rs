use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Error body returned by every JSON endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Bad Request")
    pub error: String,
    /// Human-readable, user-safe description
    pub message: String,
    /// Machine-readable code (e.g., "item_unavailable")
    pub code: String,
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Shipping address is incomplete: missing {}", .0.join(", "))]
    IncompleteAddress(Vec<String>),

    #[error("Cart is empty")]
    EmptyCart,

    /// Inventory conflict at commit time; carries the product name for the shopper.
    #[error("{0} is no longer available in the requested quantity")]
    ItemUnavailable(String),

    #[error("Payment method {0} is not available")]
    GatewayDisabled(String),

    /// Raw provider diagnostics are logged where the failure happens, never carried here.
    #[error("Payment could not be started. Please try again or choose another method.")]
    PaymentInitFailed,

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Courier service error: {0}")]
    CarrierError(String),

    #[error("Concurrent modification of order {0}")]
    ConcurrentModification(Uuid),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    pub fn invalid_transition(from: impl ToString, to: impl ToString) -> Self {
        ServiceError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseError(_) | Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_) | Self::IncompleteAddress(_) | Self::EmptyCart => {
                StatusCode::BAD_REQUEST
            }
            Self::ItemUnavailable(_) => StatusCode::CONFLICT,
            Self::GatewayDisabled(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::PaymentInitFailed => StatusCode::BAD_GATEWAY,
            Self::InvalidTransition { .. } | Self::ConcurrentModification(_) => {
                StatusCode::CONFLICT
            }
            Self::CarrierError(_) => StatusCode::BAD_GATEWAY,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
        }
    }

    /// Stable code for clients that branch on error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DatabaseError(_) | Self::InternalError(_) => "internal_error",
            Self::NotFound(_) => "not_found",
            Self::ValidationError(_) => "validation_error",
            Self::IncompleteAddress(_) => "incomplete_address",
            Self::EmptyCart => "empty_cart",
            Self::ItemUnavailable(_) => "item_unavailable",
            Self::GatewayDisabled(_) => "gateway_disabled",
            Self::PaymentInitFailed => "payment_init_failed",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::CarrierError(_) => "carrier_error",
            Self::ConcurrentModification(_) => "concurrent_modification",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
        }
    }

    /// Message suitable for HTTP responses. Internal errors are replaced with a
    /// generic message so no implementation detail leaks.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) | Self::InternalError(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            code: self.code().to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(body)).into_response()
    }
}
