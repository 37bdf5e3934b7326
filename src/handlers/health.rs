use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::{db, db::TransactionSupport, AppState};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub timestamp: String,
    pub database: &'static str,
    /// Whether order commits run inside a database transaction.
    pub transaction_mode: TransactionSupport,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database_up = db::check_connection(&state.db).await.is_ok();
    let body = HealthResponse {
        status: if database_up { "ok" } else { "unavailable" },
        version: env!("CARGO_PKG_VERSION"),
        timestamp: chrono::Utc::now().to_rfc3339(),
        database: if database_up { "up" } else { "down" },
        transaction_mode: state.tx_support,
    };
    let status = if database_up {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}
