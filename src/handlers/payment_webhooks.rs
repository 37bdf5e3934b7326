use axum::{extract::State, http::HeaderMap, response::IntoResponse};
use bytes::Bytes;

use crate::AppState;

/// POST /api/v1/payments/webhook
///
/// Takes the body as raw bytes; signatures are computed over exactly what the
/// provider sent.
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    state.services.webhooks.handle(&body, &headers).await
}
