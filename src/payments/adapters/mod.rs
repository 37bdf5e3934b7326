pub mod manual;
pub mod razorpay;
pub mod stripe;

use std::time::Duration;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::error;

use crate::errors::ServiceError;

pub use manual::ManualAdapter;
pub use razorpay::RazorpayAdapter;
pub use stripe::StripeAdapter;

pub(crate) type HmacSha256 = Hmac<Sha256>;

/// Shared HTTP client for provider calls. The timeout bounds every request;
/// calls are never retried inside a shopper request.
pub fn provider_client(timeout_secs: u64) -> Result<reqwest::Client, ServiceError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ServiceError::InternalError(format!("HTTP client setup failed: {}", e)))
}

/// Checks a hex HMAC-SHA256 signature over `message` in constant time.
pub(crate) fn verify_hex_hmac(secret: &str, message: &[u8], signature_hex: &str) -> bool {
    let Ok(expected) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(message);
    mac.verify_slice(&expected).is_ok()
}

/// Hex HMAC-SHA256, used to sign test payloads and by tests of the verifiers.
pub fn sign_hex(secret: &str, message: &[u8]) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

/// Logs the provider failure with full detail and returns the generic error.
pub(crate) fn provider_failure(
    gateway: &str,
    order_id: uuid::Uuid,
    detail: impl std::fmt::Display,
) -> ServiceError {
    error!(gateway, order_id = %order_id, "payment initiation failed: {}", detail);
    metrics::counter!("storefront_payment_init_failures_total", 1, "gateway" => gateway.to_string());
    ServiceError::PaymentInitFailed
}
