use std::time::{Duration, Instant};

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::{config::AppConfig, errors::ServiceError};

/// Courier tokens last ten days; refresh a day early.
const TOKEN_TTL: Duration = Duration::from_secs(9 * 24 * 60 * 60);
const TRACKING_URL_BASE: &str = "https://shiprocket.co/tracking";

/// Parcel defaults used when the catalog carries no dimensions (cm / kg).
const DEFAULT_LENGTH_CM: u32 = 10;
const DEFAULT_BREADTH_CM: u32 = 10;
const DEFAULT_HEIGHT_CM: u32 = 10;
const DEFAULT_WEIGHT_KG: &str = "0.5";

#[derive(Debug, Error)]
pub enum CarrierError {
    #[error("courier credentials are not configured")]
    NotConfigured,
    #[error("courier authentication failed: {0}")]
    Auth(String),
    #[error("courier request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("courier rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("unexpected courier response: {0}")]
    UnexpectedResponse(String),
}

impl From<CarrierError> for ServiceError {
    fn from(err: CarrierError) -> Self {
        ServiceError::CarrierError(err.to_string())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CarrierOrderLine {
    pub name: String,
    pub sku: String,
    pub units: i32,
    pub selling_price: Decimal,
}

/// Everything the courier needs to book a pickup.
#[derive(Debug, Clone)]
pub struct CarrierOrderRequest {
    pub order_id: String,
    pub order_date: String,
    pub customer_name: String,
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub country: String,
    pub phone: Option<String>,
    pub lines: Vec<CarrierOrderLine>,
    pub cash_on_delivery: bool,
    pub sub_total: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarrierBooking {
    pub carrier_order_ref: String,
    pub shipment_ref: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwbAssignment {
    pub tracking_code: String,
    pub carrier_name: String,
    pub tracking_url: String,
}

/// Third-party logistics API.
#[async_trait]
pub trait CarrierClient: Send + Sync {
    async fn create_order(&self, request: &CarrierOrderRequest)
        -> Result<CarrierBooking, CarrierError>;

    async fn assign_awb(&self, shipment_ref: &str) -> Result<AwbAssignment, CarrierError>;

    /// Returns the label URL.
    async fn generate_label(&self, shipment_ref: &str) -> Result<String, CarrierError>;

    async fn cancel(&self, tracking_code: &str) -> Result<(), CarrierError>;

    /// Cancels a booking that never received an AWB.
    async fn cancel_booking(&self, carrier_order_ref: &str) -> Result<(), CarrierError>;

    /// Returns the carrier's current free-text status.
    async fn track(&self, tracking_code: &str) -> Result<String, CarrierError>;
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Shiprocket-style REST client with email/password login and a cached token.
pub struct HttpCarrierClient {
    client: reqwest::Client,
    base_url: String,
    email: Option<String>,
    password: Option<String>,
    pickup_location: String,
    token: Mutex<Option<CachedToken>>,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
}

#[derive(Deserialize)]
struct CreateOrderResponse {
    order_id: Value,
    shipment_id: Value,
}

/// Ids come back as numbers or strings depending on the endpoint.
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

impl HttpCarrierClient {
    pub fn new(
        base_url: String,
        email: Option<String>,
        password: Option<String>,
        pickup_location: String,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::InternalError(format!("HTTP client setup failed: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            email: email.filter(|e| !e.trim().is_empty()),
            password: password.filter(|p| !p.is_empty()),
            pickup_location,
            token: Mutex::new(None),
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ServiceError> {
        Self::new(
            config.carrier_api_base.clone(),
            config.carrier_email.clone(),
            config.carrier_password.clone(),
            config.carrier_pickup_location.clone(),
            Duration::from_secs(config.carrier_timeout_secs),
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn token(&self) -> Result<String, CarrierError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.expires_at > Instant::now()) {
            return Ok(token.token.clone());
        }

        let (Some(email), Some(password)) = (&self.email, &self.password) else {
            return Err(CarrierError::NotConfigured);
        };

        let response = self
            .client
            .post(self.url("auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(CarrierError::Auth(format!("status {}", response.status())));
        }
        let login: LoginResponse = response
            .json()
            .await
            .map_err(|e| CarrierError::Auth(e.to_string()))?;

        info!("courier session established");
        *cached = Some(CachedToken {
            token: login.token.clone(),
            expires_at: Instant::now() + TOKEN_TTL,
        });
        Ok(login.token)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, CarrierError> {
        let token = self.token().await?;
        let response = request.bearer_auth(token).send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            // Force a fresh login next time.
            self.token.lock().await.take();
            return Err(CarrierError::Auth("token rejected".to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CarrierError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|e| CarrierError::UnexpectedResponse(e.to_string()))
    }
}

#[async_trait]
impl CarrierClient for HttpCarrierClient {
    #[instrument(skip(self, request), fields(order_id = %request.order_id))]
    async fn create_order(
        &self,
        request: &CarrierOrderRequest,
    ) -> Result<CarrierBooking, CarrierError> {
        let payment_method = if request.cash_on_delivery { "COD" } else { "Prepaid" };
        let body = json!({
            "order_id": request.order_id,
            "order_date": request.order_date,
            "pickup_location": self.pickup_location,
            "billing_customer_name": request.customer_name,
            "billing_last_name": "",
            "billing_address": request.street,
            "billing_city": request.city,
            "billing_pincode": request.zip,
            "billing_state": request.state,
            "billing_country": request.country,
            "billing_email": "",
            "billing_phone": request.phone.clone().unwrap_or_default(),
            "shipping_is_billing": true,
            "order_items": request.lines,
            "payment_method": payment_method,
            "sub_total": request.sub_total,
            "length": DEFAULT_LENGTH_CM,
            "breadth": DEFAULT_BREADTH_CM,
            "height": DEFAULT_HEIGHT_CM,
            "weight": DEFAULT_WEIGHT_KG,
        });

        let created: CreateOrderResponse = self
            .send(self.client.post(self.url("orders/create/adhoc")).json(&body))
            .await?;

        let booking = CarrierBooking {
            carrier_order_ref: id_string(&created.order_id)
                .ok_or_else(|| CarrierError::UnexpectedResponse("missing order_id".into()))?,
            shipment_ref: id_string(&created.shipment_id)
                .ok_or_else(|| CarrierError::UnexpectedResponse("missing shipment_id".into()))?,
        };
        debug!(shipment_ref = %booking.shipment_ref, "courier order created");
        Ok(booking)
    }

    #[instrument(skip(self))]
    async fn assign_awb(&self, shipment_ref: &str) -> Result<AwbAssignment, CarrierError> {
        let response: Value = self
            .send(
                self.client
                    .post(self.url("courier/assign/awb"))
                    .json(&json!({ "shipment_id": shipment_ref })),
            )
            .await?;

        let data = &response["response"]["data"];
        let tracking_code = data["awb_code"]
            .as_str()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                let reason = response["message"].as_str().unwrap_or("no awb_code");
                CarrierError::UnexpectedResponse(reason.to_string())
            })?
            .to_string();

        Ok(AwbAssignment {
            carrier_name: data["courier_name"].as_str().unwrap_or_default().to_string(),
            tracking_url: format!("{}/{}", TRACKING_URL_BASE, tracking_code),
            tracking_code,
        })
    }

    #[instrument(skip(self))]
    async fn generate_label(&self, shipment_ref: &str) -> Result<String, CarrierError> {
        let response: Value = self
            .send(
                self.client
                    .post(self.url("courier/generate/label"))
                    .json(&json!({ "shipment_id": [shipment_ref] })),
            )
            .await?;

        response["label_url"]
            .as_str()
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| CarrierError::UnexpectedResponse("missing label_url".into()))
    }

    #[instrument(skip(self))]
    async fn cancel(&self, tracking_code: &str) -> Result<(), CarrierError> {
        let _: Value = self
            .send(
                self.client
                    .post(self.url("orders/cancel/shipment/awb"))
                    .json(&json!({ "awbs": [tracking_code] })),
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn cancel_booking(&self, carrier_order_ref: &str) -> Result<(), CarrierError> {
        let id = carrier_order_ref
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::from(carrier_order_ref));
        let _: Value = self
            .send(
                self.client
                    .post(self.url("orders/cancel"))
                    .json(&json!({ "ids": [id] })),
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn track(&self, tracking_code: &str) -> Result<String, CarrierError> {
        let response: Value = self
            .send(
                self.client
                    .get(self.url(&format!("courier/track/awb/{}", tracking_code))),
            )
            .await?;

        let tracking = &response["tracking_data"];
        tracking["shipment_track"][0]["current_status"]
            .as_str()
            .or_else(|| tracking["shipment_status_text"].as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                warn!("tracking response without a current status");
                CarrierError::UnexpectedResponse("missing current_status".into())
            })
    }
}
