#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set};
use serde_json::Value;
use storefront_api::{
    config::{AppConfig, TransactionMode},
    db::{self, TransactionSupport},
    entities::{order, product, Order, Product},
    events::{self, EventSender},
    models::ShippingAddress,
    payments::{GatewayId, PaymentAdapters},
    services::order_commit::CommitRequest,
    shipping::{AwbAssignment, CarrierBooking, CarrierClient, CarrierError, CarrierOrderRequest},
    AppServices, AppState,
};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

pub const SHOPPER: &str = "shopper-1";
pub const ADMIN: &str = "ops-1";

/// In-memory courier with switchable failures.
#[derive(Default)]
pub struct FakeCarrier {
    pub fail_booking: AtomicBool,
    pub fail_awb: AtomicBool,
    pub fail_cancel: AtomicBool,
    pub track_status: Mutex<String>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeCarrier {
    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn set_track_status(&self, status: &str) {
        *self.track_status.lock().unwrap() = status.to_string();
    }
}

#[async_trait]
impl CarrierClient for FakeCarrier {
    async fn create_order(
        &self,
        request: &CarrierOrderRequest,
    ) -> Result<CarrierBooking, CarrierError> {
        self.record(format!("create_order:{}", request.order_id));
        if self.fail_booking.load(Ordering::SeqCst) {
            return Err(CarrierError::Rejected {
                status: 422,
                body: "pincode not serviceable".into(),
            });
        }
        Ok(CarrierBooking {
            carrier_order_ref: "CO-1001".into(),
            shipment_ref: "SH-2002".into(),
        })
    }

    async fn assign_awb(&self, shipment_ref: &str) -> Result<AwbAssignment, CarrierError> {
        self.record(format!("assign_awb:{}", shipment_ref));
        if self.fail_awb.load(Ordering::SeqCst) {
            return Err(CarrierError::UnexpectedResponse("no courier available".into()));
        }
        Ok(AwbAssignment {
            tracking_code: "AWB123".into(),
            carrier_name: "Delhivery".into(),
            tracking_url: "https://track.example/AWB123".into(),
        })
    }

    async fn generate_label(&self, shipment_ref: &str) -> Result<String, CarrierError> {
        self.record(format!("generate_label:{}", shipment_ref));
        Ok(format!("https://labels.example/{}.pdf", shipment_ref))
    }

    async fn cancel(&self, tracking_code: &str) -> Result<(), CarrierError> {
        self.record(format!("cancel:{}", tracking_code));
        if self.fail_cancel.load(Ordering::SeqCst) {
            return Err(CarrierError::Rejected {
                status: 400,
                body: "already picked up".into(),
            });
        }
        Ok(())
    }

    async fn cancel_booking(&self, carrier_order_ref: &str) -> Result<(), CarrierError> {
        self.record(format!("cancel_booking:{}", carrier_order_ref));
        if self.fail_cancel.load(Ordering::SeqCst) {
            return Err(CarrierError::Rejected {
                status: 400,
                body: "already picked up".into(),
            });
        }
        Ok(())
    }

    async fn track(&self, tracking_code: &str) -> Result<String, CarrierError> {
        self.record(format!("track:{}", tracking_code));
        Ok(self.track_status.lock().unwrap().clone())
    }
}

/// Helper harness for spinning up an application state backed by an in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub carrier: Arc<FakeCarrier>,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn degraded() -> Self {
        Self::with_config(|cfg| cfg.transaction_mode = TransactionMode::Degraded).await
    }

    /// Builds an app after letting the caller adjust the test configuration.
    pub async fn with_config(adjust: impl FnOnce(&mut AppConfig)) -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        // One connection so every query sees the same in-memory database.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.payment_timeout_secs = 2;
        adjust(&mut cfg);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let tx_support = TransactionSupport::detect(&pool, cfg.transaction_mode)
            .await
            .expect("detect transaction support");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = Arc::new(EventSender::new(event_tx));
        let event_task = tokio::spawn(events::process_events(event_rx));

        let carrier = Arc::new(FakeCarrier::default());
        carrier.set_track_status("IN TRANSIT");
        let adapters = PaymentAdapters::from_config(&cfg).expect("payment adapters");
        let services = AppServices::new(
            db_arc.clone(),
            &cfg,
            tx_support,
            event_sender,
            adapters,
            carrier.clone(),
        );

        let state = AppState {
            db: db_arc,
            config: Arc::new(cfg),
            tx_support,
            services,
        };

        Self {
            router: storefront_api::api_router(state.clone()),
            state,
            carrier,
            _event_task: event_task,
        }
    }

    /// Send a request as `user` (with optional role) against the router.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        user: Option<(&str, Option<&str>)>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some((user_id, role)) = user {
            builder = builder.header("x-user-id", user_id);
            if let Some(role) = role {
                builder = builder.header("x-user-role", role);
            }
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn shopper(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        self.request(method, uri, body, Some((SHOPPER, None))).await
    }

    pub async fn admin(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        self.request(method, uri, body, Some((ADMIN, Some("admin"))))
            .await
    }

    /// Posts raw bytes with the given headers, as a payment provider would.
    pub async fn post_raw(&self, uri: &str, body: &[u8], headers: &[(&str, &str)]) -> Response {
        let mut builder = Request::builder().method(Method::POST).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder
            .body(Body::from(body.to_vec()))
            .expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn seed_product(&self, name: &str, price: Decimal, stock: i32) -> product::Model {
        let now = Utc::now();
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            slug: Set(format!("{}-{}", name.to_lowercase().replace(' ', "-"), Uuid::new_v4())),
            unit_price: Set(price),
            stock_quantity: Set(stock),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed product for tests")
    }

    pub async fn set_price(&self, product_id: Uuid, price: Decimal) {
        let current = self.product(product_id).await;
        let mut active: product::ActiveModel = current.into();
        active.unit_price = Set(price);
        active.update(&*self.state.db).await.expect("update price");
    }

    pub async fn product(&self, product_id: Uuid) -> product::Model {
        Product::find_by_id(product_id)
            .one(&*self.state.db)
            .await
            .expect("load product")
            .expect("product exists")
    }

    pub async fn stock(&self, product_id: Uuid) -> i32 {
        self.product(product_id).await.stock_quantity
    }

    pub async fn order(&self, order_id: Uuid) -> order::Model {
        self.state
            .services
            .orders
            .get_order(order_id)
            .await
            .expect("order exists")
    }

    pub async fn order_count(&self) -> u64 {
        Order::find()
            .count(&*self.state.db)
            .await
            .expect("count orders")
    }

    pub async fn orders_for(&self, owner_ref: &str) -> Vec<order::Model> {
        Order::find()
            .filter(order::Column::OwnerRef.eq(owner_ref))
            .all(&*self.state.db)
            .await
            .expect("list orders")
    }

    pub async fn enable_gateway(&self, id: GatewayId, values: &[(&str, &str)]) {
        let values: BTreeMap<String, String> = values
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.state
            .services
            .gateways
            .save(id, true, &values)
            .await
            .expect("save gateway settings");
    }

    pub async fn add_to_cart(&self, owner_ref: &str, product_id: Uuid, quantity: u32) {
        self.state
            .services
            .cart
            .add_item(owner_ref, product_id, quantity)
            .await
            .expect("add item to cart");
    }

    /// Commits `owner_ref`'s cart directly, skipping payment initiation.
    pub async fn commit(&self, owner_ref: &str, gateway: GatewayId) -> order::Model {
        self.state
            .services
            .order_commit
            .commit_order(commit_request(owner_ref, gateway))
            .await
            .expect("commit order")
    }

    /// Seeds a product, commits one unit and returns the pending order.
    pub async fn place_order(&self, gateway: GatewayId) -> order::Model {
        let product = self
            .seed_product("Skyline GT-R", Decimal::from(24), 10)
            .await;
        self.add_to_cart(SHOPPER, product.id, 1).await;
        self.commit(SHOPPER, gateway).await
    }

    /// Places an order and settles it so it is ready for shipping.
    pub async fn processing_order(&self) -> order::Model {
        let order = self.place_order(GatewayId::Stripe).await;
        self.state
            .services
            .orders
            .settle_payment(order.id, GatewayId::Stripe)
            .await
            .expect("settle payment");
        self.order(order.id).await
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub fn address() -> ShippingAddress {
    ShippingAddress {
        street: "12 MG Road".into(),
        city: "Bengaluru".into(),
        state: "KA".into(),
        zip: "560001".into(),
        country: "IN".into(),
        phone: Some("+919800000000".into()),
    }
}

pub fn commit_request(owner_ref: &str, gateway: GatewayId) -> CommitRequest {
    CommitRequest {
        owner_ref: owner_ref.to_string(),
        shipping_address: address(),
        payment_method: gateway.to_string(),
        currency: "INR".into(),
    }
}

pub async fn response_json(response: Response) -> Value {
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&body).expect("response is json")
}
