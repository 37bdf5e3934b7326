mod common;

use assert_matches::assert_matches;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use common::{response_json, TestApp};
use serde_json::json;
use storefront_api::{
    models::{OrderStatus, PaymentStatus},
    payments::{adapters::sign_hex, GatewayId},
    services::order_status::SettlementOutcome,
    webhooks::WebhookOutcome,
};
use uuid::Uuid;

const WEBHOOK: &str = "/api/v1/payments/webhook";
const STRIPE_SECRET: &str = "whsec_test_123";
const RAZORPAY_SECRET: &str = "rzp_whsec_456";

async fn stripe_app() -> TestApp {
    let app = TestApp::new().await;
    app.enable_gateway(
        GatewayId::Stripe,
        &[
            ("publishableKey", "pk_test_1"),
            ("secretKey", "sk_test_1"),
            ("webhookSecret", STRIPE_SECRET),
        ],
    )
    .await;
    app
}

fn stripe_event(event_type: &str, order_id: Uuid) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "id": "evt_1",
        "type": event_type,
        "data": { "object": { "id": "pi_1", "metadata": { "orderId": order_id.to_string() } } }
    }))
    .unwrap()
}

fn stripe_signature(secret: &str, body: &[u8]) -> String {
    let timestamp = chrono::Utc::now().timestamp();
    let mut signed = format!("{}.", timestamp).into_bytes();
    signed.extend_from_slice(body);
    format!("t={},v1={}", timestamp, sign_hex(secret, &signed))
}

fn stripe_headers(body: &[u8]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        "stripe-signature",
        HeaderValue::from_str(&stripe_signature(STRIPE_SECRET, body)).unwrap(),
    );
    headers
}

#[tokio::test]
async fn redelivered_success_settles_once() {
    let app = stripe_app().await;
    let order = app.place_order(GatewayId::Stripe).await;
    let body = stripe_event("payment_intent.succeeded", order.id);
    let headers = stripe_headers(&body);
    let reconciler = &app.state.services.webhooks;

    let first = reconciler.handle(&body, &headers).await;
    assert_eq!(
        first,
        WebhookOutcome::Ack {
            settlement: Some(SettlementOutcome::Applied)
        }
    );
    let second = reconciler.handle(&body, &headers).await;
    assert_eq!(
        second,
        WebhookOutcome::Ack {
            settlement: Some(SettlementOutcome::Duplicate)
        }
    );

    let stored = app.order(order.id).await;
    assert_eq!(stored.payment_status, PaymentStatus::Paid);
    assert_eq!(stored.status, OrderStatus::Processing);
    assert_eq!(stored.settled_by.as_deref(), Some("stripe"));
}

#[tokio::test]
async fn webhook_route_acknowledges_with_received_flag() {
    let app = stripe_app().await;
    let order = app.place_order(GatewayId::Stripe).await;
    let body = stripe_event("payment_intent.succeeded", order.id);
    let signature = stripe_signature(STRIPE_SECRET, &body);

    let response = app
        .post_raw(WEBHOOK, &body, &[("stripe-signature", signature.as_str())])
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response).await, json!({ "received": true }));
    assert_eq!(app.order(order.id).await.payment_status, PaymentStatus::Paid);
}

#[tokio::test]
async fn tampered_body_is_rejected_without_touching_the_order() {
    let app = stripe_app().await;
    let order = app.place_order(GatewayId::Stripe).await;
    let signed_body = stripe_event("payment_intent.payment_failed", order.id);
    let signature = stripe_signature(STRIPE_SECRET, &signed_body);
    let forged = stripe_event("payment_intent.succeeded", order.id);

    let response = app
        .post_raw(WEBHOOK, &forged, &[("stripe-signature", signature.as_str())])
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response_json(response).await["error"].is_string());

    let stored = app.order(order.id).await;
    assert_eq!(stored.payment_status, PaymentStatus::Pending);
    assert_eq!(stored.status, OrderStatus::Pending);
}

#[tokio::test]
async fn wrong_secret_is_rejected() {
    let app = stripe_app().await;
    let order = app.place_order(GatewayId::Stripe).await;
    let body = stripe_event("payment_intent.succeeded", order.id);
    let signature = stripe_signature("whsec_someone_else", &body);

    let response = app
        .post_raw(WEBHOOK, &body, &[("stripe-signature", signature.as_str())])
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.order(order.id).await.payment_status, PaymentStatus::Pending);
}

#[tokio::test]
async fn missing_provider_header_is_rejected() {
    let app = stripe_app().await;
    let response = app.post_raw(WEBHOOK, b"{}", &[]).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_secret_asks_provider_to_retry() {
    let app = TestApp::new().await;
    let order = app.place_order(GatewayId::Razorpay).await;
    let body = serde_json::to_vec(&json!({
        "event": "payment.captured",
        "payload": { "payment": { "entity": { "notes": { "orderId": order.id.to_string() } } } }
    }))
    .unwrap();
    let signature = sign_hex(RAZORPAY_SECRET, &body);

    let response = app
        .post_raw(WEBHOOK, &body, &[("x-razorpay-signature", signature.as_str())])
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(app.order(order.id).await.payment_status, PaymentStatus::Pending);
}

#[tokio::test]
async fn configured_fallback_secret_is_used() {
    let app = TestApp::with_config(|cfg| {
        cfg.razorpay_webhook_secret = Some(RAZORPAY_SECRET.to_string())
    })
    .await;
    let order = app.place_order(GatewayId::Razorpay).await;
    let body = serde_json::to_vec(&json!({
        "event": "payment.failed",
        "payload": { "payment": { "entity": { "notes": { "orderId": order.id.to_string() } } } }
    }))
    .unwrap();
    let signature = sign_hex(RAZORPAY_SECRET, &body);

    let response = app
        .post_raw(WEBHOOK, &body, &[("x-razorpay-signature", signature.as_str())])
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let stored = app.order(order.id).await;
    assert_eq!(stored.payment_status, PaymentStatus::Failed);
    assert_eq!(stored.status, OrderStatus::Pending);
}

#[tokio::test]
async fn razorpay_receipt_correlates_order_paid() {
    let app = TestApp::with_config(|cfg| {
        cfg.razorpay_webhook_secret = Some(RAZORPAY_SECRET.to_string())
    })
    .await;
    let order = app.place_order(GatewayId::Razorpay).await;
    let body = serde_json::to_vec(&json!({
        "event": "order.paid",
        "payload": { "order": { "entity": { "id": "order_9", "receipt": order.id.to_string() } } }
    }))
    .unwrap();
    let mut headers = HeaderMap::new();
    headers.insert(
        "x-razorpay-signature",
        HeaderValue::from_str(&sign_hex(RAZORPAY_SECRET, &body)).unwrap(),
    );

    let outcome = app.state.services.webhooks.handle(&body, &headers).await;
    assert_matches!(
        outcome,
        WebhookOutcome::Ack {
            settlement: Some(SettlementOutcome::Applied)
        }
    );
    let stored = app.order(order.id).await;
    assert_eq!(stored.settled_by.as_deref(), Some("razorpay"));
    assert_eq!(stored.status, OrderStatus::Processing);
}

#[tokio::test]
async fn unknown_order_and_ignored_events_are_acknowledged() {
    let app = stripe_app().await;
    let reconciler = &app.state.services.webhooks;

    let body = stripe_event("payment_intent.succeeded", Uuid::new_v4());
    let outcome = reconciler.handle(&body, &stripe_headers(&body)).await;
    assert_eq!(outcome, WebhookOutcome::Ack { settlement: None });

    let body = stripe_event("charge.refunded", Uuid::new_v4());
    let outcome = reconciler.handle(&body, &stripe_headers(&body)).await;
    assert_eq!(outcome, WebhookOutcome::Ack { settlement: None });

    assert_eq!(app.order_count().await, 0);
}

#[tokio::test]
async fn late_success_after_failure_does_not_flip_payment() {
    let app = stripe_app().await;
    let order = app.place_order(GatewayId::Stripe).await;
    let reconciler = &app.state.services.webhooks;

    let failed = stripe_event("payment_intent.payment_failed", order.id);
    reconciler.handle(&failed, &stripe_headers(&failed)).await;

    let succeeded = stripe_event("payment_intent.succeeded", order.id);
    let outcome = reconciler
        .handle(&succeeded, &stripe_headers(&succeeded))
        .await;
    assert_eq!(
        outcome,
        WebhookOutcome::Ack {
            settlement: Some(SettlementOutcome::Conflict(PaymentStatus::Failed))
        }
    );
    assert_eq!(app.order(order.id).await.payment_status, PaymentStatus::Failed);
}

#[tokio::test]
async fn provider_other_than_the_orders_method_still_settles() {
    let app = stripe_app().await;
    let order = app.place_order(GatewayId::Razorpay).await;
    let body = stripe_event("payment_intent.succeeded", order.id);

    let outcome = app
        .state
        .services
        .webhooks
        .handle(&body, &stripe_headers(&body))
        .await;
    assert_eq!(
        outcome,
        WebhookOutcome::Ack {
            settlement: Some(SettlementOutcome::Applied)
        }
    );
    let stored = app.order(order.id).await;
    assert_eq!(stored.payment_method, "razorpay");
    assert_eq!(stored.settled_by.as_deref(), Some("stripe"));
    assert_eq!(stored.payment_status, PaymentStatus::Paid);
}
