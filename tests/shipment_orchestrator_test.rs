mod common;

use std::sync::atomic::Ordering;

use assert_matches::assert_matches;
use common::TestApp;
use storefront_api::{errors::ServiceError, models::OrderStatus, payments::GatewayId};

#[tokio::test]
async fn booking_issues_awb_and_ships() {
    let app = TestApp::new().await;
    let order = app.processing_order().await;
    assert_eq!(order.status, OrderStatus::Processing);

    let outcome = app
        .state
        .services
        .shipments
        .book_shipment(order.id)
        .await
        .unwrap();
    assert_eq!(outcome.status, OrderStatus::Shipped);
    assert_eq!(outcome.tracking_code.as_deref(), Some("AWB123"));

    let stored = app.order(order.id).await;
    assert_eq!(stored.carrier_order_ref.as_deref(), Some("CO-1001"));
    assert_eq!(stored.shipment_ref.as_deref(), Some("SH-2002"));
    assert_eq!(stored.carrier_name.as_deref(), Some("Delhivery"));
    assert!(stored.tracking_url.is_some());
}

#[tokio::test]
async fn booking_twice_reports_already_booked() {
    let app = TestApp::new().await;
    let order = app.processing_order().await;
    let shipments = &app.state.services.shipments;

    shipments.book_shipment(order.id).await.unwrap();
    let again = shipments.book_shipment(order.id).await.unwrap();
    assert_eq!(again.message, "Shipment already booked");

    let bookings = app
        .carrier
        .calls()
        .iter()
        .filter(|c| c.starts_with("create_order"))
        .count();
    assert_eq!(bookings, 1);
}

#[tokio::test]
async fn unpaid_order_cannot_be_booked() {
    let app = TestApp::new().await;
    let order = app.place_order(GatewayId::Stripe).await;

    let err = app
        .state
        .services
        .shipments
        .book_shipment(order.id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidTransition { .. });
    assert!(app.carrier.calls().is_empty());
}

#[tokio::test]
async fn carrier_booking_failure_leaves_order_processing() {
    let app = TestApp::new().await;
    let order = app.processing_order().await;
    app.carrier.fail_booking.store(true, Ordering::SeqCst);

    let err = app
        .state
        .services
        .shipments
        .book_shipment(order.id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::CarrierError(_));

    let stored = app.order(order.id).await;
    assert_eq!(stored.status, OrderStatus::Processing);
    assert!(stored.shipment_ref.is_none());
}

#[tokio::test]
async fn awb_failure_is_partial_success_and_label_retries_it() {
    let app = TestApp::new().await;
    let order = app.processing_order().await;
    let shipments = &app.state.services.shipments;
    app.carrier.fail_awb.store(true, Ordering::SeqCst);

    let outcome = shipments.book_shipment(order.id).await.unwrap();
    assert_eq!(outcome.status, OrderStatus::ReadyToShip);
    assert!(outcome.message.contains("AWB assignment failed"));
    assert!(outcome.tracking_code.is_none());

    app.carrier.fail_awb.store(false, Ordering::SeqCst);
    let labelled = shipments.issue_tracking_label(order.id).await.unwrap();
    assert_eq!(labelled.status, OrderStatus::Shipped);
    assert_eq!(labelled.tracking_code.as_deref(), Some("AWB123"));
    assert_eq!(
        labelled.label_url.as_deref(),
        Some("https://labels.example/SH-2002.pdf")
    );

    let again = shipments.issue_tracking_label(order.id).await.unwrap();
    assert_eq!(again.message, "Label already generated");
}

#[tokio::test]
async fn label_requires_a_booking() {
    let app = TestApp::new().await;
    let order = app.processing_order().await;

    let err = app
        .state
        .services
        .shipments
        .issue_tracking_label(order.id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn cancel_survives_carrier_failure() {
    let app = TestApp::new().await;
    let order = app.processing_order().await;
    let shipments = &app.state.services.shipments;
    shipments.book_shipment(order.id).await.unwrap();
    app.carrier.fail_cancel.store(true, Ordering::SeqCst);

    let outcome = shipments.cancel_shipment(order.id).await.unwrap();
    assert_eq!(outcome.status, OrderStatus::Cancelled);
    assert!(outcome.message.contains("courier cancellation failed"));
    assert!(app.carrier.calls().contains(&"cancel:AWB123".to_string()));

    let again = shipments.cancel_shipment(order.id).await.unwrap();
    assert_eq!(again.message, "Order already cancelled");
}

#[tokio::test]
async fn cancel_without_awb_skips_the_carrier() {
    let app = TestApp::new().await;
    let order = app.place_order(GatewayId::Cod).await;

    let outcome = app
        .state
        .services
        .shipments
        .cancel_shipment(order.id)
        .await
        .unwrap();
    assert_eq!(outcome.status, OrderStatus::Cancelled);
    assert!(app.carrier.calls().is_empty());
}

#[tokio::test]
async fn delivered_order_cannot_be_cancelled() {
    let app = TestApp::new().await;
    let order = app.processing_order().await;
    let shipments = &app.state.services.shipments;
    shipments.book_shipment(order.id).await.unwrap();
    app.carrier.set_track_status("Delivered");
    shipments.sync_tracking_status(order.id).await.unwrap();

    let err = shipments.cancel_shipment(order.id).await.unwrap_err();
    assert_matches!(err, ServiceError::InvalidTransition { .. });
}

#[tokio::test]
async fn tracking_sync_maps_carrier_vocabulary() {
    let app = TestApp::new().await;
    let order = app.processing_order().await;
    let shipments = &app.state.services.shipments;
    shipments.book_shipment(order.id).await.unwrap();

    app.carrier.set_track_status("Out for Delivery");
    let sync = shipments.sync_tracking_status(order.id).await.unwrap();
    assert!(!sync.changed);
    assert_eq!(sync.status, OrderStatus::Shipped);

    app.carrier.set_track_status("Weather delay");
    let sync = shipments.sync_tracking_status(order.id).await.unwrap();
    assert!(!sync.changed);

    app.carrier.set_track_status("DELIVERED");
    let sync = shipments.sync_tracking_status(order.id).await.unwrap();
    assert!(sync.changed);
    assert_eq!(app.order(order.id).await.status, OrderStatus::Delivered);

    app.carrier.set_track_status("RTO Initiated");
    let sync = shipments.sync_tracking_status(order.id).await.unwrap();
    assert!(!sync.changed);
    assert_eq!(sync.status, OrderStatus::Delivered);
}

#[tokio::test]
async fn tracking_overrides_extend_the_vocabulary() {
    let app = TestApp::with_config(|cfg| {
        cfg.tracking_status_overrides = Some("UNDELIVERED RETURNING:return_to_origin".into())
    })
    .await;
    let order = app.processing_order().await;
    let shipments = &app.state.services.shipments;
    shipments.book_shipment(order.id).await.unwrap();

    app.carrier.set_track_status("undelivered-returning");
    let sync = shipments.sync_tracking_status(order.id).await.unwrap();
    assert!(sync.changed);
    assert_eq!(sync.status, OrderStatus::ReturnToOrigin);
}

#[tokio::test]
async fn sync_requires_tracking_code() {
    let app = TestApp::new().await;
    let order = app.processing_order().await;

    let err = app
        .state
        .services
        .shipments
        .sync_tracking_status(order.id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn cancel_before_awb_cancels_the_courier_booking() {
    let app = TestApp::new().await;
    let order = app.processing_order().await;
    let shipments = &app.state.services.shipments;
    app.carrier.fail_awb.store(true, Ordering::SeqCst);
    shipments.book_shipment(order.id).await.unwrap();

    let outcome = shipments.cancel_shipment(order.id).await.unwrap();
    assert_eq!(outcome.status, OrderStatus::Cancelled);
    assert_eq!(outcome.message, "Order cancelled");
    assert!(app
        .carrier
        .calls()
        .contains(&"cancel_booking:CO-1001".to_string()));
}

#[tokio::test]
async fn label_is_refused_once_the_order_is_cancelled() {
    let app = TestApp::new().await;
    let order = app.processing_order().await;
    let shipments = &app.state.services.shipments;
    app.carrier.fail_awb.store(true, Ordering::SeqCst);
    shipments.book_shipment(order.id).await.unwrap();
    shipments.cancel_shipment(order.id).await.unwrap();
    app.carrier.fail_awb.store(false, Ordering::SeqCst);
    let calls_before = app.carrier.calls().len();

    let err = shipments.issue_tracking_label(order.id).await.unwrap_err();
    assert_matches!(err, ServiceError::InvalidTransition { .. });
    assert_eq!(app.carrier.calls().len(), calls_before);

    let stored = app.order(order.id).await;
    assert_eq!(stored.status, OrderStatus::Cancelled);
    assert!(stored.tracking_code.is_none());
}
