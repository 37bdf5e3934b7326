mod common;

use assert_matches::assert_matches;
use common::{commit_request, TestApp, SHOPPER};
use rust_decimal_macros::dec;
use storefront_api::{
    errors::ServiceError,
    models::{OrderStatus, PaymentStatus},
    payments::{GatewayId, PaymentInitResult},
    services::commerce::CheckoutRequest,
};

#[tokio::test]
async fn price_update_is_flagged_then_committed_at_server_price() {
    let app = TestApp::new().await;
    app.enable_gateway(GatewayId::Cod, &[]).await;

    let product = app.seed_product("productA", dec!(10), 5).await;
    app.add_to_cart(SHOPPER, product.id, 2).await;
    app.set_price(product.id, dec!(12)).await;

    let cart = app.state.services.cart.get_cart(SHOPPER).await.unwrap();
    let report = app.state.services.cart_validator.validate(&cart).await.unwrap();
    assert_eq!(
        report.warnings,
        vec!["Price for productA updated from $10 to $12".to_string()]
    );
    assert_eq!(report.cart.total_price(), dec!(24));

    let outcome = app
        .state
        .services
        .checkout
        .checkout(
            SHOPPER,
            CheckoutRequest {
                shipping_address: common::address(),
                payment_method: "cod".into(),
            },
        )
        .await
        .unwrap();

    assert_eq!(outcome.order.total_amount, dec!(24));
    assert_eq!(outcome.order.status, OrderStatus::Pending);
    assert_eq!(outcome.order.payment_status, PaymentStatus::Pending);
    assert_matches!(outcome.payment, Ok(PaymentInitResult::Manual));

    let lines = app.state.services.orders.get_lines(outcome.order.id).await.unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].unit_price, dec!(12));
    assert_eq!(lines[0].quantity, 2);

    assert_eq!(app.stock(product.id).await, 3);
    assert!(app.state.services.cart.get_cart(SHOPPER).await.unwrap().is_empty());
}

#[tokio::test]
async fn last_unit_is_sold_once() {
    let app = TestApp::new().await;
    let product = app.seed_product("Last Lamp", dec!(30), 1).await;
    app.add_to_cart("alice", product.id, 1).await;
    app.add_to_cart("bob", product.id, 1).await;

    let commits = &app.state.services.order_commit;
    let (first, second) = tokio::join!(
        commits.commit_order(commit_request("alice", GatewayId::Cod)),
        commits.commit_order(commit_request("bob", GatewayId::Cod)),
    );

    let results = [first, second];
    let placed = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(placed, 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(ServiceError::ItemUnavailable(name)) if name == "Last Lamp")));
    assert_eq!(app.stock(product.id).await, 0);
    assert_eq!(app.order_count().await, 1);
}

#[tokio::test]
async fn shortage_on_a_later_line_rolls_back_everything() {
    let app = TestApp::new().await;
    let plenty = app.seed_product("Plenty", dec!(5), 5).await;
    let scarce = app.seed_product("Scarce", dec!(7), 3).await;
    app.add_to_cart(SHOPPER, plenty.id, 1).await;
    app.add_to_cart(SHOPPER, scarce.id, 3).await;
    // Someone else bought some of the scarce stock after it was carted.
    {
        use sea_orm::{ActiveModelTrait, Set};
        let mut active: storefront_api::entities::product::ActiveModel = scarce.clone().into();
        active.stock_quantity = Set(2);
        active.update(&*app.state.db).await.unwrap();
    }

    let err = app
        .state
        .services
        .order_commit
        .commit_order(commit_request(SHOPPER, GatewayId::Cod))
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::ItemUnavailable(name) if name == "Scarce");
    assert_eq!(app.stock(plenty.id).await, 5);
    assert_eq!(app.stock(scarce.id).await, 2);
    assert_eq!(app.order_count().await, 0);
    assert_eq!(
        app.state.services.cart.get_cart(SHOPPER).await.unwrap().lines.len(),
        2
    );
}

#[tokio::test]
async fn degraded_mode_compensates_partial_commit() {
    let app = TestApp::degraded().await;
    assert!(!app.state.tx_support.is_transactional());

    let plenty = app.seed_product("Plenty", dec!(5), 5).await;
    let scarce = app.seed_product("Scarce", dec!(7), 3).await;
    app.add_to_cart(SHOPPER, plenty.id, 2).await;
    app.add_to_cart(SHOPPER, scarce.id, 3).await;
    {
        use sea_orm::{ActiveModelTrait, Set};
        let mut active: storefront_api::entities::product::ActiveModel = scarce.clone().into();
        active.is_active = Set(false);
        active.update(&*app.state.db).await.unwrap();
    }

    let err = app
        .state
        .services
        .order_commit
        .commit_order(commit_request(SHOPPER, GatewayId::Cod))
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::ItemUnavailable(_));
    assert_eq!(app.stock(plenty.id).await, 5);
    assert_eq!(app.order_count().await, 0);
}

#[tokio::test]
async fn degraded_mode_still_commits_normally() {
    let app = TestApp::degraded().await;
    let product = app.seed_product("Mug", dec!(12), 4).await;
    app.add_to_cart(SHOPPER, product.id, 2).await;

    let order = app.commit(SHOPPER, GatewayId::Cod).await;
    assert_eq!(order.total_amount, dec!(24));
    assert_eq!(app.stock(product.id).await, 2);
}

#[tokio::test]
async fn empty_cart_and_incomplete_address_write_nothing() {
    let app = TestApp::new().await;
    let commits = &app.state.services.order_commit;

    let err = commits
        .commit_order(commit_request(SHOPPER, GatewayId::Cod))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::EmptyCart);

    let product = app.seed_product("Mug", dec!(12), 4).await;
    app.add_to_cart(SHOPPER, product.id, 1).await;
    let mut request = commit_request(SHOPPER, GatewayId::Cod);
    request.shipping_address.city = "  ".into();
    request.shipping_address.zip.clear();

    let err = commits.commit_order(request).await.unwrap_err();
    assert_matches!(err, ServiceError::IncompleteAddress(fields) if fields == vec!["city", "zip"]);
    assert_eq!(app.stock(product.id).await, 4);
    assert_eq!(app.order_count().await, 0);
}

#[tokio::test]
async fn unknown_payment_method_is_rejected() {
    let app = TestApp::new().await;
    let product = app.seed_product("Mug", dec!(12), 4).await;
    app.add_to_cart(SHOPPER, product.id, 1).await;

    let mut request = commit_request(SHOPPER, GatewayId::Cod);
    request.payment_method = "paypal".into();
    let err = app
        .state
        .services
        .order_commit
        .commit_order(request)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
    assert_eq!(app.order_count().await, 0);
}

#[tokio::test]
async fn disabled_gateway_blocks_checkout_before_commit() {
    let app = TestApp::new().await;
    let product = app.seed_product("Mug", dec!(12), 4).await;
    app.add_to_cart(SHOPPER, product.id, 1).await;

    let err = app
        .state
        .services
        .checkout
        .checkout(
            SHOPPER,
            CheckoutRequest {
                shipping_address: common::address(),
                payment_method: "stripe".into(),
            },
        )
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::GatewayDisabled(id) if id == "stripe");
    assert_eq!(app.stock(product.id).await, 4);
    assert_eq!(app.order_count().await, 0);
}
