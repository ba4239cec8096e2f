mod common;

use assert_matches::assert_matches;
use chrono::Duration;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use storefront_api::{
    entities::{
        cart, cart_item,
        order::{OrderStatus, PaymentMethod},
        user::Role,
        Cart, CartItem, Order,
    },
    errors::ServiceError,
    services::orders::{CheckoutOutcome, CreateOrderRequest},
};
use uuid::Uuid;

fn checkout(
    address_id: Uuid,
    method: PaymentMethod,
    delivery_needed: bool,
) -> CreateOrderRequest {
    CreateOrderRequest {
        address_id,
        store_pickup: false,
        delivery_needed,
        payment_method: method,
        currency: "EGP".to_string(),
        wallet_identifier: None,
    }
}

#[tokio::test]
async fn cod_order_is_placed_processing_with_fees() {
    let app = common::spawn().await;
    let customer = app.seed_user(Role::Customer).await;
    let product = app.seed_product(10_000, 0, 5).await;
    let address = app.seed_address(Some(customer.id), false).await;

    app.carts.add_item(customer.id, product.id, 2).await.unwrap();

    let outcome = app
        .orders
        .create_order(&customer, checkout(address.id, PaymentMethod::Cod, true))
        .await
        .unwrap();

    // 2 x 10000 + 5000 delivery + 1000 COD
    let order = assert_matches!(outcome, CheckoutOutcome::Placed { order } => order);
    assert_eq!(order.total_cents, 26_000);
    assert_eq!(order.status, OrderStatus::Processing);
    assert_eq!(order.items.len(), 1);
    assert_eq!(order.items[0].quantity, 2);

    // COD never reaches the gateway.
    assert!(app.gateway.recorded().is_empty());

    // Stock decremented and cart emptied by the same transaction.
    let product = storefront_api::entities::Product::find_by_id(product.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(product.stock, 3);

    let leftover = CartItem::find()
        .filter(cart_item::Column::ProductId.eq(order.items[0].product_id))
        .all(&*app.db)
        .await
        .unwrap();
    assert!(leftover.is_empty());
}

#[tokio::test]
async fn credit_card_order_redirects_and_applies_promo_at_order_level() {
    let app = common::spawn().await;
    let customer = app.seed_user(Role::Customer).await;
    let product = app.seed_product(10_000, 0, 5).await;
    let address = app.seed_address(Some(customer.id), false).await;
    app.seed_promo("WELCOME10", 10, Duration::hours(1)).await;

    app.carts.add_item(customer.id, product.id, 2).await.unwrap();
    app.carts.apply_promo(customer.id, "WELCOME10").await.unwrap();

    let outcome = app
        .orders
        .create_order(
            &customer,
            checkout(address.id, PaymentMethod::CreditCard, true),
        )
        .await
        .unwrap();

    // (20000 - 10%) + 5000 delivery, no COD fee
    let (order_id, redirect_url) = assert_matches!(
        outcome,
        CheckoutOutcome::RedirectToPayment { order_id, redirect_url } => (order_id, redirect_url)
    );
    assert!(redirect_url.contains(&order_id.to_string()));

    let order = Order::find_by_id(order_id).one(&*app.db).await.unwrap().unwrap();
    assert_eq!(order.total_cents, 23_000);
    assert_eq!(order.status, OrderStatus::Paying);

    let calls = app.gateway.recorded();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].amount_cents, 23_000);
    assert_eq!(calls[0].buyer_id, customer.id);
}

#[tokio::test]
async fn failing_gateway_leaves_order_committed_as_payment_pending() {
    let app = common::spawn().await;
    let customer = app.seed_user(Role::Customer).await;
    let product = app.seed_product(10_000, 0, 5).await;
    let address = app.seed_address(Some(customer.id), false).await;

    app.carts.add_item(customer.id, product.id, 1).await.unwrap();
    app.gateway.fail_next("gateway timeout");

    let err = app
        .orders
        .create_order(
            &customer,
            checkout(address.id, PaymentMethod::CreditCard, false),
        )
        .await
        .unwrap_err();

    let order_id = assert_matches!(err, ServiceError::PaymentPending { order_id, .. } => order_id);

    // The order row exists and stock was decremented exactly once.
    let order = Order::find_by_id(order_id).one(&*app.db).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Paying);

    let product = storefront_api::entities::Product::find_by_id(product.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(product.stock, 4);

    let cart = Cart::find()
        .filter(cart::Column::UserId.eq(customer.id))
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    let items = CartItem::find()
        .filter(cart_item::Column::CartId.eq(cart.id))
        .all(&*app.db)
        .await
        .unwrap();
    assert!(items.is_empty());
}

#[tokio::test]
async fn empty_cart_and_unknown_currency_rejected() {
    let app = common::spawn().await;
    let customer = app.seed_user(Role::Customer).await;
    let address = app.seed_address(Some(customer.id), false).await;

    let err = app
        .orders
        .create_order(&customer, checkout(address.id, PaymentMethod::Cod, false))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));

    let product = app.seed_product(1_000, 0, 5).await;
    app.carts.add_item(customer.id, product.id, 1).await.unwrap();

    let mut request = checkout(address.id, PaymentMethod::Cod, false);
    request.currency = "USD".to_string();
    let err = app.orders.create_order(&customer, request).await.unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn foreign_address_rejected_but_store_pickup_allowed() {
    let app = common::spawn().await;
    let customer = app.seed_user(Role::Customer).await;
    let other = app.seed_user(Role::Customer).await;
    let product = app.seed_product(1_000, 0, 5).await;
    let foreign = app.seed_address(Some(other.id), false).await;
    let store = app.seed_address(None, true).await;

    app.carts.add_item(customer.id, product.id, 1).await.unwrap();

    let err = app
        .orders
        .create_order(&customer, checkout(foreign.id, PaymentMethod::Cod, false))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));

    let mut request = checkout(store.id, PaymentMethod::Cod, false);
    request.store_pickup = true;
    let outcome = app.orders.create_order(&customer, request).await.unwrap();
    assert_matches!(outcome, CheckoutOutcome::Placed { .. });
}

#[tokio::test]
async fn lifecycle_assign_deliver_and_reject() {
    let app = common::spawn().await;
    let admin = app.seed_user(Role::Admin).await;
    let transporter = app.seed_user(Role::Transporter).await;
    let customer = app.seed_user(Role::Customer).await;
    let product = app.seed_product(2_000, 0, 10).await;
    let address = app.seed_address(Some(customer.id), false).await;

    app.carts.add_item(customer.id, product.id, 1).await.unwrap();
    let outcome = app
        .orders
        .create_order(&customer, checkout(address.id, PaymentMethod::Cod, true))
        .await
        .unwrap();
    let order = assert_matches!(outcome, CheckoutOutcome::Placed { order } => order);

    // Customers may not assign.
    let err = app
        .orders
        .assign_transporter(order.id, transporter.id, &customer)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));

    // A customer account is not a valid transporter.
    let err = app
        .orders
        .assign_transporter(order.id, customer.id, &admin)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));

    // Assignment moves the order out for delivery.
    let updated = app
        .orders
        .assign_transporter(order.id, transporter.id, &admin)
        .await
        .unwrap();
    assert_eq!(updated.status, OrderStatus::OnTheWay);
    assert_eq!(updated.transporter_id, Some(transporter.id));

    // Rejection is only valid from PROCESSING.
    let err = app.orders.reject(order.id, &admin).await.unwrap_err();
    assert_matches!(err, ServiceError::InvalidStatus(_));

    // The assigned transporter confirms delivery.
    let delivered = app.orders.mark_delivered(order.id, &transporter).await.unwrap();
    assert_eq!(delivered.status, OrderStatus::Delivered);

    // Delivered is terminal for cancellation.
    let err = app.orders.cancel(order.id, &customer).await.unwrap_err();
    assert_matches!(err, ServiceError::InvalidStatus(_));
    let unchanged = Order::find_by_id(order.id).one(&*app.db).await.unwrap().unwrap();
    assert_eq!(unchanged.status, OrderStatus::Delivered);
    assert!(!unchanged.deleted);
}

#[tokio::test]
async fn owner_cancellation_soft_deletes() {
    let app = common::spawn().await;
    let customer = app.seed_user(Role::Customer).await;
    let stranger = app.seed_user(Role::Customer).await;
    let product = app.seed_product(2_000, 0, 10).await;
    let address = app.seed_address(Some(customer.id), false).await;

    app.carts.add_item(customer.id, product.id, 1).await.unwrap();
    let outcome = app
        .orders
        .create_order(&customer, checkout(address.id, PaymentMethod::Cod, false))
        .await
        .unwrap();
    let order = assert_matches!(outcome, CheckoutOutcome::Placed { order } => order);

    let err = app.orders.cancel(order.id, &stranger).await.unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));

    let cancelled = app.orders.cancel(order.id, &customer).await.unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);

    let row = Order::find_by_id(order.id).one(&*app.db).await.unwrap().unwrap();
    assert!(row.deleted);
    assert!(row.deleted_at.is_some());

    // Soft-deleted orders are gone from the read path.
    let err = app.orders.get_order(order.id, &customer).await.unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn confirm_payment_moves_paying_to_processing() {
    let app = common::spawn().await;
    let admin = app.seed_user(Role::Admin).await;
    let customer = app.seed_user(Role::Customer).await;
    let product = app.seed_product(2_000, 0, 10).await;
    let address = app.seed_address(Some(customer.id), false).await;

    app.carts.add_item(customer.id, product.id, 1).await.unwrap();
    let outcome = app
        .orders
        .create_order(
            &customer,
            checkout(address.id, PaymentMethod::CreditCard, false),
        )
        .await
        .unwrap();
    let order_id =
        assert_matches!(outcome, CheckoutOutcome::RedirectToPayment { order_id, .. } => order_id);

    // Only staff stand in for the gateway confirmation.
    let err = app.orders.confirm_payment(order_id, &customer).await.unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));

    let confirmed = app.orders.confirm_payment(order_id, &admin).await.unwrap();
    assert_eq!(confirmed.status, OrderStatus::Processing);

    // A second confirmation has no legal transition.
    let err = app.orders.confirm_payment(order_id, &admin).await.unwrap_err();
    assert_matches!(err, ServiceError::InvalidStatus(_));
}

#[tokio::test]
async fn listing_is_scoped_by_role() {
    let app = common::spawn().await;
    let admin = app.seed_user(Role::Admin).await;
    let a = app.seed_user(Role::Customer).await;
    let b = app.seed_user(Role::Customer).await;
    let product = app.seed_product(2_000, 0, 10).await;

    for customer in [&a, &b] {
        let address = app.seed_address(Some(customer.id), false).await;
        app.carts.add_item(customer.id, product.id, 1).await.unwrap();
        app.orders
            .create_order(customer, checkout(address.id, PaymentMethod::Cod, false))
            .await
            .unwrap();
    }

    let (mine, total) = app
        .orders
        .list_orders(Default::default(), &a)
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert!(mine.iter().all(|o| o.user_id == a.id));

    let (all, total) = app
        .orders
        .list_orders(Default::default(), &admin)
        .await
        .unwrap();
    assert_eq!(total, 2);
    assert_eq!(all.len(), 2);

    let mut filter = storefront_api::services::orders::OrderListFilter::default();
    filter.payment_method = Some(PaymentMethod::Cod);
    filter.status = Some(OrderStatus::Processing);
    let (_, total) = app.orders.list_orders(filter, &admin).await.unwrap();
    assert_eq!(total, 2);
}

#[tokio::test]
async fn order_snapshot_freezes_catalog_state() {
    let app = common::spawn().await;
    let customer = app.seed_user(Role::Customer).await;
    let product = app.seed_product(10_000, 25, 10).await;
    let address = app.seed_address(Some(customer.id), false).await;

    app.carts.add_item(customer.id, product.id, 2).await.unwrap();
    let outcome = app
        .orders
        .create_order(&customer, checkout(address.id, PaymentMethod::Cod, false))
        .await
        .unwrap();
    let placed = assert_matches!(outcome, CheckoutOutcome::Placed { order } => order);

    // Mutate the catalog after the fact.
    let mut update: storefront_api::entities::product::ActiveModel =
        storefront_api::entities::Product::find_by_id(product.id)
            .one(&*app.db)
            .await
            .unwrap()
            .unwrap()
            .into();
    update.price_cents = sea_orm::Set(99_999);
    update.sale_percent = sea_orm::Set(0);
    sea_orm::ActiveModelTrait::update(update, &*app.db).await.unwrap();

    let fetched = app.orders.get_order(placed.id, &customer).await.unwrap();
    assert_eq!(fetched.items[0].unit_price_cents, 10_000);
    assert_eq!(fetched.items[0].sale_percent, 25);
    // 2 x round_half_even(10000 * 0.75) = 15000
    assert_eq!(fetched.total_cents, 15_000 + 1_000);
}
