mod common;

use assert_matches::assert_matches;
use chrono::Duration;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use storefront_api::{
    entities::{cart, cart_item, product, user::Role, Cart, CartItem, Product},
    errors::ServiceError,
};
use uuid::Uuid;

async fn cart_of(app: &common::TestApp, user_id: Uuid) -> cart::Model {
    Cart::find()
        .filter(cart::Column::UserId.eq(user_id))
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn validation_removes_deleted_and_understocked_items() {
    let app = common::spawn().await;
    let customer = app.seed_user(Role::Customer).await;
    let healthy = app.seed_product(1_000, 0, 10).await;
    let doomed = app.seed_product(2_000, 0, 10).await;
    let scarce = app.seed_product(3_000, 0, 10).await;

    app.carts.add_item(customer.id, healthy.id, 1).await.unwrap();
    app.carts.add_item(customer.id, doomed.id, 1).await.unwrap();
    app.carts.add_item(customer.id, scarce.id, 5).await.unwrap();

    // Catalog moves underneath the cart: one product soft-deleted, one
    // drained below the carted quantity.
    let mut update: product::ActiveModel = doomed.into();
    update.deleted = Set(true);
    update.update(&*app.db).await.unwrap();

    let mut update: product::ActiveModel = scarce.into();
    update.stock = Set(2);
    update.update(&*app.db).await.unwrap();

    let validated = app.carts.validate_cart(customer.id).await.unwrap().unwrap();
    assert_eq!(validated.items.len(), 1);
    assert_eq!(validated.items[0].1.id, healthy.id);

    // The repair is persisted, not just filtered from the snapshot.
    let rows = CartItem::find()
        .filter(cart_item::Column::CartId.eq(validated.cart.id))
        .all(&*app.db)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);

    // Second pass has nothing left to repair.
    let again = app.carts.validate_cart(customer.id).await.unwrap().unwrap();
    assert_eq!(again.items.len(), 1);
}

#[tokio::test]
async fn expired_promo_is_detached_in_storage() {
    let app = common::spawn().await;
    let customer = app.seed_user(Role::Customer).await;
    let product = app.seed_product(1_000, 0, 10).await;
    let stale = app.seed_promo("OLD", 20, Duration::hours(-1)).await;

    app.carts.add_item(customer.id, product.id, 1).await.unwrap();
    let cart = cart_of(&app, customer.id).await;
    app.force_promo(cart, stale.id).await;

    let validated = app.carts.validate_cart(customer.id).await.unwrap().unwrap();
    assert!(validated.promo.is_none());

    let cart = cart_of(&app, customer.id).await;
    assert!(cart.promo_code_id.is_none());
}

#[tokio::test]
async fn applying_an_expired_promo_is_rejected_up_front() {
    let app = common::spawn().await;
    let customer = app.seed_user(Role::Customer).await;
    let product = app.seed_product(1_000, 0, 10).await;
    app.seed_promo("OLD", 20, Duration::hours(-1)).await;
    app.seed_promo("FRESH", 20, Duration::hours(1)).await;

    app.carts.add_item(customer.id, product.id, 1).await.unwrap();

    let err = app.carts.apply_promo(customer.id, "OLD").await.unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));

    app.carts.apply_promo(customer.id, "FRESH").await.unwrap();
    let validated = app.carts.validate_cart(customer.id).await.unwrap().unwrap();
    assert_eq!(validated.promo.unwrap().code, "FRESH");
}

#[tokio::test]
async fn add_item_enforces_cumulative_stock() {
    let app = common::spawn().await;
    let customer = app.seed_user(Role::Customer).await;
    let product = app.seed_product(1_000, 0, 5).await;

    app.carts.add_item(customer.id, product.id, 3).await.unwrap();

    // 3 already carted + 3 more exceeds the 5 in stock.
    let err = app
        .carts
        .add_item(customer.id, product.id, 3)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock(_));

    // Topping up within stock merges into one row.
    app.carts.add_item(customer.id, product.id, 2).await.unwrap();
    let validated = app.carts.validate_cart(customer.id).await.unwrap().unwrap();
    assert_eq!(validated.items.len(), 1);
    assert_eq!(validated.items[0].0.quantity, 5);
}

#[tokio::test]
async fn zero_quantity_update_removes_the_row() {
    let app = common::spawn().await;
    let customer = app.seed_user(Role::Customer).await;
    let product = app.seed_product(1_000, 0, 5).await;

    app.carts.add_item(customer.id, product.id, 2).await.unwrap();
    app.carts
        .update_item_quantity(customer.id, product.id, 0)
        .await
        .unwrap();

    let validated = app.carts.validate_cart(customer.id).await.unwrap().unwrap();
    assert!(validated.items.is_empty());

    // Updating something no longer in the cart is NotFound.
    let err = app
        .carts
        .update_item_quantity(customer.id, product.id, 1)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn users_without_a_cart_get_none_not_an_error() {
    let app = common::spawn().await;
    let customer = app.seed_user(Role::Customer).await;
    assert!(app.carts.validate_cart(customer.id).await.unwrap().is_none());

    // Deleted products cannot be added in the first place.
    let product = app.seed_product(1_000, 0, 5).await;
    let mut update: product::ActiveModel = Product::find_by_id(product.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap()
        .into();
    update.deleted = Set(true);
    update.update(&*app.db).await.unwrap();

    let err = app
        .carts
        .add_item(customer.id, product.id, 1)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}
